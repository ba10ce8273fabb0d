//! Request signing and the default delivery headers.
//!
//! Receivers authenticate a delivery by recomputing an HMAC of the request
//! body with the shared secret. Both SHA-1 and SHA-256 variants are sent so
//! that receivers written for either convention can verify.

use hmac::{Hmac, Mac};
use http::header::InvalidHeaderValue;
use http::{HeaderMap, HeaderName, HeaderValue};
use sha1::Sha1;
use sha2::Sha256;

use crate::model::HookTask;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Header families that carry the product specific delivery metadata.
const PRODUCT_PREFIXES: [&str; 3] = ["x-forgejo", "x-gitea", "x-gogs"];

/// Lower-case hex HMAC digests of a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signatures {
    pub sha1: String,
    pub sha256: String,
}

impl Signatures {
    /// Computes both digests of `body` keyed by `secret`.
    ///
    /// An empty secret is used as an empty key.
    #[must_use]
    pub fn compute(secret: &[u8], body: &[u8]) -> Self {
        let mut sha1 = HmacSha1::new_from_slice(secret).expect("HMAC can take key of any size");
        sha1.update(body);
        let mut sha256 =
            HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
        sha256.update(body);

        Self {
            sha1: hex::encode(sha1.finalize().into_bytes()),
            sha256: hex::encode(sha256.finalize().into_bytes()),
        }
    }
}

/// Checks a hex SHA-256 signature in constant time.
///
/// Accepts both the bare digest and the `sha256=` prefixed form.
#[must_use]
pub fn verify_sha256(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let digest = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Adds the delivery, event and signature headers for `task`.
///
/// `body` must be the exact bytes that will be sent.
///
/// # Errors
///
/// Returns an error when the task uuid is not a valid header value.
pub fn add_default_headers(
    headers: &mut HeaderMap,
    secret: &[u8],
    task: &HookTask,
    body: &[u8],
) -> Result<(), InvalidHeaderValue> {
    let signatures = Signatures::compute(secret, body);
    let delivery = HeaderValue::from_str(&task.uuid)?;
    let event = HeaderValue::from_static(task.event_type.event());
    let event_type = HeaderValue::from_static(task.event_type.as_str());
    let sha256 = HeaderValue::from_str(&signatures.sha256)?;

    for prefix in PRODUCT_PREFIXES {
        insert(headers, &format!("{prefix}-delivery"), delivery.clone());
        insert(headers, &format!("{prefix}-event"), event.clone());
        insert(headers, &format!("{prefix}-event-type"), event_type.clone());
        insert(headers, &format!("{prefix}-signature"), sha256.clone());
    }

    headers.insert(
        HeaderName::from_static("x-hub-signature"),
        HeaderValue::from_str(&format!("sha1={}", signatures.sha1))?,
    );
    headers.insert(
        HeaderName::from_static("x-hub-signature-256"),
        HeaderValue::from_str(&format!("sha256={}", signatures.sha256))?,
    );

    headers.insert(HeaderName::from_static("x-github-delivery"), delivery);
    headers.insert(HeaderName::from_static("x-github-event"), event);
    headers.insert(HeaderName::from_static("x-github-event-type"), event_type);

    Ok(())
}

fn insert(headers: &mut HeaderMap, name: &str, value: HeaderValue) {
    // Names are built from fixed lower-case prefixes and suffixes.
    if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
