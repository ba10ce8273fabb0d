//! sourcehut builds job submission.
//!
//! Pushes and ref creations submit the repository's build manifest, adjusted
//! to check out the pushed commit, through the builds GraphQL API.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Handler, HandlerError, HookMetadata, decode_meta, decode_payload, json_request, lookup_meta,
};
use crate::model::{HookTask, HookType, Webhook};
use crate::payload::{
    Conversion, CreatePayload, DeletePayload, ForkPayload, IssueCommentPayload, IssuePayload,
    PackagePayload, PayloadConvertor, PullRequestPayload, PushPayload, RefName, ReleasePayload,
    Repository, RepositoryPayload, ReviewKind, WikiPayload,
};
use crate::repo::{RepoError, RepositoryReader};
use crate::transport::HttpRequest;

const SUBMIT_MUTATION: &str = "mutation (
	$manifest: String!
	$tags: [String!]
	$note: String!
	$secrets: Boolean!
	$execute: Boolean!
	$visibility: Visibility!
) {
	submit(
		manifest: $manifest
		tags: $tags
		note: $note
		secrets: $secrets
		execute: $execute
		visibility: $visibility
	) {
		id
	}
}";

const DEFAULT_VISIBILITY: &str = "PRIVATE";
const SUBMITTER: &str = "forgejo";

/// Builds settings stored in the webhook meta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildsMeta {
    /// Manifest location relative to the repository root.
    pub manifest_path: String,
    /// `PUBLIC`, `UNLISTED` or `PRIVATE`; empty means private.
    pub visibility: String,
    /// Whether the job may use the account's secrets.
    pub secrets: bool,
}

/// What to build, extracted from a supported event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BuildTrigger {
    repository: Repository,
    commit: String,
    /// Full ref name, e.g. `refs/heads/main`.
    git_ref: String,
    note: String,
    /// Events from the repository itself may use secrets.
    trusted: bool,
}

struct BuildsConvertor;

impl PayloadConvertor for BuildsConvertor {
    type Output = BuildTrigger;

    fn create(&self, p: &CreatePayload) -> Conversion<BuildTrigger> {
        let git_ref = full_ref(&p.ref_name, &p.ref_type);
        let note = format!("{} {} created", p.ref_type, RefName(&git_ref).short_name());
        Conversion::Payload(BuildTrigger {
            repository: p.repository.clone(),
            commit: p.sha.clone(),
            git_ref,
            note,
            trusted: true,
        })
    }

    fn push(&self, p: &PushPayload) -> Conversion<BuildTrigger> {
        let (commit, note) = p.head_commit.as_ref().map_or_else(
            || (p.after.clone(), String::new()),
            |head| (head.id.clone(), head.message.clone()),
        );
        Conversion::Payload(BuildTrigger {
            repository: p.repository.clone(),
            commit,
            git_ref: p.ref_name.clone(),
            note,
            trusted: true,
        })
    }

    fn delete(&self, _: &DeletePayload) -> Conversion<BuildTrigger> {
        Conversion::Unsupported
    }
    fn fork(&self, _: &ForkPayload) -> Conversion<BuildTrigger> {
        Conversion::Unsupported
    }
    fn issue(&self, _: &IssuePayload) -> Conversion<BuildTrigger> {
        Conversion::Unsupported
    }
    fn issue_comment(&self, _: &IssueCommentPayload) -> Conversion<BuildTrigger> {
        Conversion::Unsupported
    }
    fn pull_request(&self, _: &PullRequestPayload) -> Conversion<BuildTrigger> {
        Conversion::Unsupported
    }
    fn review(&self, _: &PullRequestPayload, _: ReviewKind) -> Conversion<BuildTrigger> {
        Conversion::Unsupported
    }
    fn repository(&self, _: &RepositoryPayload) -> Conversion<BuildTrigger> {
        Conversion::Unsupported
    }
    fn release(&self, _: &ReleasePayload) -> Conversion<BuildTrigger> {
        Conversion::Unsupported
    }
    fn wiki(&self, _: &WikiPayload) -> Conversion<BuildTrigger> {
        Conversion::Unsupported
    }
    fn package(&self, _: &PackagePayload) -> Conversion<BuildTrigger> {
        Conversion::Unsupported
    }
}

/// Create events may carry a short ref name and its kind separately.
fn full_ref(ref_name: &str, ref_type: &str) -> String {
    if ref_name.starts_with("refs/") {
        return ref_name.to_string();
    }
    match ref_type {
        "tag" => format!("refs/tags/{ref_name}"),
        _ => format!("refs/heads/{ref_name}"),
    }
}

/// The subset of the builds manifest format that is read and rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Manifest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub arch: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub repositories: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub shell: bool,
    pub sources: Vec<String>,
    pub tasks: Vec<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<serde_yaml::Value>,
    pub environment: BTreeMap<String, serde_yaml::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub oauth: String,
}

#[derive(Debug, Serialize)]
struct BuildsVariables {
    manifest: String,
    tags: Vec<String>,
    note: String,
    secrets: bool,
    execute: bool,
    visibility: String,
}

#[derive(Debug, Serialize)]
struct GraphqlPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<BuildsVariables>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Why the manifest could not be produced.
enum ManifestFailure {
    /// Shown to the user in place of a job submission.
    Message(String),
    Fatal(HandlerError),
}

/// Submits build jobs for pushes and ref creations.
pub struct BuildsHandler {
    reader: Arc<dyn RepositoryReader>,
    app_url: String,
}

impl BuildsHandler {
    pub fn new(reader: Arc<dyn RepositoryReader>, app_url: impl Into<String>) -> Self {
        Self {
            reader,
            app_url: app_url.into(),
        }
    }

    async fn build_manifest(
        &self,
        meta: &BuildsMeta,
        trigger: &BuildTrigger,
    ) -> Result<String, ManifestFailure> {
        let path = &meta.manifest_path;
        let raw = match self
            .reader
            .read_file(&trigger.repository, &trigger.commit, path)
            .await
        {
            Ok(raw) => raw,
            Err(RepoError::NotFound(_)) => {
                return Err(ManifestFailure::Message("could not open repository".into()));
            }
            Err(RepoError::CommitNotFound(_)) => {
                return Err(ManifestFailure::Message(format!(
                    "could not get commit {:?}",
                    trigger.commit
                )));
            }
            Err(RepoError::FileNotFound { .. }) => {
                return Err(ManifestFailure::Message(format!(
                    "could not open manifest {path:?}"
                )));
            }
            Err(other) => return Err(ManifestFailure::Fatal(other.into())),
        };

        let mut manifest: Manifest = serde_yaml::from_slice(&raw).map_err(|e| {
            debug!(path = %path, error = %e, "Manifest does not decode");
            ManifestFailure::Message(format!("could not decode manifest {path:?}"))
        })?;

        for (key, value) in [
            ("BUILD_SUBMITTER", SUBMITTER),
            ("BUILD_SUBMITTER_URL", self.app_url.as_str()),
            ("GIT_REF", trigger.git_ref.as_str()),
        ] {
            manifest
                .environment
                .insert(key.to_string(), serde_yaml::Value::String(value.to_string()));
        }

        let clone_url = &trigger.repository.clone_url;
        let source = format!("{clone_url}#{}", trigger.commit);
        match manifest.sources.iter_mut().find(|s| s.as_str() == clone_url.as_str()) {
            Some(existing) => *existing = source,
            None => manifest.sources.push(source),
        }

        serde_yaml::to_string(&manifest)
            .map_err(|e| ManifestFailure::Fatal(HandlerError::Serialize(e.to_string())))
    }
}

#[async_trait]
impl Handler for BuildsHandler {
    fn hook_type(&self) -> HookType {
        HookType::SourcehutBuilds
    }

    fn metadata(&self, webhook: &Webhook) -> Option<HookMetadata> {
        lookup_meta(webhook).map(HookMetadata::Builds)
    }

    async fn new_request(
        &self,
        webhook: &Webhook,
        task: &HookTask,
    ) -> Result<HttpRequest, HandlerError> {
        let meta: BuildsMeta = decode_meta(webhook)?;
        if !is_valid_path(&meta.manifest_path) {
            return Err(RepoError::InvalidPath(meta.manifest_path).into());
        }

        let payload = decode_payload(task)?;
        let Conversion::Payload(trigger) = BuildsConvertor.convert(&payload) else {
            return Err(HandlerError::UnsupportedEvent {
                hook_type: HookType::SourcehutBuilds,
                event: task.event_type,
            });
        };

        let body = match self.build_manifest(&meta, &trigger).await {
            Ok(manifest) => {
                let git_ref = RefName(&trigger.git_ref);
                GraphqlPayload {
                    query: Some(SUBMIT_MUTATION),
                    variables: Some(BuildsVariables {
                        manifest,
                        tags: vec![
                            trigger.repository.full_name.clone(),
                            format!("{}/{}", git_ref.ref_type(), git_ref.short_name()),
                            meta.manifest_path.clone(),
                        ],
                        note: trigger.note.clone(),
                        secrets: meta.secrets && trigger.trusted,
                        execute: trigger.trusted,
                        visibility: if meta.visibility.is_empty() {
                            DEFAULT_VISIBILITY.to_string()
                        } else {
                            meta.visibility.clone()
                        },
                    }),
                    error: None,
                }
            }
            Err(ManifestFailure::Message(message)) => GraphqlPayload {
                query: None,
                variables: None,
                error: Some(format!(
                    "{}:{} {message}",
                    trigger.repository.full_name, trigger.git_ref
                )),
            },
            Err(ManifestFailure::Fatal(e)) => return Err(e),
        };

        json_request(webhook, &body)
    }
}

/// A relative, slash separated path without empty, `.` or `..` segments.
pub(crate) fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}
