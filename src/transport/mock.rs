//! Mock HTTP client for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{HttpClient, HttpError, HttpRequest, HttpResponse};

/// Scripted behaviour of one request.
pub enum MockReply {
    Respond(HttpResponse),
    Fail(HttpError),
    Panic(&'static str),
    /// Never completes; only cancellation ends the request.
    Hang,
}

/// A mock HTTP client that captures requests and replays scripted replies.
///
/// When the script runs out, every further request gets `200 OK`.
#[derive(Clone, Default)]
pub struct MockClient {
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    replies: Arc<Mutex<VecDeque<MockReply>>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: MockReply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn with_status(self, status: u16, body: &str) -> Self {
        self.with_reply(MockReply::Respond(response(status, body)))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

pub fn response(status: u16, body: &str) -> HttpResponse {
    let mut headers = http::HeaderMap::new();
    headers.insert("x-request-id", http::HeaderValue::from_static("r-1"));
    HttpResponse::new(
        http::StatusCode::from_u16(status).unwrap(),
        headers,
        body.as_bytes().to_vec(),
    )
}

impl HttpClient for MockClient {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.lock().unwrap().push(req);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            None => Ok(response(200, "ok")),
            Some(MockReply::Respond(resp)) => Ok(resp),
            Some(MockReply::Fail(err)) => Err(err),
            Some(MockReply::Panic(message)) => panic!("{message}"),
            Some(MockReply::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
