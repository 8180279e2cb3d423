use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;

use crate::{RequestConfig, Response, Transport};

enum Answer {
    Status(StatusCode, Vec<u8>),
    Unreachable,
}

/// Transport that records requests and always gives the same answer
pub struct FakeTransport {
    seen: Mutex<Vec<RequestConfig>>,
    answer: Answer,
}

impl FakeTransport {
    pub fn replying(status: u16, body: &str) -> Arc<FakeTransport> {
        Arc::new(FakeTransport {
            seen: Mutex::new(Vec::new()),
            answer: Answer::Status(
                StatusCode::from_u16(status).expect("invalid status code in test"),
                body.as_bytes().to_vec(),
            ),
        })
    }

    pub fn failing() -> Arc<FakeTransport> {
        Arc::new(FakeTransport {
            seen: Mutex::new(Vec::new()),
            answer: Answer::Unreachable,
        })
    }

    pub fn last(&self) -> RequestConfig {
        self.seen
            .lock()
            .last()
            .cloned()
            .expect("no request was dispatched")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn dispatch(&self, req: RequestConfig) -> anyhow::Result<Response> {
        let url = req.url.clone();
        self.seen.lock().push(req);
        match &self.answer {
            Answer::Status(status, body) => Ok(Response {
                status: *status,
                url,
                headers: HeaderMap::new(),
                body: body.clone(),
            }),
            Answer::Unreachable => Err(anyhow!("connection refused")),
        }
    }
}
