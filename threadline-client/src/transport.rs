use anyhow::Context;
use async_trait::async_trait;

use crate::{RequestConfig, Response};

/// Sends a fully-intercepted request and hands back the raw answer
///
/// Non-2xx statuses are not errors at this level, only failing to get an
/// answer at all is.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dispatch(&self, req: RequestConfig) -> anyhow::Result<Response>;
}

#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> ReqwestTransport {
        ReqwestTransport { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn dispatch(&self, req: RequestConfig) -> anyhow::Result<Response> {
        let mut builder = self
            .client
            .request(req.method.clone(), req.url.clone())
            .headers(req.headers);
        if let Some(body) = req.body {
            builder = builder.body(body);
        }
        let resp = builder
            .send()
            .await
            .with_context(|| format!("sending {} request to {}", req.method, req.url))?;
        let status = resp.status();
        let url = resp.url().clone();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("reading response body from {url}"))?;
        Ok(Response {
            status,
            url,
            headers,
            body: body.to_vec(),
        })
    }
}
