use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use reqwest::Url;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    api, BearerAuth, LogResponses, Navigator, ParseApiErrors, SessionStore, Transport,
    UnauthorizedHandler,
};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Prefix of every endpoint, eg. `https://example.org/api`
    pub base_url: String,

    /// Where the user gets sent when the server rejects their session
    pub login_path: String,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            base_url: String::from("http://127.0.0.1:3000/api"),
            login_path: String::from("/login"),
        }
    }
}

/// A request on its way through the request interceptors
#[derive(Clone, Debug)]
pub struct RequestConfig {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

/// Caller-provided overrides for a single request
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Response {
    pub status: StatusCode,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        // empty answers (eg. 204) are read as `null` so that `()` parses
        if self.body.iter().all(u8::is_ascii_whitespace) {
            serde_json::from_slice(b"null")
        } else {
            serde_json::from_slice(&self.body)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("encoding request body")]
    Encode(#[source] serde_json::Error),

    #[error("request failed: {0:#}")]
    Transport(anyhow::Error),

    #[error("HTTP {status}")]
    Status { status: StatusCode, response: Response },

    #[error("HTTP {status}: {error}")]
    Api { status: StatusCode, error: api::Error },

    #[error("decoding response body")]
    Decode(#[source] serde_json::Error),
}

impl RequestError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::Status { status, .. } | RequestError::Api { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// One link of an interceptor chain
///
/// Gets the value produced by the previous link and returns the value the
/// next link will see. Implemented for async closures `Fn(T) -> impl Future<Output = T>`.
#[async_trait]
pub trait Interceptor<T: Send + 'static>: Send + Sync {
    async fn intercept(&self, value: T) -> T;
}

#[async_trait]
impl<T, F, Fut> Interceptor<T> for F
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    async fn intercept(&self, value: T) -> T {
        self(value).await
    }
}

async fn run_chain<T: Send + 'static>(chain: &[Arc<dyn Interceptor<T>>], mut value: T) -> T {
    for interceptor in chain {
        value = interceptor.intercept(value).await;
    }
    value
}

pub struct RequestClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    session: SessionStore,
    request_interceptors: Vec<Arc<dyn Interceptor<RequestConfig>>>,
    response_interceptors: Vec<Arc<dyn Interceptor<Response>>>,
    error_interceptors: Vec<Arc<dyn Interceptor<RequestError>>>,
}

impl RequestClient {
    /// Builds a client with empty interceptor chains
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        session: SessionStore,
    ) -> RequestClient {
        RequestClient {
            config,
            transport,
            session,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
            error_interceptors: Vec::new(),
        }
    }

    /// Registers bearer authentication, response logging, unauthorized-session
    /// handling and API error parsing, in this order
    pub fn with_default_interceptors(mut self, navigator: Arc<dyn Navigator>) -> RequestClient {
        self.add_request_interceptor(BearerAuth::new(self.session.clone()));
        self.add_response_interceptor(LogResponses);
        self.add_error_interceptor(UnauthorizedHandler::new(
            self.session.clone(),
            navigator,
            self.config.login_path.clone(),
        ));
        self.add_error_interceptor(ParseApiErrors);
        self
    }

    pub fn add_request_interceptor(&mut self, i: impl Interceptor<RequestConfig> + 'static) {
        self.request_interceptors.push(Arc::new(i));
    }

    pub fn add_response_interceptor(&mut self, i: impl Interceptor<Response> + 'static) {
        self.response_interceptors.push(Arc::new(i));
    }

    pub fn add_error_interceptor(&mut self, i: impl Interceptor<RequestError> + 'static) {
        self.error_interceptors.push(Arc::new(i));
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, RequestError> {
        match self.perform(endpoint, options).await {
            Ok(res) => Ok(res),
            Err(err) => Err(self.intercept_error(err).await),
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RequestError> {
        let options = RequestOptions {
            method: Some(Method::GET),
            query: query
                .iter()
                .map(|(k, v)| (String::from(*k), String::from(*v)))
                .collect(),
            ..RequestOptions::default()
        };
        self.request(endpoint, options).await
    }

    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.with_body(Method::POST, endpoint, body).await
    }

    pub async fn put<T, B>(&self, endpoint: &str, body: &B) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.with_body(Method::PUT, endpoint, body).await
    }

    pub async fn patch<T, B>(&self, endpoint: &str, body: &B) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.with_body(Method::PATCH, endpoint, body).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, RequestError> {
        let options = RequestOptions {
            method: Some(Method::DELETE),
            ..RequestOptions::default()
        };
        self.request(endpoint, options).await
    }

    async fn with_body<T, B>(&self, method: Method, endpoint: &str, body: &B) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = match serde_json::to_string(body) {
            Ok(body) => body,
            Err(err) => return Err(self.intercept_error(RequestError::Encode(err)).await),
        };
        let options = RequestOptions {
            method: Some(method),
            body: Some(body),
            ..RequestOptions::default()
        };
        self.request(endpoint, options).await
    }

    async fn intercept_error(&self, err: RequestError) -> RequestError {
        run_chain(&self.error_interceptors, err).await
    }

    async fn perform<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, RequestError> {
        let config = self.build_config(endpoint, options)?;
        let config = run_chain(&self.request_interceptors, config).await;
        tracing::trace!(method = %config.method, url = %config.url, "dispatching request");
        let resp = self
            .transport
            .dispatch(config)
            .await
            .map_err(RequestError::Transport)?;
        let resp = run_chain(&self.response_interceptors, resp).await;
        if !resp.status.is_success() {
            return Err(RequestError::Status {
                status: resp.status,
                response: resp,
            });
        }
        resp.json().map_err(RequestError::Decode)
    }

    fn build_config(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<RequestConfig, RequestError> {
        let sep = if endpoint.starts_with('/') { "" } else { "/" };
        let raw = format!("{}{sep}{endpoint}", self.config.base_url.trim_end_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| RequestError::InvalidUrl {
            url: raw.clone(),
            message: e.to_string(),
        })?;
        if !options.query.is_empty() {
            url.query_pairs_mut().extend_pairs(options.query.iter());
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        for name in options.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in options.headers.iter() {
            headers.append(name.clone(), value.clone());
        }

        Ok(RequestConfig {
            method: options.method.unwrap_or(Method::GET),
            url,
            headers,
            body: options.body,
        })
    }
}
