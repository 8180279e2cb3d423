use std::sync::Arc;

use async_trait::async_trait;
use http::{header, HeaderValue, StatusCode};

use crate::{api, Interceptor, RequestConfig, RequestError, Response, SessionStore};

/// Sends the user somewhere else, eg. to the login view
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn redirect(&self, path: &str) {
        self(path)
    }
}

/// Adds `Authorization: Bearer <token>` when the session holds a token
pub struct BearerAuth {
    session: SessionStore,
}

impl BearerAuth {
    pub fn new(session: SessionStore) -> BearerAuth {
        BearerAuth { session }
    }
}

#[async_trait]
impl Interceptor<RequestConfig> for BearerAuth {
    async fn intercept(&self, mut req: RequestConfig) -> RequestConfig {
        if let Some(token) = self.session.token() {
            match HeaderValue::from_str(&format!("Bearer {}", token.0)) {
                Ok(value) => {
                    req.headers.insert(header::AUTHORIZATION, value);
                }
                Err(err) => tracing::error!(?err, "stored auth token is not a valid header value"),
            }
        }
        req
    }
}

pub struct LogResponses;

#[async_trait]
impl Interceptor<Response> for LogResponses {
    async fn intercept(&self, resp: Response) -> Response {
        tracing::debug!(status = %resp.status, url = %resp.url, "received response");
        resp
    }
}

/// Drops the session and sends the user to the login view on 401
///
/// Other failures are only logged. The error is always passed on unchanged.
pub struct UnauthorizedHandler {
    session: SessionStore,
    navigator: Arc<dyn Navigator>,
    login_path: String,
}

impl UnauthorizedHandler {
    pub fn new(
        session: SessionStore,
        navigator: Arc<dyn Navigator>,
        login_path: String,
    ) -> UnauthorizedHandler {
        UnauthorizedHandler {
            session,
            navigator,
            login_path,
        }
    }
}

#[async_trait]
impl Interceptor<RequestError> for UnauthorizedHandler {
    async fn intercept(&self, err: RequestError) -> RequestError {
        match err.status() {
            Some(StatusCode::UNAUTHORIZED) => {
                tracing::warn!("session rejected by server, logging out");
                if let Err(err) = self.session.clear_token() {
                    tracing::error!(?err, "failed clearing auth token");
                }
                self.navigator.redirect(&self.login_path);
            }
            Some(StatusCode::FORBIDDEN) => tracing::error!("access forbidden: {err}"),
            Some(status) if status.is_server_error() => tracing::error!("server error: {err}"),
            _ => (),
        }
        err
    }
}

/// Turns status errors carrying a JSON API error body into `RequestError::Api`
pub struct ParseApiErrors;

#[async_trait]
impl Interceptor<RequestError> for ParseApiErrors {
    async fn intercept(&self, err: RequestError) -> RequestError {
        match err {
            RequestError::Status { status, response } => match api::Error::parse(&response.body) {
                Ok(error) => RequestError::Api { status, error },
                Err(_) => RequestError::Status { status, response },
            },
            err => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::{
        api::AuthToken, testing::FakeTransport, ClientConfig, MemoryStorage, RequestClient,
        Storage,
    };

    /// Memory storage that counts removals
    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        removals: AtomicUsize,
    }

    impl Storage for CountingStorage {
        fn get_raw(&self, key: &str) -> Option<String> {
            self.inner.get_raw(key)
        }

        fn set_raw(&self, key: &str, value: String) -> anyhow::Result<()> {
            self.inner.set_raw(key, value)
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.removals.fetch_add(1, Ordering::SeqCst);
            self.inner.remove(key)
        }
    }

    struct Harness {
        client: RequestClient,
        storage: Arc<CountingStorage>,
        redirects: Arc<Mutex<Vec<String>>>,
    }

    fn harness(transport: &Arc<FakeTransport>) -> Harness {
        let storage = Arc::new(CountingStorage::default());
        let session = SessionStore::new(storage.clone());
        session
            .set_token(&AuthToken(String::from("s3cr3t")))
            .unwrap();
        let redirects = Arc::new(Mutex::new(Vec::new()));
        let navigator = {
            let redirects = redirects.clone();
            move |path: &str| redirects.lock().push(String::from(path))
        };
        let client = RequestClient::new(ClientConfig::default(), transport.clone(), session)
            .with_default_interceptors(Arc::new(navigator));
        Harness {
            client,
            storage,
            redirects,
        }
    }

    #[tokio::test]
    async fn bearer_token_is_read_at_request_time() {
        let transport = FakeTransport::replying(200, "null");
        let h = harness(&transport);

        let () = h.client.get("/user/profile", &[]).await.unwrap();
        assert_eq!(
            transport.last().headers[header::AUTHORIZATION],
            "Bearer s3cr3t"
        );

        h.client.session().clear_token().unwrap();
        let () = h.client.get("/user/profile", &[]).await.unwrap();
        assert!(transport.last().headers.get(header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn unauthorized_clears_session_once() {
        let transport = FakeTransport::replying(401, "");
        let mut h = harness(&transport);
        for _ in 0..3 {
            h.client
                .add_error_interceptor(|err: RequestError| async move { err });
        }

        let err = h.client.get::<()>("/user/profile", &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(h.storage.removals.load(Ordering::SeqCst), 1);
        assert_eq!(h.client.session().token(), None);
        assert_eq!(*h.redirects.lock(), vec![String::from("/login")]);
    }

    #[tokio::test]
    async fn other_failures_keep_session() {
        for status in [403, 404, 500] {
            let transport = FakeTransport::replying(status, "");
            let h = harness(&transport);
            let err = h.client.get::<()>("/comments", &[]).await.unwrap_err();
            assert_eq!(err.status().map(|s| s.as_u16()), Some(status));
            assert_eq!(h.storage.removals.load(Ordering::SeqCst), 0);
            assert!(h.client.session().token().is_some());
            assert!(h.redirects.lock().is_empty());
        }
    }

    #[tokio::test]
    async fn api_error_bodies_are_parsed() {
        let body = api::Error::ContentTooLong { len: 600, max: 500 }.contents();
        let transport = FakeTransport::replying(400, std::str::from_utf8(&body).unwrap());
        let h = harness(&transport);
        match h.client.post::<(), _>("/comments", "x").await {
            Err(RequestError::Api { status, error }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(error, api::Error::ContentTooLong { len: 600, max: 500 });
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_api_error_bodies_are_kept() {
        let transport = FakeTransport::replying(502, "Bad Gateway");
        let h = harness(&transport);
        match h.client.get::<()>("/comments", &[]).await {
            Err(RequestError::Status { status, response }) => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(response.body, b"Bad Gateway");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
