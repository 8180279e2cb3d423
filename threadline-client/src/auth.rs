use anyhow::Context;

use crate::{
    api::{LoginRequest, Session, User},
    RequestClient, RequestError,
};

/// Logs in and remembers the session token for the next requests
pub async fn login(client: &RequestClient, email: &str, password: &str) -> anyhow::Result<Session> {
    let req = LoginRequest {
        email: String::from(email),
        password: String::from(password),
    };
    req.validate()?;
    let session: Session = client
        .post("/auth/login", &req)
        .await
        .context("logging in")?;
    client
        .session()
        .set_token(&session.token)
        .context("saving auth token")?;
    tracing::info!(user = %session.user.name, "logged in");
    Ok(session)
}

/// Tells the server the session is over, then forgets the token
///
/// The token is forgotten even if the server could not be reached.
pub async fn logout(client: &RequestClient) -> anyhow::Result<()> {
    let res = client
        .post::<(), _>("/auth/logout", &serde_json::json!({}))
        .await;
    if let Err(err) = res {
        tracing::error!(?err, "failed to log out on the server");
    }
    client.session().clear_token().context("clearing auth token")?;
    tracing::info!("logged out");
    Ok(())
}

pub async fn current_user(client: &RequestClient) -> Result<User, RequestError> {
    client.get("/user/profile", &[]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::AuthToken, testing::FakeTransport, ClientConfig, SessionStore};

    fn client(transport: &std::sync::Arc<FakeTransport>) -> RequestClient {
        RequestClient::new(
            ClientConfig::default(),
            transport.clone(),
            SessionStore::in_memory(),
        )
    }

    #[tokio::test]
    async fn login_stores_token() {
        let transport = FakeTransport::replying(
            200,
            r#"{
                "token": "tok-1",
                "user": {
                    "id": "ffffffff-ffff-ffff-ffff-ffffffffffff",
                    "name": "Demo User",
                    "email": "demo@example.org"
                }
            }"#,
        );
        let c = client(&transport);
        let session = login(&c, "demo@example.org", "password123").await.unwrap();
        assert_eq!(session.user.name, "Demo User");
        assert_eq!(c.session().token(), Some(AuthToken(String::from("tok-1"))));

        let req = transport.last();
        assert_eq!(req.url.path(), "/api/auth/login");
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["email"], "demo@example.org");
    }

    #[tokio::test]
    async fn login_rejects_bad_emails_locally() {
        let transport = FakeTransport::replying(200, "null");
        let c = client(&transport);
        assert!(login(&c, "not-an-email", "pw").await.is_err());
        assert_eq!(c.session().token(), None);
    }

    #[tokio::test]
    async fn logout_always_forgets_token() {
        let transport = FakeTransport::failing();
        let c = client(&transport);
        c.session()
            .set_token(&AuthToken(String::from("tok-1")))
            .unwrap();
        logout(&c).await.unwrap();
        assert_eq!(c.session().token(), None);
        assert_eq!(transport.last().url.path(), "/api/auth/logout");
    }
}
