#![cfg(test)]

use std::sync::Arc;

use parking_lot::Mutex;
use threadline_client::{
    api::{AuthToken, CommentContent, LikeUpdate, NewComment, PostId},
    current_user, login, logout, retry, ClientConfig, CommentStore, FileStorage,
    HttpCommentSource, Latency, LoadState, RequestClient, RequestError, SessionStore,
    FETCH_ERROR_MESSAGE,
};

use super::*;

fn init_logs() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt::try_init();
    }
}

fn quick_server() -> Arc<MockServer> {
    Arc::new(MockServer::new().with_latency(Duration::ZERO))
}

fn client_for(server: &Arc<MockServer>) -> (RequestClient, Arc<Mutex<Vec<String>>>) {
    client_with(server, SessionStore::in_memory())
}

fn client_with(
    server: &Arc<MockServer>,
    session: SessionStore,
) -> (RequestClient, Arc<Mutex<Vec<String>>>) {
    init_logs();
    let redirects = Arc::new(Mutex::new(Vec::new()));
    let navigator = {
        let redirects = redirects.clone();
        move |path: &str| redirects.lock().push(String::from(path))
    };
    let client = RequestClient::new(
        ClientConfig {
            base_url: String::from("http://mock.invalid/api"),
            login_path: String::from("/login"),
        },
        server.clone(),
        session,
    )
    .with_default_interceptors(Arc::new(navigator));
    (client, redirects)
}

#[tokio::test]
async fn login_whoami_logout() {
    let server = quick_server();
    let (client, redirects) = client_for(&server);

    let session = login(&client, DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();
    assert_eq!(server.test_num_sessions(), 1);
    assert_eq!(client.session().token(), Some(session.token.clone()));

    let me = current_user(&client).await.unwrap();
    assert_eq!(me, session.user);

    logout(&client).await.unwrap();
    assert_eq!(server.test_num_sessions(), 0);
    assert_eq!(client.session().token(), None);
    assert!(redirects.lock().is_empty());
}

#[tokio::test]
async fn wrong_password_is_denied() {
    let server = quick_server();
    let (client, redirects) = client_for(&server);
    let err = login(&client, DEMO_EMAIL, "hunter2").await.unwrap_err();
    match err.downcast_ref::<RequestError>() {
        Some(RequestError::Api { error, .. }) => assert_eq!(*error, Error::PermissionDenied),
        _ => panic!("unexpected error {err:?}"),
    }
    assert_eq!(client.session().token(), None);
    assert!(redirects.lock().is_empty());
}

#[tokio::test]
async fn revoked_token_sends_user_to_login() {
    let server = quick_server();
    let (client, redirects) = client_for(&server);
    login(&client, DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();
    let stale = client.session().token().unwrap();

    // the session ends elsewhere, eg. in another process sharing the server
    server.test_revoke_sessions();

    let err = current_user(&client).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(client.session().token(), None);
    assert_eq!(*redirects.lock(), vec![String::from("/login")]);

    // stale tokens are rejected even where anonymous reads are allowed
    client.session().set_token(&stale).unwrap();
    let source = HttpCommentSource::new(Arc::new(client));
    let post = PostId(String::from("p"));
    assert!(source.fetch_comments(&post).await.is_err());
    assert_eq!(redirects.lock().len(), 2);
    assert_eq!(source.fetch_comments(&post).await.unwrap().len(), 2);
}

#[tokio::test]
async fn session_file_outlives_the_server() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let first = quick_server();
    let (client, _) = client_with(&first, SessionStore::new(Arc::new(FileStorage::new(&path))));
    login(&client, DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();
    drop(first);

    // a later run starts from a fresh server but the same session file
    let second = quick_server();
    let (client, redirects) =
        client_with(&second, SessionStore::new(Arc::new(FileStorage::new(&path))));
    assert_eq!(current_user(&client).await.unwrap().email, DEMO_EMAIL);
    assert!(client.session().token().is_some());
    assert!(redirects.lock().is_empty());

    let token = client.session().token().unwrap();
    logout(&client).await.unwrap();
    client.session().set_token(&token).unwrap();
    let err = current_user(&client).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(client.session().token(), None);
}

#[tokio::test]
async fn forged_tokens_are_rejected() {
    let server = quick_server();
    let (client, redirects) = client_for(&server);
    for forged in [
        String::from("mock-123"),
        format!("mock-{}.x", Uuid::new_v4()),
        format!("{}.x", DEMO_USER.0),
    ] {
        client.session().set_token(&AuthToken(forged)).unwrap();
        let err = current_user(&client).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }
    assert_eq!(redirects.lock().len(), 3);
}

#[tokio::test]
async fn comment_endpoints() {
    let server = quick_server();
    let (client, _) = client_for(&server);
    login(&client, DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();

    let created: Comment = client
        .post(
            "/comments",
            &NewComment {
                post_id: PostId(String::from("post-1")),
                content: String::from("  first!  "),
            },
        )
        .await
        .unwrap();
    assert_eq!(created.content, "first!");
    assert_eq!(created.author, MockServer::demo_author());
    assert_eq!(server.thread()[0], created);
    assert_eq!(server.thread().len(), 3);

    let url = format!("/comments/{}", created.id);
    let edited: Comment = client
        .put(
            &url,
            &CommentContent {
                content: String::from("edited"),
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.content, "edited");
    assert_eq!(edited.id, created.id);

    let like_url = format!("{url}/like");
    for expected in [1, 2] {
        let up: LikeUpdate = client.post(&like_url, &serde_json::json!({})).await.unwrap();
        assert_eq!(up.likes, expected);
        assert!(up.is_liked);
    }
    let down: LikeUpdate = client.delete(&like_url).await.unwrap();
    assert_eq!((down.comment_id, down.is_liked, down.likes), (created.id, false, 1));

    let reply: Reply = client
        .post(
            &format!("{url}/replies"),
            &CommentContent {
                content: String::from("replying to myself"),
            },
        )
        .await
        .unwrap();
    assert_eq!(server.thread()[0].replies, vec![reply.clone()]);

    let () = client.delete(&format!("/comments/{}", reply.id)).await.unwrap();
    assert!(server.thread()[0].replies.is_empty());
    let () = client.delete(&url).await.unwrap();
    assert_eq!(server.thread().len(), 2);

    let err = client.delete::<()>(&url).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn comment_endpoints_check_author_and_content() {
    let server = quick_server();
    let (client, redirects) = client_for(&server);
    let someone_else = server.thread()[0].id;
    let nested = server.thread()[1].replies[0].id;

    let body = CommentContent {
        content: String::from("hi"),
    };
    let err = client
        .post::<Reply, _>(&format!("/comments/{someone_else}/replies"), &body)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(redirects.lock().len(), 1);

    login(&client, DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();
    match client.delete::<()>(&format!("/comments/{someone_else}")).await {
        Err(RequestError::Api { error, .. }) => assert_eq!(error, Error::PermissionDenied),
        other => panic!("unexpected result {other:?}"),
    }
    match client.put::<Comment, _>(&format!("/comments/{nested}"), &body).await {
        Err(RequestError::Api { error, .. }) => assert_eq!(error, Error::PermissionDenied),
        other => panic!("unexpected result {other:?}"),
    }
    let err = client
        .post::<Reply, _>(&format!("/comments/{nested}/replies"), &body)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    let blank = NewComment {
        post_id: PostId(String::from("post-1")),
        content: String::from("   "),
    };
    match client.post::<Comment, _>("/comments", &blank).await {
        Err(RequestError::Api { error, .. }) => assert_eq!(error, Error::EmptyContent),
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(server.thread().len(), 2);
}

fn assert_took(start: tokio::time::Instant, ms: u64) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_millis(ms) && elapsed < Duration::from_millis(ms + 50),
        "took {elapsed:?}, expected {ms}ms"
    );
}

#[tokio::test(start_paused = true)]
async fn endpoints_have_their_own_latency() {
    let server = Arc::new(MockServer::new());
    let (client, _) = client_for(&server);
    login(&client, DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();
    let created: Comment = client
        .post(
            "/comments",
            &NewComment {
                post_id: PostId(String::from("post-1")),
                content: String::from("timed"),
            },
        )
        .await
        .unwrap();
    let url = format!("/comments/{}", created.id);

    let start = tokio::time::Instant::now();
    let _: LikeUpdate = client
        .post(&format!("{url}/like"), &serde_json::json!({}))
        .await
        .unwrap();
    assert_took(start, 200);

    let start = tokio::time::Instant::now();
    let () = client.delete(&url).await.unwrap();
    assert_took(start, 300);

    let start = tokio::time::Instant::now();
    let _: Vec<Comment> = client.get("/comments", &[("postId", "post-1")]).await.unwrap();
    assert_took(start, 500);
}

#[tokio::test]
async fn store_loads_thread_through_client() {
    let server = quick_server();
    let (client, _) = client_for(&server);
    let store = CommentStore::new(
        PostId(String::from("post-1")),
        MockServer::demo_author(),
        Arc::new(HttpCommentSource::new(Arc::new(client))),
    )
    .with_latency(Latency::none());

    store.fetch().await;
    assert_eq!(store.state(), LoadState::Ready);
    assert_eq!(store.comments(), server.thread());

    let comments = store.comments();
    assert_eq!(comments.len(), 2);
    assert!(comments[0].created_at > comments[1].created_at);
    assert_eq!(comments[1].replies.len(), 1);
    assert_eq!(comments[1].replies[0].author.name, "Bob Smith");
}

#[tokio::test]
async fn missing_post_id_is_not_found() {
    let server = quick_server();
    let (client, _) = client_for(&server);
    match client.get::<Vec<Comment>>("/comments", &[]).await {
        Err(RequestError::Api { status, error }) => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(error, Error::NotFound(String::from("postId")));
        }
        other => panic!("unexpected result {other:?}"),
    }
    let err = client.delete::<()>("/comments").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn network_failures_are_absorbed_by_the_store() {
    let server = Arc::new(
        MockServer::new()
            .with_latency(Duration::ZERO)
            .with_failure_rate(1.0),
    );
    let store = CommentStore::new(
        PostId(String::from("post-1")),
        MockServer::demo_author(),
        server.clone(),
    );
    store.fetch().await;
    assert_eq!(store.state(), LoadState::Error);
    assert_eq!(store.error().as_deref(), Some(FETCH_ERROR_MESSAGE));
    assert!(store.comments().is_empty());

    let (client, _) = client_for(&server);
    let err = client.get::<()>("/comments", &[("postId", "x")]).await.unwrap_err();
    assert!(matches!(err, RequestError::Transport(_)));
}

#[tokio::test]
async fn retrying_a_flaky_fetch() {
    let server = Arc::new(
        MockServer::new()
            .with_latency(Duration::ZERO)
            .with_failure_rate(0.5),
    );
    let store = CommentStore::new(
        PostId(String::from("post-1")),
        MockServer::demo_author(),
        server.clone(),
    );
    // 0.5^40 chance of a spurious failure
    let res = retry(40, Duration::ZERO, || async {
        store.fetch().await;
        match store.state() {
            LoadState::Ready => Ok(()),
            state => Err(state),
        }
    })
    .await;
    assert_eq!(res, Ok(()));
    assert_eq!(store.comments().len(), 2);
}

#[tokio::test]
async fn demo_session_through_store() {
    let server = quick_server();
    let store = CommentStore::new(
        PostId(String::from("post-1")),
        MockServer::demo_author(),
        server.clone(),
    )
    .with_latency(Latency::none());
    store.fetch().await;

    let mine = store.add(String::from("hello")).await;
    let reply = store.reply(mine, String::from("replying to myself")).await.unwrap();
    assert!(store.like(reply).await);

    let comments = store.comments();
    assert_eq!(comments[0].content, "hello");
    assert_eq!(comments[0].replies[0].likes, 1);
    assert!(comments[0].can_delete(&MockServer::demo_author().id));
    assert!(!comments[1].can_delete(&MockServer::demo_author().id));

    assert!(store.delete(mine).await);
    assert_eq!(store.comments(), server.thread());
}

#[test]
fn tokens_are_opaque_strings() {
    let tok: AuthToken = serde_json::from_str(r#""mock-123""#).unwrap();
    assert_eq!(tok, AuthToken(String::from("mock-123")));
}
