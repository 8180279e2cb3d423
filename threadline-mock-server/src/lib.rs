use std::{collections::HashSet, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use reqwest::{
    header::{self, HeaderMap},
    Method, StatusCode, Url,
};
use serde::de::DeserializeOwned;
use threadline_client::{
    api::{
        uuid, validate_content, Author, AuthToken, Comment, CommentContent, CommentId, Error,
        LikeUpdate, LoginRequest, NewComment, PostId, Reply, Session, User, UserId, Uuid,
    },
    CommentSource, RequestConfig, Response, Transport,
};

mod e2e;

pub const DEMO_EMAIL: &str = "demo@example.org";
pub const DEMO_PASSWORD: &str = "password123";

const BASE_PATH: &str = "/api";
const TOKEN_PREFIX: &str = "mock-";

const DEMO_USER: UserId = UserId(uuid!("00000000-0000-4000-8000-000000000001"));
const ALICE: UserId = UserId(uuid!("00000000-0000-4000-8000-00000000000a"));
const BOB: UserId = UserId(uuid!("00000000-0000-4000-8000-00000000000b"));
const CAROL: UserId = UserId(uuid!("00000000-0000-4000-8000-00000000000c"));

#[derive(Debug)]
struct DbUser {
    user: User,
    pass: String,
}

/// In-process stand-in for the comments backend
///
/// Serves the same thread for every post, after a simulated network delay
/// that fails with the configured probability.
///
/// Tokens carry the id of their user, so a token handed out by one instance
/// is honored by any other one until it gets revoked there.
pub struct MockServer {
    latency: Duration,
    failure_rate: f64,
    users: Vec<DbUser>,
    sessions: Mutex<HashSet<String>>,
    revoked: Mutex<HashSet<String>>,
    thread: Mutex<Vec<Comment>>,
}

fn author(id: UserId, name: &str) -> Author {
    Author {
        id,
        name: String::from(name),
        avatar: None,
    }
}

fn seed_thread() -> Vec<Comment> {
    let now = Utc::now();
    vec![
        Comment {
            id: CommentId::new(),
            content: String::from(
                "The Tailwind CSS integration is seamless. Love how the components are styled!",
            ),
            author: author(CAROL, "Carol Davis"),
            created_at: now - chrono::Duration::minutes(30),
            likes: 3,
            replies: Vec::new(),
        },
        Comment {
            id: CommentId::new(),
            content: String::from(
                "This is a great example of clean architecture! The separation of concerns is really well done.",
            ),
            author: author(ALICE, "Alice Johnson"),
            created_at: now - chrono::Duration::hours(2),
            likes: 5,
            replies: vec![Reply {
                id: CommentId::new(),
                content: String::from(
                    "I agree! The folder structure makes it so easy to find what you're looking for.",
                ),
                author: author(BOB, "Bob Smith"),
                created_at: now - chrono::Duration::hours(1),
                likes: 2,
            }],
        },
    ]
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            latency: Duration::from_millis(500),
            failure_rate: 0.0,
            users: vec![DbUser {
                user: User {
                    id: DEMO_USER,
                    name: String::from("Current User"),
                    email: String::from(DEMO_EMAIL),
                },
                pass: String::from(DEMO_PASSWORD),
            }],
            sessions: Mutex::new(HashSet::new()),
            revoked: Mutex::new(HashSet::new()),
            thread: Mutex::new(seed_thread()),
        }
    }

    /// Delay of reads and writes; deletions take 3/5 of it and likes 2/5
    pub fn with_latency(mut self, latency: Duration) -> MockServer {
        self.latency = latency;
        self
    }

    /// Probability, between 0 and 1, that a call fails with a network error
    pub fn with_failure_rate(mut self, rate: f64) -> MockServer {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// The thread currently served for every post
    pub fn thread(&self) -> Vec<Comment> {
        self.thread.lock().clone()
    }

    /// Identity of the demo user, as the comment store should use it
    pub fn demo_author() -> Author {
        author(DEMO_USER, "Current User")
    }

    /// Return the current number of sessions opened on this instance
    pub fn test_num_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    /// End every session opened on this instance
    pub fn test_revoke_sessions(&self) {
        let mut revoked = self.revoked.lock();
        revoked.extend(self.sessions.lock().drain());
    }

    async fn simulate_network(&self, delay: Duration) -> anyhow::Result<()> {
        tokio::time::sleep(delay).await;
        if self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(anyhow!("Network error occurred"));
        }
        Ok(())
    }

    fn resolve(&self, headers: &HeaderMap) -> Result<Option<&User>, Error> {
        let auth = match headers.get(header::AUTHORIZATION) {
            None => return Ok(None),
            Some(auth) => auth.to_str().map_err(|_| Error::Unauthorized)?,
        };
        let token = auth.strip_prefix("Bearer ").ok_or(Error::Unauthorized)?;
        if self.revoked.lock().contains(token) {
            return Err(Error::Unauthorized);
        }
        let uid = token
            .strip_prefix(TOKEN_PREFIX)
            .and_then(|t| t.split_once('.'))
            .and_then(|(uid, _)| Uuid::parse_str(uid).ok())
            .map(UserId)
            .ok_or(Error::Unauthorized)?;
        self.users
            .iter()
            .find(|u| u.user.id == uid)
            .map(|u| Some(&u.user))
            .ok_or(Error::Unauthorized)
    }

    fn user(&self, headers: &HeaderMap) -> Result<&User, Error> {
        self.resolve(headers)?.ok_or(Error::Unauthorized)
    }

    fn auth(&self, body: Option<&str>) -> Result<Vec<u8>, Error> {
        let req: LoginRequest = parse_body(body)?;
        req.validate()?;
        let u = self
            .users
            .iter()
            .find(|u| u.user.email == req.email && u.pass == req.password)
            .ok_or(Error::PermissionDenied)?;
        let token = AuthToken(format!("{}{}.{}", TOKEN_PREFIX, u.user.id.0, Uuid::new_v4()));
        self.sessions.lock().insert(token.0.clone());
        tracing::debug!(user = %u.user.name, "mock server opened a session");
        json(&Session {
            token,
            user: u.user.clone(),
        })
    }

    fn unauth(&self, headers: &HeaderMap) -> Result<Vec<u8>, Error> {
        self.user(headers)?;
        if let Some(token) = headers
            .get(header::AUTHORIZATION)
            .and_then(|a| a.to_str().ok())
            .and_then(|a| a.strip_prefix("Bearer "))
        {
            self.sessions.lock().remove(token);
            self.revoked.lock().insert(String::from(token));
        }
        Ok(Vec::new())
    }

    fn create(&self, user: &User, body: Option<&str>) -> Result<Vec<u8>, Error> {
        let req: NewComment = parse_body(body)?;
        let comment = Comment::now(author_of(user), validate_content(&req.content)?);
        tracing::debug!(post = %req.post_id, id = %comment.id, "mock server created comment");
        self.thread.lock().insert(0, comment.clone());
        json(&comment)
    }

    fn update(&self, user: &User, id: CommentId, body: Option<&str>) -> Result<Vec<u8>, Error> {
        let req: CommentContent = parse_body(body)?;
        let content = validate_content(&req.content)?;
        let mut thread = self.thread.lock();
        for c in thread.iter_mut() {
            if c.id == id {
                if c.author.id != user.id {
                    return Err(Error::PermissionDenied);
                }
                c.content = content;
                return json(&*c);
            }
            if let Some(r) = c.replies.iter_mut().find(|r| r.id == id) {
                if r.author.id != user.id {
                    return Err(Error::PermissionDenied);
                }
                r.content = content;
                return json(&*r);
            }
        }
        Err(not_found(id))
    }

    fn delete(&self, user: &User, id: CommentId) -> Result<Vec<u8>, Error> {
        let mut thread = self.thread.lock();
        if let Some(pos) = thread.iter().position(|c| c.id == id) {
            if !thread[pos].can_delete(&user.id) {
                return Err(Error::PermissionDenied);
            }
            thread.remove(pos);
            return Ok(Vec::new());
        }
        for c in thread.iter_mut() {
            if let Some(r) = c.reply(&id) {
                if !r.can_delete(&user.id) {
                    return Err(Error::PermissionDenied);
                }
                c.replies.retain(|r| r.id != id);
                return Ok(Vec::new());
            }
        }
        Err(not_found(id))
    }

    fn like(&self, id: CommentId, liked: bool) -> Result<Vec<u8>, Error> {
        let mut thread = self.thread.lock();
        let likes = thread
            .iter_mut()
            .find_map(|c| match c.id == id {
                true => Some(&mut c.likes),
                false => c.replies.iter_mut().find(|r| r.id == id).map(|r| &mut r.likes),
            })
            .ok_or_else(|| not_found(id))?;
        *likes = match liked {
            true => *likes + 1,
            false => likes.saturating_sub(1),
        };
        json(&LikeUpdate {
            comment_id: id,
            is_liked: liked,
            likes: *likes,
        })
    }

    fn reply(&self, user: &User, parent: CommentId, body: Option<&str>) -> Result<Vec<u8>, Error> {
        let req: CommentContent = parse_body(body)?;
        let reply = Reply::now(author_of(user), validate_content(&req.content)?);
        let mut thread = self.thread.lock();
        let parent = thread
            .iter_mut()
            .find(|c| c.id == parent)
            .ok_or_else(|| not_found(parent))?;
        parent.replies.push(reply.clone());
        json(&reply)
    }

    fn delay(&self, req: &RequestConfig) -> Duration {
        match (&req.method, segments(&req.url).as_slice()) {
            (&Method::DELETE, ["comments", _]) => self.latency * 3 / 5,
            (_, ["comments", _, "like"]) => self.latency * 2 / 5,
            _ => self.latency,
        }
    }

    fn route(&self, req: &RequestConfig) -> Result<Vec<u8>, Error> {
        let body = req.body.as_deref();
        match (&req.method, segments(&req.url).as_slice()) {
            (&Method::POST, ["auth", "login"]) => self.auth(body),
            (&Method::POST, ["auth", "logout"]) => self.unauth(&req.headers),
            (&Method::GET, ["user", "profile"]) => json(self.user(&req.headers)?),
            (&Method::GET, ["comments"]) => {
                // anonymous reads are fine, but a rejected token is not
                self.resolve(&req.headers)?;
                let post = req
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "postId")
                    .map(|(_, v)| PostId(v.into_owned()))
                    .ok_or_else(|| Error::NotFound(String::from("postId")))?;
                tracing::debug!(%post, "mock server serving comments");
                json(&*self.thread.lock())
            }
            (&Method::POST, ["comments"]) => self.create(self.user(&req.headers)?, body),
            (&Method::PUT, ["comments", id]) => {
                self.update(self.user(&req.headers)?, parse_id(id)?, body)
            }
            (&Method::DELETE, ["comments", id]) => {
                self.delete(self.user(&req.headers)?, parse_id(id)?)
            }
            (&Method::POST, ["comments", id, "like"]) => {
                self.user(&req.headers)?;
                self.like(parse_id(id)?, true)
            }
            (&Method::DELETE, ["comments", id, "like"]) => {
                self.user(&req.headers)?;
                self.like(parse_id(id)?, false)
            }
            (&Method::POST, ["comments", id, "replies"]) => {
                self.reply(self.user(&req.headers)?, parse_id(id)?, body)
            }
            _ => Err(Error::NotFound(format!("{} {}", req.method, req.url.path()))),
        }
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

fn author_of(user: &User) -> Author {
    author(user.id, &user.name)
}

fn not_found(id: CommentId) -> Error {
    Error::NotFound(format!("comment {id}"))
}

/// Path segments below the API base path
fn segments(url: &Url) -> Vec<&str> {
    let path = url.path();
    path.strip_prefix(BASE_PATH)
        .unwrap_or(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_id(segment: &str) -> Result<CommentId, Error> {
    Uuid::parse_str(segment)
        .map(CommentId)
        .map_err(|_| Error::NotFound(format!("comment {segment}")))
}

fn parse_body<T: DeserializeOwned>(body: Option<&str>) -> Result<T, Error> {
    serde_json::from_str(body.unwrap_or(""))
        .map_err(|e| Error::Unknown(format!("invalid request body: {e}")))
}

fn json<T: serde::Serialize + ?Sized>(v: &T) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(v).map_err(|e| Error::Unknown(format!("serializing response: {e}")))
}

fn respond(url: Url, res: Result<Vec<u8>, Error>) -> Response {
    let (status, body) = match res {
        Ok(body) if body.is_empty() => (StatusCode::NO_CONTENT, body),
        Ok(body) => (StatusCode::OK, body),
        Err(err) => {
            tracing::info!("mock server returning error: {err}");
            (err.status_code(), err.contents())
        }
    };
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    Response {
        status,
        url,
        headers,
        body,
    }
}

#[async_trait]
impl Transport for MockServer {
    async fn dispatch(&self, req: RequestConfig) -> anyhow::Result<Response> {
        self.simulate_network(self.delay(&req)).await?;
        let res = self.route(&req);
        Ok(respond(req.url, res))
    }
}

#[async_trait]
impl CommentSource for MockServer {
    async fn fetch_comments(&self, post: &PostId) -> anyhow::Result<Vec<Comment>> {
        self.simulate_network(self.latency).await?;
        tracing::debug!(%post, "mock server serving comments");
        Ok(self.thread())
    }
}
