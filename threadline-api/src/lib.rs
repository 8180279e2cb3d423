use chrono::Utc;

mod auth;
mod comment;
mod error;

pub use auth::{LoginRequest, Session, User};
pub use comment::{Author, Comment, CommentContent, LikeUpdate, NewComment, Reply};
pub use error::Error;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

/// Maximum number of characters accepted in a comment or reply
pub const MAX_CONTENT_LEN: usize = 500;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn new() -> CommentId {
        CommentId(Uuid::new_v4())
    }

    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

impl Default for CommentId {
    fn default() -> CommentId {
        CommentId::new()
    }
}

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

/// Identifies the subject a comment thread is attached to. Opaque.
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostId(pub String);

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub String);

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Checks user-submitted comment text and returns it trimmed
pub fn validate_content(content: &str) -> Result<String, Error> {
    validate_string(content)?;
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::EmptyContent);
    }
    let len = content.chars().count();
    if len > MAX_CONTENT_LEN {
        return Err(Error::ContentTooLong {
            len,
            max: MAX_CONTENT_LEN,
        });
    }
    Ok(String::from(content))
}

pub fn validate_email(email: &str) -> Result<(), Error> {
    validate_string(email)?;
    let invalid = || Error::InvalidEmail(String::from(email));
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    match domain.split_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() && !tld.ends_with('.') => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed() {
        assert_eq!(validate_content("  hello \n"), Ok(String::from("hello")));
    }

    #[test]
    fn content_must_not_be_blank() {
        assert_eq!(validate_content(""), Err(Error::EmptyContent));
        assert_eq!(validate_content(" \t\n "), Err(Error::EmptyContent));
    }

    #[test]
    fn content_length_is_counted_in_chars() {
        let at_limit = "é".repeat(MAX_CONTENT_LEN);
        assert!(validate_content(&at_limit).is_ok());

        let over = "a".repeat(MAX_CONTENT_LEN + 1);
        assert_eq!(
            validate_content(&over),
            Err(Error::ContentTooLong {
                len: MAX_CONTENT_LEN + 1,
                max: MAX_CONTENT_LEN
            })
        );
    }

    #[test]
    fn content_rejects_null_bytes() {
        assert!(matches!(
            validate_content("foo\0bar"),
            Err(Error::NullByteInString(_))
        ));
    }

    #[test]
    fn emails() {
        assert!(validate_email("alice@example.org").is_ok());
        assert!(validate_email("a.b+c@mail.example.org").is_ok());

        for bad in [
            "",
            "alice",
            "@example.org",
            "alice@",
            "alice@example",
            "alice@.org",
            "alice@example.",
            "al ice@example.org",
            "alice@@example.org",
        ] {
            assert_eq!(
                validate_email(bad),
                Err(Error::InvalidEmail(String::from(bad))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn comment_ids_are_unique() {
        let ids = (0..1000).map(|_| CommentId::new()).collect::<std::collections::HashSet<_>>();
        assert_eq!(ids.len(), 1000);
        assert_ne!(CommentId::default(), CommentId::default());
    }
}
