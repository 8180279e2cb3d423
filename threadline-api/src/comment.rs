use chrono::Utc;

use crate::{CommentId, PostId, Time, UserId};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A comment attached directly to a thread
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub content: String,
    pub author: Author,
    pub created_at: Time,
    pub likes: u64,

    /// Replies in submission order, oldest first
    #[serde(default)]
    pub replies: Vec<Reply>,
}

/// A comment attached under a top-level comment
///
/// Replies cannot themselves be replied to, so threads are at most one level
/// deep.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: CommentId,
    pub content: String,
    pub author: Author,
    pub created_at: Time,
    pub likes: u64,
}

/// Body of a comment creation request
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: PostId,
    pub content: String,
}

/// Body of edit and reply requests
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentContent {
    pub content: String,
}

/// Like counter of a comment after it got liked or unliked
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeUpdate {
    pub comment_id: CommentId,
    pub is_liked: bool,
    pub likes: u64,
}

impl Comment {
    pub fn now(author: Author, content: String) -> Comment {
        Comment {
            id: CommentId::new(),
            content,
            author,
            created_at: Utc::now(),
            likes: 0,
            replies: Vec::new(),
        }
    }

    pub fn can_delete(&self, user: &UserId) -> bool {
        self.author.id == *user
    }

    pub fn reply(&self, id: &CommentId) -> Option<&Reply> {
        self.replies.iter().find(|r| r.id == *id)
    }
}

impl Reply {
    pub fn now(author: Author, content: String) -> Reply {
        Reply {
            id: CommentId::new(),
            content,
            author,
            created_at: Utc::now(),
            likes: 0,
        }
    }

    pub fn can_delete(&self, user: &UserId) -> bool {
        self.author.id == *user
    }
}
