pub use threadline_api as api;

mod auth;
mod client;
mod format;
mod interceptors;
mod retry;
mod storage;
mod store;
mod transport;

#[cfg(test)]
mod testing;

pub use auth::{current_user, login, logout};
pub use client::{
    ClientConfig, Interceptor, RequestClient, RequestConfig, RequestError, RequestOptions,
    Response,
};
pub use format::format_relative_time;
pub use interceptors::{BearerAuth, LogResponses, Navigator, ParseApiErrors, UnauthorizedHandler};
pub use retry::{retry, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY};
pub use storage::{
    FileStorage, LayeredStorage, MemoryStorage, SessionStore, Storage, StorageExt, AUTH_TOKEN_KEY,
};
pub use store::{
    CommentSource, CommentStore, HttpCommentSource, Latency, LoadState, FETCH_ERROR_MESSAGE,
};
pub use transport::{ReqwestTransport, Transport};
