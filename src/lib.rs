pub mod api;
mod app;
pub mod config;
pub mod follow_cache;
pub mod logging;
pub mod realtime;
mod redact;
pub mod store;
pub mod types;

pub use api::{ApiClient, ApiError, ErrorKind};
pub use app::{AppError, Smokefree};
pub use config::ClientConfig;
pub use follow_cache::FollowingCache;
pub use realtime::{ConnectionState, Notifier};
pub use store::SessionStore;
