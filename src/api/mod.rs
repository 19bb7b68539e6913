mod client;
mod error;
mod interceptor;

pub mod auth;
pub mod blogs;
pub mod chat;
pub mod follow;
pub mod membership;
pub mod profile;
pub mod quit_plans;

pub use client::{ApiClient, ApiResponse, RequestConfig};
pub use error::{ApiError, ErrorKind};
pub use interceptor::{BearerAuth, ExpireSessionOn401, Interceptor};

pub(crate) use client::segment;
#[cfg(test)]
pub(crate) use client::test_support;
