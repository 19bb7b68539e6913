use crate::store::SessionStore;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;

/// Hook run around every request sent through `ApiClient`.
pub trait Interceptor: Send + Sync {
    fn on_request(&self, _headers: &mut HeaderMap) {}

    fn on_response(&self, _status: StatusCode) {}
}

/// Attaches `Authorization: Bearer <token>` when a token is persisted.
pub struct BearerAuth {
    session: SessionStore,
}

impl BearerAuth {
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }
}

impl Interceptor for BearerAuth {
    fn on_request(&self, headers: &mut HeaderMap) {
        let Some(token) = self.session.token() else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("persisted token is not a valid header value; sending unauthenticated"),
        }
    }
}

/// Drops the persisted session when the server answers 401.
pub struct ExpireSessionOn401 {
    session: SessionStore,
}

impl ExpireSessionOn401 {
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }
}

impl Interceptor for ExpireSessionOn401 {
    fn on_response(&self, status: StatusCode) {
        if status != StatusCode::UNAUTHORIZED {
            return;
        }
        match self.session.clear() {
            Ok(true) => tracing::info!("server rejected the session; signed out"),
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "failed to clear expired session"),
        }
    }
}
