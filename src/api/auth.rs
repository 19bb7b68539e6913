use super::{ApiClient, ApiError};
use crate::types::{Credentials, NewAccount, Session};
use reqwest::Method;

/// Login, registration and logout. The only place a session is created.
#[derive(Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let credentials = Credentials {
            email: email.trim(),
            password,
        };
        let session: Session = self.client.post("/auth/login", &credentials).await?;
        self.client.session().save(&session)?;
        Ok(session)
    }

    pub async fn register(&self, account: &NewAccount) -> Result<Session, ApiError> {
        let session: Session = self.client.post("/auth/register", account).await?;
        self.client.session().save(&session)?;
        Ok(session)
    }

    /// Signs out locally even when the server call fails; the server error is
    /// still reported.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let remote = self
            .client
            .send::<()>(Method::POST, "/auth/logout", None)
            .await;
        self.client.session().clear()?;
        self.client.session().clear_following()?;
        match remote {
            Err(ApiError::Unauthorized { .. }) => Ok(()),
            other => other,
        }
    }
}
