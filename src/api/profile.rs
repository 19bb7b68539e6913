use super::{segment, ApiClient, ApiError};
use crate::types::{Profile, ProfileUpdate};

#[derive(Clone)]
pub struct ProfileApi {
    client: ApiClient,
}

impl ProfileApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn me(&self) -> Result<Profile, ApiError> {
        self.client.get("/users/profile").await
    }

    pub async fn user(&self, user_id: &str) -> Result<Profile, ApiError> {
        self.client
            .get(&format!("/users/{}", segment(user_id)?))
            .await
    }

    /// Updates the profile and refreshes the cached user so the session
    /// reflects the new name/avatar.
    pub async fn update(&self, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        let profile: Profile = self.client.put("/users/profile", update).await?;
        let session = self.client.session();
        if let Some(cached) = session.user() {
            session.update_user(&profile.to_user(cached.role, cached.membership))?;
        }
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::client_for;
    use crate::types::{Session, User};
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn update_refreshes_cached_user() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/users/profile")
            .match_body(Matcher::Json(json!({"name": "Ana B"})))
            .with_status(200)
            .with_body(
                r#"{"data":{"id":"1","email":"a@b.com","name":"Ana B","followersCount":3}}"#,
            )
            .create_async()
            .await;
        let (client, session) = client_for(&server);
        session
            .save(&Session {
                token: "abc".to_string(),
                user: User {
                    id: "1".to_string(),
                    email: "a@b.com".to_string(),
                    name: Some("Ana".to_string()),
                    avatar: None,
                    role: None,
                    membership: Some("premium".to_string()),
                },
            })
            .unwrap();

        let profile = ProfileApi::new(client)
            .update(&ProfileUpdate {
                name: Some("Ana B".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(profile.followers_count, 3);
        let cached = session.user().unwrap();
        assert_eq!(cached.name.as_deref(), Some("Ana B"));
        assert_eq!(cached.membership.as_deref(), Some("premium"));
    }

    #[tokio::test]
    async fn user_encodes_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/users/a%20b")
            .with_status(200)
            .with_body(r#"{"data":{"_id":"a b","email":"x@y.z"}}"#)
            .create_async()
            .await;
        let (client, _) = client_for(&server);

        let profile = ProfileApi::new(client).user("a b").await.unwrap();

        assert_eq!(profile.id, "a b");
        mock.assert_async().await;
    }
}
