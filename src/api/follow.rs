use super::{segment, ApiClient, ApiError};
use crate::types::FollowUser;
use reqwest::Method;

#[derive(Clone)]
pub struct FollowApi {
    client: ApiClient,
}

impl FollowApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn follow(&self, user_id: &str) -> Result<(), ApiError> {
        self.client
            .send::<()>(Method::POST, &format!("/follow/{}", segment(user_id)?), None)
            .await
    }

    pub async fn unfollow(&self, user_id: &str) -> Result<(), ApiError> {
        self.client
            .send::<()>(Method::DELETE, &format!("/follow/{}", segment(user_id)?), None)
            .await
    }

    pub async fn followers(&self, user_id: &str) -> Result<Vec<FollowUser>, ApiError> {
        self.client
            .get(&format!("/follow/{}/followers", segment(user_id)?))
            .await
    }

    pub async fn following(&self, user_id: &str) -> Result<Vec<FollowUser>, ApiError> {
        self.client
            .get(&format!("/follow/{}/following", segment(user_id)?))
            .await
    }
}
