use super::{segment, ApiClient, ApiError};
use crate::types::{ChatMessage, ChatOverview, ChatUser, Conversation, OutgoingMessage};
use reqwest::Method;

#[derive(Clone)]
pub struct ChatApi {
    client: ApiClient,
}

impl ChatApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn users(&self) -> Result<Vec<ChatUser>, ApiError> {
        self.client.get("/chat/users").await
    }

    pub async fn conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.client.get("/chat/conversations").await
    }

    /// Fetches users and conversations concurrently. Either failure fails the
    /// whole call.
    pub async fn overview(&self) -> Result<ChatOverview, ApiError> {
        let (users, conversations) = tokio::try_join!(self.users(), self.conversations())?;
        Ok(ChatOverview {
            users,
            conversations,
        })
    }

    pub async fn messages(&self, user_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        self.client
            .get(&format!("/chat/messages/{}", segment(user_id)?))
            .await
    }

    pub async fn mark_read(&self, user_id: &str) -> Result<(), ApiError> {
        self.client
            .send::<()>(
                Method::PUT,
                &format!("/chat/messages/{}/read", segment(user_id)?),
                None,
            )
            .await
    }

    pub async fn send(&self, receiver_id: &str, content: &str) -> Result<ChatMessage, ApiError> {
        let message = OutgoingMessage {
            receiver_id,
            content,
        };
        self.client.post("/chat/messages", &message).await
    }
}
