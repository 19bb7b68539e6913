use super::{ApiClient, ApiError};
use crate::types::{MembershipPackage, PaymentLink};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequest<'a> {
    package_id: &'a str,
}

#[derive(Clone)]
pub struct MembershipApi {
    client: ApiClient,
}

impl MembershipApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn packages(&self) -> Result<Vec<MembershipPackage>, ApiError> {
        self.client.get("/membership/packages").await
    }

    /// Asks the server for a hosted payment page; the payment itself happens
    /// off-client.
    pub async fn create_payment_url(&self, package_id: &str) -> Result<PaymentLink, ApiError> {
        self.client
            .post(
                "/payment/create-payment-url",
                &PaymentRequest {
                    package_id: package_id.trim(),
                },
            )
            .await
    }
}
