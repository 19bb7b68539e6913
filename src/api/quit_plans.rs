use super::{segment, ApiClient, ApiError};
use crate::types::{PlanProgress, PlanStatus, ProgressEntry, QuitPlan, QuitStage, SelectPlan};
use reqwest::Method;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct StatusChange {
    status: PlanStatus,
}

/// Quit plan catalogue, selection and progress tracking. Stage validation and
/// progress computation happen server-side.
#[derive(Clone)]
pub struct QuitPlanApi {
    client: ApiClient,
}

impl QuitPlanApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn plan_path(plan_id: &str, rest: &str) -> Result<String, ApiError> {
        Ok(format!("/quit-plans/{}{rest}", segment(plan_id)?))
    }

    pub async fn list(&self) -> Result<Vec<QuitPlan>, ApiError> {
        self.client.get("/quit-plans").await
    }

    pub async fn get(&self, plan_id: &str) -> Result<QuitPlan, ApiError> {
        self.client.get(&Self::plan_path(plan_id, "")?).await
    }

    pub async fn select(&self, plan_id: &str, selection: &SelectPlan) -> Result<QuitPlan, ApiError> {
        self.client
            .post(&Self::plan_path(plan_id, "/select")?, selection)
            .await
    }

    pub async fn cancel(&self, plan_id: &str) -> Result<(), ApiError> {
        self.client
            .send::<()>(Method::PUT, &Self::plan_path(plan_id, "/cancel")?, None)
            .await
    }

    pub async fn update_status(&self, plan_id: &str, status: PlanStatus) -> Result<QuitPlan, ApiError> {
        self.client
            .put(&Self::plan_path(plan_id, "/status")?, &StatusChange { status })
            .await
    }

    pub async fn history(&self) -> Result<Vec<QuitPlan>, ApiError> {
        self.client.get("/quit-plans/history").await
    }

    pub async fn stages(&self, plan_id: &str) -> Result<Vec<QuitStage>, ApiError> {
        let mut stages: Vec<QuitStage> =
            self.client.get(&Self::plan_path(plan_id, "/stages")?).await?;
        stages.sort_by_key(|s| s.order);
        Ok(stages)
    }

    pub async fn progress(&self, plan_id: &str) -> Result<PlanProgress, ApiError> {
        self.client
            .get(&Self::plan_path(plan_id, "/progress")?)
            .await
    }

    pub async fn record_progress(
        &self,
        plan_id: &str,
        entry: &ProgressEntry,
    ) -> Result<PlanProgress, ApiError> {
        self.client
            .post(&Self::plan_path(plan_id, "/progress")?, entry)
            .await
    }
}
