#![allow(dead_code)]

use async_trait::async_trait;
use diacare_admin::gateway::{Gateway, GatewayError, GatewayResult};
use diacare_admin::model::{
    ActionOutcome, BotProfile, BotSettings, FollowEventDryRun, FollowEventFlow, FollowerPage,
    GlucoseReading, HealthRecommendation, LiffApp, LineInsights, PatientRecord, PatientStats,
    RecommendationDraft,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub endpoint: &'static str,
    pub args: Value,
}

enum Canned {
    Ok(Value),
    Err(GatewayError),
}

struct Queued {
    delay: Duration,
    body: Canned,
}

/// Gateway fake: every call is logged, and answers come off a FIFO queue.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    responses: Arc<Mutex<VecDeque<Queued>>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn respond<T: Serialize>(&self, body: T) {
        self.respond_after(Duration::ZERO, body).await
    }

    pub async fn respond_after<T: Serialize>(&self, delay: Duration, body: T) {
        let value = serde_json::to_value(body).unwrap();
        self.responses.lock().await.push_back(Queued {
            delay,
            body: Canned::Ok(value),
        });
    }

    pub async fn fail(&self, status: u16, message: &str) {
        self.responses.lock().await.push_back(Queued {
            delay: Duration::ZERO,
            body: Canned::Err(GatewayError::Server {
                status,
                message: message.to_string(),
            }),
        });
    }

    pub async fn fail_transport(&self) {
        self.responses.lock().await.push_back(Queued {
            delay: Duration::ZERO,
            body: Canned::Err(GatewayError::Transport("connection refused".into())),
        });
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn endpoints(&self) -> Vec<&'static str> {
        self.calls.lock().await.iter().map(|c| c.endpoint).collect()
    }

    async fn answer<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        args: Value,
    ) -> GatewayResult<T> {
        self.calls.lock().await.push(Call { endpoint, args });
        let queued = self.responses.lock().await.pop_front();
        let Some(queued) = queued else {
            return Err(GatewayError::Transport(format!("no response queued for {}", endpoint)));
        };
        if !queued.delay.is_zero() {
            tokio::time::sleep(queued.delay).await;
        }
        match queued.body {
            Canned::Ok(value) => {
                serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))
            }
            Canned::Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn get_bot_settings(&self) -> GatewayResult<BotSettings> {
        self.answer("get_bot_settings", Value::Null).await
    }

    async fn save_bot_settings(&self, settings: &BotSettings) -> GatewayResult<BotSettings> {
        self.answer("save_bot_settings", json!(settings)).await
    }

    async fn configure_webhook(&self) -> GatewayResult<ActionOutcome> {
        self.answer("configure_webhook", Value::Null).await
    }

    async fn configure_login_callback(&self) -> GatewayResult<ActionOutcome> {
        self.answer("configure_login_callback", Value::Null).await
    }

    async fn get_bot_profile(&self) -> GatewayResult<BotProfile> {
        self.answer("get_bot_profile", Value::Null).await
    }

    async fn get_liff_apps(&self) -> GatewayResult<Vec<LiffApp>> {
        self.answer("get_liff_apps", Value::Null).await
    }

    async fn get_line_insights(&self) -> GatewayResult<LineInsights> {
        self.answer("get_line_insights", Value::Null).await
    }

    async fn get_all_patients(&self) -> GatewayResult<Vec<PatientRecord>> {
        self.answer("get_all_patients", Value::Null).await
    }

    async fn get_patient_stats(&self, line_user_id: &str) -> GatewayResult<PatientStats> {
        self.answer("get_patient_stats", json!({ "line_user_id": line_user_id }))
            .await
    }

    async fn get_patient_readings(
        &self,
        line_user_id: &str,
        limit: u32,
    ) -> GatewayResult<Vec<GlucoseReading>> {
        self.answer(
            "get_patient_readings",
            json!({ "line_user_id": line_user_id, "limit": limit }),
        )
        .await
    }

    async fn get_recommendations(
        &self,
        line_user_id: Option<&str>,
    ) -> GatewayResult<Vec<HealthRecommendation>> {
        self.answer("get_recommendations", json!({ "user_id": line_user_id }))
            .await
    }

    async fn generate_health_recommendation(
        &self,
        draft: &RecommendationDraft,
    ) -> GatewayResult<HealthRecommendation> {
        self.answer("generate_health_recommendation", json!(draft)).await
    }

    async fn get_follow_flows(&self) -> GatewayResult<Vec<FollowEventFlow>> {
        self.answer("get_follow_flows", Value::Null).await
    }

    async fn create_follow_flow(&self, flow: &FollowEventFlow) -> GatewayResult<FollowEventFlow> {
        self.answer("create_follow_flow", json!(flow)).await
    }

    async fn update_follow_flow(
        &self,
        id: &str,
        flow: &FollowEventFlow,
    ) -> GatewayResult<FollowEventFlow> {
        self.answer("update_follow_flow", json!({ "id": id, "flow": flow }))
            .await
    }

    async fn delete_follow_flow(&self, id: &str) -> GatewayResult<()> {
        self.answer::<Value>("delete_follow_flow", json!({ "id": id }))
            .await
            .map(|_| ())
    }

    async fn handle_follow_event(
        &self,
        flow_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> GatewayResult<FollowEventDryRun> {
        self.answer(
            "handle_follow_event",
            json!({ "flow_id": flow_id, "user_id": user_id, "display_name": display_name }),
        )
        .await
    }

    async fn get_line_followers(
        &self,
        page: u32,
        limit: u32,
        search: &str,
    ) -> GatewayResult<FollowerPage> {
        self.answer(
            "get_line_followers",
            json!({ "page": page, "limit": limit, "search": search }),
        )
        .await
    }
}

pub fn patient(id: &str, name: &str, a1c: f64, in_range: f64, readings: u64) -> PatientRecord {
    PatientRecord {
        line_user_id: id.into(),
        display_name: name.into(),
        average_glucose: 140.0,
        a1c_estimate: a1c,
        in_range_percentage: in_range,
        total_readings: readings,
        ..Default::default()
    }
}

pub fn recommendation(id: &str, user_id: &str) -> HealthRecommendation {
    HealthRecommendation {
        id: id.into(),
        user_id: user_id.into(),
        a1c_level: 7.1,
        glucose_recommendation: "Check fasting glucose daily".into(),
        confidence_score: 0.8,
        ..Default::default()
    }
}
