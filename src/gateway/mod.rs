use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::gateway::model::{
    decode, decode_list, decode_record, error_message, reported_failure, FollowEventTestRequest,
};
use crate::model::{
    ActionOutcome, BotProfile, BotSettings, FollowEventDryRun, FollowEventFlow, FollowerPage,
    GlucoseReading, HealthRecommendation, LiffApp, LineInsights, PatientRecord, PatientStats,
    RecommendationDraft,
};

pub mod model;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No response was received.
    #[error("could not reach the server: {0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    /// The body could not be narrowed into the expected record.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// The server-provided message, when there is a non-empty one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            GatewayError::Server { message, .. } if !message.trim().is_empty() => {
                Some(message.as_str())
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Everything the admin tools need from the backend.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn get_bot_settings(&self) -> GatewayResult<BotSettings>;
    async fn save_bot_settings(&self, settings: &BotSettings) -> GatewayResult<BotSettings>;
    async fn configure_webhook(&self) -> GatewayResult<ActionOutcome>;
    async fn configure_login_callback(&self) -> GatewayResult<ActionOutcome>;
    async fn get_bot_profile(&self) -> GatewayResult<BotProfile>;
    async fn get_liff_apps(&self) -> GatewayResult<Vec<LiffApp>>;
    async fn get_line_insights(&self) -> GatewayResult<LineInsights>;

    async fn get_all_patients(&self) -> GatewayResult<Vec<PatientRecord>>;
    async fn get_patient_stats(&self, line_user_id: &str) -> GatewayResult<PatientStats>;
    async fn get_patient_readings(
        &self,
        line_user_id: &str,
        limit: u32,
    ) -> GatewayResult<Vec<GlucoseReading>>;
    async fn get_recommendations(
        &self,
        line_user_id: Option<&str>,
    ) -> GatewayResult<Vec<HealthRecommendation>>;
    async fn generate_health_recommendation(
        &self,
        draft: &RecommendationDraft,
    ) -> GatewayResult<HealthRecommendation>;

    async fn get_follow_flows(&self) -> GatewayResult<Vec<FollowEventFlow>>;
    async fn create_follow_flow(&self, flow: &FollowEventFlow) -> GatewayResult<FollowEventFlow>;
    async fn update_follow_flow(
        &self,
        id: &str,
        flow: &FollowEventFlow,
    ) -> GatewayResult<FollowEventFlow>;
    async fn delete_follow_flow(&self, id: &str) -> GatewayResult<()>;
    async fn handle_follow_event(
        &self,
        flow_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> GatewayResult<FollowEventDryRun>;

    async fn get_line_followers(
        &self,
        page: u32,
        limit: u32,
        search: &str,
    ) -> GatewayResult<FollowerPage>;
}

/// reqwest-backed gateway talking JSON to the admin API.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> GatewayResult<Self> {
        // `Url::join` drops the last segment unless the base ends with '/'.
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| GatewayError::Transport(e.to_string()))?;
        let http = Client::builder()
            .user_agent("diacare-admin/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn from_config(cfg: &Config) -> GatewayResult<Self> {
        Self::new(
            &cfg.api.base_url,
            cfg.api.token.clone(),
            Duration::from_secs(cfg.api.timeout_seconds),
        )
    }

    pub fn endpoint(&self, path: &str) -> GatewayResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| GatewayError::Transport(format!("invalid endpoint '{}': {}", path, e)))
    }

    pub fn build_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> GatewayResult<reqwest::Request> {
        let mut builder = self
            .http
            .request(method, self.endpoint(path)?)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    async fn execute(&self, request: reqwest::Request) -> GatewayResult<String> {
        info!(method = %request.method(), url = %request.url(), "api request");
        for (name, value) in request.headers() {
            if name.as_str().eq_ignore_ascii_case("authorization") {
                debug!("  {}: Bearer [REDACTED]", name);
            } else {
                debug!("  {}: {}", name, value.to_str().unwrap_or("[invalid]"));
            }
        }

        let res = self.http.execute(request).await?;
        let status = res.status();
        let body = res.text().await?;
        debug!(%status, body_len = body.len(), "api response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("rate limited by backend: {}", body);
        }
        if !status.is_success() {
            let message = error_message(&body).unwrap_or_default();
            warn!(%status, %message, "api error");
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }
        if let Some(message) = reported_failure(&body) {
            warn!(%status, %message, "api reported failure");
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<T> {
        let request = self.build_request::<()>(Method::GET, path, query, None)?;
        let body = self.execute(request).await?;
        decode(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        key: &str,
    ) -> GatewayResult<Vec<T>> {
        let request = self.build_request::<()>(Method::GET, path, query, None)?;
        let body = self.execute(request).await?;
        decode_list(&body, key).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> GatewayResult<T> {
        let request = self.build_request(method, path, &[], body)?;
        let body = self.execute(request).await?;
        if body.trim().is_empty() {
            return decode("{}").map_err(|e| GatewayError::Decode(e.to_string()));
        }
        decode(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    /// Like `send_json`, but the reply must be the saved record itself.
    async fn send_record<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        identity: &str,
    ) -> GatewayResult<T> {
        let request = self.build_request(method, path, &[], Some(body))?;
        let body = self.execute(request).await?;
        decode_record(&body, identity).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

fn path_segment(id: &str) -> String {
    id.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

#[async_trait]
impl Gateway for ApiClient {
    #[instrument(skip_all)]
    async fn get_bot_settings(&self) -> GatewayResult<BotSettings> {
        self.get_json("bot/settings", &[]).await
    }

    #[instrument(skip_all)]
    async fn save_bot_settings(&self, settings: &BotSettings) -> GatewayResult<BotSettings> {
        self.send_record(Method::POST, "bot/settings", settings, "channel_id")
            .await
    }

    #[instrument(skip_all)]
    async fn configure_webhook(&self) -> GatewayResult<ActionOutcome> {
        self.send_json::<(), _>(Method::POST, "bot/configure-webhook", None).await
    }

    #[instrument(skip_all)]
    async fn configure_login_callback(&self) -> GatewayResult<ActionOutcome> {
        self.send_json::<(), _>(Method::POST, "bot/configure-login-callback", None)
            .await
    }

    #[instrument(skip_all)]
    async fn get_bot_profile(&self) -> GatewayResult<BotProfile> {
        self.get_json("bot/bot-profile", &[]).await
    }

    #[instrument(skip_all)]
    async fn get_liff_apps(&self) -> GatewayResult<Vec<LiffApp>> {
        self.get_list("bot/liff-apps", &[], "apps").await
    }

    #[instrument(skip_all)]
    async fn get_line_insights(&self) -> GatewayResult<LineInsights> {
        self.get_json("bot/line-insights", &[]).await
    }

    #[instrument(skip_all)]
    async fn get_all_patients(&self) -> GatewayResult<Vec<PatientRecord>> {
        self.get_list("patients", &[], "patients").await
    }

    #[instrument(skip(self))]
    async fn get_patient_stats(&self, line_user_id: &str) -> GatewayResult<PatientStats> {
        let path = format!("patients/{}/stats", path_segment(line_user_id));
        self.get_json(&path, &[]).await
    }

    #[instrument(skip(self))]
    async fn get_patient_readings(
        &self,
        line_user_id: &str,
        limit: u32,
    ) -> GatewayResult<Vec<GlucoseReading>> {
        let path = format!("patients/{}/readings", path_segment(line_user_id));
        self.get_list(&path, &[("limit", limit.to_string())], "readings")
            .await
    }

    #[instrument(skip(self))]
    async fn get_recommendations(
        &self,
        line_user_id: Option<&str>,
    ) -> GatewayResult<Vec<HealthRecommendation>> {
        let query: Vec<(&str, String)> = line_user_id
            .filter(|id| !id.trim().is_empty())
            .map(|id| vec![("user_id", id.trim().to_string())])
            .unwrap_or_default();
        self.get_list("health/recommendations", &query, "recommendations")
            .await
    }

    #[instrument(skip_all, fields(user_id = %draft.user_id))]
    async fn generate_health_recommendation(
        &self,
        draft: &RecommendationDraft,
    ) -> GatewayResult<HealthRecommendation> {
        let form = draft
            .form_fields()
            .into_iter()
            .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                form.text(name, value)
            });
        let request = self
            .http
            .post(self.endpoint("health/recommendations")?)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json")
            .multipart(form)
            .build()?;
        let body = self.execute(request).await?;
        let rec: HealthRecommendation =
            decode_record(&body, "id").map_err(|e| GatewayError::Decode(e.to_string()))?;
        info!(id = %rec.id, risk = %rec.risk_level, "recommendation generated");
        Ok(rec)
    }

    #[instrument(skip_all)]
    async fn get_follow_flows(&self) -> GatewayResult<Vec<FollowEventFlow>> {
        self.get_list("follow-flows", &[], "flows").await
    }

    #[instrument(skip_all, fields(name = %flow.name))]
    async fn create_follow_flow(&self, flow: &FollowEventFlow) -> GatewayResult<FollowEventFlow> {
        self.send_record(Method::POST, "follow-flows", flow, "id").await
    }

    #[instrument(skip(self, flow))]
    async fn update_follow_flow(
        &self,
        id: &str,
        flow: &FollowEventFlow,
    ) -> GatewayResult<FollowEventFlow> {
        let path = format!("follow-flows/{}", path_segment(id));
        self.send_record(Method::PUT, &path, flow, "id").await
    }

    #[instrument(skip(self))]
    async fn delete_follow_flow(&self, id: &str) -> GatewayResult<()> {
        let path = format!("follow-flows/{}", path_segment(id));
        let request = self.build_request::<()>(Method::DELETE, &path, &[], None)?;
        self.execute(request).await.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn handle_follow_event(
        &self,
        flow_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> GatewayResult<FollowEventDryRun> {
        let body = FollowEventTestRequest {
            flow_id,
            user_id,
            display_name,
        };
        self.send_json(Method::POST, "follow-flows/test", Some(&body))
            .await
    }

    #[instrument(skip(self))]
    async fn get_line_followers(
        &self,
        page: u32,
        limit: u32,
        search: &str,
    ) -> GatewayResult<FollowerPage> {
        let mut query = vec![("page", page.to_string()), ("limit", limit.to_string())];
        if !search.trim().is_empty() {
            query.push(("search", search.trim().to_string()));
        }
        self.get_json("admin/line-followers", &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ApiClient {
        ApiClient::new("https://diacare.example.com/api", "secret".into(), Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let c = client();
        assert_eq!(
            c.endpoint("/bot/settings").unwrap().as_str(),
            "https://diacare.example.com/api/bot/settings"
        );
        assert_eq!(
            c.endpoint("admin/line-followers").unwrap().path(),
            "/api/admin/line-followers"
        );
    }

    #[test]
    fn build_request_sets_headers_and_body() {
        let c = client();
        let body = json!({ "sample": true });
        let request = c
            .build_request(Method::POST, "bot/settings", &[], Some(&body))
            .unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().path(), "/api/bot/settings");
        let headers = request.headers();
        assert_eq!(
            headers.get("Authorization").and_then(|h| h.to_str().ok()).unwrap(),
            "Bearer secret"
        );
        assert_eq!(
            headers.get("Content-Type").and_then(|h| h.to_str().ok()).unwrap(),
            "application/json"
        );
        let sent: serde_json::Value =
            serde_json::from_slice(request.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(sent, body);
    }

    #[test]
    fn build_request_encodes_query() {
        let c = client();
        let request = c
            .build_request::<()>(
                Method::GET,
                "admin/line-followers",
                &[("page", "2".into()), ("limit", "50".into()), ("search", "som chai".into())],
                None,
            )
            .unwrap();
        assert_eq!(request.url().query(), Some("page=2&limit=50&search=som+chai"));
        assert!(request.body().is_none());
    }

    #[test]
    fn path_segment_strips_separators() {
        assert_eq!(path_segment(" U123/../x "), "U123..x");
        assert_eq!(path_segment("flow_1-a"), "flow_1-a");
    }

    #[test]
    fn server_message_only_for_server_errors() {
        let e = GatewayError::Server { status: 400, message: "Invalid channel".into() };
        assert_eq!(e.server_message(), Some("Invalid channel"));
        let e = GatewayError::Server { status: 500, message: " ".into() };
        assert_eq!(e.server_message(), None);
        assert_eq!(GatewayError::Transport("refused".into()).server_message(), None);
    }
}
