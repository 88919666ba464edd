use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Parse a backend timestamp. Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` and
/// bare dates (midnight UTC). Anything else yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Deserializers that narrow loosely-typed backend JSON. Missing or null
/// values become the type's default rather than an error.
pub(crate) mod lenient {
    use super::*;

    pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
    }

    pub fn timestamp<'de, D>(d: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<String>::deserialize(d)?.and_then(|s| parse_timestamp(&s)))
    }

    /// Identifiers arrive as strings or integers depending on the endpoint.
    pub fn id<'de, D>(d: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Int(i64),
        }
        Ok(match Option::<RawId>::deserialize(d)? {
            Some(RawId::Text(s)) => s,
            Some(RawId::Int(n)) => n.to_string(),
            None => String::new(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientRecord {
    #[serde(deserialize_with = "lenient::or_default")]
    pub line_user_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub display_name: String,
    pub picture_url: Option<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub average_glucose: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub a1c_estimate: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub in_range_percentage: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub total_readings: u64,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientStats {
    #[serde(deserialize_with = "lenient::or_default")]
    pub total_readings: u64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub average_glucose: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub min_glucose: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub max_glucose: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub a1c_estimate: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub in_range_percentage: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub readings_last_7_days: u64,
}

/// A single DTX (finger-stick glucose) reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlucoseReading {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub line_user_id: String,
    /// mg/dL
    #[serde(deserialize_with = "lenient::or_default")]
    pub value: f64,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub measured_at: Option<DateTime<Utc>>,
    pub meal_context: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    #[default]
    #[serde(other)]
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        }
    }

    /// Scalar used when ordering by risk.
    pub fn score(&self) -> f64 {
        match self {
            RiskLevel::High => 3.0,
            RiskLevel::Medium => 2.0,
            RiskLevel::Low => 1.0,
            RiskLevel::Unknown => 0.0,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "unknown" => Ok(RiskLevel::Unknown),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

/// Glucose summary the recommendation was generated from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtxSummary {
    #[serde(deserialize_with = "lenient::or_default")]
    pub average: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub min: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub max: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub count: u64,
}

/// AI-generated advice for one patient. Immutable once created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthRecommendation {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub user_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub dtx_summary: DtxSummary,
    #[serde(deserialize_with = "lenient::or_default")]
    pub a1c_level: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub glucose_recommendation: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub lifestyle_recommendation: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub medication_recommendation: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub diet_recommendation: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub exercise_recommendation: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub monitoring_recommendation: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub confidence_score: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub trend: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub risk_level: RiskLevel,
    #[serde(deserialize_with = "lenient::or_default")]
    pub risk_factors: Vec<String>,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Input submitted to generate a recommendation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationDraft {
    pub user_id: String,
    pub average_glucose: f64,
    pub a1c_level: f64,
    pub in_range_percentage: f64,
    pub total_readings: u64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

impl RecommendationDraft {
    /// Prefill a draft from a patient's cached metrics.
    pub fn from_patient(patient: &PatientRecord) -> Self {
        Self {
            user_id: patient.line_user_id.clone(),
            average_glucose: patient.average_glucose,
            a1c_level: patient.a1c_estimate,
            in_range_percentage: patient.in_range_percentage,
            total_readings: patient.total_readings,
            ..Default::default()
        }
    }

    /// Flattened multipart fields, in submission order.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("user_id", self.user_id.trim().to_string()),
            ("average_glucose", self.average_glucose.to_string()),
            ("a1c_level", self.a1c_level.to_string()),
            ("in_range_percentage", self.in_range_percentage.to_string()),
            ("total_readings", self.total_readings.to_string()),
        ];
        if !self.notes.trim().is_empty() {
            fields.push(("notes", self.notes.trim().to_string()));
        }
        if !self.focus_areas.is_empty() {
            fields.push(("focus_areas", self.focus_areas.join(",")));
        }
        fields
    }
}

/// Singleton bot / LINE channel configuration. Saved wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    #[serde(deserialize_with = "lenient::id")]
    pub channel_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub channel_secret: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub channel_access_token: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub webhook_url: String,
    #[serde(deserialize_with = "lenient::id")]
    pub login_channel_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub login_channel_secret: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub login_callback_url: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub liff_app_ids: Vec<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub rate_limit_per_minute: u32,
    #[serde(deserialize_with = "lenient::or_default")]
    pub quick_replies_enabled: bool,
    #[serde(deserialize_with = "lenient::or_default")]
    pub quick_replies: Vec<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub welcome_message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[default]
    Text,
    QuickReply,
    Image,
    ProfileForm,
    Consent,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Text => "text",
            StepType::QuickReply => "quick_reply",
            StepType::Image => "image",
            StepType::ProfileForm => "profile_form",
            StepType::Consent => "consent",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingStep {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub step_type: StepType,
    #[serde(deserialize_with = "lenient::or_default")]
    pub content: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub delay_seconds: u32,
    #[serde(deserialize_with = "lenient::or_default")]
    pub quick_replies: Vec<String>,
}

impl OnboardingStep {
    /// New step with a client-generated id.
    pub fn new(step_type: StepType, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            step_type,
            content: content.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    #[serde(deserialize_with = "lenient::or_default")]
    pub required: bool,
    #[serde(deserialize_with = "lenient::or_default")]
    pub message: String,
    pub privacy_policy_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileCollection {
    #[serde(deserialize_with = "lenient::or_default")]
    pub enabled: bool,
    #[serde(deserialize_with = "lenient::or_default")]
    pub fields: Vec<String>,
}

/// Onboarding script sent when a user follows the bot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowEventFlow {
    #[serde(deserialize_with = "lenient::id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub name: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub is_active: bool,
    #[serde(deserialize_with = "lenient::or_default")]
    pub welcome_message: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub steps: Vec<OnboardingStep>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub consent: ConsentConfig,
    #[serde(deserialize_with = "lenient::or_default")]
    pub profile_collection: ProfileCollection,
    #[serde(deserialize_with = "lenient::timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::timestamp", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Result of dry-running a flow against a fake follow event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowEventDryRun {
    #[serde(deserialize_with = "lenient::or_default")]
    pub success: bool,
    #[serde(deserialize_with = "lenient::or_default")]
    pub message: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowerStatus {
    Active,
    Inactive,
    Blocked,
    Unfollowed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl FollowerStatus {
    pub const ALL: [FollowerStatus; 5] = [
        FollowerStatus::Active,
        FollowerStatus::Inactive,
        FollowerStatus::Blocked,
        FollowerStatus::Unfollowed,
        FollowerStatus::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FollowerStatus::Active => "active",
            FollowerStatus::Inactive => "inactive",
            FollowerStatus::Blocked => "blocked",
            FollowerStatus::Unfollowed => "unfollowed",
            FollowerStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FollowerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for FollowerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FollowerStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown follower status '{}'", s))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFollower {
    #[serde(deserialize_with = "lenient::or_default")]
    pub line_user_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub display_name: String,
    pub picture_url: Option<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status_message: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: FollowerStatus,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub followed_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub unfollowed_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub last_interaction_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub message_count: u64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub interaction_count: u64,
}

/// One server-side page of followers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerPage {
    #[serde(deserialize_with = "lenient::or_default")]
    pub followers: Vec<LineFollower>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub total: u64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub page: u32,
    #[serde(deserialize_with = "lenient::or_default")]
    pub limit: u32,
}

impl FollowerPage {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(self.limit as u64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotProfile {
    #[serde(deserialize_with = "lenient::or_default")]
    pub user_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub basic_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub display_name: String,
    pub picture_url: Option<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub chat_mode: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub mark_as_read_mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiffApp {
    #[serde(deserialize_with = "lenient::or_default")]
    pub liff_id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub view_type: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub url: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub description: String,
}

/// LINE messaging analytics for one day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineInsights {
    #[serde(deserialize_with = "lenient::or_default")]
    pub date: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub followers: u64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub targeted_reaches: u64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub blocks: u64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: String,
    /// Delivery counts keyed by message type (broadcast, push, reply, ...).
    #[serde(deserialize_with = "lenient::or_default")]
    pub deliveries: BTreeMap<String, u64>,
}

impl LineInsights {
    pub fn total_deliveries(&self) -> u64 {
        self.deliveries.values().sum()
    }
}

/// Generic `{success, message}` acknowledgement from action endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionOutcome {
    #[serde(deserialize_with = "lenient::or_default")]
    pub success: bool,
    #[serde(deserialize_with = "lenient::or_default")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_timestamp_accepts_common_shapes() {
        let a = parse_timestamp("2024-06-01").unwrap();
        assert_eq!(a.to_rfc3339(), "2024-06-01T00:00:00+00:00");
        let b = parse_timestamp("2024-06-01T08:30:00Z").unwrap();
        assert_eq!(b.to_rfc3339(), "2024-06-01T08:30:00+00:00");
        let c = parse_timestamp("2024-06-01 08:30:00").unwrap();
        assert_eq!(b, c);
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn patient_tolerates_missing_and_null_fields() {
        let p: PatientRecord = serde_json::from_value(json!({
            "line_user_id": "U1",
            "average_glucose": null,
            "created_at": "garbage"
        }))
        .unwrap();
        assert_eq!(p.line_user_id, "U1");
        assert_eq!(p.display_name, "");
        assert_eq!(p.average_glucose, 0.0);
        assert_eq!(p.total_readings, 0);
        assert!(p.created_at.is_none());
    }

    #[test]
    fn recommendation_accepts_numeric_id_and_unknown_risk() {
        let r: HealthRecommendation = serde_json::from_value(json!({
            "id": 42,
            "risk_level": "severe",
            "confidence_score": 0.8
        }))
        .unwrap();
        assert_eq!(r.id, "42");
        assert_eq!(r.risk_level, RiskLevel::Unknown);
        assert_eq!(r.confidence_score, 0.8);
    }

    #[test]
    fn follower_status_round_trips_through_strings() {
        for status in FollowerStatus::ALL {
            assert_eq!(status.as_str().parse::<FollowerStatus>().unwrap(), status);
        }
        assert!("ghost".parse::<FollowerStatus>().is_err());
        let f: LineFollower = serde_json::from_value(json!({"status": "blocked"})).unwrap();
        assert_eq!(f.status, FollowerStatus::Blocked);
    }

    #[test]
    fn unsaved_flow_omits_id_when_serialized() {
        let flow = FollowEventFlow {
            name: "Welcome".into(),
            ..Default::default()
        };
        let v = serde_json::to_value(&flow).unwrap();
        assert!(v.get("id").is_none());
        assert!(v.get("created_at").is_none());
    }

    #[test]
    fn draft_form_fields_skip_empty_optionals() {
        let draft = RecommendationDraft {
            user_id: " U1 ".into(),
            average_glucose: 140.0,
            a1c_level: 6.8,
            in_range_percentage: 65.0,
            total_readings: 30,
            ..Default::default()
        };
        let fields = draft.form_fields();
        assert_eq!(fields[0], ("user_id", "U1".to_string()));
        assert!(fields.iter().all(|(k, _)| *k != "notes" && *k != "focus_areas"));
    }

    #[test]
    fn follower_page_counts_pages() {
        let page = FollowerPage {
            total: 101,
            limit: 50,
            ..Default::default()
        };
        assert_eq!(page.total_pages(), 3);
        assert_eq!(FollowerPage::default().total_pages(), 0);
    }
}
