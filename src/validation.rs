//! Declarative draft validation. Every validator is a pure function of its
//! draft; an empty `FieldErrors` means the draft may be submitted.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::model::{BotSettings, FollowEventFlow, RecommendationDraft, StepType};

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static LIFF_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+-[A-Za-z0-9]+$").expect("valid regex"));

/// Longest delay allowed between onboarding steps (one day).
pub const MAX_STEP_DELAY_SECONDS: u32 = 86_400;
/// Upper bound accepted for an A1C percentage.
pub const MAX_A1C: f64 = 20.0;

/// Field name → human-readable message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Records the first message for a field; later ones are ignored.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn require(&mut self, field: &str, value: &str, label: &str) {
        if value.trim().is_empty() {
            self.add(field, format!("{} is required", label));
        }
    }

    fn percentage(&mut self, field: &str, value: f64, label: &str) {
        if !(0.0..=100.0).contains(&value) {
            self.add(field, format!("{} must be between 0 and 100", label));
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

pub trait Validate {
    fn validate(&self) -> FieldErrors;
}

impl Validate for RecommendationDraft {
    fn validate(&self) -> FieldErrors {
        let mut e = FieldErrors::new();
        e.require("user_id", &self.user_id, "Patient");
        if !(self.average_glucose > 0.0) {
            e.add("average_glucose", "Average glucose must be greater than 0");
        }
        if !(self.a1c_level > 0.0 && self.a1c_level <= MAX_A1C) {
            e.add("a1c_level", format!("A1C must be greater than 0 and at most {}", MAX_A1C));
        }
        e.percentage("in_range_percentage", self.in_range_percentage, "In-range percentage");
        if self.total_readings == 0 {
            e.add("total_readings", "Total readings must be greater than 0");
        }
        e
    }
}

impl Validate for BotSettings {
    fn validate(&self) -> FieldErrors {
        let mut e = FieldErrors::new();
        e.require("channel_id", &self.channel_id, "Channel ID");
        if !self.channel_id.trim().is_empty() && !DIGITS.is_match(self.channel_id.trim()) {
            e.add("channel_id", "Channel ID must contain digits only");
        }
        e.require("channel_secret", &self.channel_secret, "Channel secret");
        e.require("channel_access_token", &self.channel_access_token, "Channel access token");
        if !self.webhook_url.trim().is_empty() && !is_https_url(&self.webhook_url) {
            e.add("webhook_url", "Webhook URL must be a valid https:// URL");
        }
        if !self.login_callback_url.trim().is_empty() && !is_https_url(&self.login_callback_url) {
            e.add("login_callback_url", "Login callback URL must be a valid https:// URL");
        }
        let login_channel_id = self.login_channel_id.trim();
        if !login_channel_id.is_empty() && !DIGITS.is_match(login_channel_id) {
            e.add("login_channel_id", "Login channel ID must contain digits only");
        }
        if self.rate_limit_per_minute == 0 {
            e.add("rate_limit_per_minute", "Rate limit must be greater than 0");
        }
        for (i, id) in self.liff_app_ids.iter().enumerate() {
            if !LIFF_ID.is_match(id.trim()) {
                e.add(format!("liff_app_ids[{}]", i), format!("'{}' is not a valid LIFF ID", id));
            }
        }
        if self.quick_replies_enabled
            && self.quick_replies.iter().all(|q| q.trim().is_empty())
        {
            e.add(
                "quick_replies",
                "At least one quick reply is required when quick replies are enabled",
            );
        }
        e
    }
}

impl Validate for FollowEventFlow {
    fn validate(&self) -> FieldErrors {
        let mut e = FieldErrors::new();
        e.require("name", &self.name, "Flow name");
        e.require("welcome_message", &self.welcome_message, "Welcome message");
        if self.steps.is_empty() {
            e.add("steps", "At least one onboarding step is required");
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.content.trim().is_empty() {
                e.add(
                    format!("steps[{}].content", i),
                    format!("Step {} content is required", i + 1),
                );
            }
            if step.delay_seconds > MAX_STEP_DELAY_SECONDS {
                e.add(
                    format!("steps[{}].delay_seconds", i),
                    format!(
                        "Step {} delay must be at most {} seconds",
                        i + 1,
                        MAX_STEP_DELAY_SECONDS
                    ),
                );
            }
            if step.step_type == StepType::QuickReply
                && step.quick_replies.iter().all(|q| q.trim().is_empty())
            {
                e.add(
                    format!("steps[{}].quick_replies", i),
                    format!("Step {} needs at least one quick reply", i + 1),
                );
            }
        }
        if self.consent.required && self.consent.message.trim().is_empty() {
            e.add("consent.message", "Consent message is required when consent is required");
        }
        if let Some(url) = self.consent.privacy_policy_url.as_deref() {
            if !url.trim().is_empty() && !is_https_url(url) {
                e.add(
                    "consent.privacy_policy_url",
                    "Privacy policy URL must be a valid https:// URL",
                );
            }
        }
        if self.profile_collection.enabled && self.profile_collection.fields.is_empty() {
            e.add(
                "profile_collection.fields",
                "Select at least one profile field when profile collection is enabled",
            );
        }
        e
    }
}

fn is_https_url(raw: &str) -> bool {
    matches!(
        reqwest::Url::parse(raw.trim()),
        Ok(url) if url.scheme() == "https" && url.host().is_some()
    )
}
