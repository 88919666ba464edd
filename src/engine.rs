//! Pure list derivation: search, category filters, stable sorting and
//! single-pass summaries. Nothing here mutates its input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::model::{FollowerStatus, HealthRecommendation, LineFollower, PatientRecord, RiskLevel};

/// Clinical cut-offs shared by the patient filters and analytics bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// A1C strictly above this is "high risk"; at or above it is the diabetes band.
    pub high_risk_a1c: f64,
    /// A1C at or above this (and below `high_risk_a1c`) is the prediabetes band.
    pub prediabetes_a1c: f64,
    /// In-range percentage at or above this is "improving" / good control.
    pub improving_in_range: f64,
    /// In-range percentage at or above this (below `improving_in_range`) is
    /// "stable" / fair control.
    pub stable_in_range: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high_risk_a1c: 6.5,
            prediabetes_a1c: 5.7,
            improving_in_range: 70.0,
            stable_in_range: 50.0,
        }
    }
}

/// Text fields a record exposes to free-text search.
pub trait Searchable {
    fn search_fields(&self) -> Vec<&str>;
}

/// Scalars a record exposes to `sort_records`.
pub trait Sortable {
    fn timestamp(&self) -> Option<DateTime<Utc>>;
    fn count(&self) -> f64;
    fn risk(&self) -> f64;
    fn name(&self) -> &str;
}

/// Records that can be summarised for analytics panels.
pub trait Aggregate: Sized {
    type Summary;
    fn aggregate(records: &[Self], thresholds: &Thresholds) -> Self::Summary;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Newest first; records without a timestamp sort as the Unix epoch.
    #[default]
    Date,
    Confidence,
    Count,
    Risk,
    /// Ascending, case-insensitive.
    Name,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Date => "date",
            SortKey::Confidence => "confidence",
            SortKey::Count => "count",
            SortKey::Risk => "risk",
            SortKey::Name => "name",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(SortKey::Date),
            "confidence" => Ok(SortKey::Confidence),
            "count" => Ok(SortKey::Count),
            "risk" => Ok(SortKey::Risk),
            "name" => Ok(SortKey::Name),
            other => Err(format!("unknown sort key '{}'", other)),
        }
    }
}

/// Patient list categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PatientCategory {
    #[default]
    All,
    HighRisk,
    Improving,
    Stable,
}

impl PatientCategory {
    pub fn matches(&self, p: &PatientRecord, t: &Thresholds) -> bool {
        match self {
            PatientCategory::All => true,
            PatientCategory::HighRisk => p.a1c_estimate > t.high_risk_a1c,
            PatientCategory::Improving => p.in_range_percentage >= t.improving_in_range,
            PatientCategory::Stable => {
                p.in_range_percentage >= t.stable_in_range
                    && p.in_range_percentage < t.improving_in_range
            }
        }
    }
}

impl FromStr for PatientCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "all" => Ok(PatientCategory::All),
            "high_risk" => Ok(PatientCategory::HighRisk),
            "improving" => Ok(PatientCategory::Improving),
            "stable" => Ok(PatientCategory::Stable),
            other => Err(format!("unknown patient category '{}'", other)),
        }
    }
}

/// Follower status filter; `None` means all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFilter(pub Option<FollowerStatus>);

impl StatusFilter {
    pub fn matches(&self, f: &LineFollower) -> bool {
        self.0.map_or(true, |status| f.status == status)
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter(None));
        }
        s.parse::<FollowerStatus>().map(|st| StatusFilter(Some(st)))
    }
}

/// Case-insensitive substring search across each record's search fields.
/// A blank term matches everything.
pub fn filter_by_search<T: Searchable + Clone>(records: &[T], term: &str) -> Vec<T> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| {
            r.search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

/// Keep records satisfying a single category predicate.
pub fn filter_by_category<T, P>(records: &[T], predicate: P) -> Vec<T>
where
    T: Clone,
    P: Fn(&T) -> bool,
{
    records.iter().filter(|r| predicate(r)).cloned().collect()
}

/// Stable sort into a new Vec; ties keep their input order.
pub fn sort_records<T: Sortable + Clone>(records: &[T], key: SortKey) -> Vec<T> {
    let mut out = records.to_vec();
    match key {
        SortKey::Date => out.sort_by(|a, b| epoch_or(b).cmp(&epoch_or(a))),
        SortKey::Confidence | SortKey::Count => out.sort_by(|a, b| desc(a.count(), b.count())),
        SortKey::Risk => out.sort_by(|a, b| desc(a.risk(), b.risk())),
        SortKey::Name => out.sort_by_cached_key(|r| r.name().to_lowercase()),
    }
    out
}

/// Undated records sort as the Unix epoch.
fn epoch_or<T: Sortable>(record: &T) -> DateTime<Utc> {
    record.timestamp().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

pub fn aggregate<T: Aggregate>(records: &[T], thresholds: &Thresholds) -> T::Summary {
    T::aggregate(records, thresholds)
}

/// Share of `part` in `whole` as 0..=100; zero when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

impl Searchable for PatientRecord {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.display_name.as_str(), self.line_user_id.as_str()]
    }
}

impl Sortable for PatientRecord {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
    fn count(&self) -> f64 {
        self.total_readings as f64
    }
    fn risk(&self) -> f64 {
        self.a1c_estimate
    }
    fn name(&self) -> &str {
        &self.display_name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct A1cBands {
    pub normal: u64,
    pub prediabetes: u64,
    pub diabetes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlBands {
    pub good: u64,
    pub fair: u64,
    pub poor: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatientSummary {
    pub total: u64,
    pub total_readings: u64,
    pub mean_glucose: f64,
    pub a1c: A1cBands,
    pub control: ControlBands,
    pub high_risk: u64,
}

impl Aggregate for PatientRecord {
    type Summary = PatientSummary;

    fn aggregate(records: &[Self], t: &Thresholds) -> PatientSummary {
        let mut s = PatientSummary::default();
        let mut glucose_sum = 0.0;
        for p in records {
            s.total += 1;
            s.total_readings += p.total_readings;
            glucose_sum += p.average_glucose;

            if p.a1c_estimate >= t.high_risk_a1c {
                s.a1c.diabetes += 1;
            } else if p.a1c_estimate >= t.prediabetes_a1c {
                s.a1c.prediabetes += 1;
            } else {
                s.a1c.normal += 1;
            }
            if p.a1c_estimate > t.high_risk_a1c {
                s.high_risk += 1;
            }

            if p.in_range_percentage >= t.improving_in_range {
                s.control.good += 1;
            } else if p.in_range_percentage >= t.stable_in_range {
                s.control.fair += 1;
            } else {
                s.control.poor += 1;
            }
        }
        if s.total > 0 {
            s.mean_glucose = glucose_sum / s.total as f64;
        }
        s
    }
}

impl Searchable for LineFollower {
    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.display_name.as_str(),
            self.line_user_id.as_str(),
            self.status_message.as_str(),
        ]
    }
}

impl Sortable for LineFollower {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_interaction_at.or(self.followed_at)
    }
    fn count(&self) -> f64 {
        self.interaction_count as f64
    }
    fn risk(&self) -> f64 {
        0.0
    }
    fn name(&self) -> &str {
        &self.display_name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FollowerSummary {
    pub total: u64,
    pub by_status: BTreeMap<&'static str, u64>,
    pub total_messages: u64,
    pub total_interactions: u64,
    pub active_percentage: f64,
}

impl Aggregate for LineFollower {
    type Summary = FollowerSummary;

    fn aggregate(records: &[Self], _t: &Thresholds) -> FollowerSummary {
        let mut s = FollowerSummary::default();
        for status in FollowerStatus::ALL {
            s.by_status.insert(status.as_str(), 0);
        }
        for f in records {
            s.total += 1;
            s.total_messages += f.message_count;
            s.total_interactions += f.interaction_count;
            *s.by_status.entry(f.status.as_str()).or_insert(0) += 1;
        }
        let active = s.by_status.get(FollowerStatus::Active.as_str()).copied().unwrap_or(0);
        s.active_percentage = percentage(active, s.total);
        s
    }
}

impl Searchable for HealthRecommendation {
    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.user_id.as_str(),
            self.trend.as_str(),
            self.glucose_recommendation.as_str(),
        ]
    }
}

impl Sortable for HealthRecommendation {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
    fn count(&self) -> f64 {
        self.confidence_score
    }
    fn risk(&self) -> f64 {
        self.risk_level.score()
    }
    fn name(&self) -> &str {
        &self.user_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecommendationSummary {
    pub total: u64,
    pub by_risk: BTreeMap<RiskLevel, u64>,
    pub mean_confidence: f64,
}

impl Aggregate for HealthRecommendation {
    type Summary = RecommendationSummary;

    fn aggregate(records: &[Self], _t: &Thresholds) -> RecommendationSummary {
        let mut s = RecommendationSummary::default();
        let mut confidence = 0.0;
        for r in records {
            s.total += 1;
            confidence += r.confidence_score;
            *s.by_risk.entry(r.risk_level).or_insert(0) += 1;
        }
        if s.total > 0 {
            s.mean_confidence = confidence / s.total as f64;
        }
        s
    }
}
