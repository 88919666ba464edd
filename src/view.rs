//! One typed store per view. Each store owns the raw records of its last
//! successful load plus the user's criteria; the displayed list is always
//! derived, never stored. Stores are created on load and dropped with the view.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::editor::{
    merge_created, merge_deleted, merge_updated, EditMode, Editor, EditorError, Notice,
};
use crate::engine::{
    self, filter_by_category, filter_by_search, sort_records, FollowerSummary, PatientCategory,
    PatientSummary, RecommendationSummary, SortKey, StatusFilter, Thresholds,
};
use crate::export::{self, Column};
use crate::gateway::{Gateway, GatewayError, GatewayResult};
use crate::model::{
    BotSettings, FollowEventFlow, FollowerPage, HealthRecommendation, LineFollower, PatientRecord,
    RecommendationDraft, RiskLevel,
};
use crate::progress::{self, SimulatedProgress};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Cards,
    Table,
    Analytics,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ViewMode::Cards => "cards",
            ViewMode::Table => "table",
            ViewMode::Analytics => "analytics",
        })
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cards" => Ok(ViewMode::Cards),
            "table" => Ok(ViewMode::Table),
            "analytics" => Ok(ViewMode::Analytics),
            other => Err(format!("unknown view mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatientsView {
    patients: Vec<PatientRecord>,
    pub search: String,
    pub category: PatientCategory,
    pub sort: SortKey,
    pub mode: ViewMode,
    pub thresholds: Thresholds,
}

impl PatientsView {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            ..Default::default()
        }
    }

    pub async fn fetch(gateway: &dyn Gateway) -> GatewayResult<Vec<PatientRecord>> {
        gateway.get_all_patients().await
    }

    /// Replace the cached list. Overlapping loads are not de-duplicated: the
    /// last response applied wins.
    pub fn apply_loaded(&mut self, patients: Vec<PatientRecord>) {
        self.patients = patients;
    }

    /// Fetch and apply; on failure the previous list is kept.
    #[instrument(skip_all)]
    pub async fn load(&mut self, gateway: &dyn Gateway) -> Result<usize, Notice> {
        match Self::fetch(gateway).await {
            Ok(patients) => {
                info!(count = patients.len(), "patients loaded");
                self.apply_loaded(patients);
                Ok(self.patients.len())
            }
            Err(err) => {
                warn!(error = %err, "patients load failed");
                Err(Notice::from_gateway(&err, "load patients"))
            }
        }
    }

    pub fn all(&self) -> &[PatientRecord] {
        &self.patients
    }

    pub fn find(&self, line_user_id: &str) -> Option<&PatientRecord> {
        self.patients.iter().find(|p| p.line_user_id == line_user_id)
    }

    pub fn visible(&self) -> Vec<PatientRecord> {
        let t = self.thresholds;
        let category = self.category;
        let found = filter_by_search(&self.patients, &self.search);
        let kept = filter_by_category(&found, |p| category.matches(p, &t));
        sort_records(&kept, self.sort)
    }

    /// Summary over the unfiltered list.
    pub fn summary(&self) -> PatientSummary {
        engine::aggregate(&self.patients, &self.thresholds)
    }
}

#[derive(Debug, Clone)]
pub struct RecommendationsView {
    recommendations: Vec<HealthRecommendation>,
    pub search: String,
    pub risk: Option<RiskLevel>,
    pub sort: SortKey,
    pub editor: Editor<RecommendationDraft>,
    pub notice: Option<Notice>,
    thresholds: Thresholds,
}

impl Default for RecommendationsView {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl RecommendationsView {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            recommendations: Vec::new(),
            search: String::new(),
            risk: None,
            sort: SortKey::Date,
            editor: Editor::new(),
            notice: None,
            thresholds,
        }
    }

    #[instrument(skip_all)]
    pub async fn load(
        &mut self,
        gateway: &dyn Gateway,
        line_user_id: Option<&str>,
    ) -> Result<usize, Notice> {
        match gateway.get_recommendations(line_user_id).await {
            Ok(list) => {
                self.recommendations = list;
                Ok(self.recommendations.len())
            }
            Err(err) => Err(Notice::from_gateway(&err, "load recommendations")),
        }
    }

    pub fn all(&self) -> &[HealthRecommendation] {
        &self.recommendations
    }

    pub fn visible(&self) -> Vec<HealthRecommendation> {
        let risk = self.risk;
        let found = filter_by_search(&self.recommendations, &self.search);
        let kept = filter_by_category(&found, |r| risk.map_or(true, |level| r.risk_level == level));
        sort_records(&kept, self.sort)
    }

    pub fn summary(&self) -> RecommendationSummary {
        engine::aggregate(&self.recommendations, &self.thresholds)
    }

    pub fn open_for(&mut self, patient: Option<&PatientRecord>) {
        let draft = patient
            .map(RecommendationDraft::from_patient)
            .unwrap_or_default();
        self.editor.open(draft, EditMode::Create);
    }

    /// Submit the open draft, driving the cosmetic progress ticker while the
    /// backend generates. The new record is prepended on success.
    #[instrument(skip_all)]
    pub async fn generate<U>(
        &mut self,
        gateway: &dyn Gateway,
        tick: Duration,
        progress: &mut SimulatedProgress,
        on_progress: U,
    ) -> Result<HealthRecommendation, EditorError>
    where
        U: FnMut(u8),
    {
        let (draft, _) = self.editor.begin_submit()?;
        let outcome = progress::track(
            gateway.generate_health_recommendation(&draft),
            tick,
            progress,
            on_progress,
        )
        .await;
        match self.editor.finish_submit(outcome, "generate recommendation") {
            Ok(rec) => {
                merge_created(&mut self.recommendations, rec.clone());
                self.notice = Some(Notice::success("Health recommendation generated"));
                Ok(rec)
            }
            Err(err) => {
                self.notice = Some(Notice::from_editor(&err, "generate recommendation"));
                Err(err)
            }
        }
    }

    pub fn export_json(&self) -> Result<String, export::ExportError> {
        export::export_json(&self.recommendations)
    }
}

#[derive(Debug, Clone)]
pub struct FollowersView {
    page: FollowerPage,
    pub page_number: u32,
    pub limit: u32,
    pub search: String,
    pub status: StatusFilter,
    pub sort: SortKey,
}

impl FollowersView {
    pub fn new(limit: u32) -> Self {
        Self {
            page: FollowerPage::default(),
            page_number: 1,
            limit: limit.max(1),
            search: String::new(),
            status: StatusFilter::default(),
            sort: SortKey::Date,
        }
    }

    #[instrument(skip_all)]
    pub async fn load(&mut self, gateway: &dyn Gateway) -> Result<usize, Notice> {
        match gateway
            .get_line_followers(self.page_number, self.limit, &self.search)
            .await
        {
            Ok(page) => {
                info!(
                    page = self.page_number,
                    count = page.followers.len(),
                    total = page.total,
                    "followers loaded"
                );
                self.page = page;
                Ok(self.page.followers.len())
            }
            Err(err) => Err(Notice::from_gateway(&err, "load followers")),
        }
    }

    pub fn page(&self) -> &FollowerPage {
        &self.page
    }

    /// Page count for the last load. Falls back to the requested limit when
    /// the backend echoes no page size.
    pub fn total_pages(&self) -> u64 {
        let limit = if self.page.limit == 0 {
            self.limit
        } else {
            self.page.limit
        };
        self.page.total.div_ceil(u64::from(limit.max(1)))
    }

    /// Current page, with search re-applied locally then the status filter.
    pub fn visible(&self) -> Vec<LineFollower> {
        let status = self.status;
        let found = filter_by_search(&self.page.followers, &self.search);
        let kept = filter_by_category(&found, |f| status.matches(f));
        sort_records(&kept, self.sort)
    }

    /// Summary over the whole current page.
    pub fn summary(&self) -> FollowerSummary {
        engine::aggregate(&self.page.followers, &Thresholds::default())
    }

    pub fn export_csv(
        &self,
        columns: &[Column<LineFollower>],
    ) -> Result<String, export::ExportError> {
        export::export_csv(&self.visible(), columns)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlowsView {
    flows: Vec<FollowEventFlow>,
    pub editor: Editor<FollowEventFlow>,
    pub notice: Option<Notice>,
}

impl FlowsView {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip_all)]
    pub async fn load(&mut self, gateway: &dyn Gateway) -> Result<usize, Notice> {
        match gateway.get_follow_flows().await {
            Ok(flows) => {
                self.flows = flows;
                Ok(self.flows.len())
            }
            Err(err) => Err(Notice::from_gateway(&err, "load follow flows")),
        }
    }

    pub fn all(&self) -> &[FollowEventFlow] {
        &self.flows
    }

    pub fn find(&self, id: &str) -> Option<&FollowEventFlow> {
        self.flows.iter().find(|f| f.id == id)
    }

    pub fn open_new(&mut self, draft: FollowEventFlow) {
        self.editor.open(draft, EditMode::Create);
    }

    /// Open an existing flow for editing; false when the id is unknown.
    pub fn open_existing(&mut self, id: &str) -> bool {
        match self.find(id).cloned() {
            Some(flow) => {
                self.editor.open(flow, EditMode::Update);
                true
            }
            None => false,
        }
    }

    /// Create or update depending on how the editor was opened.
    #[instrument(skip_all)]
    pub async fn save(&mut self, gateway: &dyn Gateway) -> Result<FollowEventFlow, EditorError> {
        let result = self
            .editor
            .submit("save follow flow", |flow, mode| async move {
                match mode {
                    EditMode::Create => gateway.create_follow_flow(&flow).await.map(|f| (f, mode)),
                    EditMode::Update => gateway
                        .update_follow_flow(&flow.id, &flow)
                        .await
                        .map(|f| (f, mode)),
                }
            })
            .await;
        match result {
            Ok((saved, EditMode::Create)) => {
                merge_created(&mut self.flows, saved.clone());
                self.notice = Some(Notice::success("Follow flow created"));
                Ok(saved)
            }
            Ok((saved, EditMode::Update)) => {
                if !merge_updated(&mut self.flows, saved.clone()) {
                    merge_created(&mut self.flows, saved.clone());
                }
                self.notice = Some(Notice::success("Follow flow updated"));
                Ok(saved)
            }
            Err(err) => {
                self.notice = Some(Notice::from_editor(&err, "save follow flow"));
                Err(err)
            }
        }
    }

    #[instrument(skip(self, gateway))]
    pub async fn delete(&mut self, gateway: &dyn Gateway, id: &str) -> Result<(), GatewayError> {
        match gateway.delete_follow_flow(id).await {
            Ok(()) => {
                merge_deleted(&mut self.flows, id);
                self.notice = Some(Notice::success("Follow flow deleted"));
                Ok(())
            }
            Err(err) => {
                self.notice = Some(Notice::from_gateway(&err, "delete follow flow"));
                Err(err)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsView {
    settings: Option<BotSettings>,
    pub editor: Editor<BotSettings>,
    pub notice: Option<Notice>,
}

impl SettingsView {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip_all)]
    pub async fn load(&mut self, gateway: &dyn Gateway) -> Result<(), Notice> {
        match gateway.get_bot_settings().await {
            Ok(settings) => {
                self.settings = Some(settings);
                Ok(())
            }
            Err(err) => Err(Notice::from_gateway(&err, "load bot settings")),
        }
    }

    pub fn settings(&self) -> Option<&BotSettings> {
        self.settings.as_ref()
    }

    /// Open the loaded settings for editing; false when nothing is loaded.
    pub fn edit(&mut self) -> bool {
        match self.settings.clone() {
            Some(s) => {
                self.editor.open(s, EditMode::Update);
                true
            }
            None => false,
        }
    }

    /// Persist the whole settings object.
    #[instrument(skip_all)]
    pub async fn save(&mut self, gateway: &dyn Gateway) -> Result<BotSettings, EditorError> {
        let result = self
            .editor
            .submit("save bot settings", |draft, _| async move {
                gateway.save_bot_settings(&draft).await
            })
            .await;
        match result {
            Ok(saved) => {
                self.settings = Some(saved.clone());
                self.notice = Some(Notice::success("Bot settings saved"));
                Ok(saved)
            }
            Err(err) => {
                self.notice = Some(Notice::from_editor(&err, "save bot settings"));
                Err(err)
            }
        }
    }
}
