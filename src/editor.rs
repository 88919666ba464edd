//! Dialog-style editing: one draft at a time, validated before submission,
//! merged into the owning list on success and kept intact on failure.
//!
//! ```text
//! Closed -> Open(draft) -> [validate] -> Open(errors)            (invalid)
//!                                     -> Submitting -> Closed     (success)
//!                                                   -> Open(err)  (failure, draft kept)
//! ```
//! Closing at any point before submission discards the draft.

use std::future::Future;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gateway::GatewayError;
use crate::model::FollowEventFlow;
use crate::validation::{FieldErrors, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Transient, dismissible banner shown after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }

    /// Most specific message available, else `Failed to <action>`.
    pub fn from_gateway(err: &GatewayError, action: &str) -> Self {
        match err.server_message() {
            Some(message) => Self::error(message),
            None => Self::error(format!("Failed to {}", action)),
        }
    }

    pub fn from_editor(err: &EditorError, action: &str) -> Self {
        match err {
            EditorError::Validation(errors) => Self::error(format!("Please fix: {}", errors)),
            EditorError::Gateway(err) => Self::from_gateway(err, action),
            EditorError::NotOpen => Self::error(format!("Failed to {}", action)),
        }
    }
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("no draft is open")]
    NotOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogState<D> {
    Closed,
    Open {
        draft: D,
        mode: EditMode,
        errors: FieldErrors,
        notice: Option<Notice>,
    },
    Submitting {
        draft: D,
        mode: EditMode,
    },
}

#[derive(Debug, Clone)]
pub struct Editor<D> {
    state: DialogState<D>,
}

impl<D> Default for Editor<D> {
    fn default() -> Self {
        Self {
            state: DialogState::Closed,
        }
    }
}

impl<D: Validate + Clone> Editor<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DialogState<D> {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, DialogState::Open { .. })
    }

    pub fn open(&mut self, draft: D, mode: EditMode) {
        debug!(?mode, "editor opened");
        self.state = DialogState::Open {
            draft,
            mode,
            errors: FieldErrors::new(),
            notice: None,
        };
    }

    /// Discard the draft without side effects.
    pub fn close(&mut self) {
        self.state = DialogState::Closed;
    }

    pub fn draft(&self) -> Option<&D> {
        match &self.state {
            DialogState::Open { draft, .. } | DialogState::Submitting { draft, .. } => Some(draft),
            DialogState::Closed => None,
        }
    }

    pub fn draft_mut(&mut self) -> Option<&mut D> {
        match &mut self.state {
            DialogState::Open { draft, .. } => Some(draft),
            _ => None,
        }
    }

    pub fn errors(&self) -> Option<&FieldErrors> {
        match &self.state {
            DialogState::Open { errors, .. } => Some(errors),
            _ => None,
        }
    }

    pub fn notice(&self) -> Option<&Notice> {
        match &self.state {
            DialogState::Open { notice, .. } => notice.as_ref(),
            _ => None,
        }
    }

    /// Validate the open draft. Invalid drafts stay open with their errors;
    /// valid ones move to `Submitting` and a copy is handed back.
    pub fn begin_submit(&mut self) -> Result<(D, EditMode), EditorError> {
        let (draft, mode) = match &mut self.state {
            DialogState::Open {
                draft,
                mode,
                errors,
                notice,
            } => {
                let found = draft.validate();
                if !found.is_empty() {
                    debug!(count = found.len(), "draft rejected by validation");
                    *errors = found.clone();
                    *notice = None;
                    return Err(EditorError::Validation(found));
                }
                (draft.clone(), *mode)
            }
            _ => return Err(EditorError::NotOpen),
        };
        self.state = DialogState::Submitting {
            draft: draft.clone(),
            mode,
        };
        Ok((draft, mode))
    }

    /// Settle a submission started with `begin_submit`.
    pub fn finish_submit<R>(
        &mut self,
        outcome: Result<R, GatewayError>,
        action: &str,
    ) -> Result<R, EditorError> {
        let state = std::mem::replace(&mut self.state, DialogState::Closed);
        let (draft, mode) = match state {
            DialogState::Submitting { draft, mode } => (draft, mode),
            other => {
                self.state = other;
                return Err(EditorError::NotOpen);
            }
        };
        match outcome {
            Ok(record) => {
                info!(action, "submission succeeded");
                Ok(record)
            }
            Err(err) => {
                warn!(action, error = %err, "submission failed; draft retained");
                self.state = DialogState::Open {
                    draft,
                    mode,
                    errors: FieldErrors::new(),
                    notice: Some(Notice::from_gateway(&err, action)),
                };
                Err(EditorError::Gateway(err))
            }
        }
    }

    /// Validate, call the backend, and settle in one step.
    pub async fn submit<R, F, Fut>(&mut self, action: &str, call: F) -> Result<R, EditorError>
    where
        F: FnOnce(D, EditMode) -> Fut,
        Fut: Future<Output = Result<R, GatewayError>>,
    {
        let (draft, mode) = self.begin_submit()?;
        let outcome = call(draft, mode).await;
        self.finish_submit(outcome, action)
    }
}

/// Records addressable by a server-assigned id.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for FollowEventFlow {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for crate::model::HealthRecommendation {
    fn key(&self) -> &str {
        &self.id
    }
}

/// New records go to the front of the list.
pub fn merge_created<T>(list: &mut Vec<T>, record: T) {
    list.insert(0, record);
}

/// Replace the record with the same id in place; returns false if absent.
pub fn merge_updated<T: Keyed>(list: &mut [T], record: T) -> bool {
    match list.iter_mut().find(|r| r.key() == record.key()) {
        Some(slot) => {
            *slot = record;
            true
        }
        None => false,
    }
}

/// Remove the record with `id`; returns false if absent.
pub fn merge_deleted<T: Keyed>(list: &mut Vec<T>, id: &str) -> bool {
    let before = list.len();
    list.retain(|r| r.key() != id);
    list.len() != before
}
