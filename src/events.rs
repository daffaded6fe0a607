//! Progress and outcome records returned by every public operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::types::{EntityId, FailureKind, SyncError};

/// Operation a connector event reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorEventType {
    Publish,
    ChannelEntityAdded,
    ChannelEntityUpdated,
    ChannelEntityDeleted,
    ChannelLinkAdded,
    ChannelLinkUpdated,
    ChannelLinkDeleted,
}

/// Pipeline step an operation has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Initiated,
    EntitiesFetched,
    DocumentsBuilt,
    FilesStaged,
    CatalogSent,
    ResourcesSent,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }
}

/// One recorded progress step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub state: PipelineState,
    pub percentage: u8,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: FailureKind,
    pub message: String,
}

/// Progress of a single operation.
///
/// Created when the operation starts, advanced by each pipeline step and
/// frozen once it reaches [`PipelineState::Completed`] or
/// [`PipelineState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorEvent {
    pub id: Uuid,
    pub event_type: ConnectorEventType,
    pub channel_id: EntityId,
    pub state: PipelineState,
    pub percentage: u8,
    pub message: String,
    pub history: Vec<ProgressUpdate>,
    pub failure: Option<FailureInfo>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ConnectorEvent {
    pub fn initiate(
        event_type: ConnectorEventType,
        channel_id: EntityId,
        message: impl Into<String>,
    ) -> Self {
        let started_at = Utc::now();
        let message = message.into();
        info!("{:?}: {} (0%)", event_type, message);

        Self {
            id: Uuid::new_v4(),
            event_type,
            channel_id,
            state: PipelineState::Initiated,
            percentage: 0,
            message: message.clone(),
            history: vec![ProgressUpdate {
                state: PipelineState::Initiated,
                percentage: 0,
                message,
                at: started_at,
            }],
            failure: None,
            started_at,
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Completed
    }

    /// Record a progress step. Ignored once the event is finished or when
    /// `state` is earlier than the current state.
    pub fn update(&mut self, state: PipelineState, percentage: u8, message: impl Into<String>) {
        let message = message.into();
        if self.is_finished() {
            warn!(
                "Ignoring update '{}' on finished {:?} event {}",
                message, self.event_type, self.id
            );
            return;
        }
        if state < self.state {
            warn!(
                "Ignoring update '{}': {:?} would move {:?} event {} back from {:?}",
                message, state, self.event_type, self.id, self.state
            );
            return;
        }

        let percentage = percentage.min(100).max(self.percentage);
        info!("{:?}: {} ({}%)", self.event_type, message, percentage);
        self.state = state;
        self.percentage = percentage;
        self.message = message.clone();
        self.history.push(ProgressUpdate {
            state,
            percentage,
            message,
            at: Utc::now(),
        });
    }

    /// Same state, new message and percentage.
    pub fn progress(&mut self, percentage: u8, message: impl Into<String>) {
        self.update(self.state, percentage, message);
    }

    pub fn complete(&mut self, message: impl Into<String>) {
        if self.is_finished() {
            return;
        }
        self.update(PipelineState::Completed, 100, message);
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, err: &SyncError) {
        if self.is_finished() {
            return;
        }
        let message = err.to_string();
        error!("{:?} failed: {}", self.event_type, message);

        self.state = PipelineState::Failed;
        self.message = message.clone();
        self.history.push(ProgressUpdate {
            state: PipelineState::Failed,
            percentage: self.percentage,
            message: message.clone(),
            at: Utc::now(),
        });
        self.failure = Some(FailureInfo {
            kind: err.kind(),
            message,
        });
        self.finished_at = Some(Utc::now());
    }

    /// Percentages in the order they were reported.
    pub fn percentages(&self) -> Vec<u8> {
        self.history.iter().map(|u| u.percentage).collect()
    }
}
