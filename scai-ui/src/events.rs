//! Session update bus
//!
//! The controller owns the session; presentation code (the console, or any other
//! front end) subscribes here and renders from the updates it receives.

use crate::session::{ResultPanel, ViewMode};
use crate::stages::StageStatus;
use chrono::{DateTime, Utc};
use scai_common::StageName;
use serde::Serialize;
use tokio::sync::broadcast;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    /// `complete` received and results materialized (possibly degraded)
    Completed,
    /// Backend reported a pipeline error
    Failed(String),
    /// Connection lost before a terminal event
    TransportLost(String),
}

/// Change notification emitted by the session controller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    RunStarted {
        run_id: String,
        policy: String,
        timestamp: DateTime<Utc>,
    },
    StageChanged {
        stage: StageName,
        status: StageStatus,
        message: Option<String>,
    },
    ImpactScoresUpdated {
        metric_count: usize,
    },
    ModifiedLayerReady {
        feature_count: usize,
    },
    /// Non-fatal problem worth showing to the operator
    Diagnostic {
        message: String,
    },
    RunFinished {
        outcome: RunOutcome,
        timestamp: DateTime<Utc>,
    },
    ViewChanged {
        view_mode: ViewMode,
        result_panel: ResultPanel,
    },
}

impl SessionUpdate {
    pub fn update_type(&self) -> &'static str {
        match self {
            SessionUpdate::RunStarted { .. } => "run_started",
            SessionUpdate::StageChanged { .. } => "stage_changed",
            SessionUpdate::ImpactScoresUpdated { .. } => "impact_scores_updated",
            SessionUpdate::ModifiedLayerReady { .. } => "modified_layer_ready",
            SessionUpdate::Diagnostic { .. } => "diagnostic",
            SessionUpdate::RunFinished { .. } => "run_finished",
            SessionUpdate::ViewChanged { .. } => "view_changed",
        }
    }
}

/// Broadcast channel for [`SessionUpdate`]s
///
/// Slow subscribers lag rather than block the controller.
#[derive(Clone)]
pub struct SessionBus {
    tx: broadcast::Sender<SessionUpdate>,
}

impl SessionBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive all updates emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.tx.subscribe()
    }

    /// Emit an update, ignoring the no-subscriber case
    pub fn emit_lossy(&self, update: SessionUpdate) {
        let _ = self.tx.send(update);
    }
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_updates() {
        let bus = SessionBus::new(8);
        bus.emit_lossy(SessionUpdate::Diagnostic {
            message: "nobody home".into(),
        });

        let mut rx = bus.subscribe();
        bus.emit_lossy(SessionUpdate::ImpactScoresUpdated { metric_count: 1 });
        assert_eq!(rx.recv().await.unwrap().update_type(), "impact_scores_updated");
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let bus = SessionBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit_lossy(SessionUpdate::ModifiedLayerReady { feature_count: 3 });
        bus.emit_lossy(SessionUpdate::RunFinished {
            outcome: RunOutcome::Completed,
            timestamp: Utc::now(),
        });

        assert_eq!(rx.recv().await.unwrap().update_type(), "modified_layer_ready");
        assert_eq!(rx.recv().await.unwrap().update_type(), "run_finished");
    }

    #[test]
    fn test_update_serializes_with_type_tag() {
        let json = serde_json::to_value(SessionUpdate::StageChanged {
            stage: StageName::CitizenProxy,
            status: StageStatus::Running,
            message: None,
        })
        .unwrap();
        assert_eq!(json["type"], "stage_changed");
        assert_eq!(json["stage"], "citizen_proxy");
        assert_eq!(json["status"], "running");
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(RunOutcome::Failed("agent crashed".into())).unwrap();
        assert_eq!(json["kind"], "failed");
        assert_eq!(json["reason"], "agent crashed");
    }
}
