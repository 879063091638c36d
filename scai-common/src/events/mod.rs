//! Push-event envelope types for the SCAI event stream
//!
//! The backend streams one JSON object per SSE frame:
//! `{type: "start"|"agent_complete"|"data"|"complete"|"error", agent?, status?, message?, key?, data?}`
//!
//! `complete` and `error` are terminal: nothing else arrives for that run afterwards.
//! `data` frames carry partial results keyed by name and may arrive before, between,
//! or after `agent_complete` frames for unrelated stages.

mod frame;
mod payload;

pub use frame::{DecodeReport, FrameError, SseFrameDecoder, DEFAULT_MAX_FRAME_BYTES};
pub use payload::DataPayload;

use crate::stages::StageName;
use serde::{Deserialize, Serialize};

/// Stream event envelope
///
/// Serialized with an internal `type` tag so frames can be decoded directly from the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Stream opened by the orchestrator (informational only)
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// One pipeline stage finished (successfully or not)
    AgentComplete {
        /// Wire name of the stage (e.g. "data_ingestion")
        agent: String,
        /// Reported outcome; anything but `error` counts as success
        #[serde(default)]
        status: AgentStatus,
        /// Last log line from the agent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Display label sent by the backend (unused for identity)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_display: Option<String>,
    },

    /// Out-of-band partial result keyed by name
    Data {
        key: String,
        #[serde(default)]
        data: serde_json::Value,
    },

    /// Terminal success; the full result must be fetched separately
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Terminal failure
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl StreamEvent {
    /// Whether this event ends the run's stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }

    /// Short event type name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::AgentComplete { .. } => "agent_complete",
            StreamEvent::Data { .. } => "data",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// Stage this event refers to, if it is a known `agent_complete`
    pub fn stage(&self) -> Option<StageName> {
        match self {
            StreamEvent::AgentComplete { agent, .. } => StageName::from_wire(agent),
            _ => None,
        }
    }

    /// Convenience constructor used by tests and fake backends
    pub fn agent_complete(stage: StageName, status: AgentStatus, message: Option<&str>) -> Self {
        StreamEvent::AgentComplete {
            agent: stage.as_str().to_string(),
            status,
            message: message.map(str::to_string),
            agent_display: Some(stage.display_name().to_string()),
        }
    }
}

/// Agent outcome reported in `agent_complete`
///
/// The backend sends `running` for agents that succeeded mid-pipeline and `error`
/// when an agent failed. Unrecognised values are tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Completed,
    Error,
    #[default]
    Running,
    #[serde(other)]
    Other,
}

impl AgentStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, AgentStatus::Error)
    }
}

/// Known `data` event keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKey {
    BaselineMetrics,
    ModifiedGraphData,
    ImpactScores,
    CitizenProfiles,
    Recommendations,
}

impl DataKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKey::BaselineMetrics => "baseline_metrics",
            DataKey::ModifiedGraphData => "modified_graph_data",
            DataKey::ImpactScores => "impact_scores",
            DataKey::CitizenProfiles => "citizen_profiles",
            DataKey::Recommendations => "recommendations",
        }
    }

    pub fn from_wire(key: &str) -> Option<DataKey> {
        match key {
            "baseline_metrics" => Some(DataKey::BaselineMetrics),
            "modified_graph_data" => Some(DataKey::ModifiedGraphData),
            "impact_scores" => Some(DataKey::ImpactScores),
            "citizen_profiles" => Some(DataKey::CitizenProfiles),
            "recommendations" => Some(DataKey::Recommendations),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_agent_complete_from_backend_frame() {
        let raw = json!({
            "type": "agent_complete",
            "agent": "simulation_engine",
            "agent_display": "Simulation Engine",
            "message": "Simulation Engine: 412 edges assigned",
            "status": "running"
        });

        let event: StreamEvent = serde_json::from_value(raw).unwrap();
        match &event {
            StreamEvent::AgentComplete { agent, status, message, .. } => {
                assert_eq!(agent, "simulation_engine");
                assert_eq!(*status, AgentStatus::Running);
                assert!(message.as_deref().unwrap().starts_with("Simulation Engine"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(event.stage(), Some(StageName::SimulationEngine));
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let event: StreamEvent = serde_json::from_value(json!({
            "type": "agent_complete",
            "agent": "policy_testing",
            "status": "partially_done"
        }))
        .unwrap();

        match event {
            StreamEvent::AgentComplete { status, .. } => {
                assert_eq!(status, AgentStatus::Other);
                assert!(!status.is_error());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_missing_status_defaults_to_running() {
        let event: StreamEvent =
            serde_json::from_value(json!({"type": "agent_complete", "agent": "recommendation"}))
                .unwrap();
        assert!(matches!(
            event,
            StreamEvent::AgentComplete { status: AgentStatus::Running, .. }
        ));
    }

    #[test]
    fn test_terminal_events() {
        let complete: StreamEvent =
            serde_json::from_str(r#"{"type":"complete","message":"Simulation completed"}"#).unwrap();
        let error: StreamEvent = serde_json::from_str(r#"{"type":"error"}"#).unwrap();
        let start: StreamEvent =
            serde_json::from_str(r#"{"type":"start","agent":"orchestrator"}"#).unwrap();

        assert!(complete.is_terminal());
        assert!(error.is_terminal());
        assert!(!start.is_terminal());
        assert_eq!(error, StreamEvent::Error { message: None });
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let result = serde_json::from_str::<StreamEvent>(r#"{"type":"heartbeat"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_data_event_keeps_raw_payload() {
        let event: StreamEvent = serde_json::from_value(json!({
            "type": "data",
            "key": "recommendations",
            "data": "Proceed with phased rollout"
        }))
        .unwrap();

        assert_eq!(
            event,
            StreamEvent::Data {
                key: "recommendations".to_string(),
                data: json!("Proceed with phased rollout"),
            }
        );
        assert_eq!(DataKey::from_wire("recommendations"), Some(DataKey::Recommendations));
        assert_eq!(DataKey::from_wire("simulation_results"), None);
    }
}
