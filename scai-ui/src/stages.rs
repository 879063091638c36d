//! Stage state machine
//!
//! Derives the six-stage pipeline checklist from the event stream. [`reduce`] is a
//! pure function: the current list plus one event gives the next list.
//!
//! Invariants kept for any event order:
//! - at most one stage is `Running`
//! - `Completed` and `Error` never change once reached

use scai_common::{StageName, StreamEvent};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Status of one pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Error)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One checklist entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStage {
    pub name: StageName,
    pub status: StageStatus,
    /// Last message reported by the stage's agent
    pub message: Option<String>,
}

impl PipelineStage {
    fn pending(name: StageName) -> Self {
        Self {
            name,
            status: StageStatus::Pending,
            message: None,
        }
    }
}

/// All six stages in execution order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageList {
    stages: Vec<PipelineStage>,
}

impl Default for StageList {
    fn default() -> Self {
        Self::all_pending()
    }
}

impl StageList {
    /// Idle checklist before any run
    pub fn all_pending() -> Self {
        Self {
            stages: StageName::ALL.iter().copied().map(PipelineStage::pending).collect(),
        }
    }

    /// Checklist at the start of a run: first stage running, the rest pending
    pub fn for_new_run() -> Self {
        let mut list = Self::all_pending();
        list.stages[0].status = StageStatus::Running;
        list
    }

    pub fn get(&self, name: StageName) -> &PipelineStage {
        &self.stages[name.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineStage> {
        self.stages.iter()
    }

    pub fn statuses(&self) -> Vec<StageStatus> {
        self.stages.iter().map(|s| s.status).collect()
    }

    /// Stage currently marked running, if any
    pub fn running(&self) -> Option<StageName> {
        self.stages
            .iter()
            .find(|s| s.status == StageStatus::Running)
            .map(|s| s.name)
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|s| s.status == status).count()
    }

    /// Stages whose entry differs between `self` and `other`
    pub fn changed_since(&self, other: &StageList) -> Vec<&PipelineStage> {
        self.stages
            .iter()
            .zip(other.stages.iter())
            .filter(|(new, old)| new != old)
            .map(|(new, _)| new)
            .collect()
    }
}

/// Apply one stream event to a stage list
///
/// Only `agent_complete` for a known stage changes anything. The stage becomes
/// `Completed` (or `Error` when the agent reported an error) and its successor, if
/// still pending, starts running. A stage that already finished ignores repeats, and
/// the successor is not promoted while another stage is still running.
pub fn reduce(stages: &StageList, event: &StreamEvent) -> StageList {
    let StreamEvent::AgentComplete {
        agent,
        status,
        message,
        ..
    } = event
    else {
        return stages.clone();
    };

    let Some(name) = event.stage() else {
        debug!(agent = %agent, "Ignoring agent_complete for unknown stage");
        return stages.clone();
    };

    let mut next = stages.clone();
    let entry = &mut next.stages[name.index()];
    if entry.status.is_terminal() {
        debug!(stage = %name, status = %entry.status, "Ignoring repeat agent_complete");
        return next;
    }

    entry.status = if status.is_error() {
        StageStatus::Error
    } else {
        StageStatus::Completed
    };
    if let Some(message) = message {
        entry.message = Some(message.clone());
    }

    if let Some(successor) = name.next() {
        let can_promote = next.running().is_none();
        let successor_entry = &mut next.stages[successor.index()];
        if can_promote && successor_entry.status == StageStatus::Pending {
            successor_entry.status = StageStatus::Running;
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use scai_common::AgentStatus;

    fn complete(stage: StageName) -> StreamEvent {
        StreamEvent::agent_complete(stage, AgentStatus::Running, Some("done"))
    }

    fn failed(stage: StageName) -> StreamEvent {
        StreamEvent::agent_complete(stage, AgentStatus::Error, Some("agent crashed"))
    }

    #[test]
    fn test_new_run_shape() {
        use StageStatus::*;
        assert_eq!(
            StageList::for_new_run().statuses(),
            vec![Running, Pending, Pending, Pending, Pending, Pending]
        );
        assert_eq!(StageList::all_pending().count(Pending), 6);
    }

    #[test]
    fn test_sequential_completion() {
        let mut stages = StageList::for_new_run();
        for stage in StageName::ALL {
            stages = reduce(&stages, &complete(stage));
        }
        assert_eq!(stages.count(StageStatus::Completed), 6);
        assert_eq!(stages.running(), None);
        assert_eq!(stages.get(StageName::Recommendation).message.as_deref(), Some("done"));
    }

    #[test]
    fn test_completion_promotes_successor() {
        use StageStatus::*;
        let stages = reduce(&StageList::for_new_run(), &complete(StageName::DataIngestion));
        assert_eq!(
            stages.statuses(),
            vec![Completed, Running, Pending, Pending, Pending, Pending]
        );
    }

    #[test]
    fn test_error_advances_like_completion() {
        use StageStatus::*;
        let mut stages = StageList::for_new_run();
        stages = reduce(&stages, &complete(StageName::DataIngestion));
        stages = reduce(&stages, &failed(StageName::SimulationEngine));
        assert_eq!(
            stages.statuses(),
            vec![Completed, Error, Running, Pending, Pending, Pending]
        );
        assert_eq!(
            stages.get(StageName::SimulationEngine).message.as_deref(),
            Some("agent crashed")
        );
    }

    #[test]
    fn test_terminal_state_is_not_overwritten() {
        let stages = reduce(&StageList::for_new_run(), &failed(StageName::DataIngestion));
        let again = reduce(&stages, &complete(StageName::DataIngestion));
        assert_eq!(again.get(StageName::DataIngestion).status, StageStatus::Error);
        assert_eq!(again, stages);
    }

    #[test]
    fn test_out_of_order_completion_keeps_single_running() {
        let stages = reduce(&StageList::for_new_run(), &complete(StageName::PolicyTesting));
        assert_eq!(stages.get(StageName::PolicyTesting).status, StageStatus::Completed);
        // DataIngestion is still running, so ImpactAnalysis stays pending
        assert_eq!(stages.get(StageName::ImpactAnalysis).status, StageStatus::Pending);
        assert_eq!(stages.count(StageStatus::Running), 1);
    }

    #[test]
    fn test_non_stage_events_leave_list_unchanged() {
        let stages = StageList::for_new_run();
        let events = [
            StreamEvent::Start { agent: Some("orchestrator".into()), message: None },
            StreamEvent::Data { key: "impact_scores".into(), data: serde_json::json!({}) },
            StreamEvent::Complete { message: None },
            StreamEvent::Error { message: Some("boom".into()) },
            StreamEvent::AgentComplete {
                agent: "orchestrator".into(),
                status: AgentStatus::Running,
                message: None,
                agent_display: None,
            },
        ];
        for event in &events {
            assert_eq!(reduce(&stages, event), stages);
        }
    }

    #[test]
    fn test_changed_since_reports_touched_stages() {
        let before = StageList::for_new_run();
        let after = reduce(&before, &complete(StageName::DataIngestion));
        let changed: Vec<StageName> = after.changed_since(&before).iter().map(|s| s.name).collect();
        assert_eq!(changed, vec![StageName::DataIngestion, StageName::SimulationEngine]);
    }

    #[test]
    fn test_random_event_sequences_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5ca1);

        for _ in 0..500 {
            let mut stages = if rng.gen_bool(0.5) {
                StageList::for_new_run()
            } else {
                StageList::all_pending()
            };

            for _ in 0..rng.gen_range(1..30) {
                let stage = StageName::ALL[rng.gen_range(0..StageName::ALL.len())];
                let event = match rng.gen_range(0..4) {
                    0 => failed(stage),
                    1 => StreamEvent::Data {
                        key: "impact_scores".into(),
                        data: serde_json::json!({}),
                    },
                    _ => complete(stage),
                };

                let next = reduce(&stages, &event);
                assert!(next.count(StageStatus::Running) <= 1);
                for (old, new) in stages.iter().zip(next.iter()) {
                    if old.status.is_terminal() {
                        assert_eq!(old.status, new.status, "terminal stage {} regressed", old.name);
                    }
                }
                stages = next;
            }
        }
    }
}
