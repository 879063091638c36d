//! Pipeline stage catalogue
//!
//! The backend runs six agents strictly in sequence:
//! DATA_INGESTION → SIMULATION_ENGINE → CITIZEN_PROXY → POLICY_TESTING → IMPACT_ANALYSIS → RECOMMENDATION
//!
//! The order is fixed at build time; `StageName::ALL` is the execution order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage identity (one backend agent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Road network load, baseline metrics
    DataIngestion,
    /// Traffic assignment for the current network
    SimulationEngine,
    /// Demographic group reactions
    CitizenProxy,
    /// Apply the policy to the network, re-simulate
    PolicyTesting,
    /// Before/after metric deltas
    ImpactAnalysis,
    /// Final written recommendation
    Recommendation,
}

impl StageName {
    /// All stages in execution order
    pub const ALL: [StageName; 6] = [
        StageName::DataIngestion,
        StageName::SimulationEngine,
        StageName::CitizenProxy,
        StageName::PolicyTesting,
        StageName::ImpactAnalysis,
        StageName::Recommendation,
    ];

    /// Wire name used by the backend in `agent_complete.agent`
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::DataIngestion => "data_ingestion",
            StageName::SimulationEngine => "simulation_engine",
            StageName::CitizenProxy => "citizen_proxy",
            StageName::PolicyTesting => "policy_testing",
            StageName::ImpactAnalysis => "impact_analysis",
            StageName::Recommendation => "recommendation",
        }
    }

    /// Human-readable label for the pipeline checklist
    pub fn display_name(&self) -> &'static str {
        match self {
            StageName::DataIngestion => "Data Ingestion",
            StageName::SimulationEngine => "Simulation Engine",
            StageName::CitizenProxy => "Citizen Proxy",
            StageName::PolicyTesting => "Policy Testing",
            StageName::ImpactAnalysis => "Impact Analysis",
            StageName::Recommendation => "Recommendation",
        }
    }

    /// Resolve a wire name; unknown names return None (tolerated, not fatal)
    pub fn from_wire(name: &str) -> Option<StageName> {
        StageName::ALL.iter().copied().find(|s| s.as_str() == name)
    }

    /// Position in execution order (0-based)
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Stage immediately after this one, None for the last stage
    pub fn next(&self) -> Option<StageName> {
        StageName::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
