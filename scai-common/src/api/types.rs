//! Shared API request/response types

use crate::impact::{CitizenProfile, ImpactScoreSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// City the backend analyses unless told otherwise
pub const DEFAULT_CITY: &str = "Kochi, Kerala, India";

// ========================================
// Run lifecycle
// ========================================

/// Body of `POST /simulate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRunRequest {
    /// Free-text policy description
    pub policy: String,
    pub city: String,
}

impl StartRunRequest {
    pub fn new(policy: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            city: city.into(),
        }
    }
}

/// Response of `POST /simulate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRunResponse {
    pub job_id: String,
    /// Usually "queued"
    #[serde(default)]
    pub status: String,
}

/// Response of `GET /simulate/{job_id}/result`
///
/// The backend echoes the whole job record; every field is optional so a partial
/// record still decodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunResultResponse {
    pub id: Option<String>,
    pub policy: Option<String>,
    pub city: Option<String>,
    pub status: Option<String>,
    pub result: Option<RunResult>,
}

/// Accumulated pipeline output for a finished run
///
/// Each section decodes on its own: a section that fails to decode is logged and
/// left as `None`, so the others still apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunResult {
    pub impact_scores: Option<ImpactScoreSet>,
    pub recommendations: Option<String>,
    pub baseline_metrics: Option<BaselineMetrics>,
    pub citizen_profiles: Option<Vec<CitizenProfile>>,
}

impl<'de> Deserialize<'de> for RunResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut sections = Map::<String, Value>::deserialize(deserializer)?;
        Ok(RunResult {
            impact_scores: take_section(&mut sections, "impact_scores"),
            recommendations: take_section(&mut sections, "recommendations"),
            baseline_metrics: take_section(&mut sections, "baseline_metrics"),
            citizen_profiles: take_section(&mut sections, "citizen_profiles"),
        })
    }
}

fn take_section<T: DeserializeOwned>(sections: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = sections.remove(key)?;
    match serde_json::from_value::<Option<T>>(value) {
        Ok(section) => section,
        Err(e) => {
            warn!(section = key, error = %e, "Skipping undecodable run result section");
            None
        }
    }
}

/// Error body produced by the backend framework (`{"detail": "..."}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: String,
}

// ========================================
// City data
// ========================================

/// City-wide traffic summary (`GET /city/kochi/metrics`, `baseline_metrics` data event)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineMetrics {
    pub avg_congestion_ratio: f64,
    pub severe_congestion_pct: f64,
    pub avg_travel_time_min: f64,
    pub total_vehicle_flow: f64,
    pub daily_co2_kg: f64,
    pub economic_loss_inr_per_day: f64,
    pub total_edges: u64,
    pub total_nodes: u64,
}

/// Canned policy scenario (`GET /presets`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPreset {
    pub id: String,
    pub title: String,
    /// Policy text submitted when the preset is chosen
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub category: String,
}
