//! Impact score model
//!
//! Impact scores arrive as a JSON object keyed by metric name. Each traffic metric is a
//! before/after comparison; `citizen_satisfaction` has its own shape with a per-group
//! breakdown. Partial sets stream in via `data` events and are merged per metric.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Qualitative rating of a metric change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    HighlyPositive,
    Positive,
    #[default]
    Neutral,
    Negative,
    HighlyNegative,
    #[serde(other)]
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::HighlyPositive => "highly_positive",
            Severity::Positive => "positive",
            Severity::Neutral => "neutral",
            Severity::Negative => "negative",
            Severity::HighlyNegative => "highly_negative",
            Severity::Unknown => "unknown",
        }
    }

    /// Short marker for console tables
    pub fn marker(&self) -> &'static str {
        match self {
            Severity::HighlyPositive => "++",
            Severity::Positive => "+",
            Severity::Neutral | Severity::Unknown => "=",
            Severity::Negative => "-",
            Severity::HighlyNegative => "--",
        }
    }
}

/// Metrics the pipeline reports, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImpactMetric {
    Congestion,
    TravelTime,
    Co2Emissions,
    EconomicLoss,
    SevereCongestionRoads,
}

impl ImpactMetric {
    pub const ALL: [ImpactMetric; 5] = [
        ImpactMetric::Congestion,
        ImpactMetric::TravelTime,
        ImpactMetric::Co2Emissions,
        ImpactMetric::EconomicLoss,
        ImpactMetric::SevereCongestionRoads,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactMetric::Congestion => "congestion",
            ImpactMetric::TravelTime => "travel_time",
            ImpactMetric::Co2Emissions => "co2_emissions",
            ImpactMetric::EconomicLoss => "economic_loss",
            ImpactMetric::SevereCongestionRoads => "severe_congestion_roads",
        }
    }

    pub fn from_key(key: &str) -> Option<ImpactMetric> {
        ImpactMetric::ALL.iter().copied().find(|m| m.as_str() == key)
    }
}

/// Before/after comparison for one metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricComparison {
    pub label: String,
    pub before: f64,
    pub after: f64,
    pub delta_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_abs: Option<f64>,
    pub unit: String,
    pub severity: Severity,
}

/// One demographic group's reaction, as summarised by impact analysis
///
/// Group fields are model-generated, so numbers may arrive as floats or strings and
/// text fields may be null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupImpact {
    #[serde(deserialize_with = "null_as_default")]
    pub group: String,
    #[serde(deserialize_with = "lenient_score")]
    pub impact_score: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub sentiment: String,
    #[serde(deserialize_with = "lenient_text")]
    pub key_concern: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub affected_population: Option<f64>,
}

/// Population-weighted citizen satisfaction score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatisfactionBreakdown {
    pub score: f64,
    pub max_score: f64,
    pub severity: Severity,
    pub label: String,
    pub unit: String,
    pub by_group: Vec<GroupImpact>,
}

/// Full citizen-proxy output for one demographic group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CitizenProfile {
    #[serde(deserialize_with = "null_as_default")]
    pub group: String,
    #[serde(deserialize_with = "lenient_number")]
    pub size: Option<f64>,
    #[serde(deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub primary_concern: Option<String>,
    /// positive | negative | neutral | mixed
    #[serde(deserialize_with = "lenient_text")]
    pub impact_sentiment: Option<String>,
    /// -10..=10
    #[serde(deserialize_with = "lenient_score")]
    pub impact_score: f64,
    #[serde(deserialize_with = "lenient_text")]
    pub key_concern: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub behavioral_change: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub affected_population: Option<f64>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Any JSON number, or a string holding one; anything else is treated as absent
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().replace(',', "").parse().ok(),
        _ => None,
    }))
}

fn lenient_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?.unwrap_or_default())
}

/// Strings pass through, numbers and booleans are stringified, anything else is absent
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        Value::String(text) => Some(text),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }))
}

/// Impact scores keyed by metric name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactScoreSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citizen_satisfaction: Option<SatisfactionBreakdown>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, MetricComparison>,
}

impl ImpactScoreSet {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.citizen_satisfaction.is_none()
    }

    pub fn get(&self, metric: ImpactMetric) -> Option<&MetricComparison> {
        self.metrics.get(metric.as_str())
    }

    /// Merge a partial set: metrics present in `other` replace ours, the rest are kept
    pub fn merge(&mut self, other: ImpactScoreSet) {
        self.metrics.extend(other.metrics);
        if other.citizen_satisfaction.is_some() {
            self.citizen_satisfaction = other.citizen_satisfaction;
        }
    }

    /// Metrics in display order: known metrics first, then anything else by name
    pub fn ordered(&self) -> Vec<(&str, &MetricComparison)> {
        let mut known: Vec<(&str, &MetricComparison)> = ImpactMetric::ALL
            .iter()
            .filter_map(|m| self.metrics.get_key_value(m.as_str()))
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        known.extend(
            self.metrics
                .iter()
                .filter(|(k, _)| ImpactMetric::from_key(k).is_none())
                .map(|(k, v)| (k.as_str(), v)),
        );
        known
    }
}
