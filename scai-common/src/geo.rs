//! Road-network GeoJSON model
//!
//! The backend exports its road graph as a GeoJSON FeatureCollection of LineString
//! edges. Only the properties the map overlays need are modelled; anything else in
//! the payload is ignored.

use serde::{Deserialize, Deserializer, Serialize};

/// Congestion classification used for styling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionLevel {
    Free,
    Moderate,
    Heavy,
    Severe,
    Closed,
}

impl CongestionLevel {
    /// Classify a volume/capacity ratio (same thresholds as the backend)
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.4 {
            CongestionLevel::Free
        } else if ratio < 0.6 {
            CongestionLevel::Moderate
        } else if ratio < 0.8 {
            CongestionLevel::Heavy
        } else {
            CongestionLevel::Severe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CongestionLevel::Free => "free",
            CongestionLevel::Moderate => "moderate",
            CongestionLevel::Heavy => "heavy",
            CongestionLevel::Severe => "severe",
            CongestionLevel::Closed => "closed",
        }
    }
}

/// OSM tags may be a single string or a list of strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl TextOrList {
    /// First non-empty value
    pub fn first(&self) -> Option<&str> {
        match self {
            TextOrList::Text(text) => Some(text.as_str()).filter(|t| !t.is_empty()),
            TextOrList::List(items) => items.iter().map(String::as_str).find(|t| !t.is_empty()),
        }
    }
}

/// Feature properties consumed for rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureProperties {
    pub edge_id: Option<String>,
    pub name: Option<TextOrList>,
    pub highway: Option<TextOrList>,
    pub length: Option<f64>,
    pub speed_kph: Option<f64>,
    pub capacity: Option<f64>,
    pub baseline_flow: Option<u64>,
    /// Volume/capacity ratio in 0..=1
    pub congestion_ratio: Option<f64>,
    #[serde(deserialize_with = "lenient_level")]
    pub congestion_level: Option<CongestionLevel>,
    pub is_modified: bool,
    pub is_closed: bool,
}

fn lenient_level<'de, D>(deserializer: D) -> Result<Option<CongestionLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

impl FeatureProperties {
    /// Effective congestion classification
    ///
    /// A closed road is always `Closed`; otherwise the backend's level wins, falling back
    /// to classifying the ratio.
    pub fn level(&self) -> CongestionLevel {
        if self.is_closed {
            return CongestionLevel::Closed;
        }
        self.congestion_level
            .or_else(|| self.congestion_ratio.map(CongestionLevel::from_ratio))
            .unwrap_or(CongestionLevel::Free)
    }

    /// Road category (OSM highway tag)
    pub fn category(&self) -> Option<&str> {
        self.highway.as_ref().and_then(TextOrList::first)
    }

    /// Street name, falling back to the category
    pub fn display_name(&self) -> &str {
        self.name
            .as_ref()
            .and_then(TextOrList::first)
            .or_else(|| self.category())
            .unwrap_or("Unnamed road")
    }

    /// Congestion as a whole percentage, if known
    pub fn congestion_pct(&self) -> Option<u32> {
        self.congestion_ratio
            .map(|ratio| (ratio.clamp(0.0, 1.0) * 100.0).round() as u32)
    }
}

/// GeoJSON geometry (the subset the backend emits)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
    LineString { coordinates: Vec<[f64; 2]> },
    MultiLineString { coordinates: Vec<Vec<[f64; 2]>> },
}

/// One road edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFeature {
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: FeatureProperties,
}

fn feature_type() -> String {
    "Feature".to_string()
}

fn collection_type() -> String {
    "FeatureCollection".to_string()
}

/// Ordered sequence of georeferenced features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFeatureCollection {
    #[serde(rename = "type", default = "collection_type")]
    pub kind: String,
    #[serde(default)]
    pub features: Vec<GeoFeature>,
}

impl Default for GeoFeatureCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl GeoFeatureCollection {
    pub fn new(features: Vec<GeoFeature>) -> Self {
        Self {
            kind: collection_type(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features the policy changed: modified or closed roads only
    pub fn changed_features(&self) -> GeoFeatureCollection {
        GeoFeatureCollection::new(
            self.features
                .iter()
                .filter(|f| f.properties.is_modified || f.properties.is_closed)
                .cloned()
                .collect(),
        )
    }
}
