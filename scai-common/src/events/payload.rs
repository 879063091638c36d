//! Typed decoding of `data` event payloads

use super::DataKey;
use crate::api::BaselineMetrics;
use crate::geo::GeoFeatureCollection;
use crate::impact::{CitizenProfile, ImpactScoreSet};
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

/// Partial result carried by a `data` event with a known key
#[derive(Debug, Clone, PartialEq)]
pub enum DataPayload {
    BaselineMetrics(BaselineMetrics),
    /// Post-policy network; None when the backend failed to export it
    ModifiedNetwork(Option<GeoFeatureCollection>),
    ImpactScores(ImpactScoreSet),
    CitizenProfiles(Vec<CitizenProfile>),
    Recommendations(String),
}

#[derive(Deserialize)]
struct ModifiedGraphEnvelope {
    #[serde(default)]
    geojson: Option<GeoFeatureCollection>,
}

impl DataPayload {
    /// Decode the payload for `key`
    ///
    /// Returns `Ok(None)` for keys this client does not track.
    pub fn decode(key: &str, data: &Value) -> Result<Option<DataPayload>> {
        let Some(key) = DataKey::from_wire(key) else {
            return Ok(None);
        };

        let payload = match key {
            DataKey::BaselineMetrics => {
                DataPayload::BaselineMetrics(BaselineMetrics::deserialize(data)?)
            }
            DataKey::ModifiedGraphData => {
                let envelope = ModifiedGraphEnvelope::deserialize(data)?;
                DataPayload::ModifiedNetwork(envelope.geojson)
            }
            DataKey::ImpactScores => DataPayload::ImpactScores(ImpactScoreSet::deserialize(data)?),
            DataKey::CitizenProfiles => {
                DataPayload::CitizenProfiles(Vec::<CitizenProfile>::deserialize(data)?)
            }
            DataKey::Recommendations => match data {
                Value::String(text) => DataPayload::Recommendations(text.clone()),
                Value::Null => DataPayload::Recommendations(String::new()),
                other => {
                    return Err(Error::InvalidInput(format!(
                        "recommendations payload must be a string, got {other}"
                    )))
                }
            },
        };

        Ok(Some(payload))
    }
}
