//! # SCAI Common Library
//!
//! Shared code for the SimCity AI operator console including:
//! - Push-event envelope types (StreamEvent) and the SSE frame decoder
//! - Pipeline stage catalogue (fixed, ordered agent list)
//! - Road-network GeoJSON model consumed by the map overlays
//! - Impact score model
//! - Backend API request/response types
//! - Configuration loading

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod impact;
pub mod stages;

pub use error::{Error, Result};
pub use events::{AgentStatus, DataKey, StreamEvent};
pub use geo::{CongestionLevel, GeoFeature, GeoFeatureCollection};
pub use impact::ImpactScoreSet;
pub use stages::StageName;
