//! Backend HTTP API types
//!
//! Request/response bodies for the simulation backend:
//! - `POST /simulate` starts a run
//! - `GET /simulate/{job_id}/stream` streams pipeline events (SSE)
//! - `GET /simulate/{job_id}/result` returns the authoritative result
//! - `GET /city/kochi`, `GET /city/kochi/metrics`, `GET /presets` feed the console at startup
//!
//! Only types live here; the HTTP client itself belongs to the UI crate.

pub mod types;

pub use types::{
    ApiErrorBody, BaselineMetrics, PolicyPreset, RunResult, RunResultResponse, StartRunRequest,
    StartRunResponse, DEFAULT_CITY,
};
