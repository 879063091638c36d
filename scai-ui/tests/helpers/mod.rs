//! Test helpers for scai-ui integration tests
//!
//! - FakeBackend: scripted in-process backend (SSE chunks per run, result responses)
//! - frame/event_frame: SSE frame builders
//! - road_network: small GeoJSON fixture with modified and closed roads

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use scai_common::api::{BaselineMetrics, PolicyPreset, RunResult, RunResultResponse, StartRunRequest};
use scai_common::geo::{FeatureProperties, GeoFeature, GeoFeatureCollection, Geometry, TextOrList};
use scai_common::StreamEvent;
use scai_ui::backend::ByteStream;
use scai_ui::map::{BuiltinLibraryLoader, GeoJsonSurface, LayerSynchronizer};
use scai_ui::{Backend, RunId, SessionBus, SessionController, StreamClient, UiError, UiResult};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How a scripted stream ends once its chunks are delivered
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamEnd {
    /// Connection closes
    Eof,
    /// Connection stays open without further data
    Hang,
    /// Read error
    Fail,
}

#[derive(Debug, Clone)]
pub struct StreamScript {
    pub chunks: Vec<Bytes>,
    pub end: StreamEnd,
}

impl StreamScript {
    pub fn events(events: &[StreamEvent], end: StreamEnd) -> Self {
        Self {
            chunks: events.iter().map(event_frame).collect(),
            end,
        }
    }

    pub fn raw(chunks: Vec<Bytes>, end: StreamEnd) -> Self {
        Self { chunks, end }
    }
}

#[derive(Default)]
struct FakeState {
    scripts: VecDeque<StreamScript>,
    by_run: HashMap<String, StreamScript>,
    results: HashMap<String, RunResultResponse>,
    fail_start: bool,
    next_run: usize,
}

/// Scripted backend; each start consumes the next stream script
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    pub start_calls: AtomicUsize,
    pub stream_opens: AtomicUsize,
    pub result_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_script(&self, script: StreamScript) {
        self.state.lock().unwrap().scripts.push_back(script);
    }

    /// Result returned for `run_id`; runs without one answer 202
    pub fn set_result(&self, run_id: &str, result: RunResult) {
        self.state.lock().unwrap().results.insert(
            run_id.to_string(),
            RunResultResponse {
                id: Some(run_id.to_string()),
                status: Some("completed".to_string()),
                result: Some(result),
                ..Default::default()
            },
        );
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn start_run(&self, request: &StartRunRequest) -> UiResult<RunId> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(UiError::Network("connection refused".to_string()));
        }
        if request.policy.trim().is_empty() {
            return Err(UiError::Api(400, "Policy text cannot be empty".to_string()));
        }
        state.next_run += 1;
        let run_id = format!("run-{}", state.next_run);
        let script = state
            .scripts
            .pop_front()
            .unwrap_or_else(|| StreamScript::raw(Vec::new(), StreamEnd::Hang));
        state.by_run.insert(run_id.clone(), script);
        Ok(RunId::new(run_id))
    }

    async fn open_event_stream(&self, run_id: &RunId) -> UiResult<ByteStream> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        let script = self
            .state
            .lock()
            .unwrap()
            .by_run
            .remove(run_id.as_str())
            .ok_or_else(|| UiError::Api(404, "Job not found".to_string()))?;

        let chunks = stream::iter(script.chunks.into_iter().map(Ok::<_, UiError>));
        let stream: ByteStream = match script.end {
            StreamEnd::Eof => chunks.boxed(),
            StreamEnd::Hang => chunks.chain(stream::pending()).boxed(),
            StreamEnd::Fail => chunks
                .chain(stream::once(async {
                    Err(UiError::Stream("connection reset by peer".to_string()))
                }))
                .boxed(),
        };
        Ok(stream)
    }

    async fn fetch_run_result(&self, run_id: &RunId) -> UiResult<RunResultResponse> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .results
            .get(run_id.as_str())
            .cloned()
            .ok_or_else(|| UiError::Api(202, "Simulation still running".to_string()))
    }

    async fn fetch_city_network(&self) -> UiResult<GeoFeatureCollection> {
        Ok(road_network(&[(false, false), (false, false)]))
    }

    async fn fetch_baseline_metrics(&self) -> UiResult<BaselineMetrics> {
        Ok(baseline_metrics())
    }

    async fn fetch_presets(&self) -> UiResult<Vec<PolicyPreset>> {
        Ok(Vec::new())
    }
}

/// Encode one SSE frame
pub fn frame(value: &Value) -> Bytes {
    Bytes::from(format!("data: {}\n\n", value))
}

pub fn event_frame(event: &StreamEvent) -> Bytes {
    frame(&serde_json::to_value(event).unwrap())
}

pub fn data_event(key: &str, data: Value) -> StreamEvent {
    StreamEvent::Data {
        key: key.to_string(),
        data,
    }
}

pub fn start_event() -> StreamEvent {
    StreamEvent::Start {
        agent: Some("orchestrator".to_string()),
        message: Some("Starting simulation pipeline".to_string()),
    }
}

pub fn complete_event() -> StreamEvent {
    StreamEvent::Complete {
        message: Some("Simulation complete".to_string()),
    }
}

pub fn baseline_metrics() -> BaselineMetrics {
    BaselineMetrics {
        avg_congestion_ratio: 0.62,
        severe_congestion_pct: 14.0,
        avg_travel_time_min: 23.5,
        total_vehicle_flow: 182_000.0,
        daily_co2_kg: 41_000.0,
        economic_loss_inr_per_day: 2_600_000.0,
        total_edges: 2,
        total_nodes: 3,
    }
}

pub fn impact_scores() -> Value {
    json!({
        "congestion": {
            "label": "Average Congestion", "before": 62.0, "after": 55.0,
            "delta_pct": -11.3, "unit": "%", "severity": "positive"
        },
        "travel_time": {
            "label": "Avg Travel Time", "before": 23.5, "after": 21.0,
            "delta_pct": -10.6, "unit": "min", "severity": "positive"
        }
    })
}

/// Road network fixture; each entry is (is_modified, is_closed)
pub fn road_network(edges: &[(bool, bool)]) -> GeoFeatureCollection {
    let features = edges
        .iter()
        .enumerate()
        .map(|(i, (modified, closed))| GeoFeature {
            kind: "Feature".to_string(),
            geometry: Geometry::LineString {
                coordinates: vec![
                    [76.27 + i as f64 * 0.01, 9.96],
                    [76.28 + i as f64 * 0.01, 9.97],
                ],
            },
            properties: FeatureProperties {
                edge_id: Some(format!("e{}", i)),
                name: Some(TextOrList::Text(format!("Road {}", i))),
                congestion_ratio: Some(0.5),
                is_modified: *modified,
                is_closed: *closed,
                ..Default::default()
            },
        })
        .collect();
    GeoFeatureCollection::new(features)
}

/// Controller over `backend` with a mounted in-memory map surface
pub fn controller_for(backend: Arc<FakeBackend>) -> SessionController {
    let backend: Arc<dyn Backend> = backend;
    let map = LayerSynchronizer::new(Arc::new(BuiltinLibraryLoader));
    map.mount(|| Box::new(GeoJsonSurface::new()));
    SessionController::new(
        Arc::clone(&backend),
        StreamClient::new(backend),
        map,
        SessionBus::new(64),
        "Kochi, Kerala, India",
    )
}
