//! Session controller
//!
//! Owns the live [`Session`] and the stream connection for the current run, and wires
//! stream deliveries into the stage reducer, the session's result fields, the result
//! materializer and the map synchronizer. At most one run is active at a time.
//!
//! The controller is driven from a single task: call [`SessionController::start`],
//! then feed it deliveries with [`SessionController::next_delivery`] and
//! [`SessionController::handle_delivery`] (or [`SessionController::run_until_finished`]).

use crate::backend::{Backend, RunId};
use crate::error::{UiError, UiResult};
use crate::events::{RunOutcome, SessionBus, SessionUpdate};
use crate::map::{InstallOutcome, LayerSynchronizer, OverlaySlot};
use crate::materializer::{MaterializeOutcome, ResultMaterializer};
use crate::session::{DataApplied, Session, ViewMode};
use crate::stream_client::{StreamClient, StreamDelivery, StreamHandle, StreamSubscription};
use chrono::Utc;
use scai_common::api::{BaselineMetrics, StartRunRequest};
use scai_common::events::DataPayload;
use scai_common::{GeoFeatureCollection, StreamEvent};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of a start request
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(RunId),
    /// A run is already active; nothing was done
    AlreadyRunning,
}

pub struct SessionController {
    backend: Arc<dyn Backend>,
    stream_client: StreamClient,
    materializer: ResultMaterializer,
    map: LayerSynchronizer,
    bus: SessionBus,
    city: String,
    session: Session,
    stream: Option<StreamHandle>,
    subscription: Option<StreamSubscription>,
}

impl SessionController {
    /// # Arguments
    ///
    /// * `backend` - simulation backend
    /// * `stream_client` - opens event streams (normally against the same backend)
    /// * `map` - synchronizer for the map surface; the controller is its only writer
    /// * `bus` - where session updates are published
    /// * `city` - city sent with every start request
    pub fn new(
        backend: Arc<dyn Backend>,
        stream_client: StreamClient,
        map: LayerSynchronizer,
        bus: SessionBus,
        city: impl Into<String>,
    ) -> Self {
        Self {
            materializer: ResultMaterializer::new(Arc::clone(&backend)),
            backend,
            stream_client,
            map,
            bus,
            city: city.into(),
            session: Session::new(),
            stream: None,
            subscription: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn map(&self) -> &LayerSynchronizer {
        &self.map
    }

    pub fn bus(&self) -> &SessionBus {
        &self.bus
    }

    /// Whether a stream subscription is attached
    pub fn has_stream(&self) -> bool {
        self.subscription.is_some()
    }

    /// Start a run for `policy_text`
    ///
    /// No-op while a run is active. Otherwise resets the session, closes the previous
    /// stream, requests a run id and opens the new stream. If no run id can be
    /// obtained the session is unlocked and the error returned.
    pub async fn start(&mut self, policy_text: &str) -> UiResult<StartOutcome> {
        if self.session.is_running() {
            info!("Run already active, ignoring start request");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let policy_text = policy_text.trim();
        if policy_text.is_empty() {
            return Err(UiError::Common(scai_common::Error::InvalidInput(
                "policy description cannot be empty".to_string(),
            )));
        }

        self.session.reset_for_run(policy_text);
        self.map.clear(OverlaySlot::Modified);
        self.map.set_view_mode(ViewMode::Before);
        self.release_stream();
        self.emit_view();

        let request = StartRunRequest::new(policy_text, self.city.clone());
        let run_id = match self.backend.start_run(&request).await {
            Ok(run_id) => run_id,
            Err(e) => {
                warn!(error = %e, "Failed to start run");
                self.session.mark_stopped();
                self.diagnostic(format!("Could not start run: {}", e));
                return Err(e);
            }
        };

        self.session.set_run_id(run_id.clone());
        let (handle, subscription) = self.stream_client.open(run_id.clone());
        self.stream = Some(handle);
        self.subscription = Some(subscription);

        info!(run_id = %run_id, policy = %policy_text, "Run started");
        self.bus.emit_lossy(SessionUpdate::RunStarted {
            run_id: run_id.to_string(),
            policy: policy_text.to_string(),
            timestamp: Utc::now(),
        });
        Ok(StartOutcome::Started(run_id))
    }

    /// Next delivery from the current stream
    ///
    /// Pends forever while no stream is attached, so it can sit in a `select!`
    /// next to other inputs. Returns None once when the stream ends or is closed.
    pub async fn next_delivery(&mut self) -> Option<StreamDelivery> {
        let Some(subscription) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };

        let delivery = subscription.next().await;
        if delivery.is_none() {
            debug!("Event stream drained");
            self.subscription = None;
        }
        delivery
    }

    /// Route one delivery; returns the outcome when it ended the run
    pub async fn handle_delivery(&mut self, delivery: StreamDelivery) -> Option<RunOutcome> {
        match delivery {
            StreamDelivery::Event(event) => self.apply_event(event).await,
            StreamDelivery::Malformed(reason) => {
                self.diagnostic(format!("Dropped malformed event: {}", reason));
                None
            }
            StreamDelivery::TransportFailed(reason) => {
                warn!(reason = %reason, "Event stream lost");
                self.session.mark_stopped();
                self.diagnostic(format!("Connection to the backend was lost: {}", reason));
                self.release_stream();
                Some(self.finish(RunOutcome::TransportLost(reason)))
            }
        }
    }

    /// Drive the current stream until the run ends or the stream closes
    pub async fn run_until_finished(&mut self) -> Option<RunOutcome> {
        while self.subscription.is_some() {
            let Some(delivery) = self.next_delivery().await else {
                break;
            };
            if let Some(outcome) = self.handle_delivery(delivery).await {
                return Some(outcome);
            }
        }
        None
    }

    async fn apply_event(&mut self, event: StreamEvent) -> Option<RunOutcome> {
        match event {
            StreamEvent::Start { .. } => {
                debug!("Pipeline started");
                None
            }
            StreamEvent::AgentComplete { .. } => {
                let previous = self.session.apply_stage_event(&event);
                for stage in self.session.stages().changed_since(&previous) {
                    debug!(stage = %stage.name, status = %stage.status, "Stage changed");
                    self.bus.emit_lossy(SessionUpdate::StageChanged {
                        stage: stage.name,
                        status: stage.status,
                        message: stage.message.clone(),
                    });
                }
                None
            }
            StreamEvent::Data { key, data } => {
                match DataPayload::decode(&key, &data) {
                    Ok(Some(payload)) => self.apply_data(payload),
                    Ok(None) => debug!(key = %key, "Ignoring data event with unknown key"),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Dropping undecodable data event");
                        self.diagnostic(format!("Dropped malformed '{}' data: {}", key, e));
                    }
                }
                None
            }
            StreamEvent::Complete { .. } => self.complete().await,
            StreamEvent::Error { message } => {
                let reason = message.unwrap_or_else(|| "pipeline failed".to_string());
                warn!(reason = %reason, "Run failed");
                self.session.mark_stopped();
                self.diagnostic(format!("Simulation failed: {}", reason));
                Some(self.finish(RunOutcome::Failed(reason)))
            }
        }
    }

    fn apply_data(&mut self, payload: DataPayload) {
        match self.session.apply_data(payload) {
            DataApplied::ImpactScores { metric_count } => {
                self.bus
                    .emit_lossy(SessionUpdate::ImpactScoresUpdated { metric_count });
            }
            DataApplied::ModifiedLayer(collection) => {
                let feature_count = collection.changed_features().len();
                self.map.replace(OverlaySlot::Modified, collection);
                self.bus
                    .emit_lossy(SessionUpdate::ModifiedLayerReady { feature_count });
            }
            DataApplied::ModifiedLayerMissing => {
                self.diagnostic("Backend could not export the modified road network");
            }
            DataApplied::BaselineMetrics
            | DataApplied::CitizenProfiles { .. }
            | DataApplied::Recommendations => {}
        }
    }

    async fn complete(&mut self) -> Option<RunOutcome> {
        let run_id = self.session.run_id()?.clone();
        if self.materializer.is_done(&run_id) {
            debug!(run_id = %run_id, "Duplicate complete ignored");
            return None;
        }

        let materialized = self.materializer.materialize(&run_id, &mut self.session).await;
        debug!(run_id = %run_id, outcome = ?materialized, "Result materialization finished");
        if let Some(MaterializeOutcome::Degraded(_)) = materialized {
            if let Some(message) = self.session.diagnostics().last().cloned() {
                self.bus.emit_lossy(SessionUpdate::Diagnostic { message });
            }
        }
        self.map.set_view_mode(self.session.view_mode());
        self.emit_view();
        Some(self.finish(RunOutcome::Completed))
    }

    fn finish(&mut self, outcome: RunOutcome) -> RunOutcome {
        info!(outcome = ?outcome, "Run finished");
        self.bus.emit_lossy(SessionUpdate::RunFinished {
            outcome: outcome.clone(),
            timestamp: Utc::now(),
        });
        outcome
    }

    /// Operator view toggle; restyles the baseline overlay
    pub fn set_view_mode(&mut self, view_mode: ViewMode) -> Option<JoinHandle<InstallOutcome>> {
        self.session.set_view_mode(view_mode);
        let restyle = self.map.set_view_mode(view_mode);
        self.emit_view();
        restyle
    }

    /// Install the city road network as the baseline overlay
    pub fn load_baseline(&mut self, collection: GeoFeatureCollection) -> JoinHandle<InstallOutcome> {
        info!(features = collection.len(), "Baseline road network loaded");
        self.session.set_baseline_layer(collection.clone());
        self.map.replace(OverlaySlot::Baseline, collection)
    }

    /// Record city-wide metrics fetched outside a run
    pub fn set_baseline_metrics(&mut self, metrics: BaselineMetrics) {
        self.session.set_baseline_metrics(metrics);
    }

    /// Close the stream and tear down the map surface
    pub fn shutdown(&mut self) {
        self.release_stream();
        self.session.mark_stopped();
        self.map.teardown();
        info!("Session controller shut down");
    }

    fn release_stream(&mut self) {
        if let Some(handle) = self.stream.take() {
            handle.close();
        }
        self.subscription = None;
    }

    fn diagnostic(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.session.push_diagnostic(message.clone());
        self.bus.emit_lossy(SessionUpdate::Diagnostic { message });
    }

    fn emit_view(&self) {
        self.bus.emit_lossy(SessionUpdate::ViewChanged {
            view_mode: self.session.view_mode(),
            result_panel: self.session.result_panel(),
        });
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.release_stream();
    }
}
