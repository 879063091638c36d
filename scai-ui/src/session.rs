//! Session model
//!
//! The single live analysis session: stage checklist, partial and final results, and
//! the view state the presentation layer renders. Fields are read through getters;
//! only the controller and materializer mutate a session.

use crate::backend::RunId;
use crate::stages::{reduce, StageList};
use scai_common::api::{BaselineMetrics, RunResult};
use scai_common::events::DataPayload;
use scai_common::impact::CitizenProfile;
use scai_common::{GeoFeatureCollection, ImpactScoreSet, StreamEvent};
use serde::Serialize;
use std::fmt;

/// Which network state the map emphasises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Before,
    After,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViewMode::Before => "before",
            ViewMode::After => "after",
        })
    }
}

/// Which results panel is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultPanel {
    #[default]
    Pipeline,
    Report,
}

/// What a `data` event changed
#[derive(Debug, Clone, PartialEq)]
pub enum DataApplied {
    BaselineMetrics,
    ImpactScores { metric_count: usize },
    CitizenProfiles { count: usize },
    /// Modified network available; the controller hands it to the map
    ModifiedLayer(GeoFeatureCollection),
    /// Backend could not export the modified network
    ModifiedLayerMissing,
    Recommendations,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    run_id: Option<RunId>,
    policy_text: String,
    stages: StageList,
    is_running: bool,
    impact_scores: Option<ImpactScoreSet>,
    recommendation_text: Option<String>,
    streamed_recommendation: Option<String>,
    baseline_metrics: Option<BaselineMetrics>,
    citizen_profiles: Vec<CitizenProfile>,
    baseline_layer: Option<GeoFeatureCollection>,
    modified_layer: Option<GeoFeatureCollection>,
    view_mode: ViewMode,
    result_panel: ResultPanel,
    diagnostics: Vec<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    pub fn policy_text(&self) -> &str {
        &self.policy_text
    }

    pub fn stages(&self) -> &StageList {
        &self.stages
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn impact_scores(&self) -> Option<&ImpactScoreSet> {
        self.impact_scores.as_ref()
    }

    pub fn recommendation_text(&self) -> Option<&str> {
        self.recommendation_text.as_deref()
    }

    pub fn baseline_metrics(&self) -> Option<&BaselineMetrics> {
        self.baseline_metrics.as_ref()
    }

    pub fn citizen_profiles(&self) -> &[CitizenProfile] {
        &self.citizen_profiles
    }

    pub fn baseline_layer(&self) -> Option<&GeoFeatureCollection> {
        self.baseline_layer.as_ref()
    }

    pub fn modified_layer(&self) -> Option<&GeoFeatureCollection> {
        self.modified_layer.as_ref()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn result_panel(&self) -> ResultPanel {
        self.result_panel
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Reset for a new run and lock it as running
    ///
    /// The baseline network survives; it belongs to the city, not the run.
    pub(crate) fn reset_for_run(&mut self, policy_text: &str) {
        let baseline_layer = self.baseline_layer.take();
        *self = Session {
            policy_text: policy_text.to_string(),
            stages: StageList::for_new_run(),
            is_running: true,
            baseline_layer,
            ..Session::default()
        };
    }

    pub(crate) fn set_run_id(&mut self, run_id: RunId) {
        self.run_id = Some(run_id);
    }

    pub(crate) fn set_baseline_layer(&mut self, collection: GeoFeatureCollection) {
        self.baseline_layer = Some(collection);
    }

    pub(crate) fn set_baseline_metrics(&mut self, metrics: BaselineMetrics) {
        self.baseline_metrics = Some(metrics);
    }

    pub(crate) fn set_view_mode(&mut self, view_mode: ViewMode) {
        self.view_mode = view_mode;
    }

    pub(crate) fn push_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics.push(message.into());
    }

    /// Unlock after a failure; partial results stay
    pub(crate) fn mark_stopped(&mut self) {
        self.is_running = false;
    }

    /// Run the stage reducer; returns the stage list before the event
    pub(crate) fn apply_stage_event(&mut self, event: &StreamEvent) -> StageList {
        let next = reduce(&self.stages, event);
        std::mem::replace(&mut self.stages, next)
    }

    /// Merge a decoded `data` payload into the session
    pub(crate) fn apply_data(&mut self, payload: DataPayload) -> DataApplied {
        match payload {
            DataPayload::BaselineMetrics(metrics) => {
                self.baseline_metrics = Some(metrics);
                DataApplied::BaselineMetrics
            }
            DataPayload::ImpactScores(scores) => {
                let merged = self.impact_scores.get_or_insert_with(ImpactScoreSet::default);
                merged.merge(scores);
                DataApplied::ImpactScores {
                    metric_count: merged.metrics.len(),
                }
            }
            DataPayload::CitizenProfiles(profiles) => {
                let count = profiles.len();
                self.citizen_profiles = profiles;
                DataApplied::CitizenProfiles { count }
            }
            DataPayload::ModifiedNetwork(Some(collection)) => {
                self.modified_layer = Some(collection.clone());
                DataApplied::ModifiedLayer(collection)
            }
            DataPayload::ModifiedNetwork(None) => DataApplied::ModifiedLayerMissing,
            DataPayload::Recommendations(text) => {
                self.streamed_recommendation = Some(text);
                DataApplied::Recommendations
            }
        }
    }

    /// Overwrite results with the authoritative payload
    ///
    /// Fields missing from the payload keep their current values.
    pub(crate) fn apply_run_result(&mut self, result: RunResult) {
        if let Some(scores) = result.impact_scores {
            self.impact_scores = Some(scores);
        }
        if let Some(text) = result.recommendations {
            self.recommendation_text = Some(text);
        }
        if let Some(metrics) = result.baseline_metrics {
            self.baseline_metrics = Some(metrics);
        }
        if let Some(profiles) = result.citizen_profiles {
            self.citizen_profiles = profiles;
        }
    }

    /// Final transition after `complete`, whatever the result fetch did
    pub(crate) fn finish_with_report(&mut self) {
        if self.recommendation_text.is_none() {
            self.recommendation_text = self.streamed_recommendation.take();
        }
        self.is_running = false;
        self.view_mode = ViewMode::After;
        self.result_panel = ResultPanel::Report;
    }
}
