//! Result materializer
//!
//! After `complete`, the stream only says "done"; the full result is fetched with a
//! separate request and reconciled into the session. A failed fetch degrades the
//! report to whatever was streamed, it never fails the run.

use crate::backend::{Backend, RunId};
use crate::session::Session;
use std::sync::Arc;
use tracing::{info, warn};

/// How the result fetch went
#[derive(Debug, Clone, PartialEq)]
pub enum MaterializeOutcome {
    /// Authoritative result applied
    Applied,
    /// Fetch failed or returned no result; streamed values kept
    Degraded(String),
}

pub struct ResultMaterializer {
    backend: Arc<dyn Backend>,
    last_run: Option<RunId>,
}

impl ResultMaterializer {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            last_run: None,
        }
    }

    /// Whether the result for `run_id` was already materialized
    pub fn is_done(&self, run_id: &RunId) -> bool {
        self.last_run.as_ref() == Some(run_id)
    }

    /// Fetch and apply the result of `run_id`
    ///
    /// Runs at most once per run id; later calls return None. Whatever the fetch
    /// outcome, the session ends not running, in the `After` view, on the report panel.
    pub async fn materialize(
        &mut self,
        run_id: &RunId,
        session: &mut Session,
    ) -> Option<MaterializeOutcome> {
        if self.is_done(run_id) {
            return None;
        }
        self.last_run = Some(run_id.clone());

        let outcome = match self.backend.fetch_run_result(run_id).await {
            Ok(response) => match response.result {
                Some(result) => {
                    session.apply_run_result(result);
                    info!(run_id = %run_id, "Run result materialized");
                    MaterializeOutcome::Applied
                }
                None => {
                    let reason = "result payload missing from response".to_string();
                    warn!(run_id = %run_id, "{}", reason);
                    MaterializeOutcome::Degraded(reason)
                }
            },
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Run result fetch failed, keeping streamed values");
                MaterializeOutcome::Degraded(e.to_string())
            }
        };

        if let MaterializeOutcome::Degraded(reason) = &outcome {
            session.push_diagnostic(format!("Full result unavailable: {}", reason));
        }
        session.finish_with_report();
        Some(outcome)
    }
}
