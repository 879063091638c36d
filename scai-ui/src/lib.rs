//! scai-ui library interface
//!
//! Session/event orchestration for the SimCity AI operator console. Exposes public
//! APIs for the `scai-ui` binary and for integration testing.

pub mod backend;
pub mod console;
pub mod controller;
pub mod error;
pub mod events;
pub mod map;
pub mod materializer;
pub mod session;
pub mod stages;
pub mod stream_client;

pub use crate::backend::{Backend, HttpBackend, RunId};
pub use crate::controller::{SessionController, StartOutcome};
pub use crate::error::{UiError, UiResult};
pub use crate::events::{RunOutcome, SessionBus, SessionUpdate};
pub use crate::session::{ResultPanel, Session, ViewMode};
pub use crate::stream_client::{StreamClient, StreamDelivery, StreamHandle, StreamSubscription};
