//! # race-session
//!
//! Runs a race reproduction against a live target: builds a [`Session`] from a
//! [`RaceConfig`](race_core::RaceConfig) and two conditions, then feeds it the
//! debug layer's notifications through an [`EventDispatcher`], usually via the
//! async [`Controller`] pump.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use race_core::{Always, RaceConfig, SymbolContains};
//! use race_session::{Backend, CommandSafepointDriver, Controller, Session, notification_channel};
//!
//! let config = RaceConfig::new("OnClassPrepare", "OnClassPrepare")
//!     .with_secondary_enabled(false)
//!     .with_safepoint(true);
//! let dyn_load = SymbolContains::new(1, "(char *)klass->_name->_body", "DynLoad");
//! let backend = Backend::new(debugger, evaluator, Arc::new(CommandSafepointDriver::jcmd_gc(pid)));
//!
//! let session = Session::initialize(config, dyn_load.clone(), dyn_load, backend)?;
//! let (tx, mut rx) = notification_channel();
//! // hand `tx` to the debug layer
//! let outcome = Controller::new(session).run(&mut rx).await;
//! ```

pub mod controller;
pub mod dispatcher;
pub mod driver;
pub mod probe;
pub mod session;

pub use controller::{Controller, NotificationReceiver, NotificationSender, notification_channel};
pub use dispatcher::{EventDispatcher, Flow, dispatch_and_flush};
pub use driver::{CommandSafepointDriver, RequestStatus};
pub use probe::{AuxiliaryProbe, ProbeAction};
pub use session::{AbortReason, Backend, ControllerState, RunOutcome, Session};
