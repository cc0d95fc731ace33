//! # race-core
//!
//! Breakpoint-driven thread coordination for reproducing races in a live,
//! multi-threaded target.
//!
//! Two conditional breakpoints mark the code paths believed to race. Whichever
//! threads satisfy them are held; once both are held (and, optionally, once the
//! whole target has reached a safepoint) they are released in a chosen order,
//! turning a timing-dependent bug into a reproducible interleaving.
//!
//! ## Architecture
//!
//! ```text
//!   Condition ──> WatchPoint (primary, secondary)
//!                     │
//!                     v
//!            RendezvousCoordinator ──> SafepointGate
//!                     │
//!                     v
//!            DeferredResumeQueue ──> DebugControl::resume_thread
//! ```
//!
//! This crate holds the state machine and the collaborator traits. The
//! notification loop that feeds it lives in `race-session`.
//!
//! ## Usage
//!
//! ```ignore
//! use race_core::{Always, RaceConfig, RendezvousCoordinator};
//!
//! let config = RaceConfig::new("OnClassPrepare", "OnMonitorWait");
//! let mut coord = RendezvousCoordinator::new(&config, Box::new(Always), Box::new(Always));
//! coord.install(&mut debugger)?;
//! ```

pub mod condition;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod queue;
pub mod safepoint;
pub mod testing;
pub mod types;
pub mod watchpoint;

pub use condition::{Always, Condition, FlagMask, FnCondition, SymbolContains, from_fn};
pub use config::{DEFAULT_SAFEPOINT_LOCATION, RaceConfig, SafepointConfig, SafepointDrive};
pub use control::{Collaborators, ContextEvaluator, DebugControl, NoopDriver, Notification, SafepointDriver};
pub use coordinator::{HitOutcome, RendezvousCoordinator, RendezvousPhase};
pub use error::{RaceError, RaceResult};
pub use queue::DeferredResumeQueue;
pub use safepoint::{GateState, SafepointGate};
pub use types::{BreakpointHandle, Location, SignalKind, ThreadId};
pub use watchpoint::WatchPoint;
