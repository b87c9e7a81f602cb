//! # Timewarp — Deterministic Virtual Time for Actor Systems
//!
//! A substrate for testing and prototyping message-passing actors.
//! Actors read the time and schedule delayed messages through a
//! pluggable time backend, so the same actor code runs against the wall
//! clock in production and against a virtual clock in tests, where
//! hours of behaviour take milliseconds.
//!
//! ## Determinism
//!
//! Runs are reproducible on a current-thread tokio runtime: events due
//! at the same time fire in scheduling order and the actors they wake
//! react in that order. A [`Simulation`] refuses to start on a
//! multi-thread runtime, where reactions within one timestamp race.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │          Simulation          │ ← named actors, run modes, stats, trace
//! │  ┌────────────────────────┐  │
//! │  │    Actor wrapper       │  │ ← lifecycle hooks, mailbox, timers
//! │  │  ┌──────────────────┐  │  │
//! │  │  │   TimeBackend    │  │  │ ← real or virtual
//! │  │  │  ┌────────────┐  │  │  │
//! │  │  │  │VirtualClock│  │  │  │ ← advance, barrier
//! │  │  │  │ EventQueue │  │  │  │ ← (due, seq) min-heap
//! │  │  │  └────────────┘  │  │  │
//! │  │  └──────────────────┘  │  │
//! │  └────────────────────────┘  │
//! └──────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use timewarp::{ActorDef, RunMode, SendPattern, Simulation};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), timewarp::SimError> {
//! let result = Simulation::new(false)
//!     .add_actor(
//!         ActorDef::new("heartbeat")
//!             .send_pattern(SendPattern::periodic(1_000, "beat"))
//!             .targets(["monitor"]),
//!     )?
//!     .add_actor(ActorDef::new("monitor"))?
//!     .run(RunMode::duration(3_600_000))
//!     .await?;
//!
//! assert_eq!(result.stats().received_count("monitor"), 3_600);
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod backend;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod message;
pub mod scheduler;
pub mod simulation;
pub mod time;

// Re-exports for convenience.
pub use actor::{
    spawn_actor, Actor, ActorId, ActorRef, ActorStatus, Context, ExitReason, Started, StopReason,
};
pub use backend::{BackendKind, RealBackend, TimeBackend, VirtualBackend};
pub use clock::VirtualClock;
pub use config::{FailurePolicy, SimulationConfig};
pub use context::{ActorOptions, FailureRecord, SimulationContext};
pub use error::{SimError, SimResult};
pub use event::{Recipient, TimerId};
pub use message::Message;
pub use scheduler::EventQueue;
pub use simulation::{
    ActorDef, ActorDefinition, Outcome, RunMode, RunResult, RunSnapshot, SendPattern, Simulation,
    Stats, TerminationReason, Trace, TraceEvent,
};
pub use time::VirtualTime;
