//! Simulation runtime: declarative actors driven on one virtual clock.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`definition`] | [`ActorDef`], [`SendPattern`], [`Outcome`], [`Matcher`] |
//! | [`runner`] | [`Simulation`] builder and driver |
//! | [`result`] | [`RunMode`], [`RunSnapshot`], [`RunResult`] |
//! | [`recorder`] | [`Stats`], [`ActorStats`] |
//! | [`trace`] | [`Trace`], [`TraceEvent`], [`TraceKind`] |
//!
//! A simulated actor is an ordinary [`Actor`](crate::actor::Actor)
//! whose hooks are generated from its definition, so simulated and
//! hand-written actors share one mailbox model and one clock.

pub mod definition;
pub mod recorder;
pub mod result;
pub mod runner;
mod simulated;
pub mod trace;

pub use definition::{ActorDef, ActorDefinition, Handler, Matcher, Outcome, SendPattern};
pub(crate) use recorder::Recorder;
pub use recorder::{ActorStats, Stats};
pub use result::{RunMode, RunResult, RunSnapshot, TerminateWhen, TerminationReason};
pub use runner::{Simulation, DRIVER};
pub use trace::{Trace, TraceEvent, TraceKind};
