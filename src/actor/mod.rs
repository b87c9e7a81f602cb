//! Actor wrapper: lifecycle hooks on top of a tokio task and mailbox,
//! with every time-dependent operation routed through a
//! [`TimeBackend`](crate::backend::TimeBackend).
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`ActorId`] newtype |
//! | [`traits`] | [`Actor`] trait, [`Started`], lifecycle enums |
//! | [`context`] | [`Context`] handed to every hook |
//! | [`handle`] | [`ActorRef`] |
//! | [`runtime`] | [`spawn_actor`] and the actor task |
//! | [`builtin`] | [`Echo`], [`Probe`] |

pub mod builtin;
pub mod context;
pub mod handle;
pub mod id;
pub mod runtime;
pub mod traits;

pub use builtin::{Echo, Probe, ProbeLog, Received};
pub use context::Context;
pub use handle::ActorRef;
pub use id::ActorId;
pub use runtime::spawn_actor;
pub use traits::{Actor, ActorStatus, ExitReason, Started, StopReason};
