//! Built-in actors — `Echo` and `Probe`.
//!
//! Small reference actors used in tests and as starting points for
//! hand-written process actors.

pub mod echo;
pub mod probe;

pub use echo::Echo;
pub use probe::{Probe, ProbeLog, Received};
