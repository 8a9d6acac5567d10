//! Process entry point that wires the kernel crates into a running system
//! (§1A/§4.1): loads `Config`, builds the `EventBus` / `AgentPool` /
//! `Coordinator`, loads a project plan, and drives the wave pump to
//! completion or a pause/stop signal.

pub mod daemon;

pub use daemon::{Daemon, DaemonError};
