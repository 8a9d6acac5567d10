//! In-process typed publish/subscribe event bus (§4.11).
//!
//! Every other crate depends on this for coordinator/agent/task/checkpoint
//! notifications; it carries no transport of its own.

pub mod event_bus;
