// crates/flowcore/src/events/mod.rs

mod base;
mod hooks;

pub use base::{EventBus, ExecutionEvent};
pub use hooks::{ExecutionHooks, NoopHooks};
