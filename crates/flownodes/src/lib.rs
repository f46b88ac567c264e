//! Standard node library
//!
//! Handlers for the four node types plus the built-in actions
//! (`http`, `delay`, `log`) that action nodes dispatch to.

mod action;
mod ai;
mod condition;
mod debug;
mod http;
mod time;
mod trigger;

pub use action::ActionHandler;
pub use ai::AiTaskHandler;
pub use condition::ConditionHandler;
pub use debug::LogAction;
pub use http::HttpAction;
pub use time::DelayAction;
pub use trigger::TriggerHandler;

use flowcore::ActionInvoker;
use flowruntime::HandlerRegistry;
use std::sync::Arc;

/// Register the standard handlers with a registry.
///
/// AI task nodes are only runnable when a model invoker is supplied.
pub fn register_all(registry: &mut HandlerRegistry, ai_invoker: Option<Arc<dyn ActionInvoker>>) {
    registry.register(Arc::new(TriggerHandler));
    registry.register(Arc::new(ConditionHandler));
    registry.register(Arc::new(ActionHandler::builtin()));
    if let Some(invoker) = ai_invoker {
        registry.register(Arc::new(AiTaskHandler::new(invoker)));
    }
}
