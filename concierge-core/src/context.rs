//! Thread-local structured logging context: a stack of key/value layers
//! merged bottom-to-top, scoped via an RAII guard.

use serde_json::{Map, Value};
use std::cell::RefCell;

thread_local! {
    static CONTEXT: RefCell<Vec<Map<String, Value>>> = RefCell::new(vec![Map::new()]);
}

pub fn current_context() -> Map<String, Value> {
    CONTEXT.with(|stack| {
        let stack = stack.borrow();
        let mut merged = Map::new();
        for layer in stack.iter() {
            for (key, value) in layer {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    })
}

pub fn push_context(context: Map<String, Value>) {
    CONTEXT.with(|stack| stack.borrow_mut().push(context));
}

pub fn pop_context() {
    CONTEXT.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.len() > 1 {
            stack.pop();
        }
    });
}

pub fn add_to_current_context<K, V>(key: K, value: V)
where
    K: Into<String>,
    V: Into<Value>,
{
    CONTEXT.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(top) = stack.last_mut() {
            top.insert(key.into(), value.into());
        }
    });
}

pub struct ContextGuard;

impl Drop for ContextGuard {
    fn drop(&mut self) {
        pop_context();
    }
}

pub fn scoped_context(context: Map<String, Value>) -> ContextGuard {
    push_context(context);
    ContextGuard
}

/// Push a scoped context layer, popped automatically when the returned
/// guard drops.
#[macro_export]
macro_rules! scoped_context {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut context = serde_json::Map::new();
        $(
            context.insert($key.to_string(), serde_json::Value::from($value));
        )*
        $crate::context::scoped_context(context)
    }};
}

/// Add key/value pairs to the current context layer.
#[macro_export]
macro_rules! log_context {
    ($($key:expr => $value:expr),* $(,)?) => {{
        $(
            $crate::context::add_to_current_context($key, $value);
        )*
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clear() {
        CONTEXT.with(|stack| {
            stack.borrow_mut().clear();
            stack.borrow_mut().push(Map::new());
        });
    }

    #[test]
    fn scoped_context_pops_on_drop() {
        clear();
        {
            let _guard = scoped_context! { "operation" => "prepare" };
            assert_eq!(current_context().get("operation"), Some(&json!("prepare")));
        }
        assert!(current_context().get("operation").is_none());
    }

    #[test]
    fn nested_context_overrides_and_reverts() {
        clear();
        let _outer = scoped_context! { "request_id" => "r1", "action" => "prepare" };
        {
            let _inner = scoped_context! { "provider" => "local-container", "action" => "bootstrap" };
            let ctx = current_context();
            assert_eq!(ctx.get("request_id"), Some(&json!("r1")));
            assert_eq!(ctx.get("action"), Some(&json!("bootstrap")));
        }
        let ctx = current_context();
        assert_eq!(ctx.get("action"), Some(&json!("prepare")));
        assert!(ctx.get("provider").is_none());
    }
}
