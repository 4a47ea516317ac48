//! Method Registry
//!
//! Maps a method name to the handler that executes it. Handlers are plain
//! synchronous functions over validated [`Params`]; each one does its own
//! type-checked extraction and reports a [`MethodError`] instead of
//! panicking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dgramrpc_common::{ParamError, Params, Value};
use thiserror::Error;

/// Domain failure reported by a handler.
///
/// The dispatcher does not distinguish between variants: any error becomes
/// an ERROR response carrying the error's message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MethodError {
    #[error(transparent)]
    Param(#[from] ParamError),

    #[error("division by zero")]
    DivisionByZero,

    #[error("{0}")]
    Failed(String),
}

/// A registered method implementation.
pub type Handler = Arc<dyn Fn(&Params) -> Result<Value, MethodError> + Send + Sync>;

/// Name → handler table consulted by the dispatcher.
///
/// # Example
///
/// ```
/// use dgramrpc_server::MethodRegistry;
/// use dgramrpc_common::Params;
/// use serde_json::json;
///
/// let mut registry = MethodRegistry::new();
/// registry.register("ping", |_params: &Params| Ok(json!("pong")));
///
/// let handler = registry.lookup("ping").unwrap();
/// assert_eq!(handler(&Params::new()).unwrap(), json!("pong"));
/// assert!(registry.lookup("pong").is_none());
/// ```
#[derive(Clone, Default)]
pub struct MethodRegistry {
    handlers: HashMap<String, Handler>,
}

impl MethodRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the builtin catalog: `add`, `subtract`,
    /// `multiply`, `divide`, `get_time`, `reverse_string` and `echo`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::methods::register_builtins(&mut registry);
        registry
    }

    /// Registers (or replaces) a handler under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&Params) -> Result<Value, MethodError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_registry() {
        let registry = MethodRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.lookup("add").is_none());
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = MethodRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["add", "divide", "echo", "get_time", "multiply", "reverse_string", "subtract"]
        );
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = MethodRegistry::new();
        registry
            .register("m", |_: &Params| Ok(json!(1)))
            .register("m", |_: &Params| Ok(json!(2)));

        assert_eq!(registry.len(), 1);
        assert_eq!((registry.lookup("m").unwrap())(&Params::new()).unwrap(), json!(2));
    }

    #[test]
    fn test_param_error_message_passes_through() {
        let err: MethodError = ParamError::Missing("s".to_string()).into();
        assert_eq!(err.to_string(), "missing parameter 's'");
    }
}
