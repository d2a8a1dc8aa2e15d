use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::AgentError;
use crate::executor::shell::ShellExecutor;
use crate::executor::Executor;
use crate::proto::Method;
use crate::security::CommandValidator;

type Creator = Box<dyn Fn() -> Box<dyn Executor> + Send + Sync>;

/// Maps a method tag to a constructor for its executor.
///
/// Registration happens once at startup; afterwards every operation is a
/// read-only lookup, safe under concurrent callers.
#[derive(Default)]
pub struct ExecutorRegistry {
    creators: RwLock<HashMap<Method, Creator>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `method`.
    ///
    /// # Panics
    ///
    /// Registering the same method twice is a programming error and panics.
    pub fn register<F>(&self, method: Method, creator: F)
    where
        F: Fn() -> Box<dyn Executor> + Send + Sync + 'static,
    {
        let mut creators = self
            .creators
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if creators.contains_key(&method) {
            panic!(
                "executor method {} is already registered",
                method.as_str_name()
            );
        }
        creators.insert(method, Box::new(creator));
    }

    /// Construct a fresh executor for `method`.
    pub fn create(&self, method: Method) -> Result<Box<dyn Executor>, AgentError> {
        let creators = self.creators.read().unwrap_or_else(PoisonError::into_inner);
        creators
            .get(&method)
            .map(|creator| creator())
            .ok_or_else(|| AgentError::UnsupportedMethod(method.as_str_name().to_string()))
    }

    /// Registered method tags, in unspecified order.
    pub fn supported(&self) -> Vec<Method> {
        let creators = self.creators.read().unwrap_or_else(PoisonError::into_inner);
        creators.keys().copied().collect()
    }

    pub fn is_supported(&self, method: Method) -> bool {
        let creators = self.creators.read().unwrap_or_else(PoisonError::into_inner);
        creators.contains_key(&method)
    }
}

/// The registry used by the agent: every built-in executor, wired to the
/// process-wide validator.
pub fn default_registry(validator: Arc<CommandValidator>) -> ExecutorRegistry {
    let registry = ExecutorRegistry::new();
    registry.register(Method::Shell, move || {
        Box::new(ShellExecutor::new(validator.clone()))
    });
    registry
}
