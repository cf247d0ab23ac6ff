//! Registry of fieldbus stack factories.
//!
//! Constructed at startup and queried by name; there is no global state.

use super::simulation::SimulatedStack;
use crate::error::BridgeError;
use joybridge_common::fieldbus::FieldbusStack;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory producing a fresh stack instance.
pub type StackFactory = fn() -> Arc<dyn FieldbusStack>;

/// Registry of available fieldbus stacks.
pub struct StackRegistry {
    factories: HashMap<&'static str, StackFactory>,
}

impl StackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every stack shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("simulation", create_simulated_stack);
        registry
    }

    /// Register a stack factory.
    ///
    /// # Panics
    /// Panics if a stack with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: StackFactory) {
        if self.factories.contains_key(name) {
            panic!("Fieldbus stack '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a stack instance by name.
    ///
    /// # Errors
    /// Returns `BridgeError::UnknownStack` if no stack with the given name
    /// is registered.
    pub fn create(&self, name: &str) -> Result<Arc<dyn FieldbusStack>, BridgeError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| BridgeError::UnknownStack(name.to_string()))?;
        Ok(factory())
    }

    /// Registered stack names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for StackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn create_simulated_stack() -> Arc<dyn FieldbusStack> {
    Arc::new(SimulatedStack::new())
}
