use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::Classifier;

/// Named classifier backends, resolved once when a pipeline is built.
///
/// Backend selection is a construction-time strategy: the chosen classifier is
/// moved out of the registry and into the pipeline.
pub struct ClassifierRegistry {
    backends: HashMap<String, Box<dyn Classifier>>,
    /// Registration order, used as preference order for fallback selection.
    order: Vec<String>,
    default_name: Option<String>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            order: Vec::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<C: Classifier + 'static>(&mut self, backend: C) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        if !self.order.contains(&name) {
            self.order.push(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("classifier '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// List registered backends in preference order.
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Remove and return a backend by name.
    pub fn take(&mut self, name: &str) -> Result<Box<dyn Classifier>> {
        let backend = self
            .backends
            .remove(name)
            .ok_or_else(|| anyhow!("classifier '{}' not registered", name))?;
        self.order.retain(|entry| entry != name);
        if self.default_name.as_deref() == Some(name) {
            self.default_name = self.order.first().cloned();
        }
        Ok(backend)
    }

    /// Remove and return the default backend.
    pub fn take_default(&mut self) -> Result<Box<dyn Classifier>> {
        let name = self
            .default_name
            .clone()
            .ok_or_else(|| anyhow!("no classifier registered"))?;
        self.take(&name)
    }

    /// Return the first backend, in registration order, whose warm-up succeeds.
    ///
    /// Backends that fail to warm up are dropped from the registry.
    pub fn take_first_available(&mut self) -> Result<Box<dyn Classifier>> {
        for name in self.order.clone() {
            let mut backend = self.take(&name)?;
            match backend.warm_up() {
                Ok(()) => {
                    log::info!("classifier '{}' selected", name);
                    return Ok(backend);
                }
                Err(e) => {
                    log::warn!("classifier '{}' unavailable: {:#}", name, e);
                }
            }
        }
        Err(anyhow!("no registered classifier is available"))
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::{ScriptedClassifier, SimulatedClassifier};

    #[test]
    fn first_registered_is_default() {
        let mut registry = ClassifierRegistry::new();
        registry.register(ScriptedClassifier::new());
        registry.register(SimulatedClassifier::new(0.5, 1));
        assert_eq!(registry.list(), vec!["scripted", "simulated"]);

        let backend = registry.take_default().unwrap();
        assert_eq!(backend.name(), "scripted");
        assert_eq!(registry.list(), vec!["simulated"]);
    }

    #[test]
    fn set_default_requires_registration() {
        let mut registry = ClassifierRegistry::new();
        registry.register(ScriptedClassifier::new());
        assert!(registry.set_default("tract").is_err());
        registry.register(SimulatedClassifier::new(0.5, 1));
        registry.set_default("simulated").unwrap();
        assert_eq!(registry.take_default().unwrap().name(), "simulated");
    }

    #[test]
    fn fallback_skips_backends_that_fail_warm_up() {
        let broken = ScriptedClassifier::new();
        broken.handle().fail_warm_up("model file missing");

        let mut registry = ClassifierRegistry::new();
        registry.register(broken);
        registry.register(SimulatedClassifier::new(0.1, 7));

        let backend = registry.take_first_available().unwrap();
        assert_eq!(backend.name(), "simulated");
        assert!(registry.list().is_empty());
    }

    #[test]
    fn fallback_errors_when_nothing_is_available() {
        let broken = ScriptedClassifier::new();
        broken.handle().fail_warm_up("no model");
        let mut registry = ClassifierRegistry::new();
        registry.register(broken);
        assert!(registry.take_first_available().is_err());
    }
}
