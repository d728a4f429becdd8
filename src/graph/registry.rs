use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::config::{factory_arg, factory_name};
use crate::graph::elements::builtin_factories;
use crate::graph::source::{SourceFactory, UriSourceFactory};
use crate::graph::stage::StageFactory;

/// Named stage and source factories known to an engine.
///
/// Registration takes `&self`, so an engine can be extended after it was shared.
#[derive(Default)]
pub struct StageRegistry {
    stages: RwLock<BTreeMap<String, Arc<dyn StageFactory>>>,
    sources: RwLock<BTreeMap<String, Arc<dyn SourceFactory>>>,
}

impl StageRegistry {
    /// Registry without any factory.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in catalogue.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        for factory in builtin_factories() {
            registry.register(factory);
        }
        registry.register_source(Arc::new(UriSourceFactory));
        registry
    }

    /// Add a stage factory, replacing one with the same name.
    pub fn register(&self, factory: Arc<dyn StageFactory>) {
        let name = factory.name().to_owned();
        self.stages
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, factory);
    }

    /// Remove a stage factory (simulates a plugin disappearing).
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn StageFactory>> {
        self.stages
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }

    /// Add a source factory, replacing one with the same name.
    pub fn register_source(&self, factory: Arc<dyn SourceFactory>) {
        let name = factory.name().to_owned();
        self.sources
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, factory);
    }

    /// Stage factory of a chain entry plus the entry's `@argument`.
    pub fn resolve<'e>(&self, entry: &'e str) -> Option<(Arc<dyn StageFactory>, Option<&'e str>)> {
        let factory = self
            .stages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(factory_name(entry))
            .cloned()?;
        Some((factory, factory_arg(entry)))
    }

    /// Source factory called `name`.
    pub fn source(&self, name: &str) -> Option<Arc<dyn SourceFactory>> {
        self.sources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Names of every registered stage factory.
    pub fn stage_names(&self) -> Vec<String> {
        self.stages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}
