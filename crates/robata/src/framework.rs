//! # Frameworks
//!
//! A [`Framework`] knows how to turn a saved artifact into a
//! [`RunnableFactory`]. Frameworks are registered explicitly in a
//! [`FrameworkRegistry`], which loads models from a [`ModelStore`] and
//! refuses to load a model with a framework other than the one it was saved
//! with.

use std::collections::BTreeMap;
use std::sync::Arc;
use bytes::Bytes;
use tracing::{debug, info};
use crate::config::RunnerConfig;
use crate::error::{Result, RobataError};
use crate::resource::Resource;
use crate::runnable::{MethodTable, Runnable, RunnableFactory};
use crate::runner::Runner;
use crate::store::{ModelInfo, ModelStore, Tag};

/// Loads and wraps models saved by one ML framework.
pub trait Framework: Send + Sync {
    /// Module name recorded with every model this framework saves.
    fn name(&self) -> &str;

    /// Builds the runnable factory for a loaded model.
    fn get_runnable(&self, model: &LoadedModel) -> Result<Arc<dyn RunnableFactory>>;
}

/// A model read from the store and bound to the framework that saved it.
#[derive(Clone)]
pub struct LoadedModel {
    info: ModelInfo,
    artifact: Bytes,
    options: BTreeMap<String, serde_json::Value>,
    framework: Arc<dyn Framework>,
}

impl LoadedModel {
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn tag(&self) -> &Tag {
        &self.info.tag
    }

    pub fn artifact(&self) -> &Bytes {
        &self.artifact
    }

    /// Framework-specific load options.
    pub fn options(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.options
    }

    /// Returns a copy of this model with `options` merged into its load options.
    pub fn with_options<K, I>(&self, options: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, serde_json::Value)>,
    {
        let mut model = self.clone();
        model
            .options
            .extend(options.into_iter().map(|(key, value)| (key.into(), value)));
        model
    }

    /// The framework's factory for this model, exposing the method
    /// signatures the model was saved with.
    pub fn runnable(&self) -> Result<Arc<dyn RunnableFactory>> {
        let factory = self.framework.get_runnable(self)?;
        if self.info.signatures.is_empty() {
            return Ok(factory);
        }
        let methods = self.info.method_table(factory.methods())?;
        debug!(tag = %self.info.tag, signatures = self.info.signatures.len(), "applied saved signatures");
        Ok(Arc::new(SavedSignatures { factory, methods }))
    }

    /// Builds an uninitialized runner for this model.
    pub fn to_runner(&self, config: RunnerConfig) -> Result<Runner> {
        Runner::new(self.runnable()?, config)
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("tag", &self.info.tag)
            .field("module", &self.info.module)
            .field("artifact_len", &self.artifact.len())
            .field("options", &self.options)
            .finish()
    }
}

/// A framework factory whose method table was overridden at load time.
struct SavedSignatures {
    factory: Arc<dyn RunnableFactory>,
    methods: MethodTable,
}

impl RunnableFactory for SavedSignatures {
    fn methods(&self) -> &MethodTable {
        &self.methods
    }

    fn create(&self, resource: &Resource) -> Result<Box<dyn Runnable>> {
        self.factory.create(resource)
    }
}

/// Explicit table of frameworks by module name.
#[derive(Default)]
pub struct FrameworkRegistry {
    frameworks: BTreeMap<String, Arc<dyn Framework>>,
}

impl FrameworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, framework: Arc<dyn Framework>) -> Result<()> {
        let name = framework.name().to_string();
        if self.frameworks.contains_key(&name) {
            return Err(RobataError::config(format!("framework `{name}` is already registered")));
        }
        debug!(framework = %name, "registered framework");
        self.frameworks.insert(name, framework);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Framework>> {
        self.frameworks
            .get(name)
            .cloned()
            .ok_or_else(|| RobataError::not_found(format!("framework `{name}` is not registered")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.frameworks.keys().map(String::as_str)
    }

    /// Loads `tag` from `store` through the framework `module`.
    ///
    /// Fails with [`RobataError::NotFound`] if the model is unknown or was
    /// saved with a different framework.
    pub fn load_model(&self, store: &ModelStore, tag: &Tag, module: &str) -> Result<LoadedModel> {
        let framework = self.get(module)?;
        let stored = store.get(tag)?;
        if stored.info.module != module {
            return Err(RobataError::not_found(format!(
                "Model {} was saved with module {}, not loading with {module}",
                stored.info.tag, stored.info.module
            )));
        }
        info!(tag = %stored.info.tag, module, "loaded model");
        Ok(LoadedModel {
            info: stored.info,
            artifact: stored.artifact,
            options: BTreeMap::new(),
            framework,
        })
    }

    /// Loads `tag` with whichever registered framework saved it.
    pub fn load(&self, store: &ModelStore, tag: &Tag) -> Result<LoadedModel> {
        let module = store.get(tag)?.info.module;
        self.load_model(store, tag, &module)
    }
}
