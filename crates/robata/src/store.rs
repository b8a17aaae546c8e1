//! # Model store
//!
//! An in-memory catalogue of saved models. Each save of a name produces a
//! new version; a tag without a version, or with the version `latest`,
//! resolves to the most recent save of that name.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use crate::error::{Result, RobataError};
use crate::runnable::{BatchDim, MethodSignature, MethodTable};

const LATEST: &str = "latest";

/// `name[:version]` identifier of a saved model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag {
    name: String,
    version: Option<String>,
}

impl Tag {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let tag = Self { name: name.into(), version: Some(version.into()) };
        tag.validate()?;
        Ok(tag.normalized())
    }

    /// A tag naming the latest version of `name`.
    pub fn latest(name: impl Into<String>) -> Result<Self> {
        let tag = Self { name: name.into(), version: None };
        tag.validate()?;
        Ok(tag)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` when the tag stands for the latest version
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn normalized(mut self) -> Self {
        if self.version.as_deref() == Some(LATEST) {
            self.version = None;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(&self.name) || !self.version.as_deref().is_none_or(valid) {
            return Err(RobataError::config(format!(
                "invalid tag `{self}`: use letters, digits, '-', '_' or '.'"
            )));
        }
        Ok(())
    }
}

impl FromStr for Tag {
    type Err = RobataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((name, version)) => Tag::new(name, version),
            None => Tag::latest(s),
        }
    }
}

impl TryFrom<String> for Tag {
    type Error = RobataError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{version}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// How a saved model's method may be called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSignature {
    #[serde(default)]
    pub batchable: bool,
    #[serde(default)]
    pub batch_dim: BatchDim,
}

impl ModelSignature {
    pub fn batchable(batch_dim: impl Into<BatchDim>) -> Self {
        Self { batchable: true, batch_dim: batch_dim.into() }
    }

    /// `method` with its batching replaced by the saved one. Pass-through
    /// arguments and resource requirements are kept.
    pub fn apply_to(&self, method: MethodSignature) -> MethodSignature {
        MethodSignature {
            batchable: self.batchable,
            batch_dim: self.batch_dim,
            ..method
        }
    }
}

/// Everything recorded about one saved model besides its artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub tag: Tag,
    /// Framework module the model was saved with
    pub module: String,
    #[serde(default)]
    pub signatures: BTreeMap<String, ModelSignature>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub custom_objects: BTreeMap<String, serde_json::Value>,
}

impl ModelInfo {
    /// Info for a model saved under `tag` by the framework `module`.
    pub fn new(tag: Tag, module: impl Into<String>) -> Self {
        Self {
            tag,
            module: module.into(),
            signatures: BTreeMap::new(),
            labels: BTreeMap::new(),
            metadata: BTreeMap::new(),
            custom_objects: BTreeMap::new(),
        }
    }

    pub fn with_signature(mut self, method: impl Into<String>, signature: ModelSignature) -> Self {
        self.signatures.insert(method.into(), signature);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_custom_object(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom_objects.insert(key.into(), value);
        self
    }

    /// `provided` with the signatures declared at save time applied over it.
    ///
    /// Every saved signature must name a method in `provided`.
    pub fn method_table(&self, provided: &MethodTable) -> Result<MethodTable> {
        let mut methods = provided.clone();
        for (name, signature) in &self.signatures {
            let method = methods.remove(name).ok_or_else(|| {
                RobataError::config(format!(
                    "model {} has a signature for `{name}`, which its runnable does not provide",
                    self.tag
                ))
            })?;
            methods.insert(name.clone(), signature.apply_to(method));
        }
        Ok(methods)
    }
}

/// A saved model: its info and its serialized artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredModel {
    pub info: ModelInfo,
    pub artifact: Bytes,
}

/// # ModelStore
///
/// Thread-safe in-memory model catalogue. Versions of one name are kept in
/// save order.
#[derive(Default)]
pub struct ModelStore {
    models: RwLock<BTreeMap<String, Vec<StoredModel>>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves a model and returns its fully versioned tag.
    ///
    /// A tag without a version gets a freshly generated one. Saving over an
    /// existing version fails with [`RobataError::Config`].
    pub fn save(&self, mut info: ModelInfo, artifact: Bytes) -> Result<Tag> {
        if info.tag.version.is_none() {
            info.tag.version = Some(Uuid::new_v4().simple().to_string()[..16].to_string());
        }
        let tag = info.tag.clone();

        let mut models = self.models.write();
        let versions = models.entry(tag.name.clone()).or_default();
        if versions.iter().any(|stored| stored.info.tag == tag) {
            return Err(RobataError::config(format!("model `{tag}` already exists")));
        }
        versions.push(StoredModel { info, artifact });
        info!(tag = %tag, "saved model");
        Ok(tag)
    }

    /// Looks up a model; a tag without a version resolves to the latest save.
    pub fn get(&self, tag: &Tag) -> Result<StoredModel> {
        let models = self.models.read();
        let versions = models.get(&tag.name);
        let found = match &tag.version {
            None => versions.and_then(|versions| versions.last()),
            Some(_) => versions.and_then(|versions| versions.iter().find(|stored| stored.info.tag == *tag)),
        };
        found
            .cloned()
            .ok_or_else(|| RobataError::not_found(format!("model `{tag}` is not in the store")))
    }

    /// Info of every saved model, optionally restricted to one name.
    pub fn list(&self, name: Option<&str>) -> Vec<ModelInfo> {
        self.models
            .read()
            .iter()
            .filter(|(stored_name, _)| name.is_none_or(|name| name == stored_name.as_str()))
            .flat_map(|(_, versions)| versions.iter().map(|stored| stored.info.clone()))
            .collect()
    }

    /// Removes one version, or the latest one for an unversioned tag.
    pub fn delete(&self, tag: &Tag) -> Result<()> {
        let resolved = self.get(tag)?.info.tag;
        let mut models = self.models.write();
        if let Some(versions) = models.get_mut(&resolved.name) {
            versions.retain(|stored| stored.info.tag != resolved);
            if versions.is_empty() {
                models.remove(&resolved.name);
            }
        }
        info!(tag = %resolved, "deleted model");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::runnable::method_table;

    fn save(store: &ModelStore, tag: &str) -> Tag {
        let info = ModelInfo::new(tag.parse().unwrap(), "robata.testing.scale");
        store.save(info, Bytes::from_static(b"weights")).unwrap()
    }

    #[test]
    fn test_tag_parsing() {
        let tag: Tag = "classifier:v1".parse().unwrap();
        assert_eq!((tag.name(), tag.version()), ("classifier", Some("v1")));
        assert_eq!(tag.to_string(), "classifier:v1");

        assert_eq!("classifier".parse::<Tag>().unwrap().version(), None);
        assert_eq!("classifier:latest".parse::<Tag>().unwrap(), Tag::latest("classifier").unwrap());

        for bad in ["", ":v1", "clf:", "clf:v1:v2", "bad name"] {
            assert!(matches!(bad.parse::<Tag>(), Err(RobataError::Config(_))), "{bad}");
        }
    }

    #[test]
    fn test_signature_from_saved_json() {
        let signature: ModelSignature = serde_json::from_value(json!({"batchable": true, "batch_dim": [1, 0]})).unwrap();
        assert_eq!(signature, ModelSignature::batchable((1, 0)));

        let provided = method_table([
            MethodSignature::new("predict").batchable((0, 0)).with_unbatched_arg("mask"),
            MethodSignature::new("describe").batchable((0, 0)),
            MethodSignature::new("explain"),
        ]);
        let info = ModelInfo::new(Tag::latest("clf").unwrap(), "m")
            .with_signature("predict", signature)
            .with_signature("describe", ModelSignature::default());
        let table = info.method_table(&provided).unwrap();
        assert!(table["predict"].batchable);
        assert_eq!(table["predict"].batch_dim, BatchDim::new(1, 0));
        assert_eq!(table["predict"].unbatched_args, provided["predict"].unbatched_args);
        assert!(!table["describe"].batchable);
        assert_eq!(table["explain"], provided["explain"]);

        let unknown = info.with_signature("train", ModelSignature::default());
        assert!(matches!(unknown.method_table(&provided), Err(RobataError::Config(_))));
    }

    #[test]
    fn test_save_assigns_versions_and_latest_resolves() {
        let store = ModelStore::new();
        let first = save(&store, "clf");
        let second = save(&store, "clf");
        assert_ne!(first, second);
        assert!(first.version().is_some());

        assert_eq!(store.get(&Tag::latest("clf").unwrap()).unwrap().info.tag, second);
        assert_eq!(store.get(&first).unwrap().artifact, Bytes::from_static(b"weights"));
        assert_eq!(store.list(Some("clf")).len(), 2);
        assert!(store.list(Some("other")).is_empty());
    }

    #[test]
    fn test_duplicate_version_and_unknown_tag() {
        let store = ModelStore::new();
        save(&store, "clf:v1");
        let info = ModelInfo::new("clf:v1".parse().unwrap(), "m");
        assert!(matches!(store.save(info, Bytes::new()), Err(RobataError::Config(_))));
        assert!(store.get(&"clf:v2".parse().unwrap()).unwrap_err().is_not_found());
        assert!(store.get(&"other".parse().unwrap()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete() {
        let store = ModelStore::new();
        let v1 = save(&store, "clf:v1");
        save(&store, "clf:v2");

        store.delete(&Tag::latest("clf").unwrap()).unwrap();
        assert_eq!(store.get(&Tag::latest("clf").unwrap()).unwrap().info.tag, v1);

        store.delete(&v1).unwrap();
        assert!(store.list(None).is_empty());
        assert!(store.delete(&v1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_info_serializes_tag_as_string() {
        let info = ModelInfo::new("clf:v1".parse().unwrap(), "m").with_label("team", "search");
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["tag"], json!("clf:v1"));
        assert_eq!(serde_json::from_value::<ModelInfo>(value).unwrap(), info);
    }
}
