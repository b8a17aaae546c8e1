//! # Runnables
//!
//! A [`Runnable`] is the minimal callable wrapper around one loaded model: a set
//! of named methods, each described by a [`MethodSignature`]. Runnables are
//! created by a [`RunnableFactory`] for a given [`Resource`] and bound to it in
//! a [`BoundRunnable`], which is what runners and worker endpoints call into.

use std::collections::BTreeMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::constant::DEFAULT_BATCH_AXIS;
use crate::error::{Result, RobataError};
use crate::params::{ArgKey, ParameterSet};
use crate::payload::Value;
use crate::resource::Resource;

/// Batch axes of a method's inputs and of its output.
///
/// Serialized as an `[input, output]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct BatchDim {
    pub input: usize,
    pub output: usize,
}

impl BatchDim {
    pub fn new(input: usize, output: usize) -> Self {
        Self { input, output }
    }
}

impl Default for BatchDim {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_AXIS, DEFAULT_BATCH_AXIS)
    }
}

impl From<(usize, usize)> for BatchDim {
    fn from((input, output): (usize, usize)) -> Self {
        Self::new(input, output)
    }
}

impl From<BatchDim> for (usize, usize) {
    fn from(dim: BatchDim) -> Self {
        (dim.input, dim.output)
    }
}

/// Describes one method of a runnable. Immutable once the runnable exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    #[serde(default)]
    pub batchable: bool,
    #[serde(default)]
    pub batch_dim: BatchDim,
    /// Arguments passed through once per group instead of being merged
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unbatched_args: Vec<ArgKey>,
    /// Least resource a runner must hold to call this method
    #[serde(default)]
    pub min_resource: Resource,
}

impl MethodSignature {
    /// A non-batchable method with no resource requirement
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batchable: false,
            batch_dim: BatchDim::default(),
            unbatched_args: vec![],
            min_resource: Resource::default(),
        }
    }

    /// Marks the method batchable along `batch_dim`.
    pub fn batchable(mut self, batch_dim: impl Into<BatchDim>) -> Self {
        self.batchable = true;
        self.batch_dim = batch_dim.into();
        self
    }

    /// Declares an argument that must be identical across a batch group.
    pub fn with_unbatched_arg(mut self, key: impl Into<ArgKey>) -> Self {
        self.unbatched_args.push(key.into());
        self
    }

    pub fn requires(mut self, resource: Resource) -> Self {
        self.min_resource = resource;
        self
    }

    /// Batch axis for one input argument, `None` if the argument is passed through.
    pub fn input_axis(&self, key: &ArgKey) -> Option<usize> {
        (!self.unbatched_args.contains(key)).then_some(self.batch_dim.input)
    }
}

/// Method signatures keyed by method name.
pub type MethodTable = BTreeMap<String, MethodSignature>;

/// Collects signatures into a [`MethodTable`].
pub fn method_table(signatures: impl IntoIterator<Item = MethodSignature>) -> MethodTable {
    signatures
        .into_iter()
        .map(|signature| (signature.name.clone(), signature))
        .collect()
}

/// Defines a model that can execute named methods on a set of arguments.
///
/// # Implementation Notes
///
/// Implementations should:
/// * Treat the batch axis declared in the method's signature as the batch dimension,
///   for inputs and outputs alike
/// * Preserve the batch structure in outputs: the output of a batchable method
///   must hold exactly as many items along its output axis as the input did
/// * Be thread-safe; different methods of one runnable may run concurrently
///
/// # Example
///
/// ```ignore
/// use robata::{Runnable, ParameterSet, Value, Result};
/// use async_trait::async_trait;
///
/// struct Doubler;
///
/// #[async_trait]
/// impl Runnable for Doubler {
///     async fn forward(&self, method: &str, params: ParameterSet<Value>) -> Result<Value> {
///         let input = params.args()[0].as_array().unwrap();
///         let doubled = input.as_slice::<f32>().unwrap().iter().map(|v| v * 2.0).collect();
///         Ok(NdArray::from_vec(input.shape().to_vec(), doubled)?.into())
///     }
/// }
/// ```
#[async_trait]
pub trait Runnable: Send + Sync {
    /// Executes `method` once on `params`.
    ///
    /// The method name has already been validated against the method table.
    async fn forward(&self, method: &str, params: ParameterSet<Value>) -> Result<Value>;
}

/// Produces runnables for one model.
pub trait RunnableFactory: Send + Sync {
    /// Methods every runnable produced by this factory exposes.
    fn methods(&self) -> &MethodTable;

    /// Instantiates a runnable that may use `resource`.
    fn create(&self, resource: &Resource) -> Result<Box<dyn Runnable>>;
}

/// # BoundRunnable
///
/// A runnable bound to the resource it was created for. Calls are checked
/// against the method table and the bound resource before reaching the model.
pub struct BoundRunnable {
    runnable: Box<dyn Runnable>,
    methods: MethodTable,
    resource: Resource,
}

impl BoundRunnable {
    /// Creates a runnable from `factory` and binds it to `resource`.
    pub fn bind(factory: &dyn RunnableFactory, resource: Resource) -> Result<Self> {
        resource.validate()?;
        let runnable = factory.create(&resource)?;
        Ok(Self {
            runnable,
            methods: factory.methods().clone(),
            resource,
        })
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn signature(&self, method: &str) -> Result<&MethodSignature> {
        self.methods
            .get(method)
            .ok_or_else(|| RobataError::MethodNotFound(method.to_string()))
    }

    /// Runs `method` once: a single call is a single model execution.
    pub async fn invoke(&self, method: &str, params: ParameterSet<Value>) -> Result<Value> {
        let signature = self.signature(method)?;
        self.resource
            .ensure_satisfies(&signature.min_resource, &format!("method `{method}`"))?;
        self.runnable.forward(method, params).await
    }
}
