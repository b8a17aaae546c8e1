//! Test doubles shared by the in-crate test modules.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::Semaphore;
use crate::error::{Result, RobataError};
use crate::framework::{Framework, LoadedModel};
use crate::params::{ArgKey, ParameterSet};
use crate::payload::{NdArray, Scalar, Table, Value};
use crate::resource::Resource;
use crate::runnable::{method_table, MethodSignature, MethodTable, Runnable, RunnableFactory};

#[derive(Default)]
struct Stats {
    executions: AtomicUsize,
    rows: AtomicUsize,
}

/// Factory for [`ScaleModel`], counting what its models execute.
///
/// Methods:
/// * `predict` - batchable on `(0, 0)`, multiplies f64 arrays or table columns
///   by the factor and adds the unbatched `offset` keyword, if given
/// * `predict_gpu` - like `predict` but needs one accelerator
/// * `column_sums` - batchable on `(1, 0)`, sums each column of a
///   `[features, n]` array into an `[n]` array
/// * `describe` - not batchable, returns an object
/// * `explode` - batchable, always fails
/// * `held` - `predict` that starts executing, then waits for [`ScaleFactory::release`]
pub(crate) struct ScaleFactory {
    factor: f64,
    methods: MethodTable,
    stats: Arc<Stats>,
    gate: Arc<Semaphore>,
}

impl ScaleFactory {
    pub fn new(factor: f64) -> Self {
        let gpu = Resource { cpu: 0.0, accelerator_count: 1.0 };
        Self {
            factor,
            methods: method_table([
                MethodSignature::new("predict").batchable((0, 0)).with_unbatched_arg("offset"),
                MethodSignature::new("predict_gpu").batchable((0, 0)).requires(gpu),
                MethodSignature::new("column_sums").batchable((1, 0)),
                MethodSignature::new("describe"),
                MethodSignature::new("explode").batchable((0, 0)),
                MethodSignature::new("held").batchable((0, 0)),
            ]),
            stats: Arc::new(Stats::default()),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// Lets `executions` held calls finish.
    pub fn release(&self, executions: usize) {
        self.gate.add_permits(executions);
    }

    pub fn signature(&self, method: &str) -> MethodSignature {
        self.methods[method].clone()
    }

    /// Model executions across every runnable created by this factory.
    pub fn executions(&self) -> usize {
        self.stats.executions.load(Ordering::SeqCst)
    }

    /// Rows (items along the batch axis) the models have processed.
    pub fn rows_seen(&self) -> usize {
        self.stats.rows.load(Ordering::SeqCst)
    }
}

impl RunnableFactory for ScaleFactory {
    fn methods(&self) -> &MethodTable {
        &self.methods
    }

    fn create(&self, _resource: &Resource) -> Result<Box<dyn Runnable>> {
        Ok(Box::new(ScaleModel {
            factor: self.factor,
            stats: self.stats.clone(),
            gate: self.gate.clone(),
        }))
    }
}

pub(crate) struct ScaleModel {
    factor: f64,
    stats: Arc<Stats>,
    gate: Arc<Semaphore>,
}

impl ScaleModel {
    fn scale(&self, array: &NdArray, offset: f64) -> Result<NdArray> {
        let values = array
            .as_slice::<f64>()
            .ok_or_else(|| RobataError::type_mismatch(format!("expected f64 values, got {}", array.dtype())))?;
        NdArray::from_vec(
            array.shape().to_vec(),
            values.iter().map(|v| v * self.factor + offset).collect(),
        )
    }

    fn predict(&self, params: &ParameterSet<Value>) -> Result<Value> {
        let offset = match params.get(&ArgKey::named("offset")) {
            Some(Value::Scalar(Scalar::Float(offset))) => *offset,
            Some(other) => return Err(RobataError::type_mismatch(format!("offset must be a float, got {other:?}"))),
            None => 0.0,
        };
        match params.args().first() {
            Some(Value::Array(array)) => {
                self.count_rows(array.shape().first().copied().unwrap_or(1));
                Ok(self.scale(array, offset)?.into())
            }
            Some(Value::Table(table)) => {
                self.count_rows(table.num_rows());
                let columns = table
                    .columns()
                    .map(|(name, column)| -> Result<(String, NdArray)> {
                        match column.as_slice::<f64>() {
                            Some(_) => Ok((name.to_string(), self.scale(column, offset)?)),
                            None => Ok((name.to_string(), column.clone())),
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Table::new(columns)?.into())
            }
            other => Err(RobataError::type_mismatch(format!("predict takes an array or a table, got {other:?}"))),
        }
    }

    fn column_sums(&self, params: &ParameterSet<Value>) -> Result<Value> {
        let array = params
            .args()
            .first()
            .and_then(Value::as_array)
            .ok_or_else(|| RobataError::type_mismatch("column_sums takes an array"))?;
        let (features, n) = match array.shape() {
            [features, n] => (*features, *n),
            shape => return Err(RobataError::incompatible(format!("expected a 2-d array, got {shape:?}"))),
        };
        let values = array
            .as_slice::<f64>()
            .ok_or_else(|| RobataError::type_mismatch("column_sums takes f64 values"))?;
        self.count_rows(n);
        let sums = (0..n)
            .map(|j| (0..features).map(|i| values[i * n + j]).sum::<f64>() * self.factor)
            .collect();
        Ok(NdArray::from_vec(vec![n], sums)?.into())
    }

    fn count_rows(&self, rows: usize) {
        self.stats.rows.fetch_add(rows, Ordering::SeqCst);
    }
}

#[async_trait]
impl Runnable for ScaleModel {
    async fn forward(&self, method: &str, params: ParameterSet<Value>) -> Result<Value> {
        self.stats.executions.fetch_add(1, Ordering::SeqCst);
        match method {
            "predict" | "predict_gpu" => self.predict(&params),
            "column_sums" => self.column_sums(&params),
            "describe" => Ok(Value::Object(json!({
                "factor": self.factor,
                "arguments": params.len(),
            }))),
            "explode" => Err(RobataError::execution("model exploded")),
            "held" => {
                let permit = self.gate.acquire().await.map_err(|e| RobataError::execution(e.to_string()))?;
                permit.forget();
                self.predict(&params)
            }
            other => Err(RobataError::MethodNotFound(other.to_string())),
        }
    }
}

/// Framework whose artifacts hold the scale factor as little-endian f64 bytes.
///
/// A `factor` load option overrides the stored factor.
pub(crate) struct ScaleFramework;

impl ScaleFramework {
    pub const MODULE: &'static str = "robata.testing.scale";

    pub fn artifact(factor: f64) -> Bytes {
        Bytes::copy_from_slice(&factor.to_le_bytes())
    }
}

impl Framework for ScaleFramework {
    fn name(&self) -> &str {
        Self::MODULE
    }

    fn get_runnable(&self, model: &LoadedModel) -> Result<Arc<dyn RunnableFactory>> {
        let factor = match model.options().get("factor") {
            Some(value) => value
                .as_f64()
                .ok_or_else(|| RobataError::config("the `factor` option must be a number"))?,
            None => {
                let bytes: [u8; 8] = model
                    .artifact()
                    .as_ref()
                    .try_into()
                    .map_err(|_| RobataError::malformed("scale artifact must be 8 bytes"))?;
                f64::from_le_bytes(bytes)
            }
        };
        Ok(Arc::new(ScaleFactory::new(factor)))
    }
}
