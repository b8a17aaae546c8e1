//! # Runners
//!
//! A [`Runner`] is the lifecycle-managed handle callers invoke a model
//! through. It owns one runnable, either in-process (`init_local`) or behind
//! a [`Transport`] (`init_remote`), and one dispatch worker per batchable
//! method.
//!
//! ```text
//! uninitialized --init--> ready --destroy--> destroyed
//! ```
//!
//! Batching is transparent: a call to a batchable method is queued, merged
//! with whatever other calls arrive within the flush window, executed once,
//! and the caller receives exactly its own slice of the output.

mod dispatch;
pub mod remote;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::{debug, info};
use crate::config::RunnerConfig;
use crate::error::{Result, RobataError};
use crate::params::ParameterSet;
use crate::payload::{from_payload, to_payload, Value};
use crate::resource::Resource;
use crate::runnable::{BoundRunnable, MethodSignature, MethodTable, RunnableFactory};
use dispatch::{Executor, LocalExecutor, MethodDispatcher, RemoteExecutor};
use remote::Transport;

/// Observable lifecycle state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Uninitialized,
    Ready,
    Destroyed,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerState::Uninitialized => "uninitialized",
            RunnerState::Ready => "ready",
            RunnerState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Everything a ready runner holds.
struct Active {
    executor: Arc<dyn Executor>,
    /// Batching paths, one per batchable method with batching enabled
    dispatchers: HashMap<String, MethodDispatcher>,
}

enum Lifecycle {
    Uninitialized,
    Ready(Arc<Active>),
    Destroyed,
}

/// # Runner
///
/// ```ignore
/// let runner = Runner::new(factory, RunnerConfig::new("classifier"))?;
/// runner.init_local()?;
/// let out = runner.run("predict", ParameterSet::single(rows.into())).await?;
/// runner.destroy().await;
/// ```
pub struct Runner {
    config: RunnerConfig,
    factory: Arc<dyn RunnableFactory>,
    lifecycle: RwLock<Lifecycle>,
}

impl Runner {
    /// Creates an uninitialized runner. Fails if `config` is invalid or
    /// overrides the batching of a method the runnable does not have.
    pub fn new(factory: Arc<dyn RunnableFactory>, config: RunnerConfig) -> Result<Self> {
        config.validate()?;
        if let Some(method) = config
            .method_batching
            .keys()
            .find(|method| !factory.methods().contains_key(*method))
        {
            return Err(RobataError::config(format!(
                "runner `{}` configures batching for unknown method `{method}`",
                config.name
            )));
        }
        Ok(Self {
            config,
            factory,
            lifecycle: RwLock::new(Lifecycle::Uninitialized),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn resource(&self) -> &Resource {
        &self.config.resource
    }

    pub fn methods(&self) -> &MethodTable {
        self.factory.methods()
    }

    pub fn state(&self) -> RunnerState {
        match *self.lifecycle.read() {
            Lifecycle::Uninitialized => RunnerState::Uninitialized,
            Lifecycle::Ready(_) => RunnerState::Ready,
            Lifecycle::Destroyed => RunnerState::Destroyed,
        }
    }

    /// Creates the runnable in this process. Must be called within a tokio runtime.
    pub fn init_local(&self) -> Result<()> {
        self.init_with(|| {
            let runnable = BoundRunnable::bind(self.factory.as_ref(), self.config.resource)?;
            Ok(Arc::new(LocalExecutor::new(runnable)))
        })
    }

    /// Alias for [`Runner::init_local`].
    pub fn init(&self) -> Result<()> {
        self.init_local()
    }

    /// Sends every call through `transport` to a runnable hosted under this
    /// runner's name. Must be called within a tokio runtime.
    pub fn init_remote(&self, transport: Arc<dyn Transport>) -> Result<()> {
        self.init_with(|| Ok(Arc::new(RemoteExecutor::new(self.config.name.clone(), transport))))
    }

    fn init_with<F>(&self, make_executor: F) -> Result<()>
    where
        F: FnOnce() -> Result<Arc<dyn Executor>>,
    {
        let mut lifecycle = self.lifecycle.write();
        match *lifecycle {
            Lifecycle::Ready(_) => return Ok(()),
            Lifecycle::Destroyed => {
                return Err(RobataError::not_ready(format!(
                    "runner `{}` was destroyed and cannot be initialized again",
                    self.config.name
                )));
            }
            Lifecycle::Uninitialized => {}
        }
        tokio::runtime::Handle::try_current().map_err(|e| {
            RobataError::not_ready(format!("runner `{}` needs a tokio runtime: {e}", self.config.name))
        })?;

        let executor = make_executor()?;
        let dispatchers = self
            .methods()
            .values()
            .filter(|signature| signature.batchable && self.config.batching_for(&signature.name).enabled)
            .map(|signature| {
                let dispatcher = MethodDispatcher::spawn(
                    signature.clone(),
                    executor.clone(),
                    self.config.batching_for(&signature.name).clone(),
                );
                (signature.name.clone(), dispatcher)
            })
            .collect::<HashMap<_, _>>();

        info!(runner = %self.config.name, batched_methods = dispatchers.len(), "runner ready");
        *lifecycle = Lifecycle::Ready(Arc::new(Active { executor, dispatchers }));
        Ok(())
    }

    /// Calls `method` with `params` and returns this caller's output.
    ///
    /// Only valid on a ready runner. The method and the runner's resource are
    /// checked before the call is queued, so such failures reach only this
    /// caller. Failures of a merged group reach every caller in the group.
    pub async fn run(&self, method: &str, params: ParameterSet<Value>) -> Result<Value> {
        let active = self.active()?;
        let signature = self.signature(method)?;
        self.config
            .resource
            .ensure_satisfies(&signature.min_resource, &format!("method `{method}`"))?;

        match active.dispatchers.get(method) {
            Some(dispatcher) => {
                let params = params.map_with_key(|key, value| {
                    to_payload(&value, signature.input_axis(key).unwrap_or(signature.batch_dim.input))
                });
                let output = dispatcher.submit(params).await?.await?;
                from_payload(&output)
            }
            None => active.executor.call(signature, params).await,
        }
    }

    /// Releases the runnable or transport. Calls still queued are answered
    /// with [`RobataError::NotReady`]. Calling it again does nothing.
    pub async fn destroy(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.write(), Lifecycle::Destroyed);
        match previous {
            Lifecycle::Ready(active) => {
                for dispatcher in active.dispatchers.values() {
                    dispatcher.shutdown().await;
                }
                info!(runner = %self.config.name, "runner destroyed");
            }
            Lifecycle::Uninitialized => debug!(runner = %self.config.name, "destroyed before init"),
            Lifecycle::Destroyed => {}
        }
    }

    fn active(&self) -> Result<Arc<Active>> {
        match &*self.lifecycle.read() {
            Lifecycle::Ready(active) => Ok(active.clone()),
            Lifecycle::Uninitialized => Err(RobataError::not_ready(format!(
                "runner `{}` is not initialized",
                self.config.name
            ))),
            Lifecycle::Destroyed => Err(RobataError::not_ready(format!(
                "runner `{}` was destroyed",
                self.config.name
            ))),
        }
    }

    fn signature(&self, method: &str) -> Result<&MethodSignature> {
        self.methods()
            .get(method)
            .ok_or_else(|| RobataError::MethodNotFound(method.to_string()))
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("resource", &self.config.resource)
            .finish()
    }
}
