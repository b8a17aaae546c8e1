//! # Robata
//!
//! A dynamic **batching** and dispatch engine for model serving: many
//! independent callers invoke a model method concurrently, and calls to
//! batchable methods are transparently merged into one execution and split
//! back so that every caller receives exactly its own result.
//!
//! ## Overview
//!
//! Key components include:
//!
//! - A payload codec turning domain values into self-describing, mergeable
//!   [`Payload`]s and back
//! - [`ParameterSet`], the positional plus keyword arguments of one call,
//!   carried through every stage by mapping its values
//! - The [`BatchPlanner`], which merges an ordered group of calls along each
//!   argument's batch axis and splits the merged output in arrival order
//! - [`Runnable`]s, the minimal callable wrappers around a loaded model
//! - [`Runner`]s, which own a runnable locally or behind a [`Transport`] and
//!   run one background dispatch worker per batchable method
//! - A model store and framework registry that produce runnables from saved
//!   artifacts
//!
//! ## Architecture
//!
//! ### Batch axes
//! Every batchable method declares a [`BatchDim`] `(input, output)`: callers'
//! inputs are concatenated along the input axis and the model's output is
//! sliced along the output axis. The axes may differ.
//!
//! ### Flush policy
//! A dispatch worker wakes when a call is queued, waits up to
//! `max_latency_ms` for `max_batch_size` calls, and merges what it has in
//! strict FIFO order. Callers that gave up before their group formed are
//! left out of it.
//!
//! ### Errors
//! An error caused by one caller's call (unknown method, missing resource,
//! runner not ready) reaches only that caller. An error found while planning
//! or executing a merged group reaches every caller of the group.
//!
//! ## Features
//!
//! - **candle** - Implements [`Batchable`] for candle tensors
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use robata::{NdArray, ParameterSet, Runner, RunnerConfig};
//!
//! let runner = Runner::new(Arc::new(my_factory), RunnerConfig::from_env("classifier")?)?;
//! runner.init_local()?;
//!
//! let rows = NdArray::from_rows(vec![vec![0.1f32, 0.7]])?;
//! let scores = runner.run("predict", ParameterSet::single(rows.into())).await?;
//!
//! runner.destroy().await;
//! ```

mod communication;
mod core;

pub mod backend;
pub mod config;
pub mod constant;
pub mod error;
pub mod framework;
pub mod params;
pub mod payload;
pub mod planner;
pub mod resource;
pub mod runnable;
pub mod runner;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::Batchable;
pub use communication::Pending;
pub use config::{BatchingConfig, RunnerConfig};
pub use error::{Result, RobataError};
pub use framework::{Framework, FrameworkRegistry, LoadedModel};
pub use params::{ArgKey, ParameterSet};
pub use payload::{from_payload, to_payload, DType, NdArray, Payload, PayloadKind, Scalar, Table, Value};
pub use planner::{BatchAxes, BatchPlan, BatchPlanner, CallerId};
pub use resource::Resource;
pub use runnable::{BatchDim, BoundRunnable, MethodSignature, MethodTable, Runnable, RunnableFactory};
pub use runner::remote::{LoopbackTransport, MergedCall, RunnerServer, Transport};
pub use runner::{Runner, RunnerState};
pub use store::{ModelInfo, ModelSignature, ModelStore, Tag};
