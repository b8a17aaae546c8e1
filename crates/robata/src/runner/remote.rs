//! Remote execution: merged calls shipped to a worker-side [`RunnerServer`].
//!
//! Only payloads cross the transport. Group formation happens on the calling
//! side exactly as in local mode; the server executes one merged call at a
//! time and encodes the result along the method's output axis.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use crate::error::{Result, RobataError};
use crate::params::ParameterSet;
use crate::payload::{from_payload, to_payload, Payload};
use crate::runnable::BoundRunnable;

/// One (possibly merged) call addressed to a remote runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedCall {
    pub runner: String,
    pub method: String,
    pub params: ParameterSet<Payload>,
}

/// Carries merged calls to wherever the runnable lives.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, call: MergedCall) -> Result<Payload>;
}

/// # RunnerServer
///
/// Worker-side endpoint hosting bound runnables by runner name.
#[derive(Default)]
pub struct RunnerServer {
    runners: RwLock<HashMap<String, Arc<BoundRunnable>>>,
}

impl RunnerServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosts `runnable` under `name`, replacing any runnable of that name.
    pub fn host(&self, name: impl Into<String>, runnable: BoundRunnable) {
        let name = name.into();
        info!(runner = %name, "hosting runnable");
        self.runners.write().insert(name, Arc::new(runnable));
    }

    /// Stops hosting `name`. Returns false if it was not hosted.
    pub fn release(&self, name: &str) -> bool {
        self.runners.write().remove(name).is_some()
    }

    /// Executes one merged call.
    pub async fn serve(&self, call: MergedCall) -> Result<Payload> {
        let runnable = self
            .runners
            .read()
            .get(&call.runner)
            .cloned()
            .ok_or_else(|| RobataError::not_found(format!("runner `{}` is not hosted here", call.runner)))?;

        let output_axis = runnable.signature(&call.method)?.batch_dim.output;
        let params = call.params.try_map(|_, payload| from_payload(&payload))?;
        debug!(runner = %call.runner, method = %call.method, "serving merged call");
        let output = runnable.invoke(&call.method, params).await?;
        Ok(to_payload(&output, output_axis))
    }
}

/// In-process transport that pushes every call and reply through JSON.
pub struct LoopbackTransport {
    server: Arc<RunnerServer>,
}

impl LoopbackTransport {
    pub fn new(server: Arc<RunnerServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, call: MergedCall) -> Result<Payload> {
        let request = serde_json::to_vec(&call)?;
        let call: MergedCall = serde_json::from_slice(&request)?;

        let reply = self.server.serve(call).await;
        let encoded = serde_json::to_vec(&reply)?;
        let decoded: Result<Payload> = serde_json::from_slice(&encoded)?;
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{NdArray, Value};
    use crate::resource::Resource;
    use crate::testing::ScaleFactory;

    fn server() -> Arc<RunnerServer> {
        let server = Arc::new(RunnerServer::new());
        let runnable = BoundRunnable::bind(&ScaleFactory::new(3.0), Resource::cpu(1.0).unwrap()).unwrap();
        server.host("scale", runnable);
        server
    }

    fn call(runner: &str, method: &str) -> MergedCall {
        let input: Value = NdArray::from_rows(vec![vec![1.0f64], vec![2.0]]).unwrap().into();
        MergedCall {
            runner: runner.into(),
            method: method.into(),
            params: ParameterSet::single(to_payload(&input, 0)),
        }
    }

    #[tokio::test]
    async fn test_serve_runs_hosted_runnable() {
        let output = server().serve(call("scale", "predict")).await.unwrap();
        let value = from_payload(&output).unwrap();
        assert_eq!(value.as_array().unwrap().as_slice::<f64>().unwrap(), &[3.0, 6.0]);
    }

    #[tokio::test]
    async fn test_serve_unknown_runner_is_not_found() {
        let err = server().serve(call("missing", "predict")).await.unwrap_err();
        assert!(matches!(err, RobataError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_loopback_matches_direct_serve() {
        let server = server();
        let direct = server.serve(call("scale", "predict")).await.unwrap();
        let transported = LoopbackTransport::new(server.clone())
            .send(call("scale", "predict"))
            .await
            .unwrap();
        assert_eq!(transported, direct);
    }

    #[tokio::test]
    async fn test_loopback_preserves_remote_error_kind() {
        let server = server();
        assert!(server.release("scale"));
        let err = LoopbackTransport::new(server.clone()).send(call("scale", "predict")).await.unwrap_err();
        assert!(matches!(err, RobataError::NotFound(msg) if msg.contains("not hosted")));
        assert!(!server.release("scale"));
    }
}
