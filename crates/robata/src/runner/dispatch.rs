use std::collections::VecDeque;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use crate::communication::{Pending, QueueItem};
use crate::config::BatchingConfig;
use crate::core::batch::batching_loop;
use crate::core::handler::BatchHandler;
use crate::core::worker::BatchWorkerHandle;
use crate::error::{Result, RobataError};
use crate::params::ParameterSet;
use crate::payload::{from_payload, to_payload, Payload, Value};
use crate::planner::{BatchPlan, BatchPlanner};
use crate::runnable::{BoundRunnable, MethodSignature};
use super::remote::{MergedCall, Transport};

/// Where a runner's calls are executed.
#[async_trait]
pub(crate) trait Executor: Send + Sync {
    /// Runs one (possibly merged) call and returns its output encoded along
    /// the method's output axis.
    async fn execute(&self, signature: &MethodSignature, params: ParameterSet<Payload>) -> Result<Payload>;

    /// Runs one unbatched call.
    async fn call(&self, signature: &MethodSignature, params: ParameterSet<Value>) -> Result<Value> {
        let params = params.map_with_key(|key, value| {
            to_payload(&value, signature.input_axis(key).unwrap_or(signature.batch_dim.input))
        });
        from_payload(&self.execute(signature, params).await?)
    }
}

/// Calls an in-process runnable.
pub(crate) struct LocalExecutor {
    runnable: BoundRunnable,
}

impl LocalExecutor {
    pub fn new(runnable: BoundRunnable) -> Self {
        Self { runnable }
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn execute(&self, signature: &MethodSignature, params: ParameterSet<Payload>) -> Result<Payload> {
        let params = params.try_map(|_, payload| from_payload(&payload))?;
        let output = self.runnable.invoke(&signature.name, params).await?;
        Ok(to_payload(&output, signature.batch_dim.output))
    }

    async fn call(&self, signature: &MethodSignature, params: ParameterSet<Value>) -> Result<Value> {
        self.runnable.invoke(&signature.name, params).await
    }
}

/// Ships calls over a transport to a runner hosted elsewhere.
pub(crate) struct RemoteExecutor {
    runner: String,
    transport: Arc<dyn Transport>,
}

impl RemoteExecutor {
    pub fn new(runner: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self { runner: runner.into(), transport }
    }
}

#[async_trait]
impl Executor for RemoteExecutor {
    async fn execute(&self, signature: &MethodSignature, params: ParameterSet<Payload>) -> Result<Payload> {
        self.transport
            .send(MergedCall {
                runner: self.runner.clone(),
                method: signature.name.clone(),
                params,
            })
            .await
    }
}

/// Merges a group with the planner, executes it once and splits the output.
struct DispatchHandler {
    signature: MethodSignature,
    planner: BatchPlanner,
    executor: Arc<dyn Executor>,
}

#[async_trait]
impl BatchHandler for DispatchHandler {
    type Request = QueueItem;
    type ModelInput = (ParameterSet<Payload>, BatchPlan);
    type ModelOutput = (Payload, BatchPlan);

    fn is_abandoned(&self, request: &QueueItem) -> bool {
        request.is_cancelled()
    }

    async fn make_batch_input(&self, requests: &[QueueItem]) -> Result<Self::ModelInput> {
        if let Some(oldest) = requests.first() {
            debug!(method = %self.signature.name, waited_ms = oldest.waited().as_millis() as u64, "planning group");
        }
        let calls = requests
            .iter()
            .map(|request| (request.id(), request.params().clone()))
            .collect();
        self.planner.plan(calls)
    }

    async fn forward(&self, model_input: Self::ModelInput) -> Result<Self::ModelOutput> {
        let (params, plan) = model_input;
        debug!(method = %self.signature.name, callers = plan.len(), items = plan.total(), "executing merged call");
        let output = self.executor.execute(&self.signature, params).await?;
        Ok((output, plan))
    }

    async fn handle_outputs(&self, requests: Vec<QueueItem>, output: Result<Self::ModelOutput>) {
        let pieces = output.and_then(|(payload, plan)| self.planner.split(&plan, &payload));
        match pieces {
            Ok(pieces) => {
                for (request, (caller, piece)) in requests.into_iter().zip(pieces) {
                    if request.id() == caller {
                        request.reply(Ok(piece));
                    } else {
                        request.reply(Err(RobataError::malformed(format!(
                            "output slice for {caller} delivered out of order"
                        ))));
                    }
                }
            }
            Err(err) => {
                if err.is_batch_error() {
                    warn!(method = %self.signature.name, callers = requests.len(), error = %err, "batch group could not be formed");
                } else {
                    warn!(method = %self.signature.name, callers = requests.len(), error = %err, "batch group failed");
                }
                for request in requests {
                    request.reply(Err(err.clone()));
                }
            }
        }
    }
}

/// # MethodDispatcher
///
/// The batching path of one method: a FIFO queue and the background worker
/// that turns it into merged calls.
pub(crate) struct MethodDispatcher {
    method: String,
    planner: BatchPlanner,
    waiting_requests: Arc<Mutex<VecDeque<QueueItem>>>,
    handle: BatchWorkerHandle,
}

impl MethodDispatcher {
    /// Spawns the dispatch worker. Must be called within a tokio runtime.
    pub fn spawn(signature: MethodSignature, executor: Arc<dyn Executor>, policy: BatchingConfig) -> Self {
        let method = signature.name.clone();
        let planner = BatchPlanner::for_method(&signature);
        let waiting_requests = Arc::new(Mutex::new(VecDeque::new()));

        let handle = BatchWorkerHandle::new(method.clone(), {
            let waiting_requests = waiting_requests.clone();
            let planner = planner.clone();
            move |running, notifier| {
                tokio::spawn(async move {
                    let handler = DispatchHandler { planner, signature, executor };
                    batching_loop(&handler, &policy, running, notifier, waiting_requests).await;
                })
            }
        });

        Self { method, planner, waiting_requests, handle }
    }

    /// Queues one call and returns the future of its result. A call whose own
    /// arguments cannot be batched is rejected here and never joins a group.
    pub async fn submit(&self, params: ParameterSet<Payload>) -> Result<Pending> {
        self.planner.check_call(&params)?;
        let (tx, rx) = oneshot::channel();
        {
            let mut queue = self.waiting_requests.lock().await;
            if !self.handle.is_running() {
                return Err(RobataError::not_ready(format!(
                    "dispatcher for `{}` has shut down",
                    self.method
                )));
            }
            queue.push_back(QueueItem::new(params, tx));
        }
        // Notify the worker that new work is available
        self.handle.notify();
        Ok(Pending::new(rx))
    }

    /// Stops the worker and answers every call still queued with `NotReady`.
    pub async fn shutdown(&self) {
        let mut queue = self.waiting_requests.lock().await;
        self.handle.shutdown();
        let stranded = queue.len();
        for item in queue.drain(..) {
            item.reply(Err(RobataError::not_ready(format!(
                "runner was destroyed while `{}` was queued",
                self.method
            ))));
        }
        if stranded > 0 {
            debug!(method = %self.method, stranded, "answered queued callers at shutdown");
        }
    }
}
