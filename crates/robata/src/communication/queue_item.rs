use std::time::{Duration, Instant};
use tokio::sync::oneshot::Sender;
use tracing::debug;
use uuid::Uuid;
use crate::error::Result;
use crate::params::ParameterSet;
use crate::payload::Payload;
use crate::planner::CallerId;

/// One caller waiting in a method queue: its encoded arguments and the
/// channel its slice of the merged output is delivered on.
pub(crate) struct QueueItem {
    id: CallerId,
    params: ParameterSet<Payload>,
    sender: Sender<Result<Payload>>,
    enqueued_at: Instant,
}

impl QueueItem {
    pub fn new(params: ParameterSet<Payload>, sender: Sender<Result<Payload>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            params,
            sender,
            enqueued_at: Instant::now(),
        }
    }

    pub fn id(&self) -> CallerId {
        self.id
    }

    pub fn params(&self) -> &ParameterSet<Payload> {
        &self.params
    }

    /// The caller dropped its pending result and no longer needs a slot.
    pub fn is_cancelled(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Delivers the caller's result, discarding it if the caller went away.
    pub fn reply(self, result: Result<Payload>) {
        if self.sender.send(result).is_err() {
            debug!(caller = %self.id, "caller dropped before its result was delivered");
        }
    }
}
