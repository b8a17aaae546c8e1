use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use crate::error::{Result, RobataError};
use crate::payload::Payload;

/// # Pending
///
/// The future side of a queued call. Resolves to the caller's own slice of
/// the merged output, or to the error of the group it was batched into.
///
/// Dropping a `Pending` before its group is formed withdraws the call.
pub struct Pending {
    /// The underlying channel receiver
    receiver: oneshot::Receiver<Result<Payload>>,
}

impl Pending {
    pub(crate) fn new(receiver: oneshot::Receiver<Result<Payload>>) -> Self {
        Self { receiver }
    }
}

impl Future for Pending {
    type Output = Result<Payload>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(RobataError::not_ready("dispatch worker stopped before the call completed"))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{to_payload, Scalar, Value};

    #[tokio::test]
    async fn test_pending_resolves_to_sent_result() {
        let (tx, rx) = oneshot::channel();
        let payload = to_payload(&Value::Scalar(Scalar::Bool(true)), 0);
        tx.send(Ok(payload.clone())).unwrap();
        assert_eq!(Pending::new(rx).await, Ok(payload));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_not_ready() {
        let (tx, rx) = oneshot::channel::<Result<Payload>>();
        drop(tx);
        assert!(matches!(Pending::new(rx).await, Err(RobataError::NotReady(_))));
    }
}
