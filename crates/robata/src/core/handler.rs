use async_trait::async_trait;
use crate::error::Result;

/// The three phases a dispatch worker runs for every batch group.
#[async_trait]
pub(crate) trait BatchHandler: Send + Sync {
    type Request: Send;
    type ModelInput: Send;
    type ModelOutput: Send;

    /// True if the caller behind `request` no longer wants a result.
    fn is_abandoned(&self, request: &Self::Request) -> bool;

    /// Build one merged input from a group of queued requests.
    async fn make_batch_input(&self, requests: &[Self::Request]) -> Result<Self::ModelInput>;

    /// Run the model once on the merged input.
    async fn forward(&self, model_input: Self::ModelInput) -> Result<Self::ModelOutput>;

    /// Send every request its share of the output, or the group's error.
    async fn handle_outputs(&self, requests: Vec<Self::Request>, output: Result<Self::ModelOutput>);
}
