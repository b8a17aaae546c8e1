mod pending;
mod queue_item;

pub use pending::Pending;
pub(crate) use queue_item::QueueItem;
