use std::fmt::Debug;
use crate::error::{Result, RobataError};


/// The trait that must be fulfilled by any value type that can be merged into a batch
/// and split back apart along a batch axis.
pub trait Batchable: Debug + Clone + Send + Sync + 'static {
    /// Size of the value along `axis`, or `None` if the value has no such axis
    fn extent(&self, axis: usize) -> Option<usize>;

    /// Concatenate several values along `axis`, in the order supplied
    fn cat(items: &[Self], axis: usize) -> Result<Self>;

    /// Slice `axis` from `start` to `start + len`
    fn slice(&self, axis: usize, start: usize, len: usize) -> Result<Self>;

    /// Split a value into consecutive pieces along `axis`, one per entry of `extents`.
    ///
    /// The extents must add up to exactly the size of `axis`.
    fn split(&self, axis: usize, extents: &[usize]) -> Result<Vec<Self>> {
        let total = self.extent(axis).ok_or_else(|| {
            RobataError::malformed(format!("value has no axis {axis} to split along"))
        })?;
        let requested: usize = extents.iter().sum();
        if requested != total {
            return Err(RobataError::malformed(format!(
                "split boundaries cover {requested} items but axis {axis} holds {total}"
            )));
        }
        let mut start = 0;
        let mut pieces = Vec::with_capacity(extents.len());
        for &len in extents {
            pieces.push(self.slice(axis, start, len)?);
            start += len;
        }
        Ok(pieces)
    }
}
