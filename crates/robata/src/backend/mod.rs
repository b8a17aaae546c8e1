//! # Batch backends
//!
//! The [`Batchable`] trait is what the payload codec needs from a value type
//! to merge it into a batch and split it back apart. The built-in array and
//! table payloads implement it; tensor libraries can be plugged in behind
//! feature flags.
//!
//! ## Feature Flags
//!
//! - `candle`: implements [`Batchable`] for candle's `Tensor` and adds
//!   conversions between tensors and [`NdArray`](crate::payload::NdArray)

mod core_trait;

#[cfg_attr(docsrs, doc(cfg(feature = "candle")))]
#[cfg(feature = "candle")]
/// Candle tensor backend implementation.
///
/// This module is only available when the `candle` feature flag is enabled.
pub mod candle;

pub use core_trait::*;
