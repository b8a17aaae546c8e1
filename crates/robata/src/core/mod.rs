//! # Dispatch core
//!
//! Background machinery shared by every batchable method of a runner.
//!
//! * [`batch`] - The dispatch loop: waits for work, applies the flush policy,
//!   drains a FIFO group and hands it to a handler.
//!
//! * [`handler`] - The `BatchHandler` trait splitting a group's life into
//!   merge, forward and reply phases.
//!
//! * [`worker`] - `BatchWorkerHandle`, which spawns, wakes and stops the
//!   background task.
pub(crate) mod worker;
pub(crate) mod batch;
pub(crate) mod handler;
