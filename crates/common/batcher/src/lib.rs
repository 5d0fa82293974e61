//! Group events into batches, closed either when full or on a fixed interval.
//!
//! Producers add events concurrently through a [Batcher] handle.
//! A single [BatchDriver] task hands the batches over to a [FlushHandler],
//! in the order the batches were closed.
//!
//! On shutdown, [BatchingService::drain] flushes what remains and waits for the dispatch to complete.
//! Events accepted but not yet dispatched when the process is killed are lost.

mod batchable;
mod batcher;
mod config;
mod driver;
mod error;
mod partition;
mod service;

pub use crate::batchable::Batchable;
pub use crate::batcher::BatchReceiver;
pub use crate::batcher::Batcher;
pub use crate::config::BatchConfig;
pub use crate::config::BatchConfigBuilder;
pub use crate::config::BatchConfigError;
pub use crate::driver::BatchDriver;
pub use crate::driver::FlushHandler;
pub use crate::error::BatchError;
pub use crate::partition::PartitionedBatch;
pub use crate::service::BatchingService;
