//! Timer-driven queue, retry and cleanup passes over the action store.

pub mod backoff;
pub mod queue;

pub use queue::QueueScheduler;
