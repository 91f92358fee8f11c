//! Long-running tasks that keep the channel registry fresh.

pub mod poller;
pub mod ticker;
