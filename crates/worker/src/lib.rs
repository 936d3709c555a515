//! Execution path: worker pools that pull delivery jobs off the broker,
//! call the channel provider, and drive each transaction to a terminal
//! state under the bounded retry policy.

pub mod pool;
pub mod processor;
pub mod retry;
