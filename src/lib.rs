//! Local cache of the tiered time series blocks a remote sensor service
//! publishes, with incremental sync and series reconstruction.

pub mod block;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod query;
pub mod session;
pub mod store;
pub mod sync;
pub mod tier;
