//! Application services: sampling strategies, index rebuilds, timing.

pub mod error;
pub mod indexer;
pub mod repos;
pub mod rng;
pub mod sampling;
pub mod timing;
