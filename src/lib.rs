//! Read-through caching layer serving randomized feed item samples.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
