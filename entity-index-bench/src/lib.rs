//! Entity Index Benchmark Library
//!
//! Provides the benchmark entity, data generators and index factories for the
//! in-memory and file-backed stores.

pub mod data_gen;
pub mod stores;
