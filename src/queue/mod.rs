//! Compute task queue.
//!
//! Tasks are submitted with optional deduplication, picked up by compute
//! workers, and moved atomically to history when they complete, fail, or are
//! cancelled. A persisted flag lets operators pause workers across every
//! node sharing the queue.
//!
//! The module follows the hexagonal layout used across the crate:
//!
//! - [`domain`]: submissions, queue rows, history rows, and pause status
//! - [`ports`]: the transactional store contract
//! - [`adapters`]: in-memory and `PostgreSQL` stores
//! - [`services`]: the [`services::CeQueue`] service

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
