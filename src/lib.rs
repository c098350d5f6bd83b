//! Overseer: node process supervisor and compute task queue.
//!
//! This crate launches and supervises the processes that make up one server
//! node (search node, web server, compute engine) and maintains the durable
//! queue of asynchronous analysis tasks those processes share.
//!
//! # Architecture
//!
//! Overseer follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (OS processes,
//!   database, marker files)
//!
//! # Modules
//!
//! - [`process`]: Process supervision, readiness probing, and shutdown
//! - [`queue`]: Compute task queue with deduplication and worker pause
//! - [`config`]: Node settings loaded from TOML and the environment
//! - [`logging`]: Tracing subscriber initialisation

pub mod config;
pub mod logging;
pub mod process;
pub mod queue;
