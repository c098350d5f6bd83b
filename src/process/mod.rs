//! Node process supervision for Overseer.
//!
//! Launches the search node, web server, and compute engine of a node in
//! dependency order, probes their readiness with bounded retries, relaunches
//! them according to the restart policy, and turns external stop requests
//! into coordinated graceful or hard shutdowns. The module follows
//! hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
