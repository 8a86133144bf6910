//! MCP tool implementations.
//!
//! One module per group of facade (C9) operations. Every tool follows the
//! same shape: a `schema()` returning its JSON-Schema input, and an
//! `execute(core, arguments)` returning the JSON result or an error string
//! that the server wraps into a JSON-RPC tool error.

pub mod backup;
pub mod entities;
pub mod graph;
pub mod maintenance;
pub mod observations;
pub mod relations;
pub mod search;
pub mod stats;
pub mod transaction;
