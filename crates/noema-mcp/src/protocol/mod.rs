//! MCP Protocol Implementation
//!
//! JSON-RPC 2.0 over stdio for the Model Context Protocol, plus an optional
//! Streamable HTTP transport behind the `http` feature.

pub mod messages;
#[cfg(feature = "http")]
pub mod http;
pub mod stdio;
pub mod types;
