//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod http;
pub mod mcp;
pub mod stdio;
pub mod telemetry;
