//! mcptex: an MCP server that compiles LaTeX documents to PDF.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
