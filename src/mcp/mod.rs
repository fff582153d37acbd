//! MCP tool facade over the retrieval core.
pub mod server;
pub mod tools;
