//! # glyphs-info-mcp: Glyphs handbook retrieval over MCP
//!
//! Loads a local cache of the Glyphs handbook (markdown pages per release
//! channel), indexes every heading-delimited section, and answers anchor
//! lookups and ranked keyword searches for AI assistants via the Model
//! Context Protocol (MCP).
//!
//! ## Architecture
//!
//! - **[`config`]**: configuration loading and validation
//! - **[`corpus`]**: cache directory scan, page splitting, section parsing
//! - **[`index`]**: inverted index, anchor table and path trie over sections
//! - **[`query`]**: anchor lookup, TF-IDF search, excerpts
//! - **[`serving`]**: the immutable corpus + index + manifest snapshot
//! - **[`freshness`]**: staleness tracking and atomic background refresh
//! - **[`upstream`]**: upstream manifest version probe
//! - **[`mcp`]**: MCP server and tool handlers (stdio transport via rmcp)
//! - **[`error`]**: load and retrieval error types

pub mod config;
pub mod corpus;
pub mod error;
pub mod freshness;
pub mod index;
pub mod mcp;
pub mod query;
pub mod serving;
pub mod upstream;
