//! Screenhouse - screener query compiler for ClickHouse
//!
//! This crate compiles declarative market-data screener queries into:
//! - Parameterized ClickHouse SQL (PREWHERE/QUALIFY/LIMIT BY aware)
//! - A typed compute-graph IR with optimizer rewrites
//! - A Mermaid diagram of the optimized computation
//!
//! The compiler never executes queries; it only produces SQL text plus a
//! parameter map for a ClickHouse-compatible engine.

pub mod compiler;
pub mod compute_graph;
pub mod config;
pub mod diagram;
pub mod ir_builder;
pub mod optimizer;
pub mod screener_query;
pub mod server;
pub mod sql_generator;
