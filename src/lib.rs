//! # MQL
//!
//! A compiler for the metrics query language.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 MQL text + JSON context                  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [dsl: lexer, parser, visitor]
//! ┌─────────────────────────────────────────────────────────┐
//! │      IntermediateNode (Timeseries leaf | Formula)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [planner]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Query over one entity or a join of entities       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [context, indexer, processors]
//! ┌─────────────────────────────────────────────────────────┐
//! │             Populated, resolved, validated plan          │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod dsl;
pub mod error;
pub mod indexer;
pub mod pipeline;
pub mod planner;
pub mod processors;
pub mod query;

pub use config::Settings;
pub use context::MqlContext;
pub use error::{MqlError, MqlResult};
pub use indexer::{IndexerResolver, MappingResolver};
pub use pipeline::{compile_query, parse_mql_query_body, CompileOptions, CompileOutput};
pub use processors::QueryProcessor;
pub use query::{Dataset, Query};
