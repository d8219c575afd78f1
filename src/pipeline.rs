//! MQL compilation entry points.
//!
//! This module runs the full pipeline from query text to a finished plan:
//!
//! ```text
//! MQL text → parse → visit → plan → populate → resolve      (stage A)
//!          → treeify → post-process → optimize → finalize
//!          → validate                                        (stage B)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mql::pipeline::{compile_query, CompileOptions};
//!
//! let context = serde_json::json!({ ... });
//! let output = compile_query("sum(d:transactions/duration@millisecond)", &context, &CompileOptions::default())?;
//! println!("{}", output.query);
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, debug_span, warn};

use crate::config::Settings;
use crate::context::{populate_query_from_context, MqlContext};
use crate::dsl::{self, visitor::MqlVisitor, IntermediateNode};
use crate::error::{MqlError, MqlResult};
use crate::indexer::{IndexerResolver, MappingResolver};
use crate::planner::build_query;
use crate::processors::{
    post_processors, validators, FilterInSelectOptimizer, QueryProcessor, TimeConditionFinalizer,
    TreeifyConditions,
};
use crate::query::{Dataset, Query};

// ============================================================================
// Options
// ============================================================================

/// Options for compilation.
#[derive(Clone)]
pub struct CompileOptions {
    /// Dataset the query runs against.
    pub dataset: Dataset,

    /// Record the plan as it leaves stage A.
    pub dry_run: bool,

    /// Limits and rollup settings.
    pub settings: Settings,

    /// Collaborator that maps names to indexed ids.
    pub resolver: Arc<dyn IndexerResolver>,

    /// Caller-supplied processors, run after the built-in optimizers.
    pub custom_processors: Vec<Arc<dyn QueryProcessor>>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dataset: Dataset::GenericMetrics,
            dry_run: false,
            settings: Settings::default(),
            resolver: Arc::new(MappingResolver),
            custom_processors: Vec::new(),
        }
    }
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let processors: Vec<&str> = self.custom_processors.iter().map(|p| p.name()).collect();
        f.debug_struct("CompileOptions")
            .field("dataset", &self.dataset)
            .field("dry_run", &self.dry_run)
            .field("settings", &self.settings)
            .field("custom_processors", &processors)
            .finish_non_exhaustive()
    }
}

impl CompileOptions {
    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.dataset = dataset;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the mapping resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn IndexerResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Append a custom processor.
    pub fn with_processor(mut self, processor: Arc<dyn QueryProcessor>) -> Self {
        self.custom_processors.push(processor);
        self
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result of compiling an MQL query.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// The finished plan.
    pub query: Query,

    /// The plan as it left stage A, when compiled as a dry run.
    pub original_ast: Option<String>,
}

// ============================================================================
// Compilation Functions
// ============================================================================

/// Parse and visit query text into its intermediate tree.
pub fn parse_intermediate(body: &str) -> MqlResult<IntermediateNode> {
    let expr = dsl::parse(body)?;
    MqlVisitor::new().visit(&expr)
}

/// Build the unpopulated plan for query text.
pub fn parse_mql_query_body(body: &str, dataset: Dataset) -> MqlResult<Query> {
    let node = parse_intermediate(body)?;
    build_query(&node, dataset)
}

/// Compile query text and its context into a finished plan.
///
/// # Arguments
///
/// * `body` - The MQL query text
/// * `context` - The JSON compilation context (scope, time range, rollup, paging, mappings)
/// * `options` - Compilation options
pub fn compile_query(body: &str, context: &Value, options: &CompileOptions) -> MqlResult<CompileOutput> {
    let result = compile_inner(body, context, options);
    if let Err(err) = &result {
        warn!(query = body, error = %err, "rejected MQL query");
    }
    result
}

fn compile_inner(body: &str, context: &Value, options: &CompileOptions) -> MqlResult<CompileOutput> {
    // Stage A
    let mut query = {
        let _span = debug_span!("parse", dataset = %options.dataset).entered();
        parse_mql_query_body(body, options.dataset)?
    };

    let context = MqlContext::from_value(context)?;
    {
        let _span = debug_span!("populate").entered();
        populate_query_from_context(&mut query, &context, &options.settings)?;
    }
    {
        let _span = debug_span!("resolve", mappings = context.indexer_mappings.len()).entered();
        options
            .resolver
            .resolve(&mut query, &context.indexer_mappings, options.dataset)
            .map_err(|e| MqlError::from_foreign(&e))?;
    }

    let original_ast = options.dry_run.then(|| query.to_string());

    TreeifyConditions.process(&mut query)?;

    // Stage B
    for processor in post_processors() {
        run_processor(processor.as_ref(), &mut query)?;
    }
    run_processor(&FilterInSelectOptimizer, &mut query)?;
    for processor in &options.custom_processors {
        run_processor(processor.as_ref(), &mut query)?;
    }
    run_processor(&TimeConditionFinalizer, &mut query)?;

    for validator in validators() {
        let _span = debug_span!("validate", validator = validator.name()).entered();
        validator.validate(&query)?;
    }

    debug!(
        entities = query.entities().len(),
        composite = query.is_composite(),
        "compiled MQL query"
    );
    Ok(CompileOutput { query, original_ast })
}

fn run_processor(processor: &dyn QueryProcessor, query: &mut Query) -> MqlResult<()> {
    let _span = debug_span!("process", processor = processor.name()).entered();
    processor.process(query)
}
