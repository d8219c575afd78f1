//! Query planner - converts the intermediate tree into a logical [`Query`].
//!
//! A single metric leaf becomes a single-source query; a formula becomes a
//! join over one aliased entity per leaf (or a single-source query when the
//! formula only references one metric).

pub mod formula;
pub mod timeseries;

pub use formula::build_formula_query;
pub use timeseries::build_timeseries_query;

use crate::dsl::IntermediateNode;
use crate::error::MqlResult;
use crate::query::{Dataset, Query};

/// Plan any intermediate node.
pub fn build_query(node: &IntermediateNode, dataset: Dataset) -> MqlResult<Query> {
    match node {
        IntermediateNode::Timeseries(leaf) => build_timeseries_query(leaf, dataset),
        IntermediateNode::Formula(formula) => build_formula_query(formula, dataset),
    }
}
