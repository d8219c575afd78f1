//! Storage entities and the metric-type lookup that selects them.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{MqlError, MqlResult};

/// Dataset a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Release-health metrics with indexed tag values.
    Metrics,
    /// Performance and custom metrics with raw tag values.
    GenericMetrics,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Metrics => "metrics",
            Dataset::GenericMetrics => "generic_metrics",
        }
    }

    /// Column holding the tag map for this dataset's entities.
    pub fn tag_column(&self) -> &'static str {
        match self {
            Dataset::Metrics => "tags",
            Dataset::GenericMetrics => "tags_raw",
        }
    }
}

impl FromStr for Dataset {
    type Err = MqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metrics" => Ok(Dataset::Metrics),
            "generic_metrics" => Ok(Dataset::GenericMetrics),
            other => Err(MqlError::semantic(format!("unknown dataset {}", other))),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key of a storage-backed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKey {
    MetricsCounters,
    MetricsDistributions,
    MetricsSets,
    GenericMetricsCounters,
    GenericMetricsDistributions,
    GenericMetricsSets,
    GenericMetricsGauges,
}

impl EntityKey {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKey::MetricsCounters => "metrics_counters",
            EntityKey::MetricsDistributions => "metrics_distributions",
            EntityKey::MetricsSets => "metrics_sets",
            EntityKey::GenericMetricsCounters => "generic_metrics_counters",
            EntityKey::GenericMetricsDistributions => "generic_metrics_distributions",
            EntityKey::GenericMetricsSets => "generic_metrics_sets",
            EntityKey::GenericMetricsGauges => "generic_metrics_gauges",
        }
    }

    pub fn dataset(&self) -> Dataset {
        match self {
            EntityKey::MetricsCounters | EntityKey::MetricsDistributions | EntityKey::MetricsSets => {
                Dataset::Metrics
            }
            _ => Dataset::GenericMetrics,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metadata of an entity that the compiler needs to build and check plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub key: EntityKey,
    /// Column every query must bound from both sides.
    pub required_time_column: &'static str,
    /// Columns every query must constrain.
    pub required_filter_columns: &'static [&'static str],
    pub tag_column: &'static str,
}

const REQUIRED_FILTER_COLUMNS: &[&str] = &["org_id", "project_id"];

impl Entity {
    pub fn new(key: EntityKey) -> Self {
        Self {
            key,
            required_time_column: "timestamp",
            required_filter_columns: REQUIRED_FILTER_COLUMNS,
            tag_column: key.dataset().tag_column(),
        }
    }
}

/// Select the entity holding a metric, from the type character that leads
/// its MRI.
pub fn select_entity(mri: &str, dataset: Dataset) -> MqlResult<EntityKey> {
    let type_char = mri.chars().next();
    let key = match (dataset, type_char) {
        (Dataset::Metrics, Some('c')) => Some(EntityKey::MetricsCounters),
        (Dataset::Metrics, Some('d')) => Some(EntityKey::MetricsDistributions),
        (Dataset::Metrics, Some('s')) => Some(EntityKey::MetricsSets),
        (Dataset::GenericMetrics, Some('c')) => Some(EntityKey::GenericMetricsCounters),
        (Dataset::GenericMetrics, Some('d')) => Some(EntityKey::GenericMetricsDistributions),
        (Dataset::GenericMetrics, Some('s')) => Some(EntityKey::GenericMetricsSets),
        (Dataset::GenericMetrics, Some('g')) => Some(EntityKey::GenericMetricsGauges),
        _ => None,
    };
    key.ok_or_else(|| {
        MqlError::semantic(format!(
            "invalid metric type {}",
            type_char.map(String::from).unwrap_or_default()
        ))
    })
}
