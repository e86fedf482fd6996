//! Request-level validation for [`UserQuery`].
//!
//! Collects every violation instead of stopping at the first one, so the
//! HTTP layer can return a complete `details` list in its 422 response.

use serde::Serialize;

use crate::config::ScreenerConfig;
use crate::screener_query::{
    CompositeFilter, Expression, Filter, GroupingCriterion, LogicalOperator, TimeRange, UserQuery,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Validate a query against the screener config. Empty result means valid.
pub fn validate_user_query(query: &UserQuery, config: &ScreenerConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if query.id.trim().is_empty() {
        issues.push(ValidationIssue::new("id", "id must not be empty"));
    }
    if query.name.trim().is_empty() {
        issues.push(ValidationIssue::new("name", "name must not be empty"));
    }

    if let Some(limit) = query.limit {
        if limit == 0 {
            issues.push(ValidationIssue::new("limit", "limit must be positive"));
        } else if limit > config.max_limit {
            issues.push(ValidationIssue::new(
                "limit",
                format!("limit exceeds maximum of {}", config.max_limit),
            ));
        }
    }

    validate_filter(&query.filter, "filter", config, &mut issues);

    if let Some(groups) = &query.group_by {
        for (i, criterion) in groups.iter().enumerate() {
            let path = format!("group_by[{}]", i);
            match criterion {
                GroupingCriterion::Dimension(name) => {
                    if name.trim().is_empty() {
                        issues.push(ValidationIssue::new(path, "dimension must not be empty"));
                    }
                }
                GroupingCriterion::TopN(top_n) => {
                    if top_n.dimension.trim().is_empty() {
                        issues.push(ValidationIssue::new(
                            format!("{}.dimension", path),
                            "dimension must not be empty",
                        ));
                    }
                    if top_n.limit == 0 {
                        issues.push(ValidationIssue::new(
                            format!("{}.limit", path),
                            "per-group limit must be positive",
                        ));
                    }
                    if let Some(expr) = &top_n.expression {
                        validate_expression(expr, &format!("{}.expression", path), config, &mut issues);
                    }
                }
            }
        }
    }

    if let Some(sorts) = &query.sort_by {
        for (i, spec) in sorts.iter().enumerate() {
            validate_expression(
                &spec.target,
                &format!("sort_by[{}].target", i),
                config,
                &mut issues,
            );
        }
    }

    issues
}

fn validate_filter(
    filter: &Filter,
    path: &str,
    config: &ScreenerConfig,
    issues: &mut Vec<ValidationIssue>,
) {
    match filter {
        Filter::Simple(simple) => {
            validate_expression(&simple.target, &format!("{}.target", path), config, issues);
            validate_expression(&simple.value, &format!("{}.value", path), config, issues);
        }
        Filter::Composite(composite) => {
            validate_composite(composite, path, config, issues);
        }
    }
}

fn validate_composite(
    composite: &CompositeFilter,
    path: &str,
    config: &ScreenerConfig,
    issues: &mut Vec<ValidationIssue>,
) {
    if composite.filters.is_empty() {
        issues.push(ValidationIssue::new(
            format!("{}.filters", path),
            "composite filter requires at least one child",
        ));
    }
    if composite.operator == LogicalOperator::Not && composite.filters.len() != 1 {
        issues.push(ValidationIssue::new(
            format!("{}.filters", path),
            "'not' takes exactly one child filter",
        ));
    }
    for (i, child) in composite.filters.iter().enumerate() {
        validate_filter(child, &format!("{}.filters[{}]", path, i), config, issues);
    }
}

fn validate_expression(
    expr: &Expression,
    path: &str,
    config: &ScreenerConfig,
    issues: &mut Vec<ValidationIssue>,
) {
    match expr {
        Expression::Constant(_) => {}
        Expression::Metric(metric) => {
            if let Some(filter) = &metric.filter {
                validate_filter(filter, &format!("{}.filter", path), config, issues);
            }
        }
        Expression::Math(math) => {
            if math.operands.is_empty() {
                issues.push(ValidationIssue::new(
                    format!("{}.operands", path),
                    "math expression requires at least one operand",
                ));
            }
            for (i, operand) in math.operands.iter().enumerate() {
                validate_expression(operand, &format!("{}.operands[{}]", path, i), config, issues);
            }
        }
        Expression::Aggregate(agg) => {
            if let Some(range) = &agg.time_range {
                validate_time_range(range, &format!("{}.time_range", path), config, issues);
            }
            if let Some(filter) = &agg.filter {
                validate_filter(filter, &format!("{}.filter", path), config, issues);
            }
            validate_expression(&agg.target, &format!("{}.target", path), config, issues);
        }
    }
}

fn validate_time_range(
    range: &TimeRange,
    path: &str,
    config: &ScreenerConfig,
    issues: &mut Vec<ValidationIssue>,
) {
    match range {
        TimeRange::Absolute { from, to } => {
            if from > to {
                issues.push(ValidationIssue::new(path, "'from' must not be after 'to'"));
            }
        }
        TimeRange::Relative { duration, unit, .. } | TimeRange::Trading { duration, unit, .. } => {
            if *duration == 0 {
                issues.push(ValidationIssue::new(
                    format!("{}.duration", path),
                    "duration must be positive",
                ));
            }
            let window_days = i64::from(*duration) * unit.seconds() / 86_400;
            if window_days > i64::from(config.max_timeseries_window) {
                issues.push(ValidationIssue::new(
                    path,
                    format!(
                        "window of {} days exceeds maximum of {} days",
                        window_days, config.max_timeseries_window
                    ),
                ));
            }
        }
    }
}
