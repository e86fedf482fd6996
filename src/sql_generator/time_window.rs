//! Time-window helpers: PREWHERE pruning, range ranking, date rendering.

use chrono::DateTime;

use crate::compute_graph::{ComputeGraph, NodeKind};
use crate::screener_query::{Expression, TimeRange, TimeUnit};

/// Comparable size of a range in seconds. Trading windows count rows, not
/// calendar time, so they are scaled by ad-hoc multipliers (hour x3,
/// day x1.5, week x1.3) kept for compatibility with historical output.
pub fn range_seconds(range: &TimeRange) -> i64 {
    match range {
        TimeRange::Absolute { from, to } => to - from,
        TimeRange::Relative { duration, unit, .. } => i64::from(*duration) * unit.seconds(),
        TimeRange::Trading { duration, unit, .. } => {
            let base = i64::from(*duration) * unit.seconds();
            let multiplier = match unit {
                TimeUnit::Hour => 3.0,
                TimeUnit::Day => 1.5,
                TimeUnit::Week => 1.3,
                _ => 1.0,
            };
            (base as f64 * multiplier) as i64
        }
    }
}

/// Every time range attached to an aggregate expression node.
pub fn collect_time_ranges(graph: &ComputeGraph) -> Vec<TimeRange> {
    graph
        .nodes()
        .filter_map(|node| match &node.kind {
            NodeKind::Expression(e) => match &e.expression {
                Expression::Aggregate(agg) => agg.time_range.clone(),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// Number of distinct ranges (bounds included) in the graph.
pub fn distinct_time_range_count(graph: &ComputeGraph) -> usize {
    let mut seen: Vec<TimeRange> = Vec::new();
    for range in collect_time_ranges(graph) {
        if !seen.contains(&range) {
            seen.push(range);
        }
    }
    seen.len()
}

/// The widest range across the whole graph, by [`range_seconds`].
pub fn largest_time_range(graph: &ComputeGraph) -> Option<TimeRange> {
    collect_time_ranges(graph)
        .into_iter()
        .max_by_key(range_seconds)
}

/// Coarse PREWHERE prune on the scan's time column. Absolute ranges get a
/// one-day leeway on the lower bound so `from` stays inclusive under date
/// truncation.
pub fn prewhere_clause(range: &TimeRange, time_column: &str, time_format: &str) -> String {
    match range {
        TimeRange::Relative { duration, unit, .. }
        | TimeRange::Trading { duration, unit, .. } => format!(
            "{} >= toDate(date_sub(now(), INTERVAL {} {}))",
            time_column,
            duration,
            unit.sql_keyword()
        ),
        TimeRange::Absolute { from, to } => format!(
            "{} BETWEEN toDate('{}') AND toDate('{}')",
            time_column,
            format_date(from - 86_400, time_format),
            format_date(*to, time_format)
        ),
    }
}

/// In-query date predicate for an aggregate's window (no leeway here).
pub fn range_predicate(range: &TimeRange, time_column: &str, time_format: &str) -> Option<String> {
    match range {
        TimeRange::Relative { duration, unit, .. } => Some(format!(
            "{} >= date_sub(now(), INTERVAL {} {})",
            time_column,
            duration,
            unit.sql_keyword()
        )),
        TimeRange::Absolute { from, to } => Some(format!(
            "{} BETWEEN toDate('{}') AND toDate('{}')",
            time_column,
            format_date(*from, time_format),
            format_date(*to, time_format)
        )),
        // Trading windows are row-count frames; no calendar predicate.
        TimeRange::Trading { .. } => None,
    }
}

pub fn format_date(unix_seconds: i64, time_format: &str) -> String {
    DateTime::from_timestamp(unix_seconds, 0)
        .map(|dt| dt.date_naive().format(time_format).to_string())
        .unwrap_or_else(|| unix_seconds.to_string())
}
