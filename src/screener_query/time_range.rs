use serde::{Deserialize, Serialize};

/// Calendar unit for relative and trading time ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    /// Nominal length in seconds (months are 30 days, years 365).
    pub fn seconds(&self) -> i64 {
        match self {
            TimeUnit::Second => 1,
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 3_600,
            TimeUnit::Day => 86_400,
            TimeUnit::Week => 604_800,
            TimeUnit::Month => 2_592_000,
            TimeUnit::Year => 31_536_000,
        }
    }

    /// ClickHouse INTERVAL keyword.
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            TimeUnit::Second => "SECOND",
            TimeUnit::Minute => "MINUTE",
            TimeUnit::Hour => "HOUR",
            TimeUnit::Day => "DAY",
            TimeUnit::Week => "WEEK",
            TimeUnit::Month => "MONTH",
            TimeUnit::Year => "YEAR",
        }
    }

    /// Short suffix used in generated aliases (`30d`, `2w`).
    pub fn short(&self) -> &'static str {
        match self {
            TimeUnit::Second => "s",
            TimeUnit::Minute => "m",
            TimeUnit::Hour => "h",
            TimeUnit::Day => "d",
            TimeUnit::Week => "w",
            TimeUnit::Month => "mo",
            TimeUnit::Year => "y",
        }
    }
}

/// Time window attached to an aggregate expression.
///
/// `Trading` shares the shape of `Relative` but means trading-calendar
/// semantics: the window is a row count over trading rows, not a calendar
/// interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimeRange {
    Absolute {
        from: i64,
        to: i64,
    },
    Relative {
        duration: u32,
        unit: TimeUnit,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<i64>,
    },
    Trading {
        duration: u32,
        unit: TimeUnit,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<i64>,
    },
}

impl TimeRange {
    /// True when both ranges are the same variant, regardless of bounds.
    pub fn same_kind(&self, other: &TimeRange) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, TimeRange::Relative { .. })
    }

    pub fn is_trading(&self) -> bool {
        matches!(self, TimeRange::Trading { .. })
    }

    /// Compact suffix for auto-generated aliases: `30d` for relative and
    /// trading windows, `<from>_<to>` for absolute ones.
    pub fn range_alias(&self) -> String {
        match self {
            TimeRange::Absolute { from, to } => format!("{}_{}", from, to),
            TimeRange::Relative { duration, unit, .. }
            | TimeRange::Trading { duration, unit, .. } => {
                format!("{}{}", duration, unit.short())
            }
        }
    }
}
