//! Label tiers: the future-usefulness horizons a clause is measured over.

use serde::{Deserialize, Serialize};

/// A label horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Uses within the short window.
    Short,
    /// Uses within the long window.
    Long,
    /// Uses until the clause leaves the solver.
    Forever,
    /// Uses until the clause leaves the solver, per elapsed conflict.
    ForeverDiv,
}

impl Tier {
    /// All tiers in processing order.
    pub const ALL: [Tier; 4] = [Tier::Short, Tier::Long, Tier::Forever, Tier::ForeverDiv];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Long => "long",
            Self::Forever => "forever",
            Self::ForeverDiv => "forever_div",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "short" => Some(Self::Short),
            "long" => Some(Self::Long),
            "forever" => Some(Self::Forever),
            "forever_div" => Some(Self::ForeverDiv),
            _ => None,
        }
    }

    /// Table holding this tier's materialized labels.
    pub fn label_table(&self) -> &'static str {
        match self {
            Self::Short => "used_later_short",
            Self::Long => "used_later_long",
            Self::Forever => "used_later_forever",
            Self::ForeverDiv => "used_later_forever_div",
        }
    }

    /// Name of the label column in an extracted dataset.
    pub fn label_column(&self) -> &'static str {
        match self {
            Self::Short => "x.used_later_short",
            Self::Long => "x.used_later_long",
            Self::Forever => "x.used_later_forever",
            Self::ForeverDiv => "x.used_later_forever_div",
        }
    }

    /// Name of the percentile bucket column in an extracted dataset.
    pub fn percentile_column(&self) -> &'static str {
        match self {
            Self::Short => "x.used_later_short_topperc",
            Self::Long => "x.used_later_long_topperc",
            Self::Forever => "x.used_later_forever_topperc",
            Self::ForeverDiv => "x.used_later_forever_div_topperc",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
