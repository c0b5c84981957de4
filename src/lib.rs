use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub mod alloc;
pub mod error;
pub mod harness;
pub mod metrics;
pub mod region;
pub mod schema;
pub mod stats;

/// String-building strategy to benchmark.
#[derive(
    Clone, Copy, Debug, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Lazy map to per-line strings, then join.
    LazyJoin,
    /// Imperative formatting into a single growing buffer.
    Piecewise,
    /// Imperative append of one interpolated string per line.
    Interpolation,
    /// Imperative append of explicitly concatenated temporaries.
    Temporaries,
    /// Fold with one interpolated string per line.
    FoldInterpolation,
    /// Fold with explicitly concatenated temporaries.
    FoldTemporaries,
}

impl Variant {
    pub const ALL: [Variant; 6] = [
        Variant::LazyJoin,
        Variant::Piecewise,
        Variant::Interpolation,
        Variant::Temporaries,
        Variant::FoldInterpolation,
        Variant::FoldTemporaries,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::LazyJoin => "lazy-join",
            Variant::Piecewise => "piecewise",
            Variant::Interpolation => "interpolation",
            Variant::Temporaries => "temporaries",
            Variant::FoldInterpolation => "fold-interpolation",
            Variant::FoldTemporaries => "fold-temporaries",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Variant::LazyJoin => "map each element to a String, collect, join",
            Variant::Piecewise => "write! each element into one growing String",
            Variant::Interpolation => "push_str(&format!(..)) per element",
            Variant::Temporaries => "push_str(&(i.to_string() + \"\\n\")) per element",
            Variant::FoldInterpolation => "fold, acc + &format!(..) per element",
            Variant::FoldTemporaries => "fold, acc + &i.to_string() + \"\\n\" per element",
        }
    }

    pub fn workload(&self) -> fn(&[u64]) -> String {
        use crate::benches::strings;
        match self {
            Variant::LazyJoin => strings::lazy_join,
            Variant::Piecewise => strings::piecewise,
            Variant::Interpolation => strings::interpolation,
            Variant::Temporaries => strings::temporaries,
            Variant::FoldInterpolation => strings::fold_interpolation,
            Variant::FoldTemporaries => strings::fold_temporaries,
        }
    }
}
