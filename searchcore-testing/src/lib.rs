#![forbid(invalid_value, overflowing_literals, unconditional_recursion, unsafe_code)]
#![deny(
    bad_style,
    deprecated,
    meta_variable_misuse,
    non_ascii_idents,
    rust_2018_idioms,
    unreachable_code,
    unused_must_use
)]

//! Fault injection for exercising the `SearchCore` request engine.
//!
//! - [`scripted`]: deterministic per-verb fault scripts, including lost
//!   acknowledgements, with call counters
//! - [`chaos`]: probabilistic transient faults with a seedable RNG

pub mod chaos;
pub mod scripted;

pub use chaos::{ChaosCluster, ChaosClusterExt, ChaosConfig, Probability, ProbabilityError};
pub use scripted::{Fault, ScriptedCluster};
