//! Benchmark circuit families and the per-circuit metrics scraped from
//! synthesis logs.

use serde::{Deserialize, Serialize};
use std::fmt;

const ARITHMETIC_CIRCUITS: &[&str] = &[
    "log2",
    "square",
    "adder",
    "sin",
    "div",
    "hyp",
    "max",
    "sqrt",
    "multiplier",
    "bar",
    "dft",
    "netcard",
];

const CONTROL_CIRCUITS: &[&str] = &[
    "priority",
    "cavlc",
    "arbiter",
    "i2c",
    "voter",
    "int2float",
    "ctrl",
    "dec",
    "mem_ctrl",
    "router",
];

/// Benchmark suite a circuit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CircuitKind {
    Arithmetic,
    Control,
}

impl CircuitKind {
    /// Canonical reporting order of the circuits in this suite.
    pub fn circuits(self) -> &'static [&'static str] {
        match self {
            Self::Arithmetic => ARITHMETIC_CIRCUITS,
            Self::Control => CONTROL_CIRCUITS,
        }
    }

    /// Directory name the suite uses in synthesis log paths.
    pub fn directory(self) -> &'static str {
        match self {
            Self::Arithmetic => "arithmetic",
            Self::Control => "random_control",
        }
    }

    /// Suite of a known circuit name, if any.
    pub fn of_circuit(name: &str) -> Option<Self> {
        if ARITHMETIC_CIRCUITS.contains(&name) {
            Some(Self::Arithmetic)
        } else if CONTROL_CIRCUITS.contains(&name) {
            Some(Self::Control)
        } else {
            None
        }
    }
}

impl fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arithmetic => write!(f, "arith"),
            Self::Control => write!(f, "control"),
        }
    }
}

/// Metrics for one mapped circuit at one stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitMetrics {
    pub gates: u64,
    pub edges: u64,
    pub level: u32,
    /// Area as estimated by the mapper.
    pub area: f64,
    /// Delay as estimated by the mapper (ps).
    pub delay: f64,
    /// Area reported by NLDM static timing.
    pub nldm_area: f64,
    /// Delay reported by NLDM static timing (ps).
    pub nldm_delay: f64,
}
