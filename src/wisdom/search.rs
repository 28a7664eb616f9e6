// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The search space and benchmark budget.

Both are plain data so tests and callers can substitute their own.
*/

use super::static_wisdom::StaticWisdom;
use super::store::PassDescriptor;
use crate::parameters::Performance;
use std::str::FromStr;

/// Candidate values the learner enumerates, in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpace {
    pub shared_banked: Vec<bool>,
    pub vector_sizes: Vec<u32>,
    pub workgroup_sizes_x: Vec<u32>,
    pub workgroup_sizes_y: Vec<u32>,
    /// Radices covered by exhaustive learning.
    pub radices: Vec<u32>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        SearchSpace {
            shared_banked: vec![false, true],
            vector_sizes: vec![2, 4, 8],
            workgroup_sizes_x: vec![4, 8, 16, 32, 64, 128, 256],
            workgroup_sizes_y: vec![1, 2, 4, 8],
            radices: vec![4, 8, 16, 64],
        }
    }
}

impl SearchSpace {
    /**
    Every configuration worth measuring for `pass` on hardware bounded by `bounds`.

    Order is banking, then vector size, then workgroup x, then workgroup y.  The learner keeps the
    first of equally fast candidates, so this order decides ties.
    */
    pub fn candidates(&self, pass: &PassDescriptor, bounds: &StaticWisdom) -> Vec<Performance> {
        let mut out = Vec::new();
        for &shared_banked in &self.shared_banked {
            for &vector_size in &self.vector_sizes {
                for &workgroup_size_x in &self.workgroup_sizes_x {
                    for &workgroup_size_y in &self.workgroup_sizes_y {
                        let candidate = Performance {
                            workgroup_size_x,
                            workgroup_size_y,
                            vector_size,
                            shared_banked,
                        };
                        if is_candidate(pass, bounds, &candidate) {
                            out.push(candidate);
                        }
                    }
                }
            }
        }
        out
    }
}

/// Pruning rules, checked in order.
pub fn is_candidate(pass: &PassDescriptor, bounds: &StaticWisdom, candidate: &Performance) -> bool {
    let resolve = pass.mode.is_resolve();
    let dual = pass.mode.is_dual();
    let banked = candidate.shared_banked;
    let vector_size = candidate.vector_size;

    // banking only matters for the shared memory radices
    if pass.radix < 16 && banked {
        return false;
    }
    if pass.radix >= 16 && !bounds.shared_banked.admits(banked) {
        return false;
    }
    if resolve && (vector_size != 2 || banked) {
        return false;
    }
    if vector_size == 8 && !pass.precision.is_full_fp16() {
        return false;
    }
    // dual kernels bump the vector size to 4 anyway
    if dual && vector_size < 4 {
        return false;
    }

    let workgroup_size = candidate
        .workgroup_size_x
        .saturating_mul(candidate.workgroup_size_y);
    if workgroup_size > bounds.max_workgroup_size
        || workgroup_size < bounds.min_workgroup_size_for(pass.radix)
    {
        return false;
    }
    if pass.ny == 1 && candidate.workgroup_size_y > 1 {
        return false;
    }

    let (min_vector_size, max_vector_size) = if dual {
        (bounds.min_vector_size.max(4), bounds.max_vector_size.max(4))
    } else {
        (bounds.min_vector_size, bounds.max_vector_size)
    };
    resolve || (min_vector_size..=max_vector_size).contains(&vector_size)
}

/**
How long each candidate is measured.

Iterations stop early once `timeout` seconds have elapsed, but the first iteration always runs.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchParams {
    pub warmup: u32,
    pub iterations: u32,
    pub dispatches: u32,
    pub timeout: f64,
}

impl Default for BenchParams {
    fn default() -> Self {
        BenchParams {
            warmup: 2,
            iterations: 20,
            dispatches: 50,
            timeout: 1.0,
        }
    }
}

impl BenchParams {
    /// Iterations and dispatches are raised to at least 1.
    pub fn new(warmup: u32, iterations: u32, dispatches: u32, timeout: f64) -> Self {
        BenchParams {
            warmup,
            iterations: iterations.max(1),
            dispatches: dispatches.max(1),
            timeout,
        }
    }

    /**
    Reads overrides from `FFT_WISDOM_WARMUP`, `FFT_WISDOM_ITERATIONS`, `FFT_WISDOM_DISPATCHES`
    and `FFT_WISDOM_TIMEOUT`.

    Unset or unparsable variables keep their default.
    */
    pub fn from_env_or_default() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Like [`BenchParams::from_env_or_default`], reading variables through `lookup`.
    pub fn from_vars(lookup: impl Fn(&'static str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self::new(
            var_or(&lookup, "FFT_WISDOM_WARMUP", defaults.warmup),
            var_or(&lookup, "FFT_WISDOM_ITERATIONS", defaults.iterations),
            var_or(&lookup, "FFT_WISDOM_DISPATCHES", defaults.dispatches),
            var_or(&lookup, "FFT_WISDOM_TIMEOUT", defaults.timeout),
        )
    }
}

fn var_or<T: FromStr + Copy>(
    lookup: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
    default: T,
) -> T {
    match lookup(name) {
        Some(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                logwise::warn_sync!(
                    "Ignoring unparsable {name}={value}",
                    name = name,
                    value = value.clone()
                );
                default
            }
        },
        None => default,
    }
}
