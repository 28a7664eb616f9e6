// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Splitting one dimension of a transform into radix passes.

Each supported radix gets a cost, either learned or a rough estimate that deliberately overshoots
so learned radices are preferred.  The cheapest combination of radices that multiplies out to the
dimension is found by dynamic programming over `log2` sizes.
*/

use super::radix::{Radix, WorkGroupSize, build_radix, is_radix_valid, radix_to_wg_z};
use crate::error::ConfigError;
use crate::parameters::{Mode, Options, Target};
use crate::wisdom::{PassDescriptor, Wisdom};

/// Radices with kernels, as `log2`.  32 is only reachable as a composite.
const RADIX_LOG2: [usize; 4] = [2, 3, 4, 6];

#[derive(Debug, Clone, Default)]
struct CostPropagate {
    /// Zero means "no way to build this size".
    cost: f64,
    radices: Vec<u32>,
}

impl CostPropagate {
    fn merge_if_better(&mut self, a: &CostPropagate, b: &CostPropagate) {
        let new_cost = a.cost + b.cost;
        if (self.cost == 0.0 || new_cost < self.cost) && a.cost != 0.0 && b.cost != 0.0 {
            self.cost = new_cost;
            self.radices = a.radices.iter().chain(&b.radices).copied().collect();
        }
    }
}

fn find_cost(nx: u32, ny: u32, mode: Mode, radix: u32, options: &Options, wisdom: &Wisdom) -> f64 {
    let pass = PassDescriptor::new(nx, ny, radix, mode, Target::Ssbo, Target::Ssbo, options.precision);
    match wisdom.find_optimal_options(&pass) {
        Some((key, _)) => key.cost,
        None => f64::from(nx) * f64::from(ny) * (f64::from(radix).log2() + 2.0),
    }
}

/**
Plans the passes for the dimension `mode` transforms.

Returns no passes for resolve modes and for dimensions of size 1.  The planned cost is added to
`accumulate_cost`.
*/
#[allow(clippy::too_many_arguments)]
pub(crate) fn split_radices(
    nx: u32,
    ny: u32,
    mode: Mode,
    input_target: Target,
    output_target: Target,
    options: &Options,
    pow2_stride: bool,
    wisdom: &Wisdom,
    accumulate_cost: &mut f64,
) -> Result<Vec<Radix>, ConfigError> {
    let n = match mode {
        Mode::Vertical | Mode::VerticalDual => ny,
        Mode::Horizontal | Mode::HorizontalDual => nx,
        Mode::ResolveRealToComplex | Mode::ResolveComplexToReal => return Ok(Vec::new()),
    };
    if n == 1 {
        return Ok(Vec::new());
    }

    let ssbo_pass = |radix: u32| {
        PassDescriptor::new(nx, ny, radix, mode, Target::Ssbo, Target::Ssbo, options.precision)
    };

    let mut cost_propagate: Vec<CostPropagate> = vec![CostPropagate::default(); 32];
    for log2 in RADIX_LOG2 {
        let radix = 1u32 << log2;
        let opt = wisdom.find_optimal_options_or_default(&ssbo_pass(radix), options);
        // pow2_stride could round a hopeless workgroup up to one group, so test without it
        let valid = is_radix_valid(
            nx,
            ny,
            mode,
            opt.vector_size,
            radix,
            WorkGroupSize {
                x: opt.workgroup_size_x,
                y: opt.workgroup_size_y,
                z: radix_to_wg_z(radix),
            },
            false,
        );
        if valid {
            cost_propagate[log2] = CostPropagate {
                cost: find_cost(nx, ny, mode, radix, options, wisdom),
                radices: vec![radix],
            };
        }
    }

    let log2_n = n.trailing_zeros() as usize;
    for i in 4..=log2_n {
        let mut target = cost_propagate[i].clone();
        let mut r = 2;
        while i - r >= r {
            target.merge_if_better(&cost_propagate[r], &cost_propagate[i - r]);
            r += 1;
        }
        if i == log2_n && target.cost == 0.0 {
            return Err(ConfigError::NoSubdivision { size: n });
        }
        cost_propagate[i] = target;
    }

    let best = std::mem::take(&mut cost_propagate[log2_n]);
    let mut radices = best.radices;
    // composite radices only need p factors of their halves, so order does not change cost
    radices.sort_unstable_by(|a, b| b.cmp(a));
    if radices.iter().product::<u32>() != n {
        return Err(ConfigError::InvalidRadixSplit { size: n });
    }

    let count = radices.len();
    let mut out = Vec::with_capacity(count);
    for (i, &radix) in radices.iter().enumerate() {
        let first = i == 0;
        let last = i + 1 == count;
        // Ssbo to Ssbo wisdom picked the split; the first and last passes may have better
        // target-specific wisdom
        let orig = wisdom.find_optimal_options_or_default(&ssbo_pass(radix), options);
        let pass = ssbo_pass(radix).with_targets(
            if first { input_target } else { Target::Ssbo },
            if last { output_target } else { Target::Ssbo },
        );
        let opts =
            wisdom.find_optimal_options_or_default(&pass, &Options::new(orig, options.precision));
        out.push(build_radix(
            nx,
            ny,
            mode,
            opts.vector_size,
            opts.shared_banked,
            radix,
            WorkGroupSize {
                x: opts.workgroup_size_x,
                y: opts.workgroup_size_y,
                z: radix_to_wg_z(radix),
            },
            pow2_stride,
        )?);
    }

    *accumulate_cost += best.cost;
    Ok(out)
}
