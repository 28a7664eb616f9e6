// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Workgroup geometry of a single pass.

use crate::error::ConfigError;
use crate::parameters::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkGroupSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// A pass with its launch shape resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Radix {
    pub size: WorkGroupSize,
    pub workgroups_x: u32,
    pub workgroups_y: u32,
    pub radix: u32,
    pub vector_size: u32,
    pub shared_banked: bool,
}

impl Radix {
    pub fn is_dispatchable(&self) -> bool {
        self.workgroups_x > 0 && self.workgroups_y > 0
    }
}

/// Moves as much of `divisor` as possible out of `wg_size`.
fn reduce(wg_size: &mut u32, divisor: &mut u32) {
    if *divisor <= 1 || *wg_size == 0 {
        return;
    }
    if *wg_size >= *divisor {
        *wg_size /= *divisor;
        *divisor = 1;
    } else {
        *divisor /= *wg_size;
        *wg_size = 1;
    }
}

/// Radix 16 and 64 kernels run 4 and 8 invocations per butterfly in z.
pub(crate) const fn radix_to_wg_z(radix: u32) -> u32 {
    match radix {
        16 => 4,
        64 => 8,
        _ => 1,
    }
}

fn div(n: u32, d: u32) -> u32 {
    n.checked_div(d).unwrap_or(0)
}

/**
Resolves the launch shape for a radix pass.

The z size is folded into y and then x so the total invocation count stays at `x * y`.  Resolve
modes ignore radix, vector size and banking.
*/
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_radix(
    nx: u32,
    ny: u32,
    mode: Mode,
    vector_size: u32,
    shared_banked: bool,
    radix: u32,
    mut size: WorkGroupSize,
    pow2_stride: bool,
) -> Result<Radix, ConfigError> {
    if ny == 1 && size.y > 1 {
        return Err(ConfigError::WorkgroupYMustBeOne);
    }

    let mut divisor = size.z;
    reduce(&mut size.y, &mut divisor);
    reduce(&mut size.x, &mut divisor);

    let scalars = |components: u32| {
        nx.checked_mul(components)
            .ok_or(ConfigError::SizeOverflow { nx, ny })
    };
    let mut vector_size = vector_size;
    let (workgroups_x, workgroups_y) = match mode {
        Mode::Vertical => (
            // 2^n + 1 columns with a padded stride: one extra group covers the tail.
            div(scalars(2)?, vector_size * size.x) + u32::from(pow2_stride),
            div(ny, size.y * radix),
        ),
        Mode::VerticalDual => {
            vector_size = vector_size.max(4);
            (div(scalars(4)?, vector_size * size.x), div(ny, size.y * radix))
        }
        Mode::Horizontal => (div(scalars(2)?, vector_size * radix * size.x), div(ny, size.y)),
        Mode::HorizontalDual => {
            vector_size = vector_size.max(4);
            (div(scalars(4)?, vector_size * radix * size.x), div(ny, size.y))
        }
        Mode::ResolveRealToComplex | Mode::ResolveComplexToReal => {
            return Ok(build_resolve_radix(nx, ny, size));
        }
    };

    Ok(Radix {
        size,
        workgroups_x,
        workgroups_y,
        radix,
        vector_size,
        shared_banked,
    })
}

pub(crate) fn build_resolve_radix(nx: u32, ny: u32, size: WorkGroupSize) -> Radix {
    Radix {
        size,
        workgroups_x: div(nx, size.x),
        workgroups_y: div(ny, size.y),
        radix: 2,
        vector_size: 2,
        shared_banked: false,
    }
}

/// Large workgroups cannot always cover small transforms.
pub(crate) fn is_radix_valid(
    nx: u32,
    ny: u32,
    mode: Mode,
    vector_size: u32,
    radix: u32,
    size: WorkGroupSize,
    pow2_stride: bool,
) -> bool {
    build_radix(nx, ny, mode, vector_size, false, radix, size, pow2_stride)
        .map(|r| r.is_dispatchable())
        .unwrap_or(false)
}
