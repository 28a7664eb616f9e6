// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Hardware-class bounds for the search.

A [`HardwareTable`] maps renderer names to [`StaticWisdom`] profiles.  The built-in table knows
three GPU families; callers can supply their own.
*/

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tristate {
    False,
    True,
    #[default]
    DontCare,
}

impl Tristate {
    /// Whether `value` is compatible with this preference.
    pub const fn admits(self, value: bool) -> bool {
        match self {
            Tristate::DontCare => true,
            Tristate::True => value,
            Tristate::False => !value,
        }
    }
}

/**
Bounds the search is allowed to explore.

The default is all zero.  Zero bounds admit no workgroup size, so a search on unknown hardware
only measures the default configuration.  Use [`StaticWisdom::unconstrained`] to search everything
instead.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StaticWisdom {
    pub min_workgroup_size: u32,
    /// Minimum workgroup size for radix 16 and 64, which use shared memory.
    pub min_workgroup_size_shared: u32,
    pub max_workgroup_size: u32,
    pub min_vector_size: u32,
    pub max_vector_size: u32,
    pub shared_banked: Tristate,
}

impl StaticWisdom {
    pub const fn unconstrained() -> Self {
        StaticWisdom {
            min_workgroup_size: 1,
            min_workgroup_size_shared: 1,
            max_workgroup_size: u32::MAX,
            min_vector_size: 2,
            max_vector_size: 8,
            shared_banked: Tristate::DontCare,
        }
    }

    /// Minimum workgroup size for a pass of `radix`.
    pub const fn min_workgroup_size_for(&self, radix: u32) -> u32 {
        if radix >= 16 {
            self.min_workgroup_size_shared
        } else {
            self.min_workgroup_size
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkgroupCeiling {
    Fixed(u32),
    /// The smaller of this and the platform's maximum invocations.
    PlatformCapped(u32),
}

impl WorkgroupCeiling {
    pub const fn resolve(self, platform_max: u32) -> u32 {
        match self {
            WorkgroupCeiling::Fixed(v) => v,
            WorkgroupCeiling::PlatformCapped(v) => {
                if platform_max < v {
                    platform_max
                } else {
                    v
                }
            }
        }
    }
}

/// One row of a [`HardwareTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareFamily {
    /// Case-sensitive substring of the renderer name.
    pub name: String,
    pub min_workgroup_size: u32,
    pub min_workgroup_size_shared: u32,
    pub max_workgroup_size: WorkgroupCeiling,
    pub min_vector_size: u32,
    pub max_vector_size: u32,
    pub shared_banked: Tristate,
}

impl HardwareFamily {
    pub fn profile(&self, max_compute_invocations: u32) -> StaticWisdom {
        StaticWisdom {
            min_workgroup_size: self.min_workgroup_size,
            min_workgroup_size_shared: self.min_workgroup_size_shared,
            max_workgroup_size: self.max_workgroup_size.resolve(max_compute_invocations),
            min_vector_size: self.min_vector_size,
            max_vector_size: self.max_vector_size,
            shared_banked: self.shared_banked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareTable {
    families: Vec<HardwareFamily>,
}

impl Default for HardwareTable {
    fn default() -> Self {
        HardwareTable {
            families: vec![
                HardwareFamily {
                    name: "GeForce".to_string(),
                    // warp
                    min_workgroup_size: 32,
                    min_workgroup_size_shared: 32,
                    max_workgroup_size: WorkgroupCeiling::PlatformCapped(256),
                    min_vector_size: 2,
                    max_vector_size: 2,
                    shared_banked: Tristate::True,
                },
                HardwareFamily {
                    name: "Radeon".to_string(),
                    // GCN wavefront
                    min_workgroup_size: 64,
                    min_workgroup_size_shared: 128,
                    max_workgroup_size: WorkgroupCeiling::PlatformCapped(256),
                    min_vector_size: 2,
                    max_vector_size: 4,
                    shared_banked: Tristate::True,
                },
                HardwareFamily {
                    name: "Mali".to_string(),
                    min_workgroup_size: 4,
                    min_workgroup_size_shared: 4,
                    max_workgroup_size: WorkgroupCeiling::Fixed(64),
                    min_vector_size: 4,
                    max_vector_size: 4,
                    shared_banked: Tristate::False,
                },
            ],
        }
    }
}

impl HardwareTable {
    pub fn new(families: Vec<HardwareFamily>) -> Self {
        HardwareTable { families }
    }

    pub fn empty() -> Self {
        HardwareTable {
            families: Vec::new(),
        }
    }

    /// Appends a family.  Earlier families win.
    pub fn with_family(mut self, family: HardwareFamily) -> Self {
        self.families.push(family);
        self
    }

    pub fn families(&self) -> &[HardwareFamily] {
        &self.families
    }

    pub fn find(&self, renderer: &str) -> Option<&HardwareFamily> {
        self.families
            .iter()
            .find(|f| renderer.contains(f.name.as_str()))
    }

    /// Derives bounds for `renderer`.  Unknown renderers get all-zero bounds.
    pub fn static_wisdom(&self, renderer: &str, max_compute_invocations: u32) -> StaticWisdom {
        match self.find(renderer) {
            Some(family) => {
                logwise::info_sync!(
                    "Detected {family} GPU",
                    family = family.name.clone()
                );
                family.profile(max_compute_invocations)
            }
            None => {
                logwise::warn_sync!(
                    "No static wisdom for renderer {renderer}; only default options will be measured",
                    renderer = renderer.to_string()
                );
                StaticWisdom::default()
            }
        }
    }
}
