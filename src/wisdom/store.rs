// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Learned configurations.

Keys describe a pass independently of any hardware: its size, radix, mode, targets and precision.
Every key carries the cost measured when it was learned, but the cost does not take part in
equality or hashing.
*/

use crate::error::Error;
use crate::parameters::{Mode, Performance, Precision, Target};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Archive format version written by [`WisdomStore::archive`].
pub const ARCHIVE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PassDescriptor {
    pub nx: u32,
    pub ny: u32,
    pub radix: u32,
    pub mode: Mode,
    pub input_target: Target,
    pub output_target: Target,
    pub precision: Precision,
}

impl PassDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        nx: u32,
        ny: u32,
        radix: u32,
        mode: Mode,
        input_target: Target,
        output_target: Target,
        precision: Precision,
    ) -> Self {
        PassDescriptor {
            nx,
            ny,
            radix,
            mode,
            input_target,
            output_target,
            precision,
        }
    }

    /// The same pass with different targets.
    pub const fn with_targets(self, input_target: Target, output_target: Target) -> Self {
        PassDescriptor {
            input_target,
            output_target,
            ..self
        }
    }
}

/// A wisdom key with its learned cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WisdomPass {
    pub pass: PassDescriptor,
    /// Seconds per dispatch of the best configuration.
    pub cost: f64,
}

impl WisdomPass {
    pub const fn new(pass: PassDescriptor) -> Self {
        WisdomPass { pass, cost: 0.0 }
    }
}

impl PartialEq for WisdomPass {
    fn eq(&self, other: &Self) -> bool {
        self.pass == other.pass
    }
}

impl Eq for WisdomPass {}

//must hash exactly like PassDescriptor so lookups can borrow
impl Hash for WisdomPass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pass.hash(state);
    }
}

impl Borrow<PassDescriptor> for WisdomPass {
    fn borrow(&self) -> &PassDescriptor {
        &self.pass
    }
}

#[derive(Serialize, Deserialize)]
struct ArchiveEntry {
    pass: PassDescriptor,
    cost: f64,
    performance: Performance,
}

#[derive(Serialize, Deserialize)]
struct Archive {
    version: u32,
    entries: Vec<ArchiveEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct WisdomStore {
    library: HashMap<WisdomPass, Performance>,
}

impl WisdomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pass: &PassDescriptor) -> Option<(&WisdomPass, &Performance)> {
        self.library.get_key_value(pass)
    }

    /// Stores `performance` for `pass`, replacing both the configuration and the cost of an
    /// existing entry.
    pub fn insert(&mut self, pass: WisdomPass, performance: Performance) {
        //HashMap::insert keeps the old key, which would keep the old cost
        self.library.remove(&pass.pass);
        self.library.insert(pass, performance);
    }

    pub fn len(&self) -> usize {
        self.library.len()
    }

    pub fn is_empty(&self) -> bool {
        self.library.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WisdomPass, &Performance)> {
        self.library.iter()
    }

    /// Serializes the store to JSON.  Entries are sorted by key.
    pub fn archive(&self) -> Result<String, Error> {
        let mut entries: Vec<ArchiveEntry> = self
            .library
            .iter()
            .map(|(pass, performance)| ArchiveEntry {
                pass: pass.pass,
                cost: pass.cost,
                performance: *performance,
            })
            .collect();
        entries.sort_by(|a, b| a.pass.cmp(&b.pass));
        let archive = Archive {
            version: ARCHIVE_VERSION,
            entries,
        };
        Ok(serde_json::to_string_pretty(&archive)?)
    }

    /**
    Merges an archive produced by [`WisdomStore::archive`].

    Entries in the archive overwrite existing entries with the same key.  Nothing is merged if
    the archive is malformed or has an unknown version.
    */
    pub fn extract(&mut self, json: &str) -> Result<(), Error> {
        let archive: Archive = serde_json::from_str(json)?;
        if archive.version != ARCHIVE_VERSION {
            return Err(Error::UnsupportedArchiveVersion(archive.version));
        }
        let count = archive.entries.len() as u64;
        for entry in archive.entries {
            self.insert(
                WisdomPass {
                    pass: entry.pass,
                    cost: entry.cost,
                },
                entry.performance,
            );
        }
        logwise::info_sync!("Extracted {count} wisdom entries", count = count);
        Ok(())
    }
}
