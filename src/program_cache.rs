// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Compiled programs keyed by [`Parameters`].

A cache lives for one planning session.  It never evicts; dropping it releases every program
that no pass object still holds.
*/

use crate::device::{Program, RawHandle};
use crate::parameters::Parameters;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: HashMap<Parameters, Arc<Program>>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw handle of the program built for `parameters`, if any.
    pub fn find_program(&self, parameters: &Parameters) -> Option<RawHandle> {
        self.programs.get(parameters).and_then(|p| p.get())
    }

    /// Shared ownership of the program built for `parameters`.
    pub fn program(&self, parameters: &Parameters) -> Option<Arc<Program>> {
        self.programs.get(parameters).cloned()
    }

    /**
    Inserts `program`, taking ownership.

    A previous program for the same key is dropped here.  Its handle is released once the last
    pass object sharing it goes away.
    */
    pub fn insert_program(&mut self, parameters: Parameters, program: Program) -> Arc<Program> {
        let program = Arc::new(program);
        if self
            .programs
            .insert(parameters, program.clone())
            .is_some()
        {
            logwise::trace_sync!(
                "ProgramCache: replaced program for {parameters}",
                parameters = logwise::privacy::LogIt(&parameters)
            );
        }
        program
    }

    pub fn cache_size(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
