//! The Program Table: the compile-time directory of programs that the
//! builder (`pm-builder`) populates and the runtime (`pm-runtime`) reads.
//!
//! Construction happens in three phases: programs and their triggers are
//! declared (`create_program`/`create_trigger`/`done_program`), frequency
//! statistics are optionally attached (`define_event_frequency`), and then
//! `optimize` rewrites the table once, in place, before it is handed to a
//! state machine. After `optimize` the table is immutable.

pub mod compile;
mod error;
mod optimize;

use std::collections::HashMap;

use pm_events::EventHandle;
use pm_model::{ActionSlotDef, Program, Trigger};

pub use compile::{compile_join_op, CompiledJoin, JoinMember};
pub use error::BuildError;
pub use optimize::{OptimizeOptions, Statistics};

/// The compile-time program directory.
#[derive(Debug, Default)]
pub struct ProgramTable {
    programs: Vec<Program>,
    done: Vec<bool>,
    event_frequency: HashMap<u32, u32>,
    statistics: Option<Statistics>,
}

impl ProgramTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a frequency statistic with `event`, consulted by
    /// `optimize`'s key-event selection.
    pub fn define_event_frequency(&mut self, event: EventHandle, freq: u32) {
        self.event_frequency.insert(event.packed(), freq);
    }

    /// Convenience wrapper for tokenizer-side document-frequency tables:
    /// equivalent to `define_event_frequency(EventHandle::Term(term_id), df)`.
    pub fn define_term_frequency(&mut self, term_id: u32, df: u32) -> Result<(), BuildError> {
        let handle = EventHandle::new(pm_events::EventKind::Term, term_id)
            .map_err(|e| BuildError::EventHandleOverflow { idx: e.idx })?;
        self.define_event_frequency(handle, df);
        Ok(())
    }

    /// Register a new program with `range` and its initial slot
    /// definition. Returns the dense `program_id` used in every subsequent
    /// call referring to this program.
    pub fn create_program(&mut self, range: u32, slot: ActionSlotDef) -> u32 {
        let id = self.programs.len() as u32;
        self.programs.push(Program::new(id, range, slot));
        self.done.push(false);
        tracing::trace!(target: "pm.table", program_id = id, range, "program_created");
        id
    }

    /// Append a trigger to `program_id`. Fails if the program was already
    /// finalized with `done_program`.
    pub fn create_trigger(&mut self, program_id: u32, trigger: Trigger) -> Result<(), BuildError> {
        self.check_open(program_id)?;
        self.programs[program_id as usize].triggers.push(trigger);
        Ok(())
    }

    /// Finalize `program_id`: no further triggers may be added.
    pub fn done_program(&mut self, program_id: u32) -> Result<(), BuildError> {
        self.check_open(program_id)?;
        self.done[program_id as usize] = true;
        tracing::trace!(target: "pm.table", program_id, "program_done");
        Ok(())
    }

    /// Override a program's fire-event and result-handle after creation.
    pub fn define_program_result(
        &mut self,
        program_id: u32,
        event_on_fire: EventHandle,
        result_handle: u32,
    ) -> Result<(), BuildError> {
        let program = self.program_mut(program_id)?;
        program.slot.event_on_fire = event_on_fire;
        program.slot.result_handle = result_handle;
        Ok(())
    }

    /// Install a [`compile::CompiledJoin`] as a brand-new program: creates
    /// the program, appends its triggers, and finalizes it in one call.
    pub fn install_join(&mut self, compiled: CompiledJoin) -> Result<u32, BuildError> {
        let program_id = self.create_program(compiled.range, compiled.slot);
        for trigger in compiled.triggers {
            self.create_trigger(program_id, trigger)?;
        }
        self.done_program(program_id)?;
        Ok(program_id)
    }

    /// Run the optimizer (§4.3) over every finalized program, after
    /// rejecting any cyclic reference graph the builder may have produced.
    pub fn optimize(&mut self, opts: OptimizeOptions) -> Result<(), BuildError> {
        if let Some(program_id) = self.detect_cycle() {
            return Err(BuildError::CyclicReference { program_id });
        }
        let stats = optimize::run(&mut self.programs, &self.event_frequency, &opts);
        self.statistics = Some(stats);
        Ok(())
    }

    /// Diagnostics computed by the last `optimize` call.
    pub fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    pub fn program(&self, program_id: u32) -> Option<&Program> {
        self.programs.get(program_id as usize)
    }

    pub fn nof_programs(&self) -> usize {
        self.programs.len()
    }

    fn check_open(&self, program_id: u32) -> Result<(), BuildError> {
        let done = self
            .done
            .get(program_id as usize)
            .ok_or(BuildError::UnknownProgram { program_id })?;
        if *done {
            return Err(BuildError::ProgramAlreadyDone { program_id });
        }
        Ok(())
    }

    fn program_mut(&mut self, program_id: u32) -> Result<&mut Program, BuildError> {
        self.programs
            .get_mut(program_id as usize)
            .ok_or(BuildError::UnknownProgram { program_id })
    }

    /// The event-firing cascade must be a DAG: no program may (directly or
    /// transitively) be re-triggered by its own fire-event. Builds the
    /// `event -> subscribing programs` adjacency and runs a DFS with a
    /// recursion-stack set from every program.
    fn detect_cycle(&self) -> Option<u32> {
        let mut subscribers: HashMap<u32, Vec<u32>> = HashMap::new();
        for program in &self.programs {
            for trigger in &program.triggers {
                subscribers
                    .entry(trigger.event.packed())
                    .or_default()
                    .push(program.id);
            }
        }

        let edges = |program_id: u32| -> Vec<u32> {
            let fire_event = self.programs[program_id as usize].slot.event_on_fire.packed();
            subscribers.get(&fire_event).cloned().unwrap_or_default()
        };

        for start in self.programs.iter().map(|p| p.id) {
            let mut visited = std::collections::HashSet::new();
            visited.insert(start);
            let mut path = vec![start];
            // Iterative DFS over the reachability graph from `start`;
            // returning to `start` via any edge is a cycle.
            while let Some(&current) = path.last() {
                let mut advanced = false;
                for next in edges(current) {
                    if next == start {
                        return Some(start);
                    }
                    if visited.insert(next) {
                        path.push(next);
                        advanced = true;
                        break;
                    }
                }
                if !advanced {
                    path.pop();
                }
            }
        }
        None
    }
}
