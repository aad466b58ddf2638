//! The per-document State Machine (§4.4): the runtime engine that consumes
//! events, maintains open program instances, and fires results.
//!
//! A [`StateMachine`] borrows an optimized [`ProgramTable`] (immutable,
//! shareable across every document processed from the same compiled
//! instance) and owns everything that changes per document: the instance
//! arena, the variable-binding arena, and the accumulated result list.

mod error;
mod instance;

use std::collections::HashMap;

pub use error::RuntimeError;
pub use instance::{Instance, InstanceState};

use pm_events::{EventData, EventHandle, EventItem, EventItemArena, EventItemList};
use pm_model::SigType;
use pm_table::ProgramTable;

/// One emitted match: the symbol id of the firing pattern's declared
/// result name and the span/bindings it covers.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult {
    pub result_handle: u32,
    pub span: EventData,
}

/// Telemetry counters mirroring the original engine's statistics surface.
#[derive(Debug, Default, Clone, Copy)]
pub struct Telemetry {
    pub nof_programs_installed: u32,
    pub nof_alt_key_programs_installed: u32,
    pub nof_signals_fired: u64,
    pub nof_open_patterns: u32,
}

struct ProgramRuntimeInfo {
    /// event (packed) -> index of the trigger in this program subscribed
    /// to it. Each program has at most one trigger per distinct event.
    trigger_by_event: HashMap<u32, usize>,
    /// OR of every `Within`/`WithinStruct` trigger's `sig_val`; the
    /// bitmask a fresh instance of this program starts from.
    within_required_bits: u32,
}

/// The per-document automaton runtime.
pub struct StateMachine<'t> {
    table: &'t ProgramTable,
    runtime_info: Vec<ProgramRuntimeInfo>,
    key_index: HashMap<u32, Vec<u32>>,
    instances: Vec<Option<Instance>>,
    free_list: Vec<usize>,
    open_index: HashMap<(u32, u32), usize>,
    bindings: EventItemArena,
    results: Vec<MatchResult>,
    pending: Vec<(EventHandle, EventData)>,
    current_pos: u32,
    telemetry: Telemetry,
}

impl<'t> StateMachine<'t> {
    pub fn new(table: &'t ProgramTable) -> Self {
        let mut key_index: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut runtime_info = Vec::with_capacity(table.programs().len());

        for program in table.programs() {
            let mut trigger_by_event = HashMap::new();
            let mut within_required_bits = 0u32;
            for (idx, trigger) in program.triggers.iter().enumerate() {
                trigger_by_event.insert(trigger.event.packed(), idx);
                if trigger.sig_type == SigType::Within {
                    within_required_bits |= trigger.sig_val;
                }
                if trigger.is_key {
                    key_index.entry(trigger.event.packed()).or_default().push(program.id);
                }
            }
            runtime_info.push(ProgramRuntimeInfo {
                trigger_by_event,
                within_required_bits,
            });
        }

        let nof_alt_key_programs_installed = table
            .statistics()
            .map(|s| s.nof_alt_key_programs_installed)
            .unwrap_or(0);

        tracing::debug!(target: "pm.runtime", nof_programs = table.programs().len(), "state_machine_created");

        Self {
            table,
            runtime_info,
            key_index,
            instances: Vec::new(),
            free_list: Vec::new(),
            open_index: HashMap::new(),
            bindings: EventItemArena::new(),
            results: Vec::new(),
            pending: Vec::new(),
            current_pos: 0,
            telemetry: Telemetry {
                nof_programs_installed: table.programs().len() as u32,
                nof_alt_key_programs_installed,
                nof_signals_fired: 0,
                nof_open_patterns: 0,
            },
        }
    }

    /// Advance the current ordinal position, reaping every instance that
    /// has expired strictly before dispatching anything at the new
    /// position.
    pub fn set_current_pos(&mut self, ordpos: u32) -> Result<(), RuntimeError> {
        if ordpos < self.current_pos {
            return Err(RuntimeError::OutOfOrderInput {
                current: self.current_pos,
                got: ordpos,
            });
        }
        self.current_pos = ordpos;
        self.reap();
        Ok(())
    }

    /// Dispatch `event` with `data` to every subscribing program, draining
    /// the cascade of synthetic events it may produce before returning.
    pub fn do_transition(&mut self, event: EventHandle, data: EventData) -> Result<(), RuntimeError> {
        if data.start_ordpos < self.current_pos {
            return Err(RuntimeError::OutOfOrderInput {
                current: self.current_pos,
                got: data.start_ordpos,
            });
        }

        self.pending.push((event, data));
        while let Some((e, d)) = self.pending.pop() {
            self.dispatch_one(e, d);
        }
        self.telemetry.nof_open_patterns = self.instances.iter().filter(|i| i.is_some()).count() as u32;
        Ok(())
    }

    pub fn results(&self) -> &[MatchResult] {
        &self.results
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    /// Average number of triggers across every currently open instance's
    /// program; mirrors the original engine's `nofTriggersAvgActive`.
    pub fn avg_triggers_active(&self) -> f64 {
        let open: Vec<&Instance> = self.instances.iter().flatten().collect();
        if open.is_empty() {
            return 0.0;
        }
        let total: usize = open
            .iter()
            .map(|inst| self.table.programs()[inst.program_id as usize].triggers.len())
            .sum();
        total as f64 / open.len() as f64
    }

    /// The binding-list cursor an [`EventData`] points at.
    pub fn event_data_item_list_idx(&self, data: &EventData) -> EventItemList {
        data.subdataref
    }

    /// Read the binding at `cursor` and the cursor for the next one, or
    /// `None` once the list is exhausted.
    pub fn next_result_item(&self, cursor: EventItemList) -> Option<(&EventItem, EventItemList)> {
        let item = self.bindings.get(cursor)?;
        Some((item, item.next()))
    }

    /// Idiomatic alternative to the cursor-based accessors above: iterate
    /// every binding attached to a result in order.
    pub fn bindings(&self, cursor: EventItemList) -> pm_events::binding::EventItemIter<'_> {
        self.bindings.iter(cursor)
    }

    /// Discard every open instance and accumulated result, keeping the
    /// same program table and rewinding the current position to zero.
    pub fn reset(&mut self) {
        self.instances.clear();
        self.free_list.clear();
        self.open_index.clear();
        self.bindings.clear();
        self.results.clear();
        self.pending.clear();
        self.current_pos = 0;
        self.telemetry.nof_open_patterns = 0;
        tracing::debug!(target: "pm.runtime", "state_machine_reset");
    }

    fn reap(&mut self) {
        let expired: Vec<usize> = self
            .instances
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| match slot {
                Some(inst) if inst.state == InstanceState::Live && self.current_pos > inst.expires_at => Some(idx),
                _ => None,
            })
            .collect();

        for idx in expired {
            let instance = self.instances[idx].take().unwrap();
            self.open_index.remove(&instance.open_key);
            self.free_list.push(idx);
            tracing::trace!(target: "pm.runtime", program_id = instance.program_id, "instance_expired");
        }
    }

    fn alloc_instance(&mut self, instance: Instance) -> usize {
        if let Some(idx) = self.free_list.pop() {
            self.instances[idx] = Some(instance);
            idx
        } else {
            self.instances.push(Some(instance));
            self.instances.len() - 1
        }
    }

    fn dispatch_one(&mut self, event: EventHandle, data: EventData) {
        let packed = event.packed();

        if let Some(program_ids) = self.key_index.get(&packed).cloned() {
            for program_id in program_ids {
                let program = &self.table.programs()[program_id as usize];
                let key = instance::dedup_key(program.slot.sig_type, program_id, data.start_ordpos);
                if self.open_index.contains_key(&key) {
                    continue;
                }
                let within_bits = self.runtime_info[program_id as usize].within_required_bits;
                let instance = Instance::seed(program_id, program.range, &program.slot, data, within_bits);
                let idx = self.alloc_instance(instance);
                self.open_index.insert(key, idx);
                tracing::trace!(target: "pm.runtime", program_id, start_ordpos = data.start_ordpos, "instance_created");
            }
        }

        let mut fired = Vec::new();
        let mut aborted = Vec::new();
        for idx in 0..self.instances.len() {
            let program_id = match &self.instances[idx] {
                Some(inst) if inst.state == InstanceState::Live => inst.program_id,
                _ => continue,
            };
            let Some(&trigger_idx) = self.runtime_info[program_id as usize].trigger_by_event.get(&packed) else {
                continue;
            };
            let trigger = self.table.programs()[program_id as usize].triggers[trigger_idx];

            if trigger.sig_type == SigType::Del {
                aborted.push(idx);
                continue;
            }

            let init_count = self.table.programs()[program_id as usize].slot.init_count;
            let instance = self.instances[idx].as_mut().unwrap();
            let Some(satisfied) = instance.apply(&trigger, trigger_idx, init_count, &data) else {
                continue;
            };

            if trigger.variable != 0 {
                let head = instance.bindings_head;
                let new_head = self.bindings.push_front(head, trigger.variable, data);
                self.instances[idx].as_mut().unwrap().bindings_head = new_head;
            }

            if satisfied {
                fired.push(idx);
            }
        }

        for idx in aborted {
            if let Some(instance) = self.instances[idx].take() {
                self.open_index.remove(&instance.open_key);
                self.free_list.push(idx);
                tracing::trace!(target: "pm.runtime", program_id = instance.program_id, "instance_aborted_on_delimiter");
            }
        }

        for idx in fired {
            let Some(instance) = self.instances[idx].take() else {
                continue;
            };
            self.open_index.remove(&instance.open_key);
            self.free_list.push(idx);

            let program = &self.table.programs()[instance.program_id as usize];
            let mut fire_data = instance.span;
            fire_data.handle = program.slot.event_on_fire;
            fire_data.subdataref = instance.bindings_head;

            if program.slot.result_handle != 0 {
                self.results.push(MatchResult {
                    result_handle: program.slot.result_handle,
                    span: fire_data,
                });
            }
            tracing::trace!(
                target: "pm.runtime",
                program_id = instance.program_id,
                result_handle = program.slot.result_handle,
                "instance_fired"
            );
            self.pending.push((program.slot.event_on_fire, fire_data));
        }

        self.telemetry.nof_signals_fired += 1;
    }
}

#[cfg(test)]
mod tests;
