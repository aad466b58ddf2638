//! The public façade external collaborators actually depend on (§6):
//! [`PatternMatcherInstance`] is the compile-time builder, and
//! [`PatternMatcherContext`] is the per-document runtime it produces.
//!
//! This crate owns no algorithm of its own — it wires `pm-builder`,
//! `pm-config`, `pm-runtime`, and `pm-reconcile` together behind the shape
//! `patternMatcher.cpp`'s `PatternMatcherInstance`/`PatternMatcherContext`
//! pair exposes, trading its single `CATCH_ERROR_MAP` exception boundary
//! per method for `Result<T, ContextError>` return types.

mod error;

use pm_builder::{Builder, CompiledAutomaton};
use pm_config::BuilderOptions;
use pm_events::{EventData, EventHandle, EventKind};
use pm_model::JoinOp;
use pm_runtime::{MatchResult, RuntimeError, StateMachine};
use serde::Serialize;

pub use error::ContextError;
pub use pm_config::ConfigError;

/// One named variable bound while a result matched, with the ordinal and
/// original-source span it covers. Recursively nested the same way the
/// original's `gatherResultItems` walks a binding chain: a bound
/// sub-pattern occurrence may itself carry further bindings.
#[derive(Debug, Clone, Serialize)]
pub struct PatternMatcherResultItem {
    pub name: String,
    pub start_ordpos: u32,
    pub end_ordpos: u32,
    pub start_origseg: u32,
    pub start_origpos: u32,
    pub end_origseg: u32,
    pub end_origpos: u32,
}

/// One emitted pattern match, ready for a result consumer.
#[derive(Debug, Clone, Serialize)]
pub struct PatternMatcherResult {
    pub name: String,
    pub start_ordpos: u32,
    pub end_ordpos: u32,
    pub start_origseg: u32,
    pub start_origpos: u32,
    pub end_origseg: u32,
    pub end_origpos: u32,
    pub items: Vec<PatternMatcherResultItem>,
}

/// Named counters mirroring the original engine's `PatternMatcherStatistics`
/// surface.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Statistics {
    pub nof_programs_installed: u32,
    pub nof_alt_key_programs_installed: u32,
    pub nof_signals_fired: u64,
    pub nof_triggers_avg_active: f64,
}

/// The compile-time façade: an expression stack builder plus the compile
/// options that govern both optimization and result reconciliation.
/// Equivalent to `patternMatcher.cpp`'s `PatternMatcherInstance`.
#[derive(Debug, Default)]
pub struct PatternMatcherInstance {
    builder: Builder,
    options: BuilderOptions,
}

impl PatternMatcherInstance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: BuilderOptions) -> Self {
        Self {
            builder: Builder::new(),
            options,
        }
    }

    pub fn define_term_frequency(&mut self, term_id: u32, df: u32) -> Result<(), ContextError> {
        self.builder.define_term_frequency(term_id, df)?;
        Ok(())
    }

    pub fn push_term(&mut self, term_id: u32) -> Result<(), ContextError> {
        self.builder.push_term(term_id)?;
        Ok(())
    }

    pub fn push_pattern(&mut self, name: &str) -> Result<(), ContextError> {
        self.builder.push_pattern(name)?;
        Ok(())
    }

    pub fn push_expression(
        &mut self,
        join_op: JoinOp,
        argc: usize,
        range: u32,
        cardinality: u32,
    ) -> Result<(), ContextError> {
        self.builder.push_expression(join_op, argc, range, cardinality)?;
        Ok(())
    }

    pub fn attach_variable(&mut self, name: &str) -> Result<(), ContextError> {
        self.builder.attach_variable(name)?;
        Ok(())
    }

    pub fn define_pattern(&mut self, name: &str, visible: bool) -> Result<(), ContextError> {
        self.builder.define_pattern(name, visible)?;
        Ok(())
    }

    /// The option names `define_option` accepts.
    pub fn compile_option_names() -> &'static [&'static str] {
        BuilderOptions::compile_option_names()
    }

    pub fn define_option(&mut self, name: &str, value: f64) -> Result<(), ContextError> {
        self.options.define_option(name, value)?;
        Ok(())
    }

    /// Run the optimizer and hand back a compiled, immutable matcher ready
    /// to spawn per-document contexts.
    pub fn compile(self) -> Result<CompiledPatternMatcher, ContextError> {
        let optimize_opts = self.options.to_optimize_options();
        let reconcile_opts = self.options.to_reconcile_options();
        let automaton = self.builder.compile(optimize_opts)?;
        Ok(CompiledPatternMatcher {
            automaton,
            reconcile_opts,
        })
    }
}

/// An optimized, immutable automaton plus the reconciliation options to
/// apply when fetching results. Cheaply shared (e.g. behind an `Arc`)
/// across however many documents are processed concurrently — every
/// [`PatternMatcherContext`] only borrows it.
#[derive(Debug)]
pub struct CompiledPatternMatcher {
    automaton: CompiledAutomaton,
    reconcile_opts: pm_reconcile::ReconcileOptions,
}

impl CompiledPatternMatcher {
    pub fn nof_programs(&self) -> usize {
        self.automaton.table.nof_programs()
    }

    /// Spawn a fresh per-document context over this automaton.
    pub fn create_context(&self) -> PatternMatcherContext<'_> {
        PatternMatcherContext {
            matcher: self,
            state_machine: StateMachine::new(&self.automaton.table),
            nof_events: 0,
        }
    }
}

/// The per-document runtime façade. Equivalent to `patternMatcher.cpp`'s
/// `PatternMatcherContext`: owns a live [`StateMachine`] over a shared,
/// immutable [`CompiledPatternMatcher`].
pub struct PatternMatcherContext<'t> {
    matcher: &'t CompiledPatternMatcher,
    state_machine: StateMachine<'t>,
    nof_events: u32,
}

impl<'t> PatternMatcherContext<'t> {
    /// Feed one token: its term id, ordinal position, and original-source
    /// coordinates (`origsize` is the byte length of the occurrence at
    /// `origpos`). Tokens must arrive in non-decreasing `ordpos` order.
    pub fn put_input(
        &mut self,
        term_id: u32,
        ordpos: u32,
        origseg: u32,
        origpos: u32,
        origsize: u32,
    ) -> Result<(), ContextError> {
        self.state_machine.set_current_pos(ordpos)?;

        let end_origpos = origpos as u64 + origsize as u64;
        if end_origpos > u32::MAX as u64 {
            return Err(RuntimeError::CoordOverflow { value: end_origpos }.into());
        }
        let end_ordpos = ordpos as u64 + 1;
        if end_ordpos > u32::MAX as u64 {
            return Err(RuntimeError::CoordOverflow { value: end_ordpos }.into());
        }

        let event = EventHandle::new(EventKind::Term, term_id)?;
        let data = EventData::new(
            event,
            ordpos,
            ordpos + 1,
            origseg,
            origpos,
            origseg,
            end_origpos as u32,
        );
        self.state_machine.do_transition(event, data)?;
        self.nof_events += 1;
        tracing::trace!(target: "pm.context", term_id, ordpos, "input_fed");
        Ok(())
    }

    /// Collect and reconcile the results accumulated so far.
    pub fn fetch_results(&self) -> Vec<PatternMatcherResult> {
        let raw = self.state_machine.results();
        let reconciled = pm_reconcile::reconcile(raw, &self.matcher.reconcile_opts);

        tracing::debug!(target: "pm.context", total = raw.len(), kept = reconciled.len(), "results_fetched");

        reconciled
            .iter()
            .map(|result| self.build_result(result))
            .collect()
    }

    pub fn statistics(&self) -> Statistics {
        let telemetry = self.state_machine.telemetry();
        let nof_triggers_avg_active = if self.nof_events > 0 {
            self.state_machine.avg_triggers_active()
        } else {
            0.0
        };
        Statistics {
            nof_programs_installed: telemetry.nof_programs_installed,
            nof_alt_key_programs_installed: telemetry.nof_alt_key_programs_installed,
            nof_signals_fired: telemetry.nof_signals_fired,
            nof_triggers_avg_active,
        }
    }

    /// Discard every open instance and accumulated result, starting this
    /// context over from ordinal position zero.
    pub fn reset(&mut self) {
        self.state_machine.reset();
        self.nof_events = 0;
        tracing::debug!(target: "pm.context", "context_reset");
    }

    fn build_result(&self, result: &MatchResult) -> PatternMatcherResult {
        let name = self
            .matcher
            .automaton
            .patterns
            .key(result.result_handle)
            .unwrap_or("")
            .to_string();

        let mut items = Vec::new();
        if result.span.subdataref != 0 {
            self.gather_result_items(result.span.subdataref, &mut items);
        }

        PatternMatcherResult {
            name,
            start_ordpos: result.span.start_ordpos,
            end_ordpos: result.span.end_ordpos,
            start_origseg: result.span.start_origseg,
            start_origpos: result.span.start_origpos,
            end_origseg: result.span.end_origseg,
            end_origpos: result.span.end_origpos,
            items,
        }
    }

    /// Ported from `gatherResultItems`: walk a binding list, emitting one
    /// item per node and recursing into any bindings attached to that
    /// node's own occurrence.
    fn gather_result_items(&self, cursor: pm_events::binding::EventItemList, out: &mut Vec<PatternMatcherResultItem>) {
        for item in self.state_machine.bindings(cursor) {
            let name = self
                .matcher
                .automaton
                .variables
                .key(item.variable)
                .unwrap_or("")
                .to_string();
            out.push(PatternMatcherResultItem {
                name,
                start_ordpos: item.data.start_ordpos,
                end_ordpos: item.data.end_ordpos,
                start_origseg: item.data.start_origseg,
                start_origpos: item.data.start_origpos,
                end_origseg: item.data.end_origseg,
                end_origpos: item.data.end_origpos,
            });
            if item.data.subdataref != 0 {
                self.gather_result_items(item.data.subdataref, out);
            }
        }
    }
}
