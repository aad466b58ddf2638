//! The expression stack DSL a caller uses to describe a pattern set:
//! `push_term`/`push_expression`/`push_pattern` build a postfix stack of
//! events and compiled sub-programs, `attach_variable` names the top node's
//! occurrence for later retrieval, and `define_pattern` promotes a node to a
//! named, independently matchable result.
//!
//! This crate owns symbol interning for pattern and variable names; the
//! compiled [`ProgramTable`] only ever sees packed numeric ids.

mod error;

use pm_events::{EventHandle, EventKind, SymbolTable};
use pm_model::JoinOp;
use pm_table::{compile_join_op, JoinMember, OptimizeOptions, ProgramTable};

pub use error::BuilderError;

/// One node on the expression stack: the event it produces, the program
/// that produces it (`None` for a bare term/pattern reference with no
/// subexpression of its own), and an optional attached variable name.
#[derive(Debug, Clone, Copy)]
struct StackElement {
    event: EventHandle,
    program: Option<u32>,
    variable: u32,
}

impl StackElement {
    fn leaf(event: EventHandle) -> Self {
        Self {
            event,
            program: None,
            variable: 0,
        }
    }
}

/// The finished output of [`Builder::compile`]: a ready-to-run program
/// table plus the symbol tables needed to turn result/variable ids back
/// into names when results are fetched.
#[derive(Debug)]
pub struct CompiledAutomaton {
    pub table: ProgramTable,
    pub patterns: SymbolTable,
    pub variables: SymbolTable,
}

/// Builds a [`ProgramTable`] from a sequence of stack operations.
#[derive(Debug, Default)]
pub struct Builder {
    table: ProgramTable,
    patterns: SymbolTable,
    variables: SymbolTable,
    stack: Vec<StackElement>,
    expression_event_cnt: u32,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a document-frequency statistic to a term, consulted by the
    /// optimizer's key-event selection.
    pub fn define_term_frequency(&mut self, term_id: u32, df: u32) -> Result<(), BuilderError> {
        self.table.define_term_frequency(term_id, df)?;
        Ok(())
    }

    /// Push a bare term reference.
    pub fn push_term(&mut self, term_id: u32) -> Result<(), BuilderError> {
        let event = EventHandle::new(EventKind::Term, term_id)?;
        self.stack.push(StackElement::leaf(event));
        tracing::trace!(target: "pm.builder", term_id, "pushed_term");
        Ok(())
    }

    /// Push a reference to another (possibly not-yet-defined) named pattern.
    pub fn push_pattern(&mut self, name: &str) -> Result<(), BuilderError> {
        let id = self.patterns.get_or_create(name)?;
        let event = EventHandle::new(EventKind::Reference, id)?;
        self.stack.push(StackElement::leaf(event));
        tracing::trace!(target: "pm.builder", name, "pushed_pattern_reference");
        Ok(())
    }

    /// Pop the top `argc` stack nodes, compile them into one `join_op`
    /// program, and push the resulting synthetic event back as a single
    /// node.
    pub fn push_expression(
        &mut self,
        join_op: JoinOp,
        argc: usize,
        range: u32,
        cardinality: u32,
    ) -> Result<(), BuilderError> {
        if argc > self.stack.len() {
            return Err(BuilderError::StackUnderflow {
                argc,
                available: self.stack.len(),
            });
        }

        self.expression_event_cnt += 1;
        let slot_event = EventHandle::new(EventKind::Expression, self.expression_event_cnt)?;

        let start = self.stack.len() - argc;
        let members: Vec<JoinMember> = self.stack[start..]
            .iter()
            .map(|elem| JoinMember::new(elem.event, elem.variable))
            .collect();

        let compiled = compile_join_op(join_op, &members, range, cardinality, slot_event, 0)?;
        let program = self.table.install_join(compiled)?;

        self.stack.truncate(start);
        self.stack.push(StackElement {
            event: slot_event,
            program: Some(program),
            variable: 0,
        });
        tracing::trace!(target: "pm.builder", ?join_op, argc, range, cardinality, program, "pushed_expression");
        Ok(())
    }

    /// Name the top stack node's occurrence so it is retrievable from a
    /// fired result's binding list.
    pub fn attach_variable(&mut self, name: &str) -> Result<(), BuilderError> {
        let variable_id = self.variables.get_or_create(name)?;
        let elem = self.stack.last_mut().ok_or(BuilderError::EmptyStack)?;
        if elem.variable != 0 {
            return Err(BuilderError::VariableAlreadyAttached { variable: elem.variable });
        }
        elem.variable = variable_id;
        tracing::trace!(target: "pm.builder", name, "attached_variable");
        Ok(())
    }

    /// Promote the top stack node to a named, independently matchable
    /// pattern. A bare leaf node (no subexpression yet) is implicitly
    /// wrapped in a one-witness `Any` program first. The node is left on
    /// the stack afterward, so it may still be referenced by later
    /// expressions.
    pub fn define_pattern(&mut self, name: &str, visible: bool) -> Result<(), BuilderError> {
        let result_id = self.patterns.get_or_create(name)?;
        let result_event = EventHandle::new(EventKind::Reference, result_id)?;

        let (program, had_variable) = {
            let elem = self.stack.last().ok_or(BuilderError::EmptyStack)?;
            (elem.program, elem.variable)
        };

        let program = match program {
            None => {
                let elem = *self.stack.last().unwrap();
                let compiled = compile_join_op(JoinOp::Any, &[JoinMember::new(elem.event, elem.variable)], 0, 1, result_event, 0)?;
                self.table.install_join(compiled)?
            }
            Some(program) => {
                if had_variable != 0 {
                    return Err(BuilderError::VariableOnCompoundPattern);
                }
                program
            }
        };

        let result_handle = if visible { result_id } else { 0 };
        self.table.define_program_result(program, result_event, result_handle)?;

        let elem = self.stack.last_mut().unwrap();
        elem.program = Some(program);

        tracing::debug!(target: "pm.builder", name, visible, program, "defined_pattern");
        Ok(())
    }

    /// Run the optimizer and hand back the finished table plus symbol
    /// tables. Consumes the builder: once compiled, an automaton is
    /// immutable.
    pub fn compile(mut self, opts: OptimizeOptions) -> Result<CompiledAutomaton, BuilderError> {
        self.table.optimize(opts)?;
        Ok(CompiledAutomaton {
            table: self.table,
            patterns: self.patterns,
            variables: self.variables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_expression_rejects_more_args_than_the_stack_holds() {
        let mut builder = Builder::new();
        builder.push_term(1).unwrap();
        let err = builder.push_expression(JoinOp::Sequence, 2, 10, 0).unwrap_err();
        assert!(matches!(err, BuilderError::StackUnderflow { argc: 2, available: 1 }));
    }

    #[test]
    fn attach_variable_on_empty_stack_is_rejected() {
        let mut builder = Builder::new();
        let err = builder.attach_variable("x").unwrap_err();
        assert!(matches!(err, BuilderError::EmptyStack));
    }

    #[test]
    fn attach_variable_twice_on_the_same_node_is_rejected() {
        let mut builder = Builder::new();
        builder.push_term(1).unwrap();
        builder.attach_variable("x").unwrap();
        let err = builder.attach_variable("y").unwrap_err();
        assert!(matches!(err, BuilderError::VariableAlreadyAttached { .. }));
    }

    #[test]
    fn define_pattern_wraps_a_bare_term_in_an_any_program() {
        let mut builder = Builder::new();
        builder.push_term(1).unwrap();
        builder.define_pattern("greeting", true).unwrap();
        let compiled = builder.compile(OptimizeOptions::default()).unwrap();
        assert_eq!(compiled.table.nof_programs(), 1);
        assert_eq!(compiled.patterns.get("greeting"), Some(1));
    }

    #[test]
    fn sequence_expression_compiles_into_one_program_and_collapses_the_stack() {
        let mut builder = Builder::new();
        builder.push_term(1).unwrap();
        builder.push_term(2).unwrap();
        builder.push_expression(JoinOp::Sequence, 2, 10, 0).unwrap();
        builder.define_pattern("greeting", true).unwrap();
        let compiled = builder.compile(OptimizeOptions::default()).unwrap();
        assert_eq!(compiled.table.nof_programs(), 1);
        assert_eq!(compiled.table.program(0).unwrap().triggers.len(), 2);
    }

    #[test]
    fn variable_on_a_subexpression_pattern_is_rejected() {
        let mut builder = Builder::new();
        builder.push_term(1).unwrap();
        builder.push_term(2).unwrap();
        builder.push_expression(JoinOp::Sequence, 2, 10, 0).unwrap();
        builder.attach_variable("v").unwrap();
        let err = builder.define_pattern("greeting", true).unwrap_err();
        assert!(matches!(err, BuilderError::VariableOnCompoundPattern));
    }
}
