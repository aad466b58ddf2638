use pm_events::{EventData, EventHandle, EventKind};
use pm_model::JoinOp;
use pm_table::{compile_join_op, JoinMember, OptimizeOptions, ProgramTable};

use super::*;

fn term(idx: u32) -> EventHandle {
    EventHandle::new(EventKind::Term, idx).unwrap()
}

fn expr(idx: u32) -> EventHandle {
    EventHandle::new(EventKind::Expression, idx).unwrap()
}

fn feed(sm: &mut StateMachine<'_>, handle: EventHandle, ordpos: u32) {
    sm.set_current_pos(ordpos).unwrap();
    let data = EventData::single(handle, ordpos, 0, ordpos);
    sm.do_transition(handle, data).unwrap();
}

/// §8 scenario 1: `Sequence(A,B)` fires once both witnesses arrive in order,
/// spanning from the first to the last ordinal position.
#[test]
fn scenario_sequence_fires_in_order_with_full_span() {
    let mut table = ProgramTable::new();
    let members = vec![JoinMember::new(term(1), 0), JoinMember::new(term(2), 0)];
    let compiled = compile_join_op(JoinOp::Sequence, &members, 10, 0, expr(1), 42).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(1), 1);
    assert!(sm.results().is_empty());
    feed(&mut sm, term(2), 4);

    let results = sm.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result_handle, 42);
    assert_eq!(results[0].span.start_ordpos, 1);
    assert_eq!(results[0].span.end_ordpos, 4);
}

/// Feeding the witnesses out of order never satisfies a `Sequence` slot.
#[test]
fn scenario_sequence_out_of_order_never_fires() {
    let mut table = ProgramTable::new();
    let members = vec![JoinMember::new(term(1), 0), JoinMember::new(term(2), 0)];
    let compiled = compile_join_op(JoinOp::Sequence, &members, 10, 0, expr(1), 42).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(2), 1);
    feed(&mut sm, term(1), 2);
    assert!(sm.results().is_empty());
}

/// §8 scenario 2: `SequenceImm(A,B)` requires its witnesses to land on
/// ordinally adjacent positions; a gap between them breaks the match.
#[test]
fn scenario_sequence_imm_requires_adjacency() {
    let mut table = ProgramTable::new();
    let members = vec![JoinMember::new(term(1), 0), JoinMember::new(term(2), 0)];
    let compiled = compile_join_op(JoinOp::SequenceImm, &members, 10, 0, expr(1), 7).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(1), 1);
    feed(&mut sm, term(2), 3);
    assert!(sm.results().is_empty(), "a gap between witnesses must not fire");

    let mut sm2 = StateMachine::new(&table);
    feed(&mut sm2, term(1), 1);
    feed(&mut sm2, term(2), 2);
    assert_eq!(sm2.results().len(), 1);
}

/// §8 scenario 3: `Within(A,B,C)` fires once every member has been seen at
/// least once, in any relative order, as long as all fall inside `range`.
#[test]
fn scenario_within_fires_regardless_of_order() {
    let mut table = ProgramTable::new();
    let members = vec![
        JoinMember::new(term(1), 0),
        JoinMember::new(term(2), 0),
        JoinMember::new(term(3), 0),
    ];
    let compiled = compile_join_op(JoinOp::Within, &members, 5, 0, expr(1), 9).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(3), 1);
    feed(&mut sm, term(1), 2);
    assert!(sm.results().is_empty());
    feed(&mut sm, term(2), 3);

    let results = sm.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].span.start_ordpos, 1);
    assert_eq!(results[0].span.end_ordpos, 3);
}

/// An instance that does not complete before its `range` elapses expires
/// unfired and is reaped on the next `set_current_pos` advance.
#[test]
fn open_instance_expires_past_its_range() {
    let mut table = ProgramTable::new();
    let members = vec![JoinMember::new(term(1), 0), JoinMember::new(term(2), 0)];
    let compiled = compile_join_op(JoinOp::Sequence, &members, 2, 0, expr(1), 9).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(1), 1);
    assert_eq!(sm.telemetry().nof_open_patterns, 1);

    // position 4 is past start(1) + range(2); the instance must be reaped
    // before term(2) is even considered.
    feed(&mut sm, term(2), 4);
    assert!(sm.results().is_empty());
    assert_eq!(sm.telemetry().nof_open_patterns, 0);
}

/// `Any` with cardinality 2 out of 3 members fires on the second distinct
/// witness, regardless of which two arrive first. Its span covers only the
/// witnesses actually consumed, not every member of the join — a third
/// witness observed after firing cannot retroactively widen an already
/// closed instance.
#[test]
fn scenario_any_with_cardinality_fires_on_second_witness() {
    let mut table = ProgramTable::new();
    let members = vec![
        JoinMember::new(term(1), 0),
        JoinMember::new(term(2), 0),
        JoinMember::new(term(3), 0),
    ];
    let compiled = compile_join_op(JoinOp::Any, &members, 10, 2, expr(1), 5).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(1), 1);
    assert!(sm.results().is_empty());
    feed(&mut sm, term(2), 2);

    let results = sm.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].span.start_ordpos, 1);
    assert_eq!(results[0].span.end_ordpos, 2);

    feed(&mut sm, term(3), 3);
    assert_eq!(sm.results().len(), 1, "a new Any instance may open on the third witness but cannot fire alone");
}

/// `And(A,B)` only fires once both distinct triggers have matched, any
/// order; a repeated witness for the same member never substitutes for the
/// other.
#[test]
fn scenario_and_requires_every_distinct_member() {
    let mut table = ProgramTable::new();
    let members = vec![JoinMember::new(term(1), 0), JoinMember::new(term(2), 0)];
    let compiled = compile_join_op(JoinOp::And, &members, 10, 0, expr(1), 3).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(1), 1);
    feed(&mut sm, term(1), 2);
    assert!(sm.results().is_empty(), "repeating the same member cannot satisfy And");

    feed(&mut sm, term(2), 3);
    assert_eq!(sm.results().len(), 1);
}

/// `SequenceStruct(delim, A, B)`: the leading delimiter aborts any instance
/// still open when it recurs, without contributing evidence itself.
#[test]
fn scenario_sequence_struct_delimiter_aborts_open_instance() {
    let mut table = ProgramTable::new();
    let members = vec![
        JoinMember::new(term(9), 0),
        JoinMember::new(term(1), 0),
        JoinMember::new(term(2), 0),
    ];
    let compiled = compile_join_op(JoinOp::SequenceStruct, &members, 10, 0, expr(1), 4).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(9), 1);
    feed(&mut sm, term(1), 2);
    feed(&mut sm, term(9), 3);
    feed(&mut sm, term(2), 4);
    assert!(sm.results().is_empty(), "the recurring delimiter must abort the open instance");
}

/// §8 scenario 3: `WithinStruct(S,A,B)` fires like `Within(A,B)` when no
/// delimiter intervenes.
#[test]
fn scenario_within_struct_fires_without_delimiter() {
    let mut table = ProgramTable::new();
    let members = vec![
        JoinMember::new(term(9), 0),
        JoinMember::new(term(1), 0),
        JoinMember::new(term(2), 0),
    ];
    let compiled = compile_join_op(JoinOp::WithinStruct, &members, 5, 0, expr(1), 4).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(1), 1);
    feed(&mut sm, term(2), 2);

    let results = sm.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].span.start_ordpos, 1);
    assert_eq!(results[0].span.end_ordpos, 2);
}

/// §8 scenario 3 (continued): a delimiter observed before the slot is
/// satisfied aborts the open `WithinStruct` instance.
#[test]
fn scenario_within_struct_delimiter_aborts_open_instance() {
    let mut table = ProgramTable::new();
    let members = vec![
        JoinMember::new(term(9), 0),
        JoinMember::new(term(1), 0),
        JoinMember::new(term(2), 0),
    ];
    let compiled = compile_join_op(JoinOp::WithinStruct, &members, 5, 0, expr(1), 4).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(1), 1);
    feed(&mut sm, term(9), 2);
    feed(&mut sm, term(2), 3);
    assert!(sm.results().is_empty(), "the delimiter must abort the open instance");
}

/// §8 scenario 6: a program attaching a variable to one of its witnesses
/// makes that occurrence retrievable from the fired result's binding list.
#[test]
fn scenario_variable_binding_is_attached_to_fired_result() {
    let mut table = ProgramTable::new();
    let variable = 77;
    let members = vec![JoinMember::new(term(1), variable), JoinMember::new(term(2), 0)];
    let compiled = compile_join_op(JoinOp::Sequence, &members, 10, 0, expr(1), 6).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(1), 1);
    feed(&mut sm, term(2), 2);

    let result = &sm.results()[0];
    let cursor = sm.event_data_item_list_idx(&result.span);
    let bindings: Vec<_> = sm.bindings(cursor).collect();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].variable, variable);
    assert_eq!(bindings[0].data.start_ordpos, 1);
}

/// A firing program's `event_on_fire` is dispatched recursively before
/// `do_transition` returns, letting a second program trigger on the first
/// one's cascade within the same call.
#[test]
fn cascading_fire_is_dispatched_before_do_transition_returns() {
    let mut table = ProgramTable::new();
    let inner_members = vec![JoinMember::new(term(1), 0), JoinMember::new(term(2), 0)];
    let inner = compile_join_op(JoinOp::Sequence, &inner_members, 10, 0, expr(1), 0).unwrap();
    table.install_join(inner).unwrap();

    let outer_members = vec![JoinMember::new(expr(1), 0)];
    let outer = compile_join_op(JoinOp::Any, &outer_members, 10, 0, expr(2), 11).unwrap();
    table.install_join(outer).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(1), 1);
    feed(&mut sm, term(2), 2);

    let results = sm.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result_handle, 11);
}

/// Feeding an ordinal position behind the current one is rejected rather
/// than silently reordered.
#[test]
fn out_of_order_input_is_rejected() {
    let table = ProgramTable::new();
    let mut sm = StateMachine::new(&table);
    sm.set_current_pos(5).unwrap();
    let err = sm.set_current_pos(3).unwrap_err();
    assert!(matches!(err, RuntimeError::OutOfOrderInput { current: 5, got: 3 }));
}

/// `reset` fully rewinds a state machine to its freshly-constructed state.
#[test]
fn reset_clears_results_and_position() {
    let mut table = ProgramTable::new();
    let members = vec![JoinMember::new(term(1), 0), JoinMember::new(term(2), 0)];
    let compiled = compile_join_op(JoinOp::Sequence, &members, 10, 0, expr(1), 1).unwrap();
    table.install_join(compiled).unwrap();
    table.optimize(OptimizeOptions::default()).unwrap();

    let mut sm = StateMachine::new(&table);
    feed(&mut sm, term(1), 1);
    feed(&mut sm, term(2), 2);
    assert_eq!(sm.results().len(), 1);

    sm.reset();
    assert!(sm.results().is_empty());
    assert_eq!(sm.telemetry().nof_open_patterns, 0);

    feed(&mut sm, term(1), 1);
    feed(&mut sm, term(2), 2);
    assert_eq!(sm.results().len(), 1, "a reset machine must behave identically to a fresh one");
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Universal invariant: however a `Sequence(A,B)` match fires, its span
    /// never starts after it ends, and never extends past the last fed
    /// position.
    proptest! {
        #[test]
        fn sequence_span_is_well_ordered_and_bounded(
            gap in 0u32..20,
            start in 1u32..50,
        ) {
            let mut table = ProgramTable::new();
            let members = vec![JoinMember::new(term(1), 0), JoinMember::new(term(2), 0)];
            let compiled = compile_join_op(JoinOp::Sequence, &members, 100, 0, expr(1), 1).unwrap();
            table.install_join(compiled).unwrap();
            table.optimize(OptimizeOptions::default()).unwrap();

            let mut sm = StateMachine::new(&table);
            feed(&mut sm, term(1), start);
            feed(&mut sm, term(2), start + gap);

            if let Some(result) = sm.results().first() {
                prop_assert!(result.span.start_ordpos <= result.span.end_ordpos);
                prop_assert_eq!(result.span.start_ordpos, start);
                prop_assert_eq!(result.span.end_ordpos, start + gap);
            }
        }
    }

    /// A `Sequence` instance never fires once its range has elapsed,
    /// whatever the gap between the two witnesses.
    proptest! {
        #[test]
        fn sequence_never_fires_past_its_range(
            gap in 0u32..30,
            range in 1u32..15,
        ) {
            let mut table = ProgramTable::new();
            let members = vec![JoinMember::new(term(1), 0), JoinMember::new(term(2), 0)];
            let compiled = compile_join_op(JoinOp::Sequence, &members, range, 0, expr(1), 1).unwrap();
            table.install_join(compiled).unwrap();
            table.optimize(OptimizeOptions::default()).unwrap();

            let mut sm = StateMachine::new(&table);
            feed(&mut sm, term(1), 1);
            feed(&mut sm, term(2), 1 + gap);

            if gap > range {
                prop_assert!(sm.results().is_empty());
            } else {
                prop_assert_eq!(sm.results().len(), 1);
            }
        }
    }
}
