//! Result Reconciler (§4.5): turns a state machine's raw, possibly
//! overlapping result list into the set actually handed back to the caller.
//!
//! A compiled pattern set frequently has a broad pattern built as the union
//! of several narrower ones (e.g. `Any(A,B,C)` alongside `Sequence(A,B)`).
//! Both fire, and both are "correct", but a caller asking for `exclusive`
//! results wants only the outermost match at a given position. This crate
//! implements that elimination: for every pair of results whose
//! original-source spans nest, the contained one is dropped unless the two
//! spans are identical.

use pm_events::EventData;
use pm_runtime::MatchResult;

/// Options governing reconciliation, mirroring the instance-level
/// `exclusive`/`maxResultSize` options of the original engine.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    /// When `false`, `reconcile` returns every result unmodified.
    pub exclusive: bool,
    /// Distance, in original-source byte positions, beyond which a later
    /// result can no longer possibly cover an earlier one. Bounds the
    /// elimination scan; see [`covered_flags`]'s pruning break.
    pub max_result_size: u32,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            exclusive: false,
            max_result_size: 100,
        }
    }
}

/// Apply `opts` to `results`, returning the surviving subset in their
/// original relative order.
pub fn reconcile(results: &[MatchResult], opts: &ReconcileOptions) -> Vec<MatchResult> {
    if !opts.exclusive || results.len() < 2 {
        return results.to_vec();
    }

    // The elimination scan's pruning break assumes results are visited in
    // ascending original-source start order; the state machine's raw result
    // list is only ordinal-fire order, which does not guarantee that for
    // overlapping windows, so sort a parallel index array first and map
    // eliminated flags back afterward.
    let mut order: Vec<usize> = (0..results.len()).collect();
    order.sort_by(|&a, &b| start_key(&results[a].span).cmp(&start_key(&results[b].span)));

    let sorted_spans: Vec<EventData> = order.iter().map(|&i| results[i].span).collect();
    let eliminated_sorted = covered_flags(&sorted_spans, opts.max_result_size);

    let mut eliminated = vec![false; results.len()];
    for (sorted_idx, original_idx) in order.iter().enumerate() {
        eliminated[*original_idx] = eliminated_sorted[sorted_idx];
    }

    let nof_eliminated = eliminated.iter().filter(|&&e| e).count();
    if nof_eliminated > 0 {
        tracing::debug!(target: "pm.reconcile", nof_eliminated, total = results.len(), "results_eliminated_by_coverage");
    }

    results
        .iter()
        .zip(eliminated.iter())
        .filter_map(|(result, &is_eliminated)| if is_eliminated { None } else { Some(*result) })
        .collect()
}

fn start_key(span: &EventData) -> (u32, u32) {
    (span.start_origseg, span.start_origpos)
}

/// Ported from `getCoveredFlags`: given `spans` sorted ascending by
/// `(start_origseg, start_origpos)`, mark every span that is strictly
/// contained in another (in either direction) for elimination. Two spans
/// that cover each other exactly (identical bounds) eliminate neither.
///
/// `max_result_size` bounds the inner scan: once a later span starts more
/// than `max_result_size` positions past the current span's end, nothing
/// further in the (sorted) list can cover it, so the scan breaks early.
pub fn covered_flags(spans: &[EventData], max_result_size: u32) -> Vec<bool> {
    let mut eliminate = vec![false; spans.len()];

    for ai in 0..spans.len() {
        let result = &spans[ai];
        for ni in ai..spans.len() {
            let follow = &spans[ni];

            if follow.start_origseg > result.end_origseg
                || follow.start_origpos >= result.end_origpos + max_result_size
            {
                break;
            }

            if covers(follow, result) && !identical(follow, result) {
                eliminate[ai] = true;
            }
            if covers(result, follow) && !identical(follow, result) {
                eliminate[ni] = true;
            }
        }
    }

    eliminate
}

/// `a` covers `b`: `a`'s original-source span contains `b`'s entirely.
fn covers(a: &EventData, b: &EventData) -> bool {
    a.start_origseg <= b.start_origseg
        && a.start_origpos <= b.start_origpos
        && a.end_origseg >= b.end_origseg
        && a.end_origpos >= b.end_origpos
}

fn identical(a: &EventData, b: &EventData) -> bool {
    a.start_origseg == b.start_origseg
        && a.start_origpos == b.start_origpos
        && a.end_origseg == b.end_origseg
        && a.end_origpos == b.end_origpos
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_events::{EventHandle, EventKind};

    fn span(start: u32, end: u32) -> EventData {
        EventData::new(
            EventHandle::new(EventKind::Expression, 1).unwrap(),
            start,
            end,
            0,
            start,
            0,
            end,
        )
    }

    fn result(result_handle: u32, start: u32, end: u32) -> MatchResult {
        MatchResult {
            result_handle,
            span: span(start, end),
        }
    }

    #[test]
    fn non_exclusive_returns_everything_unmodified() {
        let results = vec![result(1, 0, 10), result(2, 2, 4)];
        let out = reconcile(&results, &ReconcileOptions { exclusive: false, max_result_size: 100 });
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn exclusive_drops_the_contained_result() {
        let results = vec![result(1, 2, 4), result(2, 0, 10)];
        let out = reconcile(&results, &ReconcileOptions { exclusive: true, max_result_size: 100 });
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].result_handle, 2);
    }

    #[test]
    fn identical_spans_eliminate_neither() {
        let results = vec![result(1, 0, 10), result(2, 0, 10)];
        let out = reconcile(&results, &ReconcileOptions { exclusive: true, max_result_size: 100 });
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn disjoint_spans_survive_both() {
        let results = vec![result(1, 0, 2), result(2, 50, 52)];
        let out = reconcile(&results, &ReconcileOptions { exclusive: true, max_result_size: 5 });
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn pruning_break_respects_max_result_size() {
        // follow starts well past result.end + max_result_size: must not be
        // treated as covering, regardless of actual bounds.
        let spans = vec![span(0, 5), span(200, 210)];
        let eliminated = covered_flags(&spans, 10);
        assert_eq!(eliminated, vec![false, false]);
    }

    #[test]
    fn order_independent_input_is_reconciled_the_same_way() {
        let forward = vec![result(1, 0, 10), result(2, 2, 4)];
        let reversed = vec![result(2, 2, 4), result(1, 0, 10)];

        let out_forward = reconcile(&forward, &ReconcileOptions { exclusive: true, max_result_size: 100 });
        let out_reversed = reconcile(&reversed, &ReconcileOptions { exclusive: true, max_result_size: 100 });

        assert_eq!(out_forward.len(), 1);
        assert_eq!(out_reversed.len(), 1);
        assert_eq!(out_forward[0].result_handle, out_reversed[0].result_handle);
    }
}
