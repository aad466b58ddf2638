//! The program table optimizer (§4.3): key-event selection, stop-word
//! promotion, and range clamping. A pure function over the table — it must
//! never observe input tokens.

use std::collections::{BTreeMap, HashMap, HashSet};

use pm_events::EventHandle;
use pm_model::Program;

/// Tuning knobs handed to [`run`]; populated from [`crate::ProgramTable`]'s
/// option surface (`stopwordOccurrenceFactor`, `weightFactor`, `maxRange`).
#[derive(Debug, Clone, Copy)]
pub struct OptimizeOptions {
    pub stopword_occurrence_factor: f64,
    pub weight_factor: f64,
    pub max_range: Option<u32>,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            stopword_occurrence_factor: 1.0,
            weight_factor: 1.0,
            max_range: None,
        }
    }
}

/// Diagnostics produced by the optimizer and retained for
/// `ProgramTable::statistics()`.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    /// Histogram of key-event frequency buckets: frequency → number of
    /// programs keyed on an event of that frequency.
    pub key_event_dist: BTreeMap<u32, u32>,
    /// Packed event handles deemed too frequent to gate a program alone.
    pub stop_word_set: HashSet<u32>,
    pub nof_alt_key_programs_installed: u32,
}

const DEFAULT_FREQUENCY: u32 = 1;

fn frequency_of(event_frequency: &HashMap<u32, u32>, event: EventHandle) -> u32 {
    *event_frequency
        .get(&event.packed())
        .unwrap_or(&DEFAULT_FREQUENCY)
}

fn median(mut values: Vec<u32>) -> u32 {
    if values.is_empty() {
        return DEFAULT_FREQUENCY;
    }
    values.sort_unstable();
    values[values.len() / 2]
}

/// Run the optimizer over `programs` in place, returning the diagnostics it
/// collected. Eligible-as-key triggers were already marked `is_key = true`
/// by the join-operator compiler; this pass narrows that set down to the
/// single cheapest trigger per program (promoting a second one to an
/// "alt-key" if the chosen key turns out to be a stop-word).
pub fn run(programs: &mut [Program], event_frequency: &HashMap<u32, u32>, opts: &OptimizeOptions) -> Statistics {
    let mut stats = Statistics::default();

    // Pass 1: collect the frequency of every currently-eligible key trigger
    // per program, so we can compute the stop-word threshold before
    // mutating anything.
    let mut chosen_key_freqs = Vec::with_capacity(programs.len());
    for program in programs.iter() {
        let mut best: Option<(usize, u32, f64)> = None;
        for (idx, trigger) in program.triggers.iter().enumerate() {
            if !trigger.is_key {
                continue;
            }
            let freq = frequency_of(event_frequency, trigger.event);
            let weighted = freq as f64 * opts.weight_factor;
            if best.map_or(true, |(_, _, bw)| weighted < bw) {
                best = Some((idx, freq, weighted));
            }
        }
        chosen_key_freqs.push(best.map(|(idx, freq, _)| (idx, freq)));
    }

    let median_key_freq = median(
        chosen_key_freqs
            .iter()
            .filter_map(|c| c.map(|(_, f)| f))
            .collect(),
    );

    let is_stopword = |freq: u32| (freq as f64) * opts.stopword_occurrence_factor > median_key_freq as f64;

    // Pass 2: narrow each program's eligible set to the chosen key trigger
    // (clearing is_key on the rest), and promote an alt-key if the chosen
    // one is a stop-word.
    for (program, chosen) in programs.iter_mut().zip(chosen_key_freqs.into_iter()) {
        let Some((chosen_idx, chosen_freq)) = chosen else {
            continue;
        };

        for (idx, trigger) in program.triggers.iter_mut().enumerate() {
            if trigger.is_key && idx != chosen_idx {
                trigger.is_key = false;
            }
        }

        *stats.key_event_dist.entry(chosen_freq).or_insert(0) += 1;

        if is_stopword(chosen_freq) {
            stats
                .stop_word_set
                .insert(program.triggers[chosen_idx].event.packed());

            // Install an alt-key: the next cheapest non-chosen trigger, if
            // any, is also woken so the instance is not solely gated on a
            // high-frequency event.
            let alt = program
                .triggers
                .iter()
                .enumerate()
                .filter(|(idx, _)| *idx != chosen_idx)
                .min_by_key(|(_, t)| frequency_of(event_frequency, t.event));
            if let Some((alt_idx, _)) = alt {
                program.triggers[alt_idx].is_key = true;
                stats.nof_alt_key_programs_installed += 1;
            }
        }

        if let Some(max_range) = opts.max_range {
            if program.range > max_range {
                program.range = max_range;
            }
        }

        tracing::debug!(
            target: "pm.table",
            program_id = program.id,
            key_trigger_freq = chosen_freq,
            range = program.range,
            "program_optimized"
        );
    }

    stats
}
