//! Demonstration entrypoint for the pattern matcher: tokenizes a toy
//! whitespace-delimited document, compiles a small built-in set of
//! sequence/within/any example patterns over its own vocabulary, feeds the
//! tokens through `pm-context`, and prints the resulting matches as JSON
//! Lines.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Once;

use anyhow::{Context, Result};
use clap::Parser;
use pm_context::{CompiledPatternMatcher, PatternMatcherInstance};
use pm_model::JoinOp;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "patternmatcher", version, about = "Pattern matcher demonstration CLI")]
struct Args {
    /// Path to a whitespace-tokenized text file; reads stdin if omitted.
    path: Option<PathBuf>,
    /// Compile-options file (overrides discovery of `patternmatcher.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn configure_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "cli.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn read_input(path: Option<&std::path::Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// One whitespace-delimited token: its text, byte offset, and byte length.
fn tokenize(text: &str) -> Vec<(String, u32, u32)> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push((text[s..i].to_string(), s as u32, (i - s) as u32));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push((text[s..].to_string(), s as u32, (text.len() - s) as u32));
    }
    tokens
}

/// Assign a dense term id to each distinct (lowercased) word, in order of
/// first appearance. Term ids are the caller's own dictionary — the core
/// never interprets them beyond identity.
fn intern_terms(tokens: &[(String, u32, u32)]) -> (Vec<u32>, Vec<(String, u32)>) {
    let mut by_word: HashMap<String, u32> = HashMap::new();
    let mut first_seen = Vec::new();
    let mut next_id = 1u32;

    let ids = tokens
        .iter()
        .map(|(word, _, _)| {
            let key = word.to_lowercase();
            *by_word.entry(key.clone()).or_insert_with(|| {
                let id = next_id;
                next_id += 1;
                first_seen.push((key, id));
                id
            })
        })
        .collect();

    (ids, first_seen)
}

/// Compile sequence/any/within demonstration patterns over the document's
/// own most-frequent-to-appear vocabulary. Returns `None` if the document
/// has too little distinct vocabulary to build any of them.
fn build_demo_matcher(
    options: pm_config::BuilderOptions,
    vocab: &[(String, u32)],
) -> Result<Option<CompiledPatternMatcher>> {
    if vocab.len() < 2 {
        return Ok(None);
    }

    let (w0, id0) = &vocab[0];
    let (w1, id1) = &vocab[1];

    let mut instance = PatternMatcherInstance::with_options(options);

    instance.push_term(*id0)?;
    instance.attach_variable("first")?;
    instance.push_term(*id1)?;
    instance.push_expression(JoinOp::Sequence, 2, 20, 0)?;
    instance.define_pattern(&format!("sequence_{w0}_{w1}"), true)?;

    instance.push_term(*id0)?;
    instance.push_term(*id1)?;
    instance.push_expression(JoinOp::Any, 2, 0, 1)?;
    instance.define_pattern(&format!("any_{w0}_or_{w1}"), true)?;

    if let Some((w2, id2)) = vocab.get(2) {
        instance.push_term(*id0)?;
        instance.push_term(*id1)?;
        instance.push_term(*id2)?;
        instance.push_expression(JoinOp::Within, 3, 30, 0)?;
        instance.define_pattern(&format!("within_{w0}_{w1}_{w2}"), true)?;
    }

    Ok(Some(instance.compile()?))
}

fn main() -> Result<()> {
    configure_logging();
    install_panic_hook();

    let args = Args::parse();
    let text = read_input(args.path.as_deref())?;
    let tokens = tokenize(&text);
    let (term_ids, vocab) = intern_terms(&tokens);

    tracing::info!(target: "cli", nof_tokens = tokens.len(), nof_distinct_terms = vocab.len(), "tokenized");

    let options = pm_config::load_from(args.config.clone());
    let Some(matcher) = build_demo_matcher(options, &vocab)? else {
        eprintln!("not enough distinct vocabulary to build demonstration patterns");
        return Ok(());
    };

    let mut ctx = matcher.create_context();
    for (ordpos, (term_id, (_, origpos, origsize))) in term_ids.iter().zip(tokens.iter()).enumerate() {
        ctx.put_input(*term_id, ordpos as u32, 0, *origpos, *origsize)?;
    }

    for result in ctx.fetch_results() {
        println!("{}", serde_json::to_string(&result)?);
    }

    let stats = ctx.statistics();
    tracing::info!(
        target: "cli",
        nof_programs_installed = stats.nof_programs_installed,
        nof_signals_fired = stats.nof_signals_fired,
        "done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_whitespace_and_tracks_byte_offsets() {
        let tokens = tokenize("the quick  fox");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], ("the".to_string(), 0, 3));
        assert_eq!(tokens[1], ("quick".to_string(), 4, 5));
        assert_eq!(tokens[2], ("fox".to_string(), 11, 3));
    }

    #[test]
    fn intern_terms_assigns_dense_ids_by_first_appearance() {
        let tokens = tokenize("the Fox the dog fox");
        let (ids, vocab) = intern_terms(&tokens);
        assert_eq!(ids, vec![1, 2, 1, 3, 2]);
        assert_eq!(
            vocab,
            vec![
                ("the".to_string(), 1),
                ("fox".to_string(), 2),
                ("dog".to_string(), 3),
            ]
        );
    }

    #[test]
    fn build_demo_matcher_needs_at_least_two_distinct_terms() {
        let tokens = tokenize("solo");
        let (_ids, vocab) = intern_terms(&tokens);
        let matcher = build_demo_matcher(pm_config::BuilderOptions::default(), &vocab).unwrap();
        assert!(matcher.is_none());
    }

    #[test]
    fn build_demo_matcher_fires_the_sequence_pattern_end_to_end() {
        let tokens = tokenize("the quick fox");
        let (term_ids, vocab) = intern_terms(&tokens);
        let matcher = build_demo_matcher(pm_config::BuilderOptions::default(), &vocab)
            .unwrap()
            .unwrap();

        let mut ctx = matcher.create_context();
        for (ordpos, (term_id, (_, origpos, origsize))) in term_ids.iter().zip(tokens.iter()).enumerate() {
            ctx.put_input(*term_id, ordpos as u32, 0, *origpos, *origsize).unwrap();
        }

        let results = ctx.fetch_results();
        assert!(results.iter().any(|r| r.name == "sequence_the_quick"));
    }
}
