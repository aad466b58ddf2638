//! The five recognized pattern-matching compile options
//! (`stopwordOccurrenceFactor`, `weightFactor`, `maxRange`, `maxResultSize`,
//! `exclusive`), an optional `patternmatcher.toml` defaults file, and the
//! glue turning both into the option structs `pm-table` and `pm-reconcile`
//! actually consume.

mod error;

use std::{fs, path::PathBuf};

use serde::Deserialize;

pub use error::ConfigError;

use pm_reconcile::ReconcileOptions;
use pm_table::OptimizeOptions;

/// The live, merged set of compile options a `PatternMatcherInstance` holds.
/// Unlike [`OptionsFile`], every field here has a concrete value — loading
/// and `define_option` calls only ever narrow it further.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuilderOptions {
    pub stopword_occurrence_factor: f64,
    pub weight_factor: f64,
    pub max_range: Option<u32>,
    pub max_result_size: u32,
    pub exclusive: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            stopword_occurrence_factor: 1.0,
            weight_factor: 1.0,
            max_range: None,
            max_result_size: 100,
            exclusive: false,
        }
    }
}

impl BuilderOptions {
    /// The option names `define_option` accepts, in declaration order.
    pub fn compile_option_names() -> &'static [&'static str] {
        &[
            "stopwordOccurrenceFactor",
            "weightFactor",
            "maxRange",
            "exclusive",
            "maxResultSize",
        ]
    }

    /// Set one option by its (case-insensitive) name. `exclusive` ignores
    /// `value` and is simply switched on, matching the reference engine's
    /// `defineOption` (a boolean option expressed through the same
    /// `(name, f64)` call signature every option shares).
    pub fn define_option(&mut self, name: &str, value: f64) -> Result<(), ConfigError> {
        if name.eq_ignore_ascii_case("stopwordOccurrenceFactor") {
            self.stopword_occurrence_factor = value;
        } else if name.eq_ignore_ascii_case("weightFactor") {
            self.weight_factor = value;
        } else if name.eq_ignore_ascii_case("maxRange") {
            self.max_range = Some(round_option(value));
        } else if name.eq_ignore_ascii_case("maxResultSize") {
            self.max_result_size = round_option(value);
        } else if name.eq_ignore_ascii_case("exclusive") {
            self.exclusive = true;
        } else {
            return Err(ConfigError::UnknownOption { name: name.to_string() });
        }
        tracing::trace!(target: "pm.config", name, value, "option_defined");
        Ok(())
    }

    pub fn to_optimize_options(&self) -> OptimizeOptions {
        OptimizeOptions {
            stopword_occurrence_factor: self.stopword_occurrence_factor,
            weight_factor: self.weight_factor,
            max_range: self.max_range,
        }
    }

    pub fn to_reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            exclusive: self.exclusive,
            max_result_size: self.max_result_size,
        }
    }
}

fn round_option(value: f64) -> u32 {
    (value + f64::EPSILON) as u32
}

/// The on-disk shape of `patternmatcher.toml`: every field optional, so a
/// partial file only overrides what it names.
#[derive(Debug, Deserialize, Default, Clone, Copy)]
pub struct OptionsFile {
    #[serde(default)]
    pub stopword_occurrence_factor: Option<f64>,
    #[serde(default)]
    pub weight_factor: Option<f64>,
    #[serde(default)]
    pub max_range: Option<u32>,
    #[serde(default)]
    pub max_result_size: Option<u32>,
    #[serde(default)]
    pub exclusive: Option<bool>,
}

impl OptionsFile {
    fn apply_to(self, opts: &mut BuilderOptions) {
        if let Some(v) = self.stopword_occurrence_factor {
            opts.stopword_occurrence_factor = v;
        }
        if let Some(v) = self.weight_factor {
            opts.weight_factor = v;
        }
        if let Some(v) = self.max_range {
            opts.max_range = Some(v);
        }
        if let Some(v) = self.max_result_size {
            opts.max_result_size = v;
        }
        if let Some(v) = self.exclusive {
            opts.exclusive = v;
        }
    }
}

/// Locate the effective config path: `./patternmatcher.toml` if present,
/// otherwise the platform config directory.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("patternmatcher.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("patternmatcher").join("patternmatcher.toml");
    }
    PathBuf::from("patternmatcher.toml")
}

/// Load `path` (or the result of [`discover`]) over the compiled-in
/// defaults. A missing or unparseable file silently falls back to defaults,
/// matching the original engine's "config is always optional" posture.
pub fn load_from(path: Option<PathBuf>) -> BuilderOptions {
    let path = path.unwrap_or_else(discover);
    let mut opts = BuilderOptions::default();

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<OptionsFile>(&content) {
            Ok(file) => {
                file.apply_to(&mut opts);
                tracing::debug!(target: "pm.config", path = %path.display(), "options_loaded");
            }
            Err(err) => {
                tracing::warn!(target: "pm.config", path = %path.display(), error = %err, "options_file_unparsable_using_defaults");
            }
        },
        Err(_) => {
            tracing::debug!(target: "pm.config", path = %path.display(), "no_options_file_using_defaults");
        }
    }

    opts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_option_name_is_rejected() {
        let mut opts = BuilderOptions::default();
        let err = opts.define_option("bogus", 1.0).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { .. }));
    }

    #[test]
    fn exclusive_ignores_its_value_argument() {
        let mut opts = BuilderOptions::default();
        opts.define_option("exclusive", 0.0).unwrap();
        assert!(opts.exclusive);
    }

    #[test]
    fn option_names_are_case_insensitive() {
        let mut opts = BuilderOptions::default();
        opts.define_option("MAXRANGE", 42.0).unwrap();
        assert_eq!(opts.max_range, Some(42));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let opts = load_from(Some(PathBuf::from("/nonexistent/patternmatcher.toml")));
        assert_eq!(opts, BuilderOptions::default());
    }

    #[test]
    fn partial_file_only_overrides_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patternmatcher.toml");
        fs::write(&path, "max_result_size = 250\nexclusive = true\n").unwrap();

        let opts = load_from(Some(path));
        assert_eq!(opts.max_result_size, 250);
        assert!(opts.exclusive);
        assert_eq!(opts.weight_factor, BuilderOptions::default().weight_factor);
    }

    #[test]
    fn compile_option_names_lists_all_five() {
        assert_eq!(BuilderOptions::compile_option_names().len(), 5);
    }
}
