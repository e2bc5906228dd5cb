// Copyright (c) 2026 igdiscover developers. All rights reserved.
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility
)]

//! Run configuration, stored as `igdiscover.toml` in the run directory.
//!
//! Settings are addressed by dotted keys (`j_discovery.allele_ratio`). Every
//! change is validated against the full schema before it is accepted.

use anyhow::{Context, Result};
use igd_types::first_invalid_base;
use log::warn;
use read_group::spec::DEFAULT_PSEUDO_CDR3;
use read_group::{BarcodeSpec, PseudoCdr3Slice};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "igdiscover.toml";

/// Keys that may be absent from the file.
/// Longest barcode accepted at either end of a read.
pub const MAX_BARCODE_LENGTH: usize = 1000;

const OPTIONAL_KEYS: [&str; 5] = ["limit", "reads1", "reads2", "single_reads", "database"];

#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("invalid primer '{primer}' in {key}: '{base}' is not a nucleotide")]
    InvalidPrimer {
        key: &'static str,
        primer: String,
        base: char,
    },

    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: String,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("barcode_length_5prime and barcode_length_3prime cannot both be set")]
    ConflictingBarcodes,

    #[error("{key} must be at most {}, got {value}", MAX_BARCODE_LENGTH)]
    BarcodeTooLong { key: &'static str, value: usize },

    #[error("iterations must be at least 1")]
    NoIterations,

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeProgram {
    /// Built-in overlap merger.
    Overlap,
    /// Use the first reads of each pair unmerged.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FilterConfig {
    pub v_coverage: f64,
    pub j_coverage: f64,
    pub v_identity: f64,
    pub require_j: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            v_coverage: 90.0,
            j_coverage: 60.0,
            v_identity: 80.0,
            require_j: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// Reads a candidate needs to be accepted.
    pub min_count: usize,
    /// Candidate reads relative to all reads of the parent allele.
    pub allele_ratio: f64,
    pub cluster_distance: u32,
    pub min_identity: f64,
    pub min_coverage: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            enabled: true,
            min_count: 10,
            allele_ratio: 0.1,
            cluster_distance: 1,
            min_identity: 90.0,
            min_coverage: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Maximum number of discovery rounds.
    pub iterations: usize,
    /// Worker threads for assignment, 0 for all cores.
    pub threads: usize,
    /// Only use the first `limit` reads.
    pub limit: Option<usize>,
    pub minimum_length: usize,
    pub barcode_length_5prime: usize,
    pub barcode_length_3prime: usize,
    pub pseudo_cdr3: PseudoCdr3Slice,
    /// Trim trailing G from the pseudo-CDR3 (RACE protocols).
    pub race_g: bool,
    pub merge_program: MergeProgram,
    pub forward_primers: Vec<String>,
    pub reverse_primers: Vec<String>,
    pub d_coverage: f64,
    pub reads1: Option<PathBuf>,
    pub reads2: Option<PathBuf>,
    pub single_reads: Option<PathBuf>,
    pub database: Option<PathBuf>,
    // sections last, TOML tables follow plain values
    pub preprocessing_filter: FilterConfig,
    pub final_filter: FilterConfig,
    pub v_discovery: DiscoveryConfig,
    pub j_discovery: DiscoveryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            iterations: 10,
            threads: 0,
            limit: None,
            minimum_length: 250,
            barcode_length_5prime: 0,
            barcode_length_3prime: 0,
            pseudo_cdr3: DEFAULT_PSEUDO_CDR3,
            race_g: false,
            merge_program: MergeProgram::Overlap,
            forward_primers: Vec::new(),
            reverse_primers: Vec::new(),
            d_coverage: 70.0,
            reads1: None,
            reads2: None,
            single_reads: None,
            database: None,
            preprocessing_filter: FilterConfig::default(),
            final_filter: FilterConfig::default(),
            v_discovery: DiscoveryConfig::default(),
            j_discovery: DiscoveryConfig {
                allele_ratio: 0.2,
                ..DiscoveryConfig::default()
            },
        }
    }
}

/// Parse a value the way it would be written in the config file. Bare words
/// that are not TOML literals are taken as strings.
fn parse_literal(raw: &str) -> toml::Value {
    let raw = raw.trim();
    toml::from_str::<toml::Table>(&format!("v = {raw}"))
        .ok()
        .and_then(|mut table| table.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

fn check_range(key: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigValidationError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigValidationError::OutOfRange {
            key: key.to_string(),
            min,
            max,
            value,
        });
    }
    Ok(())
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigValidationError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigValidationError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let config = Config::from_toml(&text)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        config.warn_non_default();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml()?)
            .with_context(|| format!("could not write {}", path.display()))
    }

    fn warn_non_default(&self) {
        let default = Config::default();
        if self.preprocessing_filter != default.preprocessing_filter {
            warn!("using non-default preprocessing_filter = {:?}", self.preprocessing_filter);
        }
        if self.final_filter != default.final_filter {
            warn!("using non-default final_filter = {:?}", self.final_filter);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.iterations == 0 {
            return Err(ConfigValidationError::NoIterations);
        }
        for (key, value) in [
            ("barcode_length_5prime", self.barcode_length_5prime),
            ("barcode_length_3prime", self.barcode_length_3prime),
        ] {
            if value > MAX_BARCODE_LENGTH {
                return Err(ConfigValidationError::BarcodeTooLong { key, value });
            }
        }
        if self.barcode_length_5prime > 0 && self.barcode_length_3prime > 0 {
            return Err(ConfigValidationError::ConflictingBarcodes);
        }
        for (key, primers) in [
            ("forward_primers", &self.forward_primers),
            ("reverse_primers", &self.reverse_primers),
        ] {
            for primer in primers {
                let invalid = if primer.is_empty() {
                    Some(' ')
                } else {
                    first_invalid_base(primer.as_bytes()).map(|(_, base)| base as char)
                };
                if let Some(base) = invalid {
                    return Err(ConfigValidationError::InvalidPrimer {
                        key,
                        primer: primer.clone(),
                        base,
                    });
                }
            }
        }
        check_range("d_coverage", self.d_coverage, 0.0, 100.0)?;
        for (name, filter) in [
            ("preprocessing_filter", &self.preprocessing_filter),
            ("final_filter", &self.final_filter),
        ] {
            check_range(&format!("{name}.v_coverage"), filter.v_coverage, 0.0, 100.0)?;
            check_range(&format!("{name}.j_coverage"), filter.j_coverage, 0.0, 100.0)?;
            check_range(&format!("{name}.v_identity"), filter.v_identity, 0.0, 100.0)?;
        }
        for (name, discovery) in [
            ("v_discovery", &self.v_discovery),
            ("j_discovery", &self.j_discovery),
        ] {
            check_range(&format!("{name}.allele_ratio"), discovery.allele_ratio, 0.0, 1.0)?;
            check_range(&format!("{name}.min_identity"), discovery.min_identity, 0.0, 100.0)?;
            check_range(&format!("{name}.min_coverage"), discovery.min_coverage, 0.0, 100.0)?;
        }
        Ok(())
    }

    /// Current value of a dotted key. `Ok(None)` for optional settings that
    /// are not set.
    pub fn get(&self, key: &str) -> Result<Option<toml::Value>, ConfigValidationError> {
        let doc = toml::Value::try_from(self)?;
        let mut value = &doc;
        for part in key.split('.') {
            match value.get(part) {
                Some(v) => value = v,
                None if OPTIONAL_KEYS.contains(&key) => return Ok(None),
                None => return Err(ConfigValidationError::UnknownKey(key.to_string())),
            }
        }
        if value.is_table() {
            return Err(ConfigValidationError::InvalidValue {
                key: key.to_string(),
                message: "is a section, not a setting".to_string(),
            });
        }
        Ok(Some(value.clone()))
    }

    /// Set a dotted key from its textual form, e.g. `("j_discovery.allele_ratio",
    /// "0.37")` or `("forward_primers", "['CGTGA']")`. The configuration is
    /// unchanged if the result does not validate.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), ConfigValidationError> {
        let mut doc = toml::Value::try_from(&*self)?;
        let (parents, leaf) = match key.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, key),
        };
        let mut table = doc
            .as_table_mut()
            .ok_or_else(|| ConfigValidationError::UnknownKey(key.to_string()))?;
        for part in parents.into_iter().flat_map(|p| p.split('.')) {
            table = table
                .get_mut(part)
                .and_then(toml::Value::as_table_mut)
                .ok_or_else(|| ConfigValidationError::UnknownKey(key.to_string()))?;
        }
        match table.get(leaf) {
            Some(existing) if existing.is_table() => {
                return Err(ConfigValidationError::InvalidValue {
                    key: key.to_string(),
                    message: "is a section, not a setting".to_string(),
                })
            }
            Some(_) => {}
            None if parents.is_none() && OPTIONAL_KEYS.contains(&leaf) => {}
            None => return Err(ConfigValidationError::UnknownKey(key.to_string())),
        }
        table.insert(leaf.to_string(), parse_literal(raw));

        let updated: Config =
            doc.try_into()
                .map_err(|e: toml::de::Error| ConfigValidationError::InvalidValue {
                    key: key.to_string(),
                    message: e.message().to_string(),
                })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Signed barcode length: positive at the 5' end, negative at the 3' end.
    /// Both lengths are bounded by `validate`, so the casts cannot wrap.
    pub fn barcode_length(&self) -> i32 {
        if self.barcode_length_5prime > 0 {
            self.barcode_length_5prime as i32
        } else {
            -(self.barcode_length_3prime as i32)
        }
    }

    pub fn barcode_spec(&self) -> BarcodeSpec {
        BarcodeSpec::new(self.barcode_length())
            .with_pseudo_cdr3(self.pseudo_cdr3)
            .with_trim_g(self.race_g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_roundtrip() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("pseudo_cdr3 = \"-80:-60\""));
        assert!(!text.contains("limit"));
        assert_eq!(Config::from_toml(&text).unwrap(), config);
        assert_eq!(Config::from_toml("").unwrap(), config);
    }

    #[test]
    fn test_set_scalar_and_nested() {
        let mut config = Config::default();
        config.set("d_coverage", "12").unwrap();
        assert_eq!(config.d_coverage, 12.0);
        config.set("j_discovery.allele_ratio", "0.37").unwrap();
        assert_eq!(config.j_discovery.allele_ratio, 0.37);
        assert_eq!(
            config.get("j_discovery.allele_ratio").unwrap(),
            Some(toml::Value::Float(0.37))
        );
        config.set("barcode_length_3prime", "21").unwrap();
        assert_eq!(config.barcode_length(), -21);
        config.set("pseudo_cdr3", "-5:-2").unwrap();
        assert_eq!(config.barcode_spec().pseudo_cdr3, "-5:-2".parse().ok());
    }

    #[test]
    fn test_set_primers_and_strings() {
        let mut config = Config::default();
        config.set("forward_primers", "['CGTGA']").unwrap();
        assert_eq!(config.forward_primers, ["CGTGA"]);
        config.set("merge_program", "none").unwrap();
        assert_eq!(config.merge_program, MergeProgram::None);
        config.set("reads1", "reads.1.fastq.gz").unwrap();
        assert_eq!(config.reads1, Some(PathBuf::from("reads.1.fastq.gz")));
        assert_eq!(config.get("limit").unwrap(), None);
        config.set("limit", "1000").unwrap();
        assert_eq!(config.limit, Some(1000));
    }

    #[test]
    fn test_rejected_values_leave_config_unchanged() {
        let mut config = Config::default();
        let before = config.clone();

        let err = config.set("forward_primers", "['CGTXA']").unwrap_err();
        assert!(matches!(err, ConfigValidationError::InvalidPrimer { base: 'X', .. }));
        // a bare word is a string, not a list
        assert!(config.set("reverse_primers", "CGTGA").is_err());
        assert!(matches!(
            config.set("no_such_key", "1"),
            Err(ConfigValidationError::UnknownKey(_))
        ));
        assert!(matches!(
            config.set("j_discovery.no_such_key", "1"),
            Err(ConfigValidationError::UnknownKey(_))
        ));
        assert!(config.set("j_discovery", "1").is_err());
        assert!(config.set("merge_program", "flash").is_err());
        assert!(config.set("pseudo_cdr3", "-2:-5").is_err());
        assert!(matches!(
            config.set("j_discovery.allele_ratio", "1.5"),
            Err(ConfigValidationError::OutOfRange { .. })
        ));
        config.set("barcode_length_5prime", "12").unwrap();
        assert!(matches!(
            config.set("barcode_length_3prime", "12"),
            Err(ConfigValidationError::ConflictingBarcodes)
        ));
        config.barcode_length_5prime = 0;
        assert_eq!(config, before);
    }

    #[test]
    fn test_barcode_length_is_bounded() {
        let mut config = Config::default();
        config.set("barcode_length_3prime", "1000").unwrap();
        assert_eq!(config.barcode_length(), -1000);
        assert!(matches!(
            config.set("barcode_length_3prime", "4294967296"),
            Err(ConfigValidationError::BarcodeTooLong {
                key: "barcode_length_3prime",
                ..
            })
        ));
        assert!(matches!(
            config.set("barcode_length_5prime", "2147483648"),
            Err(ConfigValidationError::BarcodeTooLong { .. })
        ));
        assert_eq!(config.barcode_length(), -1000);
    }

    #[test]
    fn test_unknown_key_in_file() {
        let err = Config::from_toml("iterations = 3\ncolour = 'red'\n").unwrap_err();
        assert!(err.to_string().contains("colour"), "{err}");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = Config::default();
        config.set("iterations", "3").unwrap();
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap().iterations, 3);
    }
}
