// Copyright (c) 2026 igdiscover developers. All rights reserved.
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility
)]

//!
//! Versioned germline allele database: loading and validating the V/D/J FASTA
//! files of a database directory, and deriving new snapshots as alleles are
//! discovered.
//!

pub mod errors;

use anyhow::Result;
use bio::io::fasta;
use errors::{ErrorContext, FastaState, GermlineDbError};
use igd_types::{first_invalid_base, parse_allele_name, Locus, Segment};
use itertools::Itertools;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GermlineAllele {
    pub name: String,
    pub locus: Option<Locus>,
    pub segment: Segment,
    pub sequence: Vec<u8>,
}

impl GermlineAllele {
    /// The locus is taken from the name when it follows IMGT conventions.
    pub fn new(name: impl Into<String>, segment: Segment, sequence: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let locus = parse_allele_name(&name).map(|(locus, _)| locus);
        GermlineAllele {
            name,
            locus,
            segment,
            sequence: sequence.into(),
        }
    }

    pub fn with_locus(mut self, locus: Option<Locus>) -> Self {
        self.locus = locus;
        self
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

pub fn segment_fasta_path(dir: &Path, segment: Segment) -> PathBuf {
    dir.join(format!("{segment}.fasta"))
}

/// An immutable snapshot of the allele set. Iteration `n` of a discovery run
/// assigns against version `n - 1`; the seed database is version 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GermlineDatabase {
    version: usize,
    alleles: BTreeMap<String, GermlineAllele>,
}

impl GermlineDatabase {
    pub fn new<I>(version: usize, alleles: I) -> Result<Self, GermlineDbError>
    where
        I: IntoIterator<Item = GermlineAllele>,
    {
        let mut map = BTreeMap::new();
        for allele in alleles {
            if map.contains_key(&allele.name) {
                return Err(GermlineDbError::DuplicateName {
                    name: allele.name,
                    state: FastaState::Unknown,
                    first_line: None,
                });
            }
            map.insert(allele.name.clone(), allele);
        }
        Ok(GermlineDatabase {
            version,
            alleles: map,
        })
    }

    /// Validate the FASTA files of a database directory without keeping them.
    pub fn check(dir: &Path) -> Result<()> {
        GermlineDatabase::from_directory(dir).map(|_| ())
    }

    /// Load `V.fasta`, `D.fasta` and `J.fasta` from `dir`. The D file is
    /// optional since light chain loci have no D genes.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let mut alleles = Vec::new();
        let mut line_of_name = HashMap::new();
        for segment in Segment::all() {
            let fa_file = segment_fasta_path(dir, segment);
            if !fa_file.exists() {
                if segment == Segment::D {
                    continue;
                }
                return Err(GermlineDbError::MissingSegmentFile {
                    dir: dir.to_path_buf(),
                    segment,
                }
                .into());
            }
            let loaded = read_segment_fasta(&fa_file, segment, &mut line_of_name)?;
            if loaded.is_empty() && segment != Segment::D {
                return Err(GermlineDbError::NoAlleles { fa_file }.into());
            }
            alleles.extend(loaded);
        }
        let db = GermlineDatabase::new(0, alleles)?;
        info!(
            "Loaded germline database from {} ({})",
            dir.display(),
            db.summary()
        );
        Ok(db)
    }

    pub fn version(&self) -> usize {
        self.version
    }

    pub fn len(&self) -> usize {
        self.alleles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alleles.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&GermlineAllele> {
        self.alleles.get(name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.alleles.contains_key(name)
    }

    /// Alleles in name order.
    pub fn iter(&self) -> impl Iterator<Item = &GermlineAllele> {
        self.alleles.values()
    }

    pub fn iter_segment(&self, segment: Segment) -> impl Iterator<Item = &GermlineAllele> {
        self.alleles
            .values()
            .filter(move |allele| allele.segment == segment)
    }

    pub fn contains_sequence(&self, segment: Segment, sequence: &[u8]) -> bool {
        self.iter_segment(segment)
            .any(|allele| allele.sequence == sequence)
    }

    /// `V=12 D=0 J=3`
    pub fn summary(&self) -> String {
        let counts = self.alleles.values().counts_by(|allele| allele.segment);
        Segment::all()
            .iter()
            .map(|segment| format!("{segment}={}", counts.get(segment).copied().unwrap_or(0)))
            .join(" ")
    }

    /// Next snapshot containing every current allele plus `additions`.
    pub fn with_additions<I>(&self, additions: I) -> Result<GermlineDatabase, GermlineDbError>
    where
        I: IntoIterator<Item = GermlineAllele>,
    {
        let mut alleles = self.alleles.clone();
        for allele in additions {
            if alleles.contains_key(&allele.name) {
                return Err(GermlineDbError::NameAlreadyPresent {
                    name: allele.name,
                    version: self.version,
                });
            }
            alleles.insert(allele.name.clone(), allele);
        }
        Ok(GermlineDatabase {
            version: self.version + 1,
            alleles,
        })
    }

    pub fn is_superset_of(&self, other: &GermlineDatabase) -> bool {
        other
            .alleles
            .iter()
            .all(|(name, allele)| self.alleles.get(name) == Some(allele))
    }

    pub fn write_fasta<W: Write>(&self, writer: W) -> Result<()> {
        write_alleles(writer, self.iter())
    }

    /// Write one FASTA file per segment, the layout `from_directory` reads.
    pub fn write_directory(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        for segment in Segment::all() {
            let file = File::create(segment_fasta_path(dir, segment))?;
            write_alleles(BufWriter::new(file), self.iter_segment(segment))?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a GermlineDatabase {
    type IntoIter = std::collections::btree_map::Values<'a, String, GermlineAllele>;
    type Item = &'a GermlineAllele;

    fn into_iter(self) -> Self::IntoIter {
        self.alleles.values()
    }
}

fn write_alleles<'a, W, I>(writer: W, alleles: I) -> Result<()>
where
    W: Write,
    I: Iterator<Item = &'a GermlineAllele>,
{
    let mut writer = fasta::Writer::new(writer);
    for allele in alleles {
        writer.write(&allele.name, None, &allele.sequence)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_segment_fasta(
    fa_file: &Path,
    segment: Segment,
    line_of_name: &mut HashMap<String, Option<usize>>,
) -> Result<Vec<GermlineAllele>> {
    let fa_reader = fasta::Reader::from_file(fa_file)?;
    let mut context = ErrorContext::new(fa_file)?;
    let mut alleles = Vec::new();

    for record in fa_reader.records() {
        let record = record.map_err(|e| GermlineDbError::CannotReadFastaRecord {
            fa_file: fa_file.to_path_buf(),
            state: context.state.clone(),
            error: e,
        })?;
        context.advance(&record)?;

        if record.seq().is_empty() {
            return Err(GermlineDbError::EmptySequence {
                fa_file: fa_file.to_path_buf(),
                state: context.state.clone(),
            }
            .into());
        }
        if let Some((i, base)) = first_invalid_base(record.seq()) {
            return Err(GermlineDbError::InvalidBaseInSequence {
                fa_file: fa_file.to_path_buf(),
                state: context.state.clone(),
                base: base as char,
                position: i + 1,
            }
            .into());
        }
        if let Some(&first_line) = line_of_name.get(record.id()) {
            return Err(GermlineDbError::DuplicateName {
                name: record.id().to_string(),
                state: context.state.clone(),
                first_line,
            }
            .into());
        }
        line_of_name.insert(record.id().to_string(), context.state.line_num());
        alleles.push(GermlineAllele::new(
            record.id(),
            segment,
            record.seq().to_ascii_uppercase(),
        ));
    }
    Ok(alleles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const V_FASTA: &str = ">IGHV1-2*02\nCAGGTGCAGCTGGTGCAG\n>IGHV1-3*01\ncaggtccagcttgtgcag\n";
    const J_FASTA: &str = ">IGHJ4*02\nACTACTTTGACTACTGG\n";

    fn write_db(v: &str, d: Option<&str>, j: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("V.fasta"), v).unwrap();
        if let Some(d) = d {
            fs::write(dir.path().join("D.fasta"), d).unwrap();
        }
        fs::write(dir.path().join("J.fasta"), j).unwrap();
        dir
    }

    #[test]
    fn test_load_directory() {
        let dir = write_db(V_FASTA, None, J_FASTA);
        let db = GermlineDatabase::from_directory(dir.path()).unwrap();
        assert_eq!(db.version(), 0);
        assert_eq!(db.len(), 3);
        assert_eq!(db.summary(), "V=2 D=0 J=1");
        let allele = db.get("IGHV1-3*01").unwrap();
        assert_eq!(allele.sequence, b"CAGGTCCAGCTTGTGCAG");
        assert_eq!(allele.locus, Some(Locus::IGH));
        assert_eq!(allele.segment, Segment::V);
        assert!(db.contains_sequence(Segment::J, b"ACTACTTTGACTACTGG"));
        assert!(!db.contains_sequence(Segment::V, b"ACTACTTTGACTACTGG"));
        let names: Vec<_> = db.iter_segment(Segment::V).map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["IGHV1-2*02", "IGHV1-3*01"]);
    }

    #[test]
    fn test_missing_j_file() {
        let dir = write_db(V_FASTA, None, J_FASTA);
        fs::remove_file(dir.path().join("J.fasta")).unwrap();
        let err = GermlineDatabase::check(dir.path()).unwrap_err();
        assert!(err.to_string().contains("has no J.fasta file"));
    }

    #[test]
    fn test_empty_v_file() {
        let dir = write_db("", Some(""), J_FASTA);
        let err = GermlineDatabase::check(dir.path()).unwrap_err();
        assert!(err.to_string().contains("contains no records"), "{err}");
    }

    #[test]
    fn test_invalid_base() {
        let dir = write_db(V_FASTA, None, ">IGHJ1*01\nACGT\n>IGHJ4*02\nACXGT\n");
        let err = GermlineDatabase::check(dir.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Invalid character 'X' in the sequence at position 3"));
        assert!(msg.contains("LINE     3: >IGHJ4*02"), "{msg}");
    }

    #[test]
    fn test_duplicate_name_across_files() {
        let dir = write_db(V_FASTA, Some(">IGHV1-2*02\nGGGACG\n"), J_FASTA);
        let err = GermlineDatabase::check(dir.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The allele name 'IGHV1-2*02' is duplicated (LINE     1: >IGHV1-2*02). \
             The same name was encountered in line 1."
        );
    }

    #[test]
    fn test_with_additions() {
        let seed = GermlineDatabase::new(
            0,
            vec![
                GermlineAllele::new("IGHV1-2*02", Segment::V, b"ACGTACGT".to_vec()),
                GermlineAllele::new("IGHJ4*02", Segment::J, b"TTGGCC".to_vec()),
            ],
        )
        .unwrap();
        let novel = GermlineAllele::new("IGHV_novel01", Segment::V, b"ACGTTCGT".to_vec());
        assert_eq!(novel.locus, Some(Locus::IGH));

        let next = seed.with_additions(vec![novel.clone()]).unwrap();
        assert_eq!(next.version(), 1);
        assert_eq!(next.len(), 3);
        assert!(next.is_superset_of(&seed));
        assert!(!seed.is_superset_of(&next));
        // the seed is untouched
        assert_eq!(seed.len(), 2);

        let err = next.with_additions(vec![novel]).unwrap_err();
        assert!(matches!(err, GermlineDbError::NameAlreadyPresent { version: 1, .. }));
    }

    #[test]
    fn test_write_directory_roundtrip() {
        let dir = write_db(V_FASTA, Some(">IGHD3-10*01\nGTATTACTATGGTTCGGGGAGTTATTATAAC\n"), J_FASTA);
        let db = GermlineDatabase::from_directory(dir.path()).unwrap();
        let out = tempfile::tempdir().unwrap();
        db.write_directory(out.path()).unwrap();
        let reloaded = GermlineDatabase::from_directory(out.path()).unwrap();
        assert_eq!(reloaded, db);

        let mut fasta = Vec::new();
        db.write_fasta(&mut fasta).unwrap();
        assert!(String::from_utf8(fasta).unwrap().starts_with(">IGHD3-10*01\n"));
    }
}
