// Copyright (c) 2026 igdiscover developers. All rights reserved.

use anyhow::{bail, Result};
use igd_types::Read;
use log::info;
use read_group::io::{create_writer, read_fastx, write_fastx, write_group_table};
use read_group::{group_reads, BarcodeSpec, GroupingStats, PseudoCdr3Slice, ReadGroup, ReadGrouper};
use std::path::{Path, PathBuf};

/// Settings of a stand-alone grouping run.
#[derive(Debug, Clone, Default)]
pub struct GroupOptions {
    /// Positive for a 5' barcode, negative for a 3' barcode.
    pub barcode_length: i32,
    pub pseudo_cdr3: Option<PseudoCdr3Slice>,
    pub trim_g: bool,
    pub minimum_length: usize,
    /// Also write one line per group here.
    pub groups_output: Option<PathBuf>,
}

impl GroupOptions {
    pub fn spec(&self) -> BarcodeSpec {
        let spec = BarcodeSpec::new(self.barcode_length).with_trim_g(self.trim_g);
        match self.pseudo_cdr3 {
            Some(slice) => spec.with_pseudo_cdr3(slice),
            None => spec,
        }
    }
}

/// Group reads and keep one representative per group.
///
/// Fails when reads were given but not a single one fit the barcode settings,
/// which means the settings are wrong for this data.
pub(crate) fn representatives(
    spec: BarcodeSpec,
    minimum_length: usize,
    reads: Vec<Read>,
) -> Result<(Vec<Read>, Vec<ReadGroup>, GroupingStats)> {
    let grouper = ReadGrouper::new(spec).minimum_length(minimum_length);
    let (groups, stats) = group_reads(grouper, reads);
    if stats.skipped_malformed > 0 && stats.skipped_malformed + stats.too_short == stats.reads {
        bail!(
            "none of the {} reads fit barcode length {} with pseudo-CDR3 {}",
            stats.reads,
            spec.barcode_length,
            spec.pseudo_cdr3
                .map_or_else(|| "none".to_string(), |slice| slice.to_string())
        );
    }
    let representatives = groups.iter().map(ReadGroup::representative).collect();
    info!(
        "Grouped {} reads into {} groups ({} too short, {} skipped)",
        stats.reads, stats.groups, stats.too_short, stats.skipped_malformed
    );
    Ok((representatives, groups, stats))
}

pub fn run_group(input: &Path, output: &Path, options: &GroupOptions) -> Result<GroupingStats> {
    let reads = read_fastx(input)?;
    let (representatives, groups, stats) =
        representatives(options.spec(), options.minimum_length, reads)?;
    write_fastx(output, &representatives)?;
    if let Some(path) = &options.groups_output {
        write_group_table(create_writer(path)?, &groups)?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_run_group() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("reads.fasta");
        fs::write(
            &input,
            ">a\nAAAACGTACGTTT\n>b\nAAAACGTACGTTT\n>c\nCCCCGGGGTTTTA\n>d\nAAA\n",
        )
        .unwrap();
        let output = tmp.path().join("grouped.fasta");
        let groups_output = tmp.path().join("groups.tab");
        let options = GroupOptions {
            barcode_length: 4,
            minimum_length: 5,
            groups_output: Some(groups_output.clone()),
            ..Default::default()
        };
        let stats = run_group(&input, &output, &options).unwrap();
        assert_eq!(
            stats,
            GroupingStats {
                reads: 4,
                too_short: 1,
                skipped_malformed: 0,
                groups: 2,
            }
        );

        let grouped = read_fastx(&output).unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].name(), "a;barcode=AAAA;cdr3=;size=2;");
        assert_eq!(grouped[0].seq(), b"CGTACGTTT");
        assert_eq!(grouped[1].seq(), b"GGGGTTTTA");

        let table = fs::read_to_string(groups_output).unwrap();
        assert_eq!(table.lines().count(), 3);
    }

    #[test]
    fn test_spec_fitting_no_read_is_an_error() {
        let reads = vec![
            Read::new("a", b"ACGTACGT".to_vec()),
            Read::new("b", b"ACGTAC".to_vec()),
        ];
        let spec = BarcodeSpec::new(4).with_pseudo_cdr3("-30:-20".parse().unwrap());
        assert!(representatives(spec, 0, reads).is_err());
    }
}
