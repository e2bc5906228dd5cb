// Copyright (c) 2026 igdiscover developers. All rights reserved.

use allele_assign::{clonotypes, write_clonotypes, AssignmentTable};
use anyhow::Result;
use log::info;
use std::io::Write;
use std::path::Path;

/// Write the clonotypes of an assignment table to `out`, most abundant first.
/// Returns the number of clonotypes written.
pub fn run_clonotypes<W: Write>(table: &Path, limit: Option<usize>, out: W) -> Result<usize> {
    let table = AssignmentTable::read_tsv(table)?;
    let clonotypes = clonotypes(&table, limit);
    write_clonotypes(out, &clonotypes)?;
    info!(
        "Wrote {} clonotypes from {} records",
        clonotypes.len(),
        table.len()
    );
    Ok(clonotypes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::fixture;
    use crate::context::{run_config, run_init, ConfigAction, InitOptions, RunContext};
    use crate::pipeline::run_pipeline;
    use allele_discovery::controller::ASSIGNED_TABLE;
    use allele_discovery::Target;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clonotypes_of_first_iteration() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, reads) = fixture(tmp.path(), 6);
        let dir = tmp.path().join("run");
        run_init(
            &dir,
            &InitOptions {
                database: db,
                reads1: None,
                single_reads: Some(reads),
            },
        )
        .unwrap();
        run_config(&dir, &ConfigAction::Set("minimum_length".into(), "50".into())).unwrap();
        run_pipeline(&RunContext::open(&dir).unwrap(), Target::NoFinal).unwrap();

        let assigned = dir.join("iteration-01").join(ASSIGNED_TABLE);
        let mut out = Vec::new();
        assert_eq!(run_clonotypes(&assigned, Some(5), &mut out).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let fields: Vec<_> = lines[1].split('\t').collect();
        assert_eq!(&fields[..4], ["6", "6", "IGHV1-2*02", "IGHJ4*02"]);

        assert_eq!(lines[0], "count\trecords\tv_call\tj_call\tjunction_length\tjunction");

        assert_eq!(run_clonotypes(&assigned, Some(0), Vec::new()).unwrap(), 0);
        assert!(run_clonotypes(&dir.join("missing.tab"), None, Vec::new()).is_err());
    }
}
