// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! Final filter: the last assignment against the newest database, reduced to
//! records that pass the final thresholds, exact duplicates merged.

use allele_assign::{count_from_name, Aligner, AlignerFailure, AssignmentRecord, AssignmentTable};
use germline_db::GermlineDatabase;
use igd_types::Read;
use log::info;
use std::collections::HashMap;

/// Minimum alignment quality for a record to be kept. Percentages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub v_coverage: f64,
    pub j_coverage: f64,
    pub v_identity: f64,
    pub require_j: bool,
    /// D hits covering less of the allele are dropped from kept records.
    pub d_coverage: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            v_coverage: 90.0,
            j_coverage: 60.0,
            v_identity: 80.0,
            require_j: true,
            d_coverage: 70.0,
        }
    }
}

impl FilterParams {
    pub fn passes(&self, record: &AssignmentRecord) -> bool {
        let Some(v) = &record.v else {
            return false;
        };
        if v.coverage < self.v_coverage || v.identity < self.v_identity {
            return false;
        }
        match &record.j {
            Some(j) => j.coverage >= self.j_coverage,
            None => !self.require_j,
        }
    }

    fn drop_weak_d(&self, mut record: AssignmentRecord) -> AssignmentRecord {
        if record
            .d
            .as_ref()
            .is_some_and(|d| d.coverage < self.d_coverage)
        {
            record.d = None;
        }
        record
    }

    pub fn apply(&self, table: &AssignmentTable) -> AssignmentTable {
        table
            .iter()
            .filter(|record| self.passes(record))
            .map(|record| self.drop_weak_d(record.clone()))
            .collect()
    }
}

/// Collapse reads with identical sequences. The first occurrence keeps its
/// name and position; the count is the sum of the collapsed read counts.
pub fn dedup_exact(reads: &[Read]) -> Vec<(Read, usize)> {
    let mut index: HashMap<&[u8], usize> = HashMap::new();
    let mut unique: Vec<(Read, usize)> = Vec::new();
    for read in reads {
        let count = count_from_name(read.name());
        match index.get(read.seq()) {
            Some(&i) => unique[i].1 += count,
            None => {
                index.insert(read.seq(), unique.len());
                unique.push((read.clone(), count));
            }
        }
    }
    unique
}

/// Produces the terminal assignment table of a run.
pub struct FinalFilter<'a> {
    aligner: &'a dyn Aligner,
    params: FilterParams,
}

impl<'a> FinalFilter<'a> {
    pub fn new(aligner: &'a dyn Aligner, params: FilterParams) -> Self {
        FinalFilter { aligner, params }
    }

    /// Deduplicate `reads` by exact sequence, assign the unique sequences
    /// against `database` and drop records failing the filter.
    pub fn run(
        &self,
        database: &GermlineDatabase,
        reads: &[Read],
    ) -> Result<AssignmentTable, AlignerFailure> {
        let (unique, counts): (Vec<Read>, Vec<usize>) = dedup_exact(reads).into_iter().unzip();
        let assigned = self.aligner.assign(&unique, database)?;
        if assigned.len() != unique.len() {
            return Err(AlignerFailure::MalformedOutput(format!(
                "{} records for {} reads",
                assigned.len(),
                unique.len()
            )));
        }
        let table: AssignmentTable = assigned
            .into_iter()
            .zip(counts)
            .map(|(mut record, count)| {
                record.count = count;
                record
            })
            .filter(|record| self.params.passes(record))
            .map(|record| self.params.drop_weak_d(record))
            .collect();
        info!(
            "Final table: {} reads, {} unique sequences, {} records after filtering",
            reads.len(),
            unique.len(),
            table.len()
        );
        Ok(table)
    }
}
