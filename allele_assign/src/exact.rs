// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! Per-allele counts of error-free, full-length assignments.

use crate::table::AssignmentTable;
use anyhow::Result;
use germline_db::GermlineDatabase;
use igd_types::Segment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;

/// One row of `exact.tab`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactOccurrence {
    pub allele: String,
    pub segment: Segment,
    /// Reads assigned to the allele.
    pub count: usize,
    /// Reads matching the whole allele without errors.
    pub exact_count: usize,
    /// Distinct junctions among the exact matches.
    pub exact_junctions: usize,
}

#[derive(Default)]
struct Tally<'a> {
    count: usize,
    exact_count: usize,
    junctions: HashSet<&'a [u8]>,
}

/// Exact occurrences of every V and J allele of `database` in `table`, in
/// database order. Alleles nothing was assigned to get a row of zeros.
pub fn exact_occurrences(
    table: &AssignmentTable,
    database: &GermlineDatabase,
) -> Vec<ExactOccurrence> {
    let mut tallies: BTreeMap<(Segment, &str), Tally<'_>> = BTreeMap::new();
    for record in table {
        for segment in [Segment::V, Segment::J] {
            let Some(hit) = record.hit(segment) else {
                continue;
            };
            let tally = tallies.entry((segment, hit.allele.as_str())).or_default();
            tally.count += record.count;
            if hit.errors == 0 && hit.coverage >= 100.0 {
                tally.exact_count += record.count;
                if let Some(junction) = record.junction() {
                    tally.junctions.insert(junction);
                }
            }
        }
    }

    [Segment::V, Segment::J]
        .into_iter()
        .flat_map(|segment| database.iter_segment(segment))
        .map(|allele| {
            let tally = tallies.get(&(allele.segment, allele.name.as_str()));
            ExactOccurrence {
                allele: allele.name.clone(),
                segment: allele.segment,
                count: tally.map_or(0, |t| t.count),
                exact_count: tally.map_or(0, |t| t.exact_count),
                exact_junctions: tally.map_or(0, |t| t.junctions.len()),
            }
        })
        .collect()
}

pub fn write_exact_table<W: Write>(writer: W, rows: &[ExactOccurrence]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{AssignmentRecord, SegmentHit};
    use germline_db::GermlineAllele;
    use pretty_assertions::assert_eq;

    fn hit(allele: &str, errors: u32, query_start: usize, query_end: usize) -> SegmentHit {
        SegmentHit {
            allele: allele.to_string(),
            identity: if errors == 0 { 100.0 } else { 90.0 },
            coverage: 100.0,
            errors,
            query_start,
            query_end,
            allele_start: 0,
            allele_end: query_end - query_start,
        }
    }

    fn record(name: &str, count: usize, seq: &[u8], v_errors: u32) -> AssignmentRecord {
        let mut record = AssignmentRecord::unassigned(name, count, seq.to_vec());
        record.v = Some(hit("IGHV1-2*02", v_errors, 0, 4));
        record.j = Some(hit("IGHJ4*02", 0, seq.len() - 4, seq.len()));
        record
    }

    #[test]
    fn test_exact_occurrences() {
        let database = GermlineDatabase::new(
            0,
            vec![
                GermlineAllele::new("IGHV1-2*02", Segment::V, b"ACGT".to_vec()),
                GermlineAllele::new("IGHV1-2*04", Segment::V, b"ACGA".to_vec()),
                GermlineAllele::new("IGHJ4*02", Segment::J, b"TTGG".to_vec()),
            ],
        )
        .unwrap();
        let table = AssignmentTable::new(vec![
            record("a", 3, b"ACGTCCCTTGG", 0),
            record("b", 2, b"ACGTCCCTTGG", 0),
            record("c", 1, b"ACGTAATTGG", 0),
            record("d", 4, b"ACCTGGGTTGG", 1),
        ]);
        let rows = exact_occurrences(&table, &database);
        let summary: Vec<_> = rows
            .iter()
            .map(|r| (r.allele.as_str(), r.count, r.exact_count, r.exact_junctions))
            .collect();
        assert_eq!(
            summary,
            [
                ("IGHV1-2*02", 10, 6, 2),
                ("IGHV1-2*04", 0, 0, 0),
                ("IGHJ4*02", 10, 10, 3)
            ]
        );

        let mut out = Vec::new();
        write_exact_table(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text.lines().next(),
            Some("allele\tsegment\tcount\texact_count\texact_junctions")
        );
        assert_eq!(text.lines().nth(2), Some("IGHV1-2*04\tV\t0\t0\t0"));
    }
}
