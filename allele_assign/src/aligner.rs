// Copyright (c) 2026 igdiscover developers. All rights reserved.

use crate::table::{count_from_name, AssignmentRecord, AssignmentTable, SegmentHit};
use germline_db::{GermlineAllele, GermlineDatabase};
use igd_types::{Read, Segment};
use log::debug;
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignerFailure {
    #[error("the germline database has no {0} alleles")]
    EmptyDatabase(Segment),

    #[error("could not start the aligner thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("aligner returned malformed output: {0}")]
    MalformedOutput(String),
}

/// Maps reads to the best V, D and J allele of a database snapshot.
///
/// Implementations must return exactly one record per input read, in input
/// order. Any error is fatal for the discovery round that asked for it.
pub trait Aligner: Send + Sync {
    fn assign(
        &self,
        reads: &[Read],
        database: &GermlineDatabase,
    ) -> Result<AssignmentTable, AlignerFailure>;
}

/// Gap-free assignment: every allele is slid along the read and the offset
/// with the best `matches - mismatches` score wins.
///
/// V is searched on the whole read, J after the end of the V hit and D in
/// between. Ties go to the allele that sorts first by name, then to the
/// leftmost offset.
#[derive(Debug, Clone)]
pub struct UngappedAligner {
    threads: usize,
    min_overlap: usize,
    min_d_overlap: usize,
}

impl Default for UngappedAligner {
    fn default() -> Self {
        UngappedAligner {
            threads: 1,
            min_overlap: 10,
            min_d_overlap: 5,
        }
    }
}

impl UngappedAligner {
    /// `threads == 0` uses one worker per available core.
    pub fn new(threads: usize) -> Self {
        UngappedAligner {
            threads,
            ..Default::default()
        }
    }

    /// Shortest V or J alignment that is reported.
    pub fn min_overlap(mut self, min_overlap: usize) -> Self {
        self.min_overlap = min_overlap.max(1);
        self
    }

    pub fn min_d_overlap(mut self, min_d_overlap: usize) -> Self {
        self.min_d_overlap = min_d_overlap.max(1);
        self
    }

    fn assign_read(&self, read: &Read, database: &GermlineDatabase) -> AssignmentRecord {
        let seq = read.seq();
        let mut record =
            AssignmentRecord::unassigned(read.name(), count_from_name(read.name()), seq.to_vec());

        record.v = best_hit(seq, 0, database.iter_segment(Segment::V), self.min_overlap);
        let v_end = record.v.as_ref().map_or(0, |hit| hit.query_end);

        record.j = best_hit(
            &seq[v_end..],
            v_end,
            database.iter_segment(Segment::J),
            self.min_overlap,
        );
        let j_start = record.j.as_ref().map_or(seq.len(), |hit| hit.query_start);

        if j_start > v_end {
            record.d = best_hit(
                &seq[v_end..j_start],
                v_end,
                database.iter_segment(Segment::D),
                self.min_d_overlap,
            );
        }
        record
    }
}

impl Aligner for UngappedAligner {
    fn assign(
        &self,
        reads: &[Read],
        database: &GermlineDatabase,
    ) -> Result<AssignmentTable, AlignerFailure> {
        for segment in [Segment::V, Segment::J] {
            if database.iter_segment(segment).next().is_none() {
                return Err(AlignerFailure::EmptyDatabase(segment));
            }
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()?;
        let records: Vec<_> = pool.install(|| {
            reads
                .par_iter()
                .map(|read| self.assign_read(read, database))
                .collect()
        });
        if records.len() != reads.len() {
            return Err(AlignerFailure::MalformedOutput(format!(
                "{} records for {} reads",
                records.len(),
                reads.len()
            )));
        }
        debug!(
            "Assigned {} reads against database version {}",
            records.len(),
            database.version()
        );
        Ok(AssignmentTable::new(records))
    }
}

struct Placement {
    score: i64,
    query_start: usize,
    allele_start: usize,
    len: usize,
    mismatches: u32,
}

fn best_placement(query: &[u8], allele: &[u8], min_overlap: usize) -> Option<Placement> {
    let min_overlap = min_overlap.min(allele.len());
    if min_overlap == 0 || query.len() < min_overlap {
        return None;
    }
    let first = -((allele.len() - min_overlap) as i64);
    let last = (query.len() - min_overlap) as i64;
    let mut best: Option<Placement> = None;
    for shift in first..=last {
        let query_start = shift.max(0) as usize;
        let allele_start = (-shift).max(0) as usize;
        let len = (query.len() - query_start).min(allele.len() - allele_start);
        if len < min_overlap {
            continue;
        }
        let mismatches = triple_accel::hamming(
            &query[query_start..query_start + len],
            &allele[allele_start..allele_start + len],
        );
        let score = len as i64 - 2 * i64::from(mismatches);
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(Placement {
                score,
                query_start,
                allele_start,
                len,
                mismatches,
            });
        }
    }
    best.filter(|p| p.score > 0)
}

fn best_hit<'a, I>(query: &[u8], offset: usize, alleles: I, min_overlap: usize) -> Option<SegmentHit>
where
    I: Iterator<Item = &'a GermlineAllele>,
{
    let mut best: Option<(Placement, &GermlineAllele)> = None;
    for allele in alleles {
        if let Some(placement) = best_placement(query, &allele.sequence, min_overlap) {
            if best.as_ref().map_or(true, |(b, _)| placement.score > b.score) {
                best = Some((placement, allele));
            }
        }
    }
    best.map(|(p, allele)| SegmentHit {
        allele: allele.name.clone(),
        identity: 100.0 * (p.len - p.mismatches as usize) as f64 / p.len as f64,
        coverage: 100.0 * p.len as f64 / allele.len() as f64,
        errors: p.mismatches,
        query_start: offset + p.query_start,
        query_end: offset + p.query_start + p.len,
        allele_start: p.allele_start,
        allele_end: p.allele_start + p.len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &[u8] = b"CAGGTGCAGCTGGTGCAGTCTGGGGCTGAGGTGAAGAAG";
    const V2: &[u8] = b"GAGGTGCAGCTGTTGGAGTCTGGGGGAGGCTTGGTACAG";
    const D1: &[u8] = b"GTATTACTATGG";
    const J1: &[u8] = b"ACTACTTTGACTACTGGGGCCAGGGAACC";

    fn database() -> GermlineDatabase {
        GermlineDatabase::new(
            0,
            vec![
                GermlineAllele::new("IGHV1-2*02", Segment::V, V1.to_vec()),
                GermlineAllele::new("IGHV3-23*01", Segment::V, V2.to_vec()),
                GermlineAllele::new("IGHD3-10*01", Segment::D, D1.to_vec()),
                GermlineAllele::new("IGHJ4*02", Segment::J, J1.to_vec()),
            ],
        )
        .unwrap()
    }

    fn read(name: &str, parts: &[&[u8]]) -> Read {
        Read::new(name, parts.concat())
    }

    #[test]
    fn test_exact_vdj() {
        let reads = vec![read("r1;size=4;", &[V2, b"CC", D1, b"TA", J1])];
        let table = UngappedAligner::new(2).assign(&reads, &database()).unwrap();
        let record = &table.records()[0];
        assert_eq!(record.count, 4);

        let v = record.v.as_ref().unwrap();
        assert_eq!(v.allele, "IGHV3-23*01");
        assert_eq!((v.query_start, v.query_end), (0, V2.len()));
        assert_eq!(v.errors, 0);
        assert_eq!(v.coverage, 100.0);

        let d = record.d.as_ref().unwrap();
        assert_eq!(d.allele, "IGHD3-10*01");
        assert_eq!(d.query_start, V2.len() + 2);

        let j = record.j.as_ref().unwrap();
        assert_eq!(j.allele, "IGHJ4*02");
        assert_eq!(j.query_end, V2.len() + 2 + D1.len() + 2 + J1.len());
        assert_eq!(j.identity, 100.0);
    }

    #[test]
    fn test_mismatch_and_truncation() {
        let mut v = V1.to_vec();
        v[5] = b'A';
        // first three V bases missing
        let reads = vec![read("r1", &[&v[3..], J1])];
        let table = UngappedAligner::default().assign(&reads, &database()).unwrap();
        let hit = table.records()[0].v.as_ref().unwrap();
        assert_eq!(hit.allele, "IGHV1-2*02");
        assert_eq!(hit.errors, 1);
        assert_eq!((hit.allele_start, hit.allele_end), (3, V1.len()));
        assert_eq!((hit.query_start, hit.query_end), (0, V1.len() - 3));
        assert!(hit.coverage < 100.0);
        assert_eq!(table.records()[0].count, 1);
    }

    #[test]
    fn test_unassignable_read() {
        let reads = vec![Read::new("junk", b"TTTTTTTT".to_vec())];
        let table = UngappedAligner::default().assign(&reads, &database()).unwrap();
        assert_eq!(table.records()[0].v, None);
        assert_eq!(table.records()[0].j, None);
    }

    #[test]
    fn test_output_order_with_threads() {
        let reads: Vec<_> = (0..50)
            .map(|i| {
                let v = if i % 2 == 0 { V1 } else { V2 };
                read(&format!("r{i}"), &[v, J1])
            })
            .collect();
        let table = UngappedAligner::new(4).assign(&reads, &database()).unwrap();
        for (i, record) in table.iter().enumerate() {
            assert_eq!(record.name, format!("r{i}"));
            let expected = if i % 2 == 0 { "IGHV1-2*02" } else { "IGHV3-23*01" };
            assert_eq!(record.call(Segment::V), Some(expected));
        }
    }

    #[test]
    fn test_empty_database() {
        let db = GermlineDatabase::new(
            0,
            vec![GermlineAllele::new("IGHV1-2*02", Segment::V, V1.to_vec())],
        )
        .unwrap();
        let err = UngappedAligner::default()
            .assign(&[Read::new("r", V1.to_vec())], &db)
            .unwrap_err();
        assert!(matches!(err, AlignerFailure::EmptyDatabase(Segment::J)));
    }
}
