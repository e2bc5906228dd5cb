// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! Detection of germline alleles missing from the database.
//!
//! Records that align to a known allele with a few mismatches are turned back
//! into full-length allele sequences, clustered per parent allele and
//! summarized by a consensus. A [`NoveltyPolicy`] decides which consensus
//! sequences are real.

use allele_assign::{AssignmentRecord, AssignmentTable, SegmentHit};
use anyhow::{bail, Result};
use germline_db::{GermlineAllele, GermlineDatabase};
use igd_types::{Locus, Segment};
use log::debug;
use petgraph::unionfind::UnionFind;
use read_group::consensus::column_consensus;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub trait NoveltyDetector: Send + Sync {
    /// Candidate alleles absent from `database`. Names never collide with
    /// names already in `database`. Must be deterministic.
    fn detect(
        &self,
        table: &AssignmentTable,
        database: &GermlineDatabase,
    ) -> Result<Vec<GermlineAllele>>;
}

/// A clustered consensus sequence before the policy decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub segment: Segment,
    pub locus: Option<Locus>,
    pub parent: String,
    pub sequence: Vec<u8>,
    /// Reads in the cluster.
    pub support: usize,
    /// Reads assigned to the parent allele, with or without errors.
    pub parent_support: usize,
    pub distinct_sequences: usize,
}

impl Candidate {
    pub fn allele_ratio(&self) -> f64 {
        if self.parent_support == 0 {
            return 0.0;
        }
        self.support as f64 / self.parent_support as f64
    }
}

pub trait NoveltyPolicy: Send + Sync {
    fn accept(&self, candidate: &Candidate) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportPolicy {
    pub min_count: usize,
    pub min_allele_ratio: f64,
}

impl Default for SupportPolicy {
    fn default() -> Self {
        SupportPolicy {
            min_count: 10,
            min_allele_ratio: 0.1,
        }
    }
}

impl NoveltyPolicy for SupportPolicy {
    fn accept(&self, candidate: &Candidate) -> bool {
        candidate.support >= self.min_count && candidate.allele_ratio() >= self.min_allele_ratio
    }
}

#[derive(Debug, Clone)]
pub struct SegmentSettings<P> {
    pub segment: Segment,
    /// Maximum Hamming distance between sequences of one cluster.
    pub cluster_distance: u32,
    pub min_identity: f64,
    pub min_coverage: f64,
    pub policy: P,
}

impl SegmentSettings<SupportPolicy> {
    pub fn new(segment: Segment) -> Self {
        SegmentSettings {
            segment,
            cluster_distance: 1,
            min_identity: 90.0,
            min_coverage: 90.0,
            policy: SupportPolicy::default(),
        }
    }
}

/// Default detector, configured per segment. Segments without settings are
/// never searched.
#[derive(Debug, Clone)]
pub struct ConsensusDetector<P = SupportPolicy> {
    segments: Vec<SegmentSettings<P>>,
}

impl<P> Default for ConsensusDetector<P> {
    fn default() -> Self {
        ConsensusDetector {
            segments: Vec::new(),
        }
    }
}

impl<P: NoveltyPolicy> ConsensusDetector<P> {
    pub fn new() -> Self {
        ConsensusDetector::default()
    }

    pub fn with_segment(mut self, settings: SegmentSettings<P>) -> Self {
        self.segments.push(settings);
        self
    }

    pub fn segments(&self) -> &[SegmentSettings<P>] {
        &self.segments
    }
}

/// Parent prefix, aligned read bases, parent suffix. None unless the hit is a
/// gap-free alignment that fits both sequences.
fn reconstruct(record: &AssignmentRecord, hit: &SegmentHit, parent: &[u8]) -> Option<Vec<u8>> {
    if hit.query_end > record.sequence.len()
        || hit.allele_end > parent.len()
        || hit.query_start > hit.query_end
        || hit.query_end - hit.query_start != hit.allele_end - hit.allele_start
    {
        return None;
    }
    let mut seq = Vec::with_capacity(parent.len());
    seq.extend_from_slice(&parent[..hit.allele_start]);
    seq.extend_from_slice(&record.sequence[hit.query_start..hit.query_end]);
    seq.extend_from_slice(&parent[hit.allele_end..]);
    Some(seq)
}

fn clusters(seqs: &[(Vec<u8>, usize)], max_distance: u32) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::new(seqs.len());
    for i in 0..seqs.len() {
        for j in (i + 1)..seqs.len() {
            let (a, b) = (&seqs[i].0, &seqs[j].0);
            if a.len() == b.len() && triple_accel::hamming(a, b) <= max_distance {
                uf.union(i, j);
            }
        }
    }
    let mut position: HashMap<usize, usize> = HashMap::new();
    let mut out: Vec<Vec<usize>> = Vec::new();
    for i in 0..seqs.len() {
        let root = uf.find(i);
        let pos = *position.entry(root).or_insert_with(|| {
            out.push(Vec::new());
            out.len() - 1
        });
        out[pos].push(i);
    }
    out
}

fn segment_candidates<P>(
    settings: &SegmentSettings<P>,
    table: &AssignmentTable,
    database: &GermlineDatabase,
) -> Result<Vec<Candidate>> {
    let segment = settings.segment;
    let parent_support = table.allele_counts(segment);

    let mut buckets: BTreeMap<&str, BTreeMap<Vec<u8>, usize>> = BTreeMap::new();
    for record in table {
        let Some(hit) = record.hit(segment) else {
            continue;
        };
        if hit.errors == 0
            || hit.identity < settings.min_identity
            || hit.coverage < settings.min_coverage
        {
            continue;
        }
        let Some(parent) = database.get(&hit.allele) else {
            bail!(
                "record '{}' is assigned to '{}', which is not in database version {}",
                record.name,
                hit.allele,
                database.version()
            );
        };
        match reconstruct(record, hit, &parent.sequence) {
            Some(seq) => {
                *buckets
                    .entry(parent.name.as_str())
                    .or_default()
                    .entry(seq)
                    .or_insert(0) += record.count;
            }
            None => debug!("Skipping gapped or out of range hit of '{}'", record.name),
        }
    }

    let mut candidates = Vec::new();
    for (parent_name, bucket) in buckets {
        let Some(parent) = database.get(parent_name) else {
            continue;
        };
        let seqs: Vec<(Vec<u8>, usize)> = bucket.into_iter().collect();
        for members in clusters(&seqs, settings.cluster_distance) {
            let Some(sequence) = column_consensus(
                members
                    .iter()
                    .map(|&i| (seqs[i].0.as_slice(), seqs[i].1)),
            ) else {
                continue;
            };
            candidates.push(Candidate {
                segment,
                locus: parent.locus,
                parent: parent_name.to_string(),
                sequence,
                support: members.iter().map(|&i| seqs[i].1).sum(),
                parent_support: parent_support.get(parent_name).copied().unwrap_or(0),
                distinct_sequences: members.len(),
            });
        }
    }
    Ok(candidates)
}

/// `IGHV_novel01`, `IGHV_novel02`, ... skipping names already taken.
fn next_name(
    locus: Option<Locus>,
    segment: Segment,
    counters: &mut HashMap<String, usize>,
    taken: &BTreeSet<String>,
    database: &GermlineDatabase,
) -> String {
    let prefix = match locus {
        Some(locus) => format!("{locus}{segment}"),
        None => segment.to_string(),
    };
    let counter = counters.entry(prefix.clone()).or_insert(0);
    loop {
        *counter += 1;
        let name = format!("{prefix}_novel{:02}", *counter);
        if !database.contains_name(&name) && !taken.contains(&name) {
            return name;
        }
    }
}

impl<P: NoveltyPolicy> NoveltyDetector for ConsensusDetector<P> {
    fn detect(
        &self,
        table: &AssignmentTable,
        database: &GermlineDatabase,
    ) -> Result<Vec<GermlineAllele>> {
        let mut accepted: Vec<GermlineAllele> = Vec::new();
        let mut taken = BTreeSet::new();
        let mut counters = HashMap::new();

        for settings in &self.segments {
            for candidate in segment_candidates(settings, table, database)? {
                let segment = candidate.segment;
                if database.contains_sequence(segment, &candidate.sequence)
                    || accepted
                        .iter()
                        .any(|a| a.segment == segment && a.sequence == candidate.sequence)
                {
                    continue;
                }
                if !settings.policy.accept(&candidate) {
                    debug!(
                        "Rejected {segment} candidate from {} (support {}, ratio {:.3})",
                        candidate.parent,
                        candidate.support,
                        candidate.allele_ratio()
                    );
                    continue;
                }
                let name = next_name(candidate.locus, segment, &mut counters, &taken, database);
                debug!(
                    "Accepted {name} from {} (support {}, ratio {:.3})",
                    candidate.parent,
                    candidate.support,
                    candidate.allele_ratio()
                );
                taken.insert(name.clone());
                accepted.push(
                    GermlineAllele::new(name, segment, candidate.sequence)
                        .with_locus(candidate.locus),
                );
            }
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENT: &[u8] = b"ACGTACGTACGTACGTACGT";

    fn database() -> GermlineDatabase {
        GermlineDatabase::new(
            0,
            vec![
                GermlineAllele::new("IGHV1-1*01", Segment::V, PARENT.to_vec()),
                GermlineAllele::new("IGHV_novel01", Segment::V, b"TTTTTTTTTTTTTTTTTTTT".to_vec()),
                GermlineAllele::new("IGHJ1*01", Segment::J, b"GGGGCCCC".to_vec()),
            ],
        )
        .unwrap()
    }

    fn mutate(seq: &[u8], pos: usize, base: u8) -> Vec<u8> {
        let mut seq = seq.to_vec();
        seq[pos] = base;
        seq
    }

    /// A record whose V hit covers the read completely.
    fn record(name: &str, count: usize, seq: &[u8], errors: u32) -> AssignmentRecord {
        let mut record = AssignmentRecord::unassigned(name, count, seq.to_vec());
        let len = seq.len();
        record.v = Some(SegmentHit {
            allele: "IGHV1-1*01".to_string(),
            identity: 100.0 * (len - errors as usize) as f64 / len as f64,
            coverage: 100.0,
            errors,
            query_start: 0,
            query_end: len,
            allele_start: 0,
            allele_end: len,
        });
        record
    }

    fn detector(min_count: usize) -> ConsensusDetector {
        ConsensusDetector::new().with_segment(SegmentSettings {
            policy: SupportPolicy {
                min_count,
                min_allele_ratio: 0.2,
            },
            ..SegmentSettings::new(Segment::V)
        })
    }

    #[test]
    fn test_reconstruct_partial_hit() {
        let mut rec = record("r", 1, &PARENT[2..18], 0);
        let hit = SegmentHit {
            allele_start: 2,
            allele_end: 18,
            ..rec.v.take().unwrap()
        };
        assert_eq!(reconstruct(&rec, &hit, PARENT), Some(PARENT.to_vec()));
        let gapped = SegmentHit {
            allele_end: 17,
            ..hit
        };
        assert_eq!(reconstruct(&rec, &gapped, PARENT), None);
    }

    #[test]
    fn test_detects_supported_variant() {
        let variant = mutate(PARENT, 10, b'T');
        let table = AssignmentTable::new(vec![
            record("a", 6, &variant, 1),
            record("b", 2, &variant, 1),
            // sequencing error around the variant, same cluster
            record("c", 1, &mutate(&variant, 3, b'A'), 2),
            record("d", 10, PARENT, 0),
            // isolated noise
            record("e", 1, &mutate(PARENT, 15, b'A'), 1),
        ]);
        let found = detector(5).detect(&table, &database()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "IGHV_novel02");
        assert_eq!(found[0].sequence, variant);
        assert_eq!(found[0].segment, Segment::V);
        assert_eq!(found[0].locus, Some(Locus::IGH));
    }

    #[test]
    fn test_policy_rejects_weak_support() {
        let variant = mutate(PARENT, 10, b'T');
        let table = AssignmentTable::new(vec![
            record("a", 3, &variant, 1),
            record("d", 10, PARENT, 0),
        ]);
        assert!(detector(5).detect(&table, &database()).unwrap().is_empty());
        // 3 of 13 reads passes the ratio
        assert_eq!(detector(3).detect(&table, &database()).unwrap().len(), 1);
    }

    #[test]
    fn test_consensus_equal_to_parent_is_dropped() {
        // errors scattered over different positions vote back to the parent
        let table = AssignmentTable::new(vec![
            record("a", 5, &mutate(PARENT, 1, b'T'), 1),
            record("b", 5, &mutate(PARENT, 2, b'A'), 1),
            record("c", 5, &mutate(PARENT, 3, b'C'), 1),
        ]);
        let detector = ConsensusDetector::new().with_segment(SegmentSettings {
            cluster_distance: 2,
            policy: SupportPolicy {
                min_count: 1,
                min_allele_ratio: 0.0,
            },
            ..SegmentSettings::new(Segment::V)
        });
        assert!(detector.detect(&table, &database()).unwrap().is_empty());
    }

    #[test]
    fn test_deterministic() {
        let table = AssignmentTable::new(vec![
            record("a", 6, &mutate(PARENT, 10, b'T'), 1),
            record("b", 7, &mutate(PARENT, 4, b'G'), 1),
            record("c", 9, PARENT, 0),
        ]);
        let first = detector(5).detect(&table, &database()).unwrap();
        let names: Vec<_> = first.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["IGHV_novel02", "IGHV_novel03"]);
        for _ in 0..5 {
            assert_eq!(detector(5).detect(&table, &database()).unwrap(), first);
        }
    }

    #[test]
    fn test_unknown_parent_is_an_error() {
        let mut rec = record("a", 6, &mutate(PARENT, 10, b'T'), 1);
        if let Some(hit) = rec.v.as_mut() {
            hit.allele = "IGHV9-9*01".to_string();
        }
        let table = AssignmentTable::new(vec![rec]);
        assert!(detector(1).detect(&table, &database()).is_err());
    }
}
