// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! Merging of overlapping paired-end reads into single reads.

use bio::alphabets::dna::revcomp;
use igd_types::Read;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("paired inputs differ in length: {r1} first reads, {r2} second reads")]
    UnequalLength { r1: usize, r2: usize },

    #[error("pair {index} has mismatching names '{r1}' and '{r2}'")]
    NameMismatch {
        index: usize,
        r1: String,
        r2: String,
    },
}

/// Counts reported by a merger, stored as `stats/reads.json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub pairs: usize,
    pub merged: usize,
    pub discarded: usize,
}

pub trait ReadMerger {
    fn merge(&self, r1: Vec<Read>, r2: Vec<Read>) -> Result<(Vec<Read>, MergeStats), MergeError>;
}

/// Joins the first read with the reverse complement of the second where the
/// two overlap. Pairs without an acceptable overlap are discarded.
#[derive(Debug, Clone, Copy)]
pub struct OverlapMerger {
    pub min_overlap: usize,
    pub max_mismatch_rate: f64,
}

impl Default for OverlapMerger {
    fn default() -> Self {
        OverlapMerger {
            min_overlap: 10,
            max_mismatch_rate: 0.1,
        }
    }
}

/// `name/1` and `name/2` belong to the same pair.
fn pair_name(name: &str) -> &str {
    name.strip_suffix("/1")
        .or_else(|| name.strip_suffix("/2"))
        .unwrap_or(name)
}

impl OverlapMerger {
    /// Overlap length with the lowest mismatch rate, the longest one on ties.
    fn best_overlap(&self, left: &[u8], right: &[u8]) -> Option<usize> {
        let max_overlap = left.len().min(right.len());
        let mut best: Option<(usize, f64)> = None;
        for overlap in (self.min_overlap.max(1)..=max_overlap).rev() {
            let mismatches = left[left.len() - overlap..]
                .iter()
                .zip(&right[..overlap])
                .filter(|(a, b)| a != b)
                .count();
            let rate = mismatches as f64 / overlap as f64;
            if rate <= self.max_mismatch_rate && best.map_or(true, |(_, r)| rate < r) {
                best = Some((overlap, rate));
            }
        }
        best.map(|(overlap, _)| overlap)
    }

    fn merge_pair(&self, r1: &Read, r2: &Read) -> Option<Read> {
        let left = r1.seq();
        let right = revcomp(r2.seq());
        let overlap = self.best_overlap(left, &right)?;
        let start = left.len() - overlap;

        let right_qual: Option<Vec<u8>> = r2.qual().map(|q| q.iter().rev().copied().collect());
        let mut seq = left.to_vec();
        let mut qual = r1.qual().map(<[u8]>::to_vec);
        // mismatches in the overlap go to the better quality base
        if let (Some(q1), Some(q2)) = (qual.as_mut(), right_qual.as_ref()) {
            for i in 0..overlap {
                if q2[i] > q1[start + i] {
                    seq[start + i] = right[i];
                }
                q1[start + i] = q1[start + i].max(q2[i]);
            }
        }
        seq.extend_from_slice(&right[overlap..]);
        let name = pair_name(r1.name()).to_string();
        Some(match (qual, right_qual) {
            (Some(mut q1), Some(q2)) => {
                q1.extend_from_slice(&q2[overlap..]);
                Read::with_qual(name, seq, q1)
            }
            _ => Read::new(name, seq),
        })
    }
}

impl ReadMerger for OverlapMerger {
    fn merge(&self, r1: Vec<Read>, r2: Vec<Read>) -> Result<(Vec<Read>, MergeStats), MergeError> {
        if r1.len() != r2.len() {
            return Err(MergeError::UnequalLength {
                r1: r1.len(),
                r2: r2.len(),
            });
        }
        let mut stats = MergeStats {
            pairs: r1.len(),
            ..Default::default()
        };
        let mut merged = Vec::new();
        for (index, (a, b)) in r1.iter().zip(&r2).enumerate() {
            if pair_name(a.name()) != pair_name(b.name()) {
                return Err(MergeError::NameMismatch {
                    index,
                    r1: a.name().to_string(),
                    r2: b.name().to_string(),
                });
            }
            match self.merge_pair(a, b) {
                Some(read) => {
                    stats.merged += 1;
                    merged.push(read);
                }
                None => stats.discarded += 1,
            }
        }
        Ok((merged, stats))
    }
}
