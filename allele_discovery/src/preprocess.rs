// Copyright (c) 2026 igdiscover developers. All rights reserved.

use bio::alphabets::dna::revcomp;
use igd_types::Read;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessStats {
    pub input: usize,
    pub forward_primer_trimmed: usize,
    pub reverse_primer_trimmed: usize,
    pub too_short: usize,
    pub output: usize,
}

/// Read limit, primer removal and length filter, applied in that order.
///
/// Forward primers are removed from the 5' end and reverse primers (given as
/// sequenced, i.e. reverse complemented in the read) from the 3' end. Reads
/// without a primer are kept as they are.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    limit: Option<usize>,
    minimum_length: usize,
    forward_primers: Vec<Vec<u8>>,
    reverse_primers: Vec<Vec<u8>>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Preprocessor::default()
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn minimum_length(mut self, minimum_length: usize) -> Self {
        self.minimum_length = minimum_length;
        self
    }

    pub fn forward_primers<I, S>(mut self, primers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.forward_primers = primers.into_iter().map(|p| p.as_ref().to_vec()).collect();
        self
    }

    pub fn reverse_primers<I, S>(mut self, primers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.reverse_primers = primers.into_iter().map(|p| revcomp(p.as_ref())).collect();
        self
    }

    pub fn run(&self, reads: Vec<Read>) -> (Vec<Read>, PreprocessStats) {
        let mut stats = PreprocessStats::default();
        let limit = self.limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        for read in reads.into_iter().take(limit) {
            stats.input += 1;
            let seq = read.seq();
            let start = self
                .forward_primers
                .iter()
                .find(|p| seq.starts_with(p))
                .map_or(0, |p| {
                    stats.forward_primer_trimmed += 1;
                    p.len()
                });
            let end = self
                .reverse_primers
                .iter()
                .find(|p| seq.len() >= start + p.len() && seq.ends_with(p))
                .map_or(seq.len(), |p| {
                    stats.reverse_primer_trimmed += 1;
                    seq.len() - p.len()
                });
            if end - start < self.minimum_length {
                stats.too_short += 1;
                continue;
            }
            let untouched = start == 0 && end == seq.len();
            out.push(if untouched {
                read
            } else {
                read.slice(start..end)
            });
        }
        stats.output = out.len();
        (out, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess() {
        let reads = vec![
            Read::new("a", b"CGTGAACGTACGTACGT".to_vec()),
            Read::new("b", b"ACGTACGTACGTTTCAC".to_vec()),
            Read::new("c", b"ACG".to_vec()),
            Read::new("d", b"GGGGGGGGGGGG".to_vec()),
        ];
        let (out, stats) = Preprocessor::new()
            .forward_primers(["CGTGA"])
            // GTGAA reverse complemented
            .reverse_primers(["GTGAA"])
            .minimum_length(10)
            .limit(Some(3))
            .run(reads);
        let seqs: Vec<_> = out.iter().map(|r| r.seq()).collect();
        assert_eq!(seqs, [&b"ACGTACGTACGT"[..], &b"ACGTACGTACGT"[..]]);
        assert_eq!(
            stats,
            PreprocessStats {
                input: 3,
                forward_primer_trimmed: 1,
                reverse_primer_trimmed: 1,
                too_short: 1,
                output: 2,
            }
        );
    }
}
