// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! Collapse reads that share a barcode and pseudo-CDR3.
//!
//! Grouping is a single linear pass: each read is keyed with
//! [`BarcodeSpec::extract`] and appended to the group of that key. Groups come
//! out in the order their key was first seen. Keys must match exactly, there
//! is no mismatch tolerance.

use crate::consensus::{column_consensus, most_frequent};
use crate::spec::BarcodeSpec;
use igd_types::Read;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

/// The sole clustering criterion: two reads group together iff their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub barcode: Vec<u8>,
    pub pseudo_cdr3: Vec<u8>,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}",
            String::from_utf8_lossy(&self.barcode),
            String::from_utf8_lossy(&self.pseudo_cdr3)
        )
    }
}

/// One key and every read mapping to it, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadGroup {
    key: GroupKey,
    members: Vec<Read>,
    remainders: Vec<Range<usize>>,
}

impl ReadGroup {
    fn new(key: GroupKey) -> Self {
        ReadGroup {
            key,
            members: Vec::new(),
            remainders: Vec::new(),
        }
    }

    fn push(&mut self, read: Read, remainder: Range<usize>) {
        self.members.push(read);
        self.remainders.push(remainder);
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn members(&self) -> &[Read] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member sequences with the barcode removed.
    pub fn unbarcoded(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.members
            .iter()
            .zip(&self.remainders)
            .map(|(read, range)| &read.seq()[range.clone()])
    }

    /// A single read standing for the whole group.
    ///
    /// The sequence is the column-wise majority of the barcode-stripped member
    /// sequences. Members of unequal length fall back to the most frequent
    /// sequence. The name carries the key and group size, e.g.
    /// `read7;barcode=ACGT;cdr3=TTCA;size=3;`.
    pub fn representative(&self) -> Read {
        let seqs: Vec<&[u8]> = self.unbarcoded().collect();
        let seq = column_consensus(seqs.iter().map(|s| (*s, 1)))
            .or_else(|| most_frequent(seqs.iter().copied()).map(<[u8]>::to_vec))
            .unwrap_or_default();
        let name = format!(
            "{};barcode={};cdr3={};size={};",
            self.members.first().map_or("", Read::name),
            String::from_utf8_lossy(&self.key.barcode),
            String::from_utf8_lossy(&self.key.pseudo_cdr3),
            self.len()
        );
        Read::new(name, seq)
    }
}

/// Counts collected during the grouping pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingStats {
    pub reads: usize,
    pub too_short: usize,
    pub skipped_malformed: usize,
    pub groups: usize,
}

pub struct ReadGrouper {
    spec: BarcodeSpec,
    minimum_length: usize,
}

impl ReadGrouper {
    pub fn new(spec: BarcodeSpec) -> Self {
        ReadGrouper {
            spec,
            minimum_length: 0,
        }
    }

    /// Reads shorter than this are dropped before grouping.
    pub fn minimum_length(mut self, minimum_length: usize) -> Self {
        self.minimum_length = minimum_length;
        self
    }

    pub fn spec(&self) -> &BarcodeSpec {
        &self.spec
    }

    /// Group `reads`. Nothing is consumed until the returned iterator is first polled.
    pub fn group<I>(self, reads: I) -> GroupIter<I::IntoIter>
    where
        I: IntoIterator<Item = Read>,
    {
        GroupIter {
            grouper: self,
            input: Some(reads.into_iter()),
            output: Vec::new().into_iter(),
            stats: None,
        }
    }
}

/// Lazy, finite, non-restartable sequence of groups.
pub struct GroupIter<I> {
    grouper: ReadGrouper,
    input: Option<I>,
    output: std::vec::IntoIter<ReadGroup>,
    stats: Option<GroupingStats>,
}

impl<I: Iterator<Item = Read>> GroupIter<I> {
    /// Available once the first group has been requested.
    pub fn stats(&self) -> Option<&GroupingStats> {
        self.stats.as_ref()
    }

    fn accumulate(&mut self, input: I) {
        let ReadGrouper {
            spec,
            minimum_length,
        } = &self.grouper;
        let mut stats = GroupingStats::default();
        let mut index: HashMap<GroupKey, usize> = HashMap::new();
        let mut groups: Vec<ReadGroup> = Vec::new();

        for read in input {
            stats.reads += 1;
            if read.len() < *minimum_length {
                stats.too_short += 1;
                continue;
            }
            let (key, remainder) = match spec.extract(&read) {
                Ok(extraction) => extraction.into_parts(),
                Err(e) => {
                    debug!("skipping read: {e}");
                    stats.skipped_malformed += 1;
                    continue;
                }
            };
            match index.entry(key) {
                Entry::Occupied(slot) => groups[*slot.get()].push(read, remainder),
                Entry::Vacant(slot) => {
                    let mut group = ReadGroup::new(slot.key().clone());
                    group.push(read, remainder);
                    slot.insert(groups.len());
                    groups.push(group);
                }
            }
        }

        stats.groups = groups.len();
        if stats.skipped_malformed > 0 {
            warn!(
                "{} of {} reads were skipped because the barcode spec did not fit them",
                stats.skipped_malformed, stats.reads
            );
        }
        debug!("grouping finished: {stats:?}");
        self.output = groups.into_iter();
        self.stats = Some(stats);
    }
}

impl<I: Iterator<Item = Read>> Iterator for GroupIter<I> {
    type Item = ReadGroup;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(input) = self.input.take() {
            self.accumulate(input);
        }
        self.output.next()
    }
}

/// Group all reads eagerly, returning the groups and the pass statistics.
pub fn group_reads<I>(grouper: ReadGrouper, reads: I) -> (Vec<ReadGroup>, GroupingStats)
where
    I: IntoIterator<Item = Read>,
{
    let mut iter = grouper.group(reads);
    let first = iter.next();
    let stats = iter.stats().cloned().unwrap_or_default();
    let groups = first.into_iter().chain(iter).collect();
    (groups, stats)
}
