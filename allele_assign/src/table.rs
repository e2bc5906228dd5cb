// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! Assignment records and their tab-separated representation.

use anyhow::{Context, Result};
use igd_types::Segment;
use read_group::io::{create_writer, open_reader};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read as IoRead, Write};
use std::path::Path;

/// Best alignment of one germline allele against a read. Coordinates are
/// zero based and half open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentHit {
    pub allele: String,
    /// Percent of aligned positions that match.
    pub identity: f64,
    /// Percent of the allele covered by the alignment.
    pub coverage: f64,
    pub errors: u32,
    pub query_start: usize,
    pub query_end: usize,
    pub allele_start: usize,
    pub allele_end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub name: String,
    /// Number of reads this record stands for.
    pub count: usize,
    pub sequence: Vec<u8>,
    pub v: Option<SegmentHit>,
    pub d: Option<SegmentHit>,
    pub j: Option<SegmentHit>,
}

impl AssignmentRecord {
    pub fn unassigned(name: impl Into<String>, count: usize, sequence: Vec<u8>) -> Self {
        AssignmentRecord {
            name: name.into(),
            count,
            sequence,
            v: None,
            d: None,
            j: None,
        }
    }

    pub fn hit(&self, segment: Segment) -> Option<&SegmentHit> {
        match segment {
            Segment::V => self.v.as_ref(),
            Segment::D => self.d.as_ref(),
            Segment::J => self.j.as_ref(),
        }
    }

    pub fn call(&self, segment: Segment) -> Option<&str> {
        self.hit(segment).map(|hit| hit.allele.as_str())
    }

    /// Bases between the end of the V hit and the start of the J hit. Empty
    /// when the two hits touch or overlap, `None` without both hits.
    pub fn junction(&self) -> Option<&[u8]> {
        let (v, j) = (self.v.as_ref()?, self.j.as_ref()?);
        let end = j.query_start.min(self.sequence.len());
        Some(self.sequence.get(v.query_end..end).unwrap_or_default())
    }
}

/// Group size encoded in a read name by the grouping step (`...;size=12;`),
/// 1 when absent.
pub fn count_from_name(name: &str) -> usize {
    name.split(';')
        .find_map(|field| field.strip_prefix("size="))
        .and_then(|size| size.parse().ok())
        .unwrap_or(1)
}

/// Assignment results in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentTable {
    records: Vec<AssignmentRecord>,
}

impl AssignmentTable {
    pub fn new(records: Vec<AssignmentRecord>) -> Self {
        AssignmentTable { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AssignmentRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[AssignmentRecord] {
        &self.records
    }

    pub fn filtered<F>(&self, mut keep: F) -> AssignmentTable
    where
        F: FnMut(&AssignmentRecord) -> bool,
    {
        AssignmentTable {
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Summed record counts per called allele of `segment`.
    pub fn allele_counts(&self, segment: Segment) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            if let Some(allele) = record.call(segment) {
                *counts.entry(allele).or_insert(0) += record.count;
            }
        }
        counts
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);
        for record in &self.records {
            writer.serialize(AssignmentRow::from(record))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn from_reader<R: IoRead>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_reader(reader);
        let records = reader
            .deserialize()
            .map(|row| -> Result<AssignmentRecord> {
                let row: AssignmentRow = row?;
                Ok(row.into())
            })
            .collect::<Result<_>>()?;
        Ok(AssignmentTable { records })
    }

    /// Write the table as TSV, gzipped when `path` ends in `.gz`.
    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        self.to_writer(create_writer(path)?)
            .with_context(|| format!("while writing {}", path.display()))
    }

    pub fn read_tsv(path: &Path) -> Result<Self> {
        AssignmentTable::from_reader(open_reader(path)?)
            .with_context(|| format!("while reading {}", path.display()))
    }
}

impl FromIterator<AssignmentRecord> for AssignmentTable {
    fn from_iter<I: IntoIterator<Item = AssignmentRecord>>(iter: I) -> Self {
        AssignmentTable {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for AssignmentTable {
    type Item = AssignmentRecord;
    type IntoIter = std::vec::IntoIter<AssignmentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a AssignmentTable {
    type Item = &'a AssignmentRecord;
    type IntoIter = std::slice::Iter<'a, AssignmentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Flat column layout of the TSV file. csv cannot serialize nested structs
/// under headers so every hit field gets its own column.
#[derive(Debug, Serialize, Deserialize)]
struct AssignmentRow {
    name: String,
    count: usize,
    v_call: Option<String>,
    v_identity: Option<f64>,
    v_coverage: Option<f64>,
    v_errors: Option<u32>,
    v_query_start: Option<usize>,
    v_query_end: Option<usize>,
    v_allele_start: Option<usize>,
    v_allele_end: Option<usize>,
    d_call: Option<String>,
    d_identity: Option<f64>,
    d_coverage: Option<f64>,
    d_errors: Option<u32>,
    d_query_start: Option<usize>,
    d_query_end: Option<usize>,
    d_allele_start: Option<usize>,
    d_allele_end: Option<usize>,
    j_call: Option<String>,
    j_identity: Option<f64>,
    j_coverage: Option<f64>,
    j_errors: Option<u32>,
    j_query_start: Option<usize>,
    j_query_end: Option<usize>,
    j_allele_start: Option<usize>,
    j_allele_end: Option<usize>,
    sequence: String,
}

#[derive(Default)]
struct FlatHit {
    call: Option<String>,
    identity: Option<f64>,
    coverage: Option<f64>,
    errors: Option<u32>,
    query_start: Option<usize>,
    query_end: Option<usize>,
    allele_start: Option<usize>,
    allele_end: Option<usize>,
}

impl From<Option<&SegmentHit>> for FlatHit {
    fn from(hit: Option<&SegmentHit>) -> Self {
        match hit {
            Some(hit) => FlatHit {
                call: Some(hit.allele.clone()),
                identity: Some(hit.identity),
                coverage: Some(hit.coverage),
                errors: Some(hit.errors),
                query_start: Some(hit.query_start),
                query_end: Some(hit.query_end),
                allele_start: Some(hit.allele_start),
                allele_end: Some(hit.allele_end),
            },
            None => FlatHit::default(),
        }
    }
}

impl FlatHit {
    /// A hit needs every column; partially filled rows read back as no hit.
    fn into_hit(self) -> Option<SegmentHit> {
        Some(SegmentHit {
            allele: self.call?,
            identity: self.identity?,
            coverage: self.coverage?,
            errors: self.errors?,
            query_start: self.query_start?,
            query_end: self.query_end?,
            allele_start: self.allele_start?,
            allele_end: self.allele_end?,
        })
    }
}

impl From<&AssignmentRecord> for AssignmentRow {
    fn from(record: &AssignmentRecord) -> Self {
        let v = FlatHit::from(record.v.as_ref());
        let d = FlatHit::from(record.d.as_ref());
        let j = FlatHit::from(record.j.as_ref());
        AssignmentRow {
            name: record.name.clone(),
            count: record.count,
            v_call: v.call,
            v_identity: v.identity,
            v_coverage: v.coverage,
            v_errors: v.errors,
            v_query_start: v.query_start,
            v_query_end: v.query_end,
            v_allele_start: v.allele_start,
            v_allele_end: v.allele_end,
            d_call: d.call,
            d_identity: d.identity,
            d_coverage: d.coverage,
            d_errors: d.errors,
            d_query_start: d.query_start,
            d_query_end: d.query_end,
            d_allele_start: d.allele_start,
            d_allele_end: d.allele_end,
            j_call: j.call,
            j_identity: j.identity,
            j_coverage: j.coverage,
            j_errors: j.errors,
            j_query_start: j.query_start,
            j_query_end: j.query_end,
            j_allele_start: j.allele_start,
            j_allele_end: j.allele_end,
            sequence: String::from_utf8_lossy(&record.sequence).into_owned(),
        }
    }
}

impl From<AssignmentRow> for AssignmentRecord {
    fn from(row: AssignmentRow) -> Self {
        let v = FlatHit {
            call: row.v_call,
            identity: row.v_identity,
            coverage: row.v_coverage,
            errors: row.v_errors,
            query_start: row.v_query_start,
            query_end: row.v_query_end,
            allele_start: row.v_allele_start,
            allele_end: row.v_allele_end,
        };
        let d = FlatHit {
            call: row.d_call,
            identity: row.d_identity,
            coverage: row.d_coverage,
            errors: row.d_errors,
            query_start: row.d_query_start,
            query_end: row.d_query_end,
            allele_start: row.d_allele_start,
            allele_end: row.d_allele_end,
        };
        let j = FlatHit {
            call: row.j_call,
            identity: row.j_identity,
            coverage: row.j_coverage,
            errors: row.j_errors,
            query_start: row.j_query_start,
            query_end: row.j_query_end,
            allele_start: row.j_allele_start,
            allele_end: row.j_allele_end,
        };
        AssignmentRecord {
            name: row.name,
            count: row.count,
            sequence: row.sequence.into_bytes(),
            v: v.into_hit(),
            d: d.into_hit(),
            j: j.into_hit(),
        }
    }
}
