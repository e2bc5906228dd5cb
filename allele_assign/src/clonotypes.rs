// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! Clonotypes: assigned records sharing V call, J call and junction.

use crate::table::AssignmentTable;
use anyhow::Result;
use igd_types::Segment;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clonotype {
    /// Summed read count of the member records.
    pub count: usize,
    pub records: usize,
    pub v_call: String,
    pub j_call: String,
    pub junction_length: usize,
    pub junction: String,
}

/// Group the records of `table` that have both a V and a J hit. The most
/// abundant clonotypes come first, ties are broken by V, J and junction.
/// With `limit`, only that many clonotypes are returned.
pub fn clonotypes(table: &AssignmentTable, limit: Option<usize>) -> Vec<Clonotype> {
    let mut groups: HashMap<(&str, &str, &[u8]), (usize, usize)> = HashMap::new();
    for record in table {
        let (Some(v), Some(j), Some(junction)) = (
            record.call(Segment::V),
            record.call(Segment::J),
            record.junction(),
        ) else {
            continue;
        };
        let entry = groups.entry((v, j, junction)).or_default();
        entry.0 += record.count;
        entry.1 += 1;
    }

    let mut clonotypes: Vec<Clonotype> = groups
        .into_iter()
        .map(|((v, j, junction), (count, records))| Clonotype {
            count,
            records,
            v_call: v.to_string(),
            j_call: j.to_string(),
            junction_length: junction.len(),
            junction: String::from_utf8_lossy(junction).into_owned(),
        })
        .collect();
    clonotypes.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.v_call.cmp(&b.v_call))
            .then_with(|| a.j_call.cmp(&b.j_call))
            .then_with(|| a.junction.cmp(&b.junction))
    });
    if let Some(limit) = limit {
        clonotypes.truncate(limit);
    }
    clonotypes
}

pub fn write_clonotypes<W: Write>(writer: W, clonotypes: &[Clonotype]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    for clonotype in clonotypes {
        writer.serialize(clonotype)?;
    }
    writer.flush()?;
    Ok(())
}
