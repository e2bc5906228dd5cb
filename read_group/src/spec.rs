// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! Barcode and pseudo-CDR3 extraction.
//!
//! A `BarcodeSpec` says where the molecular barcode sits (5' or 3' end, by the
//! sign of its length) and which slice of the remaining sequence is used as the
//! pseudo-CDR3. Slices follow the Python convention: negative bounds count from
//! the far end of the barcode-stripped remainder, never of the original read.

use crate::grouper::GroupKey;
use igd_types::Read;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedSpec {
    #[error("read '{read}' has length {len}, but the barcode spec needs at least {min_len} bases")]
    ReadTooShort {
        read: String,
        len: usize,
        min_len: usize,
    },

    #[error(
        "pseudo-CDR3 slice {slice} resolves to {start}..{end} on the {len} bases left \
         after removing the barcode of read '{read}'"
    )]
    SliceOutOfBounds {
        read: String,
        slice: PseudoCdr3Slice,
        start: i64,
        end: i64,
        len: usize,
    },

    #[error("cannot parse pseudo-CDR3 slice '{0}', expected START:END, e.g. -80:-60")]
    InvalidSlice(String),

    #[error("pseudo-CDR3 slice {0} has contradictory bounds, its start is not before its end")]
    ContradictoryBounds(PseudoCdr3Slice),
}

/// The `[start:end]` window of the barcode-stripped remainder used as pseudo-CDR3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PseudoCdr3Slice {
    start: i32,
    end: i32,
}

/// 80 to 60 bases before the 3' end of the remainder.
pub const DEFAULT_PSEUDO_CDR3: PseudoCdr3Slice = PseudoCdr3Slice {
    start: -80,
    end: -60,
};

impl PseudoCdr3Slice {
    pub fn new(start: i32, end: i32) -> Result<Self, MalformedSpec> {
        let slice = PseudoCdr3Slice { start, end };
        // Bounds of the same sign are comparable without knowing the read length.
        // An end of 0 lies before every negative start.
        if ((start >= 0) == (end >= 0) && start >= end) || (start < 0 && end == 0) {
            return Err(MalformedSpec::ContradictoryBounds(slice));
        }
        Ok(slice)
    }

    pub fn start(&self) -> i32 {
        self.start
    }

    pub fn end(&self) -> i32 {
        self.end
    }

    /// Shortest remainder the slice can be resolved against.
    pub fn min_len(&self) -> usize {
        let (s, e) = (self.start.unsigned_abs() as usize, self.end.unsigned_abs() as usize);
        match (self.start >= 0, self.end >= 0) {
            (true, true) => e,
            (false, false) => s,
            (true, false) => s + e,
            (false, true) => s.max(e),
        }
    }

    /// Resolve the slice against a remainder of `len` bases.
    fn resolve(&self, len: usize) -> Result<Range<usize>, (i64, i64)> {
        let resolve_bound = |bound: i32| {
            if bound < 0 {
                len as i64 + i64::from(bound)
            } else {
                i64::from(bound)
            }
        };
        let (start, end) = (resolve_bound(self.start), resolve_bound(self.end));
        if start < 0 || end > len as i64 || start > end {
            return Err((start, end));
        }
        Ok(start as usize..end as usize)
    }
}

impl fmt::Display for PseudoCdr3Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for PseudoCdr3Slice {
    type Err = MalformedSpec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MalformedSpec::InvalidSlice(s.to_string());
        let (start, end) = s.split_once(':').ok_or_else(invalid)?;
        let start = start.trim().parse().map_err(|_| invalid())?;
        let end = end.trim().parse().map_err(|_| invalid())?;
        PseudoCdr3Slice::new(start, end)
    }
}

impl TryFrom<String> for PseudoCdr3Slice {
    type Error = MalformedSpec;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PseudoCdr3Slice> for String {
    fn from(slice: PseudoCdr3Slice) -> String {
        slice.to_string()
    }
}

/// Where the barcode and the pseudo-CDR3 are located on a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BarcodeSpec {
    /// Positive: barcode at the 5' end. Negative: barcode at the 3' end. Zero: no barcode.
    pub barcode_length: i32,
    pub pseudo_cdr3: Option<PseudoCdr3Slice>,
    /// Strip a trailing run of G from the pseudo-CDR3 (template-switch artifact).
    pub trim_g: bool,
}

/// Result of applying a `BarcodeSpec` to one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub barcode: Vec<u8>,
    pub pseudo_cdr3: Vec<u8>,
    /// Coordinates of the barcode-stripped remainder in the original read.
    pub remainder: Range<usize>,
}

impl Extraction {
    pub fn key(&self) -> GroupKey {
        GroupKey {
            barcode: self.barcode.clone(),
            pseudo_cdr3: self.pseudo_cdr3.clone(),
        }
    }

    pub fn into_parts(self) -> (GroupKey, Range<usize>) {
        (
            GroupKey {
                barcode: self.barcode,
                pseudo_cdr3: self.pseudo_cdr3,
            },
            self.remainder,
        )
    }
}

impl BarcodeSpec {
    pub fn new(barcode_length: i32) -> Self {
        BarcodeSpec {
            barcode_length,
            pseudo_cdr3: None,
            trim_g: false,
        }
    }

    pub fn with_pseudo_cdr3(mut self, slice: PseudoCdr3Slice) -> Self {
        self.pseudo_cdr3 = Some(slice);
        self
    }

    pub fn with_trim_g(mut self, trim_g: bool) -> Self {
        self.trim_g = trim_g;
        self
    }

    pub fn barcode_len(&self) -> usize {
        self.barcode_length.unsigned_abs() as usize
    }

    /// The shortest read this spec can be applied to.
    pub fn min_read_length(&self) -> usize {
        self.barcode_len() + self.pseudo_cdr3.map_or(0, |s| s.min_len())
    }

    pub fn extract(&self, read: &Read) -> Result<Extraction, MalformedSpec> {
        let seq = read.seq();
        let bc_len = self.barcode_len();
        if seq.len() < bc_len {
            return Err(MalformedSpec::ReadTooShort {
                read: read.name().to_string(),
                len: seq.len(),
                min_len: self.min_read_length(),
            });
        }
        let (barcode, remainder) = if self.barcode_length >= 0 {
            (0..bc_len, bc_len..seq.len())
        } else {
            (seq.len() - bc_len..seq.len(), 0..seq.len() - bc_len)
        };

        let pseudo_cdr3 = match self.pseudo_cdr3 {
            None => Vec::new(),
            Some(slice) => {
                let rest = &seq[remainder.clone()];
                let window =
                    slice
                        .resolve(rest.len())
                        .map_err(|(start, end)| MalformedSpec::SliceOutOfBounds {
                            read: read.name().to_string(),
                            slice,
                            start,
                            end,
                            len: rest.len(),
                        })?;
                let cdr3 = &rest[window];
                if self.trim_g {
                    trim_trailing_g(cdr3).to_vec()
                } else {
                    cdr3.to_vec()
                }
            }
        };

        Ok(Extraction {
            barcode: seq[barcode].to_vec(),
            pseudo_cdr3,
            remainder,
        })
    }
}

/// Remove the maximal run of `G` at the 3' end.
pub fn trim_trailing_g(seq: &[u8]) -> &[u8] {
    let keep = seq.iter().rposition(|&b| b != b'G').map_or(0, |i| i + 1);
    &seq[..keep]
}
