// Copyright (c) 2026 igdiscover developers. All rights reserved.
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility
)]

//! igd_types
//!
//! Small shared vocabulary for the discovery workspace: gene segment and locus
//! enums, the immutable `Read` record and nucleotide alphabet checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

// From https://danielkeep.github.io/tlborm/book/blk-counting.html
macro_rules! replace_expr {
    ($_t:tt $sub:expr) => {
        $sub
    };
}

macro_rules! count_tts {
    ($($tts:tt)*) => {0usize $(+ replace_expr!($tts 1usize))*};
}

macro_rules! make_enum {
    (
        name: $name:ident,
        variants:[$( ($field:ident, $lit: literal) ,)*],
        const_var_name: $const_var_name:ident,
    ) => {
        pub const $const_var_name: [&str; count_tts!($($field)*)] = [
            $($lit,)*
        ];

        #[derive(
            Debug,
            Copy,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
            Hash,
        )]
        pub enum $name {
            $(
                #[serde(rename = $lit)]
                $field,
            )*
        }

        impl $name {
            pub fn all() -> [Self; count_tts!($($field)*)] {
                [
                    $($name::$field,)*
                ]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", match self {
                    $(
                        $name::$field => $lit,
                    )*
                })
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(
                        $lit => Ok($name::$field),
                    )*
                    unknown => Err(
                        format!("Unknown variant '{}' for {}. Supported variants are: [{}]", unknown, stringify!($name), $const_var_name.join(", "))
                    )
                }
            }
        }
    };
}

make_enum! {
    name: Segment,
    variants: [
        (V, "V"),
        (D, "D"),
        (J, "J"),
    ],
    const_var_name: SEGMENTS,
}

make_enum! {
    name: Locus,
    variants: [
        (IGH, "IGH"),
        (IGK, "IGK"),
        (IGL, "IGL"),
        (TRA, "TRA"),
        (TRB, "TRB"),
        (TRD, "TRD"),
        (TRG, "TRG"),
    ],
    const_var_name: LOCI,
}

impl Segment {
    /// Lower case column prefix used in assignment tables (`v_call`, `j_identity`, ...).
    pub fn column_prefix(self) -> &'static str {
        match self {
            Segment::V => "v",
            Segment::D => "d",
            Segment::J => "j",
        }
    }
}

/// Split an IMGT style allele name such as `IGHV1-18*01` into its locus and
/// segment. Returns None when the name does not start with a known locus
/// followed by V, D or J.
pub fn parse_allele_name(name: &str) -> Option<(Locus, Segment)> {
    let locus: Locus = name.get(..3)?.parse().ok()?;
    let segment: Segment = name.get(3..4)?.parse().ok()?;
    Some((locus, segment))
}

/// IUPAC nucleotide codes accepted in reads and germline sequences.
pub const ALLOWED_NUCLEOTIDES: &[u8] = b"ACGTURYKMSWBDHVN";

/// Position and value of the first symbol outside `ALLOWED_NUCLEOTIDES`.
pub fn first_invalid_base(seq: &[u8]) -> Option<(usize, u8)> {
    seq.iter()
        .enumerate()
        .find(|(_, base)| !ALLOWED_NUCLEOTIDES.contains(&base.to_ascii_uppercase()))
        .map(|(i, &base)| (i, base))
}

pub fn is_valid_dna(seq: &[u8]) -> bool {
    first_invalid_base(seq).is_none()
}

/// A sequencing read. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Read {
    name: String,
    seq: Vec<u8>,
    qual: Option<Vec<u8>>,
}

impl Read {
    pub fn new(name: impl Into<String>, seq: impl Into<Vec<u8>>) -> Read {
        Read {
            name: name.into(),
            seq: seq.into(),
            qual: None,
        }
    }

    /// Create a read with per-base qualities. Qualities of the wrong length
    /// are dropped rather than kept misaligned.
    pub fn with_qual(
        name: impl Into<String>,
        seq: impl Into<Vec<u8>>,
        qual: impl Into<Vec<u8>>,
    ) -> Read {
        let seq = seq.into();
        let qual = qual.into();
        let qual = (qual.len() == seq.len()).then_some(qual);
        Read {
            name: name.into(),
            seq,
            qual,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    pub fn qual(&self) -> Option<&[u8]> {
        self.qual.as_deref()
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// A new read holding the bases (and qualities) in `range`.
    pub fn slice(&self, range: Range<usize>) -> Read {
        Read {
            name: self.name.clone(),
            seq: self.seq[range.clone()].to_vec(),
            qual: self.qual.as_ref().map(|q| q[range].to_vec()),
        }
    }

    /// Same bases and qualities under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Read {
        Read {
            name: name.into(),
            seq: self.seq.clone(),
            qual: self.qual.clone(),
        }
    }
}

impl fmt::Display for Read {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ">{}\n{}", self.name, String::from_utf8_lossy(&self.seq))
    }
}
