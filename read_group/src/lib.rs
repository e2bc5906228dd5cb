// Copyright (c) 2026 igdiscover developers. All rights reserved.
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility
)]

//! Group reads that come from the same molecule.
//!
//! Reads are keyed by a molecular barcode plus a short pseudo-CDR3 window
//! ([`spec`]) and collapsed into groups with one representative each
//! ([`grouper`]). This happens before any alignment.

pub mod consensus;
pub mod grouper;
pub mod io;
pub mod spec;

pub use grouper::{group_reads, GroupIter, GroupKey, GroupingStats, ReadGroup, ReadGrouper};
pub use spec::{BarcodeSpec, Extraction, MalformedSpec, PseudoCdr3Slice};
