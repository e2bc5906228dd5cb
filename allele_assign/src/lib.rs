// Copyright (c) 2026 igdiscover developers. All rights reserved.
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility
)]

//! Read-to-germline assignment.
//!
//! The discovery loop only relies on the [`Aligner`] trait and the
//! [`AssignmentTable`] it returns; [`UngappedAligner`] is the built-in
//! implementation.

pub mod aligner;
pub mod clonotypes;
pub mod exact;
pub mod table;

pub use aligner::{Aligner, AlignerFailure, UngappedAligner};
pub use clonotypes::{clonotypes, write_clonotypes, Clonotype};
pub use exact::{exact_occurrences, write_exact_table, ExactOccurrence};
pub use table::{count_from_name, AssignmentRecord, AssignmentTable, SegmentHit};
