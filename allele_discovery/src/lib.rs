// Copyright (c) 2026 igdiscover developers. All rights reserved.
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility
)]

//! Iterative discovery of germline alleles.
//!
//! [`controller::IterationController`] repeats assignment against the current
//! database and [`novelty`] detection until a round finds no new allele, then
//! computes the final table with [`filter::FinalFilter`]. Round outputs go to
//! an [`artifacts::ArtifactStore`].

pub mod artifacts;
pub mod controller;
pub mod filter;
pub mod merge;
pub mod novelty;
pub mod plan;
pub mod preprocess;

pub use artifacts::{ArtifactKey, ArtifactStore, DirectoryStore, MemoryStore};
pub use controller::{
    ControllerSettings, DiscoveryError, Iteration, IterationController, RunOutcome, State,
};
pub use filter::{FilterParams, FinalFilter};
pub use merge::{MergeError, MergeStats, OverlapMerger, ReadMerger};
pub use novelty::{
    Candidate, ConsensusDetector, NoveltyDetector, NoveltyPolicy, SegmentSettings, SupportPolicy,
};
pub use plan::{Stage, StagePlan, Target};
pub use preprocess::{PreprocessStats, Preprocessor};
