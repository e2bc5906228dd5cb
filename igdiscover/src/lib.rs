// Copyright (c) 2026 igdiscover developers. All rights reserved.
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2021_compatibility
)]

//! The `igdiscover` command line front end.
//!
//! A run lives in its own directory holding `igdiscover.toml`, a copy of the
//! starting database under `database/` and every artifact produced later.
//! [`context::RunContext`] is the handle on such a directory.

pub mod clonotypes;
pub mod context;
pub mod group;
pub mod pipeline;

pub use clonotypes::run_clonotypes;
pub use context::{guess_reads2, run_config, run_init, ConfigAction, InitOptions, RunContext};
pub use group::{run_group, GroupOptions};
pub use pipeline::{run_pipeline, PipelineSummary, ReadStats};
