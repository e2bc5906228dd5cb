// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! Evaluation of a run directory up to a requested target.

use crate::context::RunContext;
use crate::group::representatives;
use allele_assign::UngappedAligner;
use allele_discovery::{
    ArtifactKey, ArtifactStore, ConsensusDetector, ControllerSettings, FilterParams,
    IterationController, MergeStats, OverlapMerger, PreprocessStats, Preprocessor, ReadMerger,
    RunOutcome, SegmentSettings, Stage, StagePlan, State, SupportPolicy, Target,
};
use anyhow::{bail, Context, Result};
use igd_config::{Config, DiscoveryConfig, FilterConfig, MergeProgram};
use igd_types::{Read, Segment};
use log::info;
use read_group::io::{read_fastx, write_fasta};
use read_group::GroupingStats;
use serde::Serialize;

pub const READ_STATS: &str = "reads.json";
pub const PREPROCESSED_READS: &str = "preprocessed.fasta.gz";
pub const GROUPED_READS: &str = "grouped.fasta.gz";

/// Read counts of the stages before discovery, stored as `stats/reads.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merging: Option<MergeStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessing: Option<PreprocessStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping: Option<GroupingStats>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub stages: Vec<Stage>,
    pub reads: ReadStats,
    pub outcome: Option<RunOutcome>,
    /// Records in the final table, if it was built.
    pub final_records: Option<usize>,
    pub database: Option<String>,
}

fn filter_params(filter: &FilterConfig, d_coverage: f64) -> FilterParams {
    FilterParams {
        v_coverage: filter.v_coverage,
        j_coverage: filter.j_coverage,
        v_identity: filter.v_identity,
        require_j: filter.require_j,
        d_coverage,
    }
}

fn segment_settings(segment: Segment, discovery: &DiscoveryConfig) -> SegmentSettings<SupportPolicy> {
    SegmentSettings {
        segment,
        cluster_distance: discovery.cluster_distance,
        min_identity: discovery.min_identity,
        min_coverage: discovery.min_coverage,
        policy: SupportPolicy {
            min_count: discovery.min_count,
            min_allele_ratio: discovery.allele_ratio,
        },
    }
}

fn detector(config: &Config) -> ConsensusDetector {
    [
        (Segment::V, &config.v_discovery),
        (Segment::J, &config.j_discovery),
    ]
    .into_iter()
    .filter(|(_, discovery)| discovery.enabled)
    .fold(ConsensusDetector::new(), |detector, (segment, discovery)| {
        detector.with_segment(segment_settings(segment, discovery))
    })
}

fn controller_settings(config: &Config, stop_before_final: bool) -> ControllerSettings {
    ControllerSettings {
        max_iterations: config.iterations,
        preprocessing_filter: filter_params(&config.preprocessing_filter, config.d_coverage),
        final_filter: filter_params(&config.final_filter, config.d_coverage),
        stop_before_final,
    }
}

fn fasta_bytes(reads: &[Read]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_fasta(&mut buf, reads)?;
    Ok(buf)
}

fn merge_reads(ctx: &RunContext) -> Result<(Vec<Read>, Option<MergeStats>)> {
    let config = ctx.config();
    let (Some(reads1), Some(reads2)) = (&config.reads1, &config.reads2) else {
        bail!("paired-end input requires both reads1 and reads2 in the configuration");
    };
    let r1 = read_fastx(&ctx.resolve(reads1))?;
    match config.merge_program {
        MergeProgram::None => {
            info!("Merging disabled, using {} first reads", r1.len());
            Ok((r1, None))
        }
        MergeProgram::Overlap => {
            let r2 = read_fastx(&ctx.resolve(reads2))?;
            let (merged, stats) = OverlapMerger::default().merge(r1, r2)?;
            info!(
                "Merged {} of {} read pairs",
                stats.merged, stats.pairs
            );
            Ok((merged, Some(stats)))
        }
    }
}

fn single_reads(ctx: &RunContext) -> Result<Vec<Read>> {
    let path = ctx
        .config()
        .single_reads
        .as_ref()
        .context("no input reads configured")?;
    read_fastx(&ctx.resolve(path))
}

/// Run every stage `target` depends on, in dependency order.
pub fn run_pipeline(ctx: &RunContext, target: Target) -> Result<PipelineSummary> {
    let config = ctx.config();
    let paired = config.reads1.is_some();
    let stages = StagePlan::new(paired).stages_for(target)?;
    info!("Target {target} needs stages {stages:?}");

    let aligner = UngappedAligner::new(config.threads);
    let detector = detector(config);
    let database = ctx.load_database()?;
    let mut seed = Some(database);
    let mut discovery_store = ctx.store();
    let mut discovery_store = Some(&mut discovery_store);
    let mut store = ctx.store();

    let mut read_stats = ReadStats::default();
    let mut reads: Vec<Read> = Vec::new();
    let mut merged = false;
    let mut grouped: Vec<Read> = Vec::new();
    let mut controller: Option<IterationController<'_>> = None;

    for &stage in &stages {
        match stage {
            Stage::MergeReads => {
                let (out, stats) = merge_reads(ctx)?;
                reads = out;
                merged = true;
                read_stats.merging = stats;
            }
            Stage::Preprocess => {
                let input = if merged {
                    std::mem::take(&mut reads)
                } else {
                    single_reads(ctx)?
                };
                let (out, stats) = Preprocessor::new()
                    .limit(config.limit)
                    .minimum_length(config.minimum_length)
                    .forward_primers(&config.forward_primers)
                    .reverse_primers(&config.reverse_primers)
                    .run(input);
                info!(
                    "Preprocessing kept {} of {} reads",
                    stats.output, stats.input
                );
                store.put(ArtifactKey::Reads, PREPROCESSED_READS, &fasta_bytes(&out)?)?;
                reads = out;
                read_stats.preprocessing = Some(stats);
            }
            Stage::GroupReads => {
                if config.barcode_length() == 0 {
                    info!("No barcode configured, every read is its own group");
                    grouped = reads.clone();
                } else {
                    let (out, _, stats) =
                        representatives(config.barcode_spec(), 0, reads.clone())?;
                    grouped = out;
                    read_stats.grouping = Some(stats);
                }
                store.put(ArtifactKey::Reads, GROUPED_READS, &fasta_bytes(&grouped)?)?;
            }
            Stage::Discover => {
                let seed = seed.take().context("discovery already started")?;
                let discovery_store = discovery_store
                    .take()
                    .context("discovery already started")?;
                let settings = controller_settings(config, !stages.contains(&Stage::Finalize));
                let mut discovery = IterationController::new(
                    &aligner,
                    &detector,
                    discovery_store,
                    settings,
                    seed,
                    std::mem::take(&mut grouped),
                    std::mem::take(&mut reads),
                );
                discovery.run_until(State::Finalizing)?;
                controller = Some(discovery);
            }
            Stage::Finalize => {
                let discovery = controller
                    .as_mut()
                    .context("the final table needs the discovery stage")?;
                discovery.run()?;
            }
        }
    }

    store.put(
        ArtifactKey::Stats,
        READ_STATS,
        &serde_json::to_vec_pretty(&read_stats)?,
    )?;

    let summary = PipelineSummary {
        stages,
        reads: read_stats,
        outcome: controller.as_ref().and_then(IterationController::outcome),
        final_records: controller
            .as_ref()
            .and_then(IterationController::final_table)
            .map(|table| table.len()),
        database: controller
            .as_ref()
            .map(|discovery| discovery.current_database().summary()),
    };
    Ok(summary)
}
