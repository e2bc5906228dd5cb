// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! The discovery loop: assign, detect, update, repeated until a round finds
//! nothing new.

use crate::artifacts::{novel_allele_table, table_bytes, ArtifactKey, ArtifactStore};
use crate::filter::{FilterParams, FinalFilter};
use crate::novelty::NoveltyDetector;
use allele_assign::{
    exact_occurrences, write_exact_table, Aligner, AlignerFailure, AssignmentTable,
};
use anyhow::{Context, Result};
use germline_db::{GermlineAllele, GermlineDatabase};
use igd_types::Read;
use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

pub const ASSIGNED_TABLE: &str = "assigned.tab.gz";
pub const FILTERED_TABLE: &str = "filtered.tab.gz";
pub const NEW_GERMLINE_TABLE: &str = "new_germline.tab";
pub const EXACT_TABLE: &str = "exact.tab";
pub const DATABASE_FASTA: &str = "database.fasta";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("aligner failed in iteration {iteration}")]
    Aligner {
        iteration: usize,
        #[source]
        source: AlignerFailure,
    },

    #[error("aligner failed while computing the final table")]
    FinalAssignment(#[source] AlignerFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Assigning,
    Detecting,
    Updating,
    Finalizing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Converged { iterations: usize },
    /// The last allowed round still found alleles. The final table was built
    /// from the newest database anyway.
    NotConverged { iterations: usize },
}

impl RunOutcome {
    pub fn iterations(&self) -> usize {
        match *self {
            RunOutcome::Converged { iterations } | RunOutcome::NotConverged { iterations } => {
                iterations
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub max_iterations: usize,
    pub preprocessing_filter: FilterParams,
    pub final_filter: FilterParams,
    /// Stop in `Done` right after the loop, without a final table.
    pub stop_before_final: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        ControllerSettings {
            max_iterations: 10,
            preprocessing_filter: FilterParams::default(),
            final_filter: FilterParams::default(),
            stop_before_final: false,
        }
    }
}

/// One sealed discovery round. Read only.
#[derive(Debug)]
pub struct Iteration {
    number: usize,
    database: Arc<GermlineDatabase>,
    assigned: AssignmentTable,
    filtered: AssignmentTable,
    discovered: Vec<GermlineAllele>,
}

impl Iteration {
    pub fn number(&self) -> usize {
        self.number
    }

    /// The database the round assigned against.
    pub fn database(&self) -> &GermlineDatabase {
        &self.database
    }

    pub fn assigned(&self) -> &AssignmentTable {
        &self.assigned
    }

    pub fn filtered(&self) -> &AssignmentTable {
        &self.filtered
    }

    pub fn discovered(&self) -> &[GermlineAllele] {
        &self.discovered
    }
}

/// Data of the round in progress. Dropped without trace if the round fails.
struct Round {
    number: usize,
    database: Arc<GermlineDatabase>,
    assigned: AssignmentTable,
    filtered: AssignmentTable,
    candidates: Vec<GermlineAllele>,
}

pub struct IterationController<'a> {
    aligner: &'a dyn Aligner,
    detector: &'a dyn NoveltyDetector,
    store: &'a mut dyn ArtifactStore,
    settings: ControllerSettings,
    /// Input of every assignment round, normally group representatives.
    grouped: Vec<Read>,
    /// Input of the final filter.
    reads: Vec<Read>,
    current: Arc<GermlineDatabase>,
    state: State,
    round: Option<Round>,
    iterations: Vec<Iteration>,
    outcome: Option<RunOutcome>,
    final_table: Option<AssignmentTable>,
}

impl<'a> IterationController<'a> {
    pub fn new(
        aligner: &'a dyn Aligner,
        detector: &'a dyn NoveltyDetector,
        store: &'a mut dyn ArtifactStore,
        settings: ControllerSettings,
        seed: GermlineDatabase,
        grouped: Vec<Read>,
        reads: Vec<Read>,
    ) -> Self {
        IterationController {
            aligner,
            detector,
            store,
            settings,
            grouped,
            reads,
            current: Arc::new(seed),
            state: State::Init,
            round: None,
            iterations: Vec::new(),
            outcome: None,
            final_table: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn iterations(&self) -> &[Iteration] {
        &self.iterations
    }

    pub fn current_database(&self) -> Arc<GermlineDatabase> {
        Arc::clone(&self.current)
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    pub fn final_table(&self) -> Option<&AssignmentTable> {
        self.final_table.as_ref()
    }

    /// Advance by one state. On error the round in progress is discarded and
    /// a failed round restarts at `Assigning`; sealed iterations stay as they
    /// are.
    pub fn step(&mut self) -> Result<State> {
        let next = match self.state {
            State::Init => self.init(),
            State::Assigning => self.assigning(),
            State::Detecting => self.detecting(),
            State::Updating => self.updating(),
            State::Finalizing => self.finalizing(),
            State::Done => Ok(State::Done),
        };
        match next {
            Ok(state) => {
                self.state = state;
                Ok(state)
            }
            Err(e) => {
                self.round = None;
                if matches!(self.state, State::Detecting | State::Updating) {
                    self.state = State::Assigning;
                }
                Err(e)
            }
        }
    }

    /// Step until `target` or `Done` is reached.
    pub fn run_until(&mut self, target: State) -> Result<State> {
        while self.state != target && self.state != State::Done {
            self.step()?;
        }
        Ok(self.state)
    }

    pub fn run(&mut self) -> Result<RunOutcome> {
        self.run_until(State::Done)?;
        // Done is only reachable after Updating set the outcome
        Ok(self.outcome.unwrap_or(RunOutcome::Converged {
            iterations: self.iterations.len(),
        }))
    }

    fn init(&mut self) -> Result<State> {
        // Outputs of an earlier run would read as rounds of this one.
        for key in self.store.keys()? {
            if matches!(key, ArtifactKey::Iteration(_) | ArtifactKey::Final) {
                info!("Removing {key} left by an earlier run");
                self.store.clear(key)?;
            }
        }
        info!(
            "Starting discovery with {} grouped reads, {} reads for the final table, database {}",
            self.grouped.len(),
            self.reads.len(),
            self.current.summary()
        );
        Ok(State::Assigning)
    }

    fn assigning(&mut self) -> Result<State> {
        let number = self.iterations.len() + 1;
        let database = Arc::clone(&self.current);
        let assigned = self
            .aligner
            .assign(&self.grouped, &database)
            .map_err(|source| DiscoveryError::Aligner {
                iteration: number,
                source,
            })?;
        let filtered = self.settings.preprocessing_filter.apply(&assigned);
        info!(
            "Iteration {number}: {} of {} records pass the preprocessing filter",
            filtered.len(),
            assigned.len()
        );
        self.round = Some(Round {
            number,
            database,
            assigned,
            filtered,
            candidates: Vec::new(),
        });
        Ok(State::Detecting)
    }

    fn detecting(&mut self) -> Result<State> {
        let round = self
            .round
            .as_mut()
            .context("no assignment round in progress")?;
        round.candidates = self
            .detector
            .detect(&round.filtered, &round.database)
            .with_context(|| format!("novelty detection failed in iteration {}", round.number))?;
        Ok(State::Updating)
    }

    fn updating(&mut self) -> Result<State> {
        let round = self
            .round
            .take()
            .context("no assignment round in progress")?;
        let key = ArtifactKey::Iteration(round.number);

        let next_database = if round.candidates.is_empty() {
            None
        } else {
            Some(round.database.with_additions(round.candidates.iter().cloned())?)
        };

        let mut fasta = Vec::new();
        round.database.write_fasta(&mut fasta)?;
        let mut exact = Vec::new();
        write_exact_table(&mut exact, &exact_occurrences(&round.filtered, &round.database))?;
        let mut entries = vec![
            (ASSIGNED_TABLE, table_bytes(&round.assigned)?),
            (FILTERED_TABLE, table_bytes(&round.filtered)?),
            (DATABASE_FASTA, fasta),
            (EXACT_TABLE, exact),
        ];
        if !round.candidates.is_empty() {
            entries.push((NEW_GERMLINE_TABLE, novel_allele_table(&round.candidates)?));
        }
        // The round is sealed only once all of its files are in place.
        self.store.commit(key, &entries)?;

        let number = round.number;
        let discovered = round.candidates.len();
        self.iterations.push(Iteration {
            number,
            database: round.database,
            assigned: round.assigned,
            filtered: round.filtered,
            discovered: round.candidates,
        });

        let next_state = match next_database {
            None => {
                info!("Iteration {number}: no new alleles, converged");
                self.outcome = Some(RunOutcome::Converged { iterations: number });
                State::Finalizing
            }
            Some(database) => {
                info!(
                    "Iteration {number}: {discovered} new alleles, database is now {}",
                    database.summary()
                );
                self.current = Arc::new(database);
                if number >= self.settings.max_iterations {
                    warn!(
                        "Did not converge after {number} iterations, \
                         finishing with the newest database"
                    );
                    self.outcome = Some(RunOutcome::NotConverged { iterations: number });
                    State::Finalizing
                } else {
                    State::Assigning
                }
            }
        };
        if next_state == State::Finalizing && self.settings.stop_before_final {
            return Ok(State::Done);
        }
        Ok(next_state)
    }

    fn finalizing(&mut self) -> Result<State> {
        let table = FinalFilter::new(self.aligner, self.settings.final_filter)
            .run(&self.current, &self.reads)
            .map_err(DiscoveryError::FinalAssignment)?;
        let mut fasta = Vec::new();
        self.current.write_fasta(&mut fasta)?;
        self.store.commit(
            ArtifactKey::Final,
            &[(ASSIGNED_TABLE, table_bytes(&table)?), (DATABASE_FASTA, fasta)],
        )?;
        info!(
            "Final table written with {} records, database {}",
            table.len(),
            self.current.summary()
        );
        self.final_table = Some(table);
        Ok(State::Done)
    }
}
