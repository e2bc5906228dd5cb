// Copyright (c) 2026 igdiscover developers. All rights reserved.

//! Which pipeline stages a run needs, and in which order.

use anyhow::{bail, Result};
use petgraph::algo::toposort;
use petgraph::prelude::*;
use petgraph::visit::{Dfs, Reversed};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    MergeReads,
    Preprocess,
    GroupReads,
    Discover,
    Finalize,
}

/// What the caller asked to have built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Grouped reads only.
    Grouped,
    /// The discovery rounds, without the final table.
    NoFinal,
    Final,
}

impl Target {
    fn stage(self) -> Stage {
        match self {
            Target::Grouped => Stage::GroupReads,
            Target::NoFinal => Stage::Discover,
            Target::Final => Stage::Finalize,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Target::Grouped => "grouped",
            Target::NoFinal => "nofinal",
            Target::Final => "final",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Target {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "grouped" => Target::Grouped,
            "nofinal" => Target::NoFinal,
            "final" | "all" => Target::Final,
            other => bail!("unknown target '{other}', expected one of: grouped, nofinal, final"),
        })
    }
}

/// Stage dependency graph. Edges point from a stage to the stages that
/// consume its output.
pub struct StagePlan {
    graph: DiGraph<Stage, ()>,
}

impl StagePlan {
    /// `paired` adds the read merging stage in front of preprocessing.
    pub fn new(paired: bool) -> Self {
        let mut graph = DiGraph::new();
        let preprocess = graph.add_node(Stage::Preprocess);
        let group = graph.add_node(Stage::GroupReads);
        let discover = graph.add_node(Stage::Discover);
        let finalize = graph.add_node(Stage::Finalize);
        if paired {
            let merge = graph.add_node(Stage::MergeReads);
            graph.add_edge(merge, preprocess, ());
        }
        graph.add_edge(preprocess, group, ());
        graph.add_edge(group, discover, ());
        graph.add_edge(discover, finalize, ());
        // the final filter reads the preprocessed reads directly
        graph.add_edge(preprocess, finalize, ());
        StagePlan { graph }
    }

    fn node(&self, stage: Stage) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&index| self.graph[index] == stage)
    }

    /// The stages `target` depends on, itself included, in an order where
    /// every stage comes after its inputs.
    pub fn stages_for(&self, target: Target) -> Result<Vec<Stage>> {
        let Some(start) = self.node(target.stage()) else {
            bail!("target {target} is not part of this plan");
        };
        let reversed = Reversed(&self.graph);
        let mut needed = HashSet::new();
        let mut dfs = Dfs::new(reversed, start);
        while let Some(index) = dfs.next(reversed) {
            needed.insert(index);
        }
        let Ok(order) = toposort(&self.graph, None) else {
            bail!("stage graph has a cycle");
        };
        Ok(order
            .into_iter()
            .filter(|index| needed.contains(index))
            .map(|index| self.graph[index])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets() {
        let plan = StagePlan::new(true);
        assert_eq!(
            plan.stages_for(Target::Grouped).unwrap(),
            [Stage::MergeReads, Stage::Preprocess, Stage::GroupReads]
        );
        assert_eq!(
            plan.stages_for(Target::NoFinal).unwrap(),
            [
                Stage::MergeReads,
                Stage::Preprocess,
                Stage::GroupReads,
                Stage::Discover
            ]
        );
        let all = plan.stages_for(Target::Final).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all.last(), Some(&Stage::Finalize));
    }

    #[test]
    fn test_single_end_plan() {
        let plan = StagePlan::new(false);
        assert_eq!(
            plan.stages_for(Target::Final).unwrap(),
            [
                Stage::Preprocess,
                Stage::GroupReads,
                Stage::Discover,
                Stage::Finalize
            ]
        );
    }

    #[test]
    fn test_parse_target() {
        assert_eq!("nofinal".parse::<Target>().unwrap(), Target::NoFinal);
        assert_eq!("all".parse::<Target>().unwrap(), Target::Final);
        assert!("iteration-01".parse::<Target>().is_err());
    }
}
