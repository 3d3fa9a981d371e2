use std::time::Instant;

use anyhow::Result;
use clap::ValueEnum;
use log::{
    debug,
    info,
};
use rand::{
    Rng,
    SeedableRng,
};
use rayon::prelude::*;
use wyhash::WyRng;

use crate::{
    eval,
    game::{
        payoff,
        InfoSetKey,
    },
    tree::GameTree,
};

/// Named knobs of the training loop; every magic constant of the algorithm
/// lives here so callers can override them.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Regret at or above this keeps a branch in the promising set.
    pub prune_threshold: f64,
    /// Average-strategy probabilities below this are zeroed when reporting.
    pub average_strategy_floor: f64,
    /// Share of full (unpruned) traversals mixed into pruned training runs.
    pub full_traversal_ratio: f64,
    /// Iterations between progress reports.
    pub report_interval: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prune_threshold: 0.0,
            average_strategy_floor: 0.01,
            full_traversal_ratio: 0.05,
            report_interval: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    Vanilla,
    Discounted,
    Pruned,
    PrunedParallel,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Variant::Vanilla => "vanilla",
            Variant::Discounted => "discounted",
            Variant::Pruned => "pruned",
            Variant::PrunedParallel => "pruned-parallel",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branching {
    Full,
    Promising,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Update {
    Plain,
    /// Linear discount by `t / (t + 1)` after each additive regret update;
    /// `t` is threaded in explicitly by the training loop.
    Discounted { t: u64 },
}

/// Per-iteration traversal parameters. The one recursive walk below serves
/// all four training variants; only the pass changes.
#[derive(Debug, Clone, Copy)]
struct TraversalPass {
    branching: Branching,
    update: Update,
    parallel: bool,
}

pub struct Trainer {
    tree: GameTree,
    rng: WyRng,
    config: Config,
    variant: Variant,
}

impl Trainer {
    /// Fresh trainer over a newly built tree.
    pub fn new(variant: Variant, config: Config, seed: Option<u64>) -> Self {
        Self::with_tree(GameTree::build(), variant, config, seed)
    }

    /// Continues training a previously trained tree in place.
    pub fn with_tree(tree: GameTree, variant: Variant, config: Config, seed: Option<u64>) -> Self {
        Self {
            tree,
            rng: WyRng::seed_from_u64(seed.unwrap_or_else(rand::random)),
            config,
            variant,
        }
    }

    pub fn tree(&self) -> &GameTree {
        &self.tree
    }

    pub fn into_tree(self) -> GameTree {
        self.tree
    }

    /// Expected value of the current average strategy, by full enumeration
    /// of the 36 chance outcomes.
    pub fn game_value(&self) -> Result<f64> {
        eval::game_value(&self.tree, self.config.average_strategy_floor)
    }

    /// Runs `iterations` self-play iterations, each sampling one chance
    /// outcome and walking the tree once top to bottom.
    pub fn train(&mut self, iterations: usize) -> Result<()> {
        if matches!(self.variant, Variant::Pruned | Variant::PrunedParallel) {
            self.tree.prune(self.config.prune_threshold);
        }

        let mut util = 0.0;
        let mut timer = Instant::now();
        for i in 1..=iterations {
            let rolled = [self.rng.gen_range(1u8..=6), self.rng.gen_range(1u8..=6)];
            let pass = self.pass_for(i as u64);
            util += self.cfr(rolled, &InfoSetKey::root(rolled[0]), 1.0, 1.0, &pass)?;

            if i % self.config.report_interval == 0 {
                let per_sec = self.config.report_interval as f64 / timer.elapsed().as_secs_f64();
                info!("trained {} iterations ({:.0} iterations/s)", i, per_sec);
                info!("theoretical game value: {}", self.game_value()?);
                timer = Instant::now();
            }
        }
        debug!("average sampled root utility: {}", util / iterations as f64);
        Ok(())
    }

    fn pass_for(&mut self, t: u64) -> TraversalPass {
        match self.variant {
            Variant::Vanilla => TraversalPass {
                branching: Branching::Full,
                update: Update::Plain,
                parallel: false,
            },
            Variant::Discounted => TraversalPass {
                branching: Branching::Full,
                update: Update::Discounted {
                    t,
                },
                parallel: false,
            },
            Variant::Pruned | Variant::PrunedParallel => {
                // Occasionally re-walk the full tree so a branch pruned
                // early is not starved forever.
                let branching = if self.rng.gen::<f64>() < self.config.full_traversal_ratio {
                    Branching::Full
                } else {
                    Branching::Promising
                };
                TraversalPass {
                    branching,
                    update: Update::Plain,
                    parallel: self.variant == Variant::PrunedParallel
                        && branching == Branching::Promising,
                }
            }
        }
    }

    /// One ply of the recursive CFR walk. `p0`/`p1` are the players' reach
    /// probabilities; the acting player's strategy is weighted by the
    /// opponent's reach, and returned utilities are negated on the way up
    /// (two-player zero sum).
    fn cfr(
        &self,
        rolled: [u8; 2],
        key: &InfoSetKey,
        p0: f64,
        p1: f64,
        pass: &TraversalPass,
    ) -> Result<f64> {
        let player = key.acting_player();
        let other = 1 - player;
        let node_cell = self.tree.node(key)?;

        if key.is_terminal() {
            node_cell.lock().unwrap().record_visit();
            return payoff(key, rolled);
        }

        let realization_weight = if player == 0 {
            p1
        } else {
            p0
        };

        let (strategy, children, branches) = {
            let mut node = node_cell.lock().unwrap();
            node.record_visit();
            node.record_realization(realization_weight);
            let strategy = node.to_strategy(realization_weight);
            let children = node.children().to_vec();
            let branches: Vec<usize> = match pass.branching {
                Branching::Full => (0..children.len()).collect(),
                Branching::Promising => match node.promising_branches() {
                    Some(p) => p.to_vec(),
                    None => (0..children.len()).collect(),
                },
            };
            (strategy, children, branches)
        };
        debug!("cfr at {}: {} of {} branches", key, branches.len(), children.len());

        let walk_branch = |i: usize| -> Result<(usize, f64)> {
            // Control passes to the opponent: the child key leads with
            // their rolled face.
            let next = key.advance(rolled[other], children[i]);
            let (next_p0, next_p1) = if player == 0 {
                (p0 * strategy[i], p1)
            } else {
                (p0, p1 * strategy[i])
            };
            Ok((i, -self.cfr(rolled, &next, next_p0, next_p1, pass)?))
        };

        // The parallel pass fans the branches out to the rayon pool and
        // blocks on all of them; sibling subtrees are disjoint, so workers
        // never contend for the same node.
        let branch_utils: Vec<(usize, f64)> = if pass.parallel && branches.len() > 1 {
            branches.par_iter().map(|i| walk_branch(*i)).collect::<Result<Vec<_>>>()?
        } else {
            branches.iter().map(|i| walk_branch(*i)).collect::<Result<Vec<_>>>()?
        };

        let mut node_util = 0.0;
        for (i, util) in branch_utils.iter() {
            node_util += strategy[*i] * util;
        }

        let mut node = node_cell.lock().unwrap();
        for (i, util) in branch_utils.iter() {
            node.add_regret(*i, util - node_util, realization_weight);
            if let Update::Discounted {
                t,
            } = pass.update
            {
                node.discount_regret(*i, t);
            }
        }

        Ok(node_util)
    }
}
