use std::fmt::Display;

use more_asserts::debug_assert_ge;

use crate::game::Action;

/// Mutable per-information-set state. A challenged (terminal) info set
/// keeps empty arrays and only its visit counter moves.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    regret_sum: Vec<f64>,
    strategy: Vec<f64>,
    strategy_sum: Vec<f64>,

    children: Vec<Action>,

    times_visited: u64,
    realization_count: u64,
    realization_sum: f64,

    /// Action indices kept by the latest pruning pass; `None` until a
    /// pruning pass has run.
    promising_branches: Option<Vec<usize>>,
}

impl Node {
    pub fn new(children: Vec<Action>) -> Self {
        let len = children.len();
        Self {
            regret_sum: vec![0.0; len],
            strategy: vec![0.0; len],
            strategy_sum: vec![0.0; len],
            children,
            times_visited: 0,
            realization_count: 0,
            realization_sum: 0.0,
            promising_branches: None,
        }
    }

    pub fn restore(
        children: Vec<Action>,
        regret_sum: Vec<f64>,
        strategy_sum: Vec<f64>,
        times_visited: u64,
        realization_count: u64,
        realization_sum: f64,
        promising_branches: Option<Vec<usize>>,
    ) -> Self {
        let len = children.len();
        Self {
            regret_sum,
            strategy: vec![0.0; len],
            strategy_sum,
            children,
            times_visited,
            realization_count,
            realization_sum,
            promising_branches,
        }
    }

    pub fn children(&self) -> &[Action] {
        &self.children
    }

    pub fn regret_sum(&self) -> &[f64] {
        &self.regret_sum
    }

    pub fn strategy_sum(&self) -> &[f64] {
        &self.strategy_sum
    }

    pub fn times_visited(&self) -> u64 {
        self.times_visited
    }

    pub fn realization_count(&self) -> u64 {
        self.realization_count
    }

    pub fn realization_sum(&self) -> f64 {
        self.realization_sum
    }

    pub fn promising_branches(&self) -> Option<&[usize]> {
        self.promising_branches.as_deref()
    }

    pub fn record_visit(&mut self) {
        self.times_visited += 1;
    }

    pub fn record_realization(&mut self, realization_weight: f64) {
        self.realization_count += 1;
        self.realization_sum += realization_weight;
    }

    /// Current strategy by regret matching: positive regrets normalized,
    /// uniform when no regret is positive. Accumulates the reach-weighted
    /// strategy into `strategy_sum` as a side effect.
    pub fn to_strategy(&mut self, realization_weight: f64) -> Vec<f64> {
        let normalizing_sum: f64 = self.regret_sum.iter().filter(|v| **v > 0.0).sum();
        let actions_len = self.strategy.len();
        if normalizing_sum == 0.0 {
            self.strategy = vec![1.0 / actions_len as f64; actions_len];
        } else {
            for (i, reg) in self.regret_sum.iter().enumerate() {
                self.strategy[i] = if *reg > 0.0 {
                    *reg / normalizing_sum
                } else {
                    0.0
                };
            }
        };

        for i in 0..actions_len {
            debug_assert_ge!(self.strategy[i], 0.0);
            self.strategy_sum[i] += realization_weight * self.strategy[i];
        }

        self.strategy.clone()
    }

    /// Average strategy over all iterations so far: normalized
    /// `strategy_sum` with entries below `floor` zeroed and the remainder
    /// renormalized. Zero denominators fall back to uniform.
    pub fn to_average_strategy(&self, floor: f64) -> Vec<f64> {
        let actions_len = self.strategy_sum.len();
        let normalizing_sum: f64 = self.strategy_sum.iter().sum();
        let mut avg: Vec<f64> = if normalizing_sum == 0.0 {
            vec![1.0 / actions_len as f64; actions_len]
        } else {
            self.strategy_sum.iter().map(|s| s / normalizing_sum).collect()
        };

        for p in avg.iter_mut() {
            if *p < floor {
                *p = 0.0;
            }
        }
        let kept_sum: f64 = avg.iter().sum();
        if kept_sum == 0.0 {
            return vec![1.0 / actions_len as f64; actions_len];
        }
        for p in avg.iter_mut() {
            *p /= kept_sum;
        }
        avg
    }

    pub fn add_regret(&mut self, action_index: usize, regret: f64, realization_weight: f64) {
        self.regret_sum[action_index] += realization_weight * regret;
    }

    /// Linear discount applied after the additive update; `t` is the
    /// training-progress counter threaded in by the caller.
    pub fn discount_regret(&mut self, action_index: usize, t: u64) {
        self.regret_sum[action_index] *= t as f64 / (t + 1) as f64;
    }

    /// Recomputes the promising set: indices whose accumulated regret is at
    /// or above `threshold`.
    pub fn reprune(&mut self, threshold: f64) {
        self.promising_branches =
            Some((0..self.regret_sum.len()).filter(|i| self.regret_sum[*i] >= threshold).collect());
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let avg = self.to_average_strategy(0.0);
        write!(f, "Avg Strategy[")?;
        for (i, act) in self.children.iter().enumerate() {
            write!(f, "{}: {:.03}, ", act, avg[i])?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::CLAIM_LADDER;

    fn test_node() -> Node {
        let children: Vec<Action> =
            CLAIM_LADDER[..3].iter().map(|c| Action::Claim(*c)).collect();
        Node::new(children)
    }

    #[test]
    fn test_strategy_is_uniform_without_positive_regret() {
        let mut node = test_node();
        let strategy = node.to_strategy(1.0);
        assert_eq!(vec![1.0 / 3.0; 3], strategy);
    }

    #[test]
    fn test_strategy_matches_positive_regret() {
        let mut node = test_node();
        node.add_regret(0, 3.0, 1.0);
        node.add_regret(1, 1.0, 1.0);
        node.add_regret(2, -5.0, 1.0);
        let strategy = node.to_strategy(1.0);
        assert_eq!(vec![0.75, 0.25, 0.0], strategy);
        assert!((strategy.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_strategy_sum_accumulates_realization_weight() {
        let mut node = test_node();
        node.to_strategy(0.5);
        node.to_strategy(0.25);
        let expected = 0.75 / 3.0;
        for s in node.strategy_sum() {
            assert!((s - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_average_strategy_floors_and_renormalizes() {
        let mut node = test_node();
        node.strategy_sum = vec![99.0, 0.5, 0.5];
        let avg = node.to_average_strategy(0.01);
        assert_eq!(0.0, avg[1]);
        assert_eq!(0.0, avg[2]);
        assert!((avg.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_average_strategy_uniform_when_untrained() {
        let node = test_node();
        assert_eq!(vec![1.0 / 3.0; 3], node.to_average_strategy(0.01));
    }

    #[test]
    fn test_discount_regret() {
        let mut node = test_node();
        node.add_regret(0, 4.0, 1.0);
        node.discount_regret(0, 1);
        assert_eq!(2.0, node.regret_sum()[0]);
        node.discount_regret(0, 3);
        assert_eq!(1.5, node.regret_sum()[0]);
    }

    #[test]
    fn test_reprune_keeps_high_regret_branches() {
        let mut node = test_node();
        node.add_regret(0, 5.0, 1.0);
        node.add_regret(1, -2.0, 1.0);
        node.reprune(0.0);
        assert_eq!(Some(&[0, 2][..]), node.promising_branches());
    }
}
