use std::{
    collections::HashMap,
    sync::Mutex,
};

use anyhow::{
    ensure,
    Context,
    Result,
};

use crate::{
    game::InfoSetKey,
    node::Node,
};

/// The complete information-set tree of the one-die-each game: one node for
/// every reachable key from each of the 6 opening rolls. Built once; only
/// the accumulators inside the nodes mutate afterwards.
///
/// Nodes sit behind per-node mutexes so the parallel traversal can share
/// the tree across workers; sibling subtrees never alias the same key, so
/// the locks are uncontended in practice.
pub struct GameTree {
    nodes: HashMap<InfoSetKey, Mutex<Node>>,
}

impl GameTree {
    /// Exhaustively enumerates every reachable information set by repeated
    /// application of the legal-action function until the challenge token
    /// terminates each path.
    pub fn build() -> Self {
        let mut nodes = HashMap::new();
        for roll in 1..=6 {
            Self::expand(&mut nodes, InfoSetKey::root(roll));
        }
        Self {
            nodes,
        }
    }

    fn expand(nodes: &mut HashMap<InfoSetKey, Mutex<Node>>, key: InfoSetKey) {
        let children = key.legal_actions();
        for act in children.iter() {
            Self::expand(nodes, key.push(*act));
        }
        nodes.insert(key, Mutex::new(Node::new(children)));
    }

    /// Rebuilds a tree from deserialized nodes, failing fast on structural
    /// inconsistencies instead of letting them corrupt training silently.
    pub fn from_nodes(nodes: HashMap<InfoSetKey, Mutex<Node>>) -> Result<Self> {
        let tree = Self {
            nodes,
        };
        tree.validate()?;
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, key: &InfoSetKey) -> Option<&Mutex<Node>> {
        self.nodes.get(key)
    }

    pub fn node(&self, key: &InfoSetKey) -> Result<&Mutex<Node>> {
        self.nodes.get(key).with_context(|| format!("info set missing from tree: {}", key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InfoSetKey, &Mutex<Node>)> {
        self.nodes.iter()
    }

    /// Recomputes every node's promising-branch set against `threshold`.
    pub fn prune(&mut self, threshold: f64) {
        for node in self.nodes.values_mut() {
            node.get_mut().unwrap().reprune(threshold);
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.nodes.is_empty(), "tree has no nodes");
        for roll in 1..=6 {
            ensure!(
                self.nodes.contains_key(&InfoSetKey::root(roll)),
                "missing opening-roll key: {}",
                roll
            );
        }
        for (key, node) in self.nodes.iter() {
            let node = node.lock().unwrap();
            ensure!(
                node.children() == key.legal_actions(),
                "children of {} diverge from the legal actions",
                key
            );
            ensure!(
                node.regret_sum().len() == node.children().len()
                    && node.strategy_sum().len() == node.children().len(),
                "accumulator arrays of {} do not match its action count",
                key
            );
            if let Some(promising) = node.promising_branches() {
                ensure!(
                    promising.iter().all(|i| *i < node.children().len()),
                    "promising branch index out of range at {}",
                    key
                );
            }
            // Every key reachable through `children` must resolve.
            for act in node.children() {
                ensure!(
                    self.nodes.contains_key(&key.push(*act)),
                    "child {} of {} missing from tree",
                    act,
                    key
                );
            }
            // The traversal rewrites the leading roll to either player's
            // face, so every roll variant of every key must resolve.
            for roll in 1..=6 {
                ensure!(
                    self.nodes.contains_key(&key.with_roll(roll)),
                    "missing roll variant {} of {}",
                    roll,
                    key
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Action;

    #[test]
    fn test_build_enumerates_every_information_set() {
        let tree = GameTree::build();
        // Per opening roll: one key per subset of the 12-claim ladder
        // (2^12, including the root) plus a challenged variant of each
        // non-empty subset (2^12 - 1).
        assert_eq!(6 * (4096 + 4095), tree.len() as i32);
    }

    #[test]
    fn test_root_children_exclude_challenge() {
        let tree = GameTree::build();
        for roll in 1..=6 {
            let node = tree.node(&InfoSetKey::root(roll)).unwrap().lock().unwrap();
            assert_eq!(12, node.children().len());
            assert!(!node.children().contains(&Action::Dudo));
        }
    }

    #[test]
    fn test_nodes_satisfy_length_invariant() {
        let tree = GameTree::build();
        for (key, node) in tree.iter() {
            let node = node.lock().unwrap();
            assert_eq!(key.legal_actions(), node.children());
            assert_eq!(node.children().len(), node.regret_sum().len());
            assert_eq!(node.children().len(), node.strategy_sum().len());
        }
    }

    #[test]
    fn test_terminal_nodes_carry_no_arrays() {
        let tree = GameTree::build();
        let key: InfoSetKey = "4 2*1 d".parse().unwrap();
        let node = tree.node(&key).unwrap().lock().unwrap();
        assert!(node.children().is_empty());
        assert!(node.regret_sum().is_empty());
    }

    #[test]
    fn test_prune_marks_every_branch_promising_on_fresh_tree() {
        let mut tree = GameTree::build();
        tree.prune(0.0);
        for (_, node) in tree.iter() {
            let node = node.lock().unwrap();
            let promising = node.promising_branches().unwrap();
            assert_eq!((0..node.children().len()).collect::<Vec<_>>(), promising);
        }
    }

    #[test]
    fn test_fresh_tree_passes_validation() {
        let tree = GameTree::build();
        assert!(tree.validate().is_ok());
    }
}
