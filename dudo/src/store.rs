use std::{
    collections::HashMap,
    fs::File,
    io::{
        BufReader,
        BufWriter,
        Write,
    },
    path::Path,
    sync::Mutex,
};

use anyhow::{
    ensure,
    Context,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    game::{
        Action,
        InfoSetKey,
    },
    node::Node,
    tree::GameTree,
};

pub const SCHEMA_VERSION: u32 = 1;

/// On-disk form of a trained tree. Keys and action labels use their
/// textual rendering so the format stays readable and portable across
/// schema revisions.
#[derive(Debug, Serialize, Deserialize)]
pub struct TreeFile {
    pub version: u32,
    pub nodes: Vec<NodeRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    pub key: String,
    pub children: Vec<String>,
    pub regret_sum: Vec<f64>,
    pub strategy_sum: Vec<f64>,
    pub times_visited: u64,
    pub realization_count: u64,
    pub realization_sum: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promising_branches: Option<Vec<usize>>,
}

impl TreeFile {
    pub fn from_tree(tree: &GameTree) -> Self {
        let mut nodes: Vec<NodeRecord> = tree
            .iter()
            .map(|(key, node)| {
                let node = node.lock().unwrap();
                NodeRecord {
                    key: key.to_string(),
                    children: node.children().iter().map(|a| a.to_string()).collect(),
                    regret_sum: node.regret_sum().to_vec(),
                    strategy_sum: node.strategy_sum().to_vec(),
                    times_visited: node.times_visited(),
                    realization_count: node.realization_count(),
                    realization_sum: node.realization_sum(),
                    promising_branches: node.promising_branches().map(|p| p.to_vec()),
                }
            })
            .collect();
        // Deterministic output regardless of map iteration order.
        nodes.sort_by(|a, b| a.key.cmp(&b.key));
        Self {
            version: SCHEMA_VERSION,
            nodes,
        }
    }

    /// Rebuilds the in-memory tree, failing fast on any structural
    /// inconsistency before training can touch it.
    pub fn into_tree(self) -> Result<GameTree> {
        ensure!(
            self.version == SCHEMA_VERSION,
            "unsupported tree schema version: {} (expected {})",
            self.version,
            SCHEMA_VERSION
        );
        let mut nodes = HashMap::new();
        for record in self.nodes {
            let key: InfoSetKey = record
                .key
                .parse()
                .with_context(|| format!("bad info set key: {:?}", record.key))?;
            let children = record
                .children
                .iter()
                .map(|s| s.parse::<Action>())
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("bad action label under key {}", key))?;
            ensure!(
                record.regret_sum.len() == children.len()
                    && record.strategy_sum.len() == children.len(),
                "array length mismatch at {}",
                key
            );
            let node = Node::restore(
                children,
                record.regret_sum,
                record.strategy_sum,
                record.times_visited,
                record.realization_count,
                record.realization_sum,
                record.promising_branches,
            );
            let prev = nodes.insert(key, Mutex::new(node));
            ensure!(prev.is_none(), "duplicate info set key: {:?}", record.key);
        }
        GameTree::from_nodes(nodes)
    }
}

pub fn save_tree(tree: &GameTree, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create tree file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &TreeFile::from_tree(tree))
        .with_context(|| format!("failed to serialize tree to {:?}", path))?;
    // Dropping a BufWriter swallows flush errors; surface them instead.
    writer.flush().with_context(|| format!("failed to flush tree file: {:?}", path))?;
    Ok(())
}

pub fn load_tree(path: &Path) -> Result<GameTree> {
    let file =
        File::open(path).with_context(|| format!("failed to open tree file: {:?}", path))?;
    let tree_file: TreeFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse tree file: {:?}", path))?;
    tree_file.into_tree()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_shape_and_accumulators() {
        let tree = GameTree::build();
        let key: InfoSetKey = "3 1*2".parse().unwrap();
        {
            let mut node = tree.node(&key).unwrap().lock().unwrap();
            node.add_regret(0, 2.5, 0.5);
            node.record_visit();
            node.to_strategy(1.0);
        }

        let restored = TreeFile::from_tree(&tree).into_tree().unwrap();
        assert_eq!(tree.len(), restored.len());
        let node = restored.node(&key).unwrap().lock().unwrap();
        assert_eq!(1.25, node.regret_sum()[0]);
        assert_eq!(1, node.times_visited());
        assert!((node.strategy_sum().iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip_preserves_promising_branches() {
        let mut tree = GameTree::build();
        tree.prune(0.0);
        let restored = TreeFile::from_tree(&tree).into_tree().unwrap();
        let key: InfoSetKey = "1 1*2".parse().unwrap();
        let node = restored.node(&key).unwrap().lock().unwrap();
        assert_eq!(node.children().len(), node.promising_branches().unwrap().len());
    }

    #[test]
    fn test_rejects_unknown_schema_version() {
        let mut file = TreeFile::from_tree(&GameTree::build());
        file.version = 99;
        assert!(file.into_tree().is_err());
    }

    #[test]
    fn test_rejects_array_length_mismatch() {
        let mut file = TreeFile::from_tree(&GameTree::build());
        let record = file.nodes.iter_mut().find(|r| !r.regret_sum.is_empty()).unwrap();
        record.regret_sum.pop();
        assert!(file.into_tree().is_err());
    }

    #[test]
    fn test_rejects_missing_roll_variant() {
        let mut file = TreeFile::from_tree(&GameTree::build());
        let index = file.nodes.iter().position(|r| r.key == "5 2*1 d").unwrap();
        file.nodes.swap_remove(index);
        assert!(file.into_tree().is_err());
    }

    #[test]
    fn test_rejects_missing_child_key_family() {
        let mut file = TreeFile::from_tree(&GameTree::build());
        // Drop all six roll variants of one challenged key; the parents
        // still list the challenge among their children.
        let family: Vec<String> = (1..=6).map(|roll| format!("{} 2*1 d", roll)).collect();
        file.nodes.retain(|r| !family.contains(&r.key));
        assert!(file.into_tree().is_err());
    }

    #[test]
    fn test_rejects_missing_opening_roll_keys() {
        let mut file = TreeFile::from_tree(&GameTree::build());
        file.nodes.retain(|r| r.key.len() != 1);
        assert!(file.into_tree().is_err());
    }

    #[test]
    fn test_rejects_malformed_key() {
        let mut file = TreeFile::from_tree(&GameTree::build());
        file.nodes[0].key = "7 1*2".to_string();
        assert!(file.into_tree().is_err());
    }

    #[test]
    fn test_save_and_load_file_round_trip() {
        let tree = GameTree::build();
        let path = std::env::temp_dir().join("dudo-tree-round-trip.json");
        save_tree(&tree, &path).unwrap();
        let restored = load_tree(&path).unwrap();
        assert_eq!(tree.len(), restored.len());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_json_round_trip() {
        let tree = GameTree::build();
        let json = serde_json::to_string(&TreeFile::from_tree(&tree)).unwrap();
        let parsed: TreeFile = serde_json::from_str(&json).unwrap();
        assert_eq!(tree.len(), parsed.into_tree().unwrap().len());
    }
}
