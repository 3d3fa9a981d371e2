use anyhow::Result;

use crate::{
    game::{
        payoff,
        InfoSetKey,
    },
    tree::GameTree,
};

/// Expected game value of the tree's average strategy, enumerated over all
/// 36 equally likely roll combinations. Read-only; used to watch
/// convergence, never to update an accumulator.
pub fn game_value(tree: &GameTree, average_strategy_floor: f64) -> Result<f64> {
    let mut total = 0.0;
    for first in 1..=6 {
        for second in 1..=6 {
            let rolled = [first, second];
            total += value_recursive(
                tree,
                rolled,
                &InfoSetKey::root(first),
                average_strategy_floor,
            )?;
        }
    }
    Ok(total / 36.0)
}

fn value_recursive(
    tree: &GameTree,
    rolled: [u8; 2],
    key: &InfoSetKey,
    floor: f64,
) -> Result<f64> {
    if key.is_terminal() {
        return payoff(key, rolled);
    }

    let (strategy, children) = {
        let node = tree.node(key)?.lock().unwrap();
        (node.to_average_strategy(floor), node.children().to_vec())
    };

    let other = 1 - key.acting_player();
    let mut value = 0.0;
    for (i, act) in children.iter().enumerate() {
        let next = key.advance(rolled[other], *act);
        value += -value_recursive(tree, rolled, &next, floor)? * strategy[i];
    }
    Ok(value)
}
