use std::fmt::Display;
use std::str::FromStr;

use anyhow::{
    bail,
    ensure,
};

/// Strength assigned to the challenge action; one past the strongest claim.
pub const DUDO_STRENGTH: i32 = 12;

/// Every claim of the one-die-each game, in increasing strength order.
/// Claims on rank 1 outrank every other claim of the same count.
pub const CLAIM_LADDER: [Claim; 12] = [
    Claim { count: 1, rank: 2 },
    Claim { count: 1, rank: 3 },
    Claim { count: 1, rank: 4 },
    Claim { count: 1, rank: 5 },
    Claim { count: 1, rank: 6 },
    Claim { count: 1, rank: 1 },
    Claim { count: 2, rank: 2 },
    Claim { count: 2, rank: 3 },
    Claim { count: 2, rank: 4 },
    Claim { count: 2, rank: 5 },
    Claim { count: 2, rank: 6 },
    Claim { count: 2, rank: 1 },
];

/// "At least `count` dice among both players show `rank`", with rank-1 wild.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Claim {
    pub count: i32,
    pub rank: i32,
}

impl Claim {
    /// Maps the claim ladder onto 0..=11.
    pub fn strength(&self) -> i32 {
        if self.rank != 1 {
            6 * self.count + self.rank - 8
        } else {
            6 * self.count - 1
        }
    }
}

impl PartialOrd for Claim {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Claim {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.strength().cmp(&other.strength())
    }
}

impl Display for Claim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}*{}", self.count, self.rank)
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
    Claim(Claim),
    Dudo,
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Claim(c) => write!(f, "{}", c),
            Action::Dudo => write!(f, "d"),
        }
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "d" {
            return Ok(Action::Dudo);
        }
        let Some((count, rank)) = s.split_once('*') else {
            bail!("malformed action token: {:?}", s);
        };
        let claim = Claim {
            count: count.parse()?,
            rank: rank.parse()?,
        };
        ensure!(
            CLAIM_LADDER.contains(&claim),
            "claim out of range: {:?}",
            s
        );
        Ok(Action::Claim(claim))
    }
}

/// An information set: the acting player's own rolled face followed by the
/// public claim history, optionally terminated by the challenge token.
///
/// The leading roll is rewritten to the player about to act at every step,
/// so the key never encodes the opponent's private die.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct InfoSetKey {
    roll: u8,
    history: Vec<Action>,
}

impl InfoSetKey {
    pub fn root(roll: u8) -> Self {
        Self {
            roll,
            history: vec![],
        }
    }

    pub fn roll(&self) -> u8 {
        self.roll
    }

    pub fn history(&self) -> &[Action] {
        &self.history
    }

    /// Index of the player to act; player 0 opens every round.
    pub fn acting_player(&self) -> usize {
        self.history.len() % 2
    }

    pub fn is_terminal(&self) -> bool {
        self.history.last() == Some(&Action::Dudo)
    }

    /// Child key with the same leading roll; used while building the tree.
    pub fn push(&self, action: Action) -> Self {
        let mut history = self.history.clone();
        history.push(action);
        Self {
            roll: self.roll,
            history,
        }
    }

    /// Child key as seen by the next actor: leading roll rewritten to
    /// `roll`, `action` appended to the history.
    pub fn advance(&self, roll: u8, action: Action) -> Self {
        let mut next = self.push(action);
        next.roll = roll;
        next
    }

    pub fn with_roll(&self, roll: u8) -> Self {
        Self {
            roll,
            history: self.history.clone(),
        }
    }

    /// Strength of the most recent play: -1 at the root, 12 once
    /// challenged, otherwise the trailing claim's strength.
    pub fn strength(&self) -> i32 {
        match self.history.last() {
            None => -1,
            Some(Action::Dudo) => DUDO_STRENGTH,
            Some(Action::Claim(c)) => c.strength(),
        }
    }

    /// Every strictly stronger claim in increasing strength order, then the
    /// challenge token. The root excludes the challenge (an opening claim
    /// is mandatory); a challenged key has no legal actions.
    pub fn legal_actions(&self) -> Vec<Action> {
        let strength = self.strength();
        if strength == DUDO_STRENGTH {
            return vec![];
        }
        let mut v: Vec<Action> = CLAIM_LADDER
            .iter()
            .filter(|c| c.strength() > strength)
            .map(|c| Action::Claim(*c))
            .collect();
        if !self.history.is_empty() {
            v.push(Action::Dudo);
        }
        v
    }
}

impl Display for InfoSetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.roll)?;
        for act in self.history.iter() {
            write!(f, " {}", act)?;
        }
        Ok(())
    }
}

impl FromStr for InfoSetKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split_whitespace();
        let Some(roll) = tokens.next() else {
            bail!("empty info set key");
        };
        let roll: u8 = roll.parse()?;
        ensure!((1..=6).contains(&roll), "rolled face out of range: {}", roll);
        let history = tokens.map(Action::from_str).collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            roll,
            history,
        })
    }
}

/// Occurrences of each rank among the rolled faces; a rolled 1 is wild and
/// counts toward every rank.
pub fn rank_count(rolled: &[u8]) -> [i32; 6] {
    let mut counts = [0; 6];
    for &face in rolled {
        if face == 1 {
            for c in counts.iter_mut() {
                *c += 1;
            }
        } else {
            counts[face as usize - 1] += 1;
        }
    }
    counts
}

/// Payoff of a challenged information set: +1.0 if the challenged claim
/// holds against the actual faces, -1.0 otherwise. The caller negates the
/// value when stepping back up a ply.
pub fn payoff(key: &InfoSetKey, rolled: [u8; 2]) -> anyhow::Result<f64> {
    ensure!(key.is_terminal(), "payoff requested for unchallenged info set: {}", key);
    let history = key.history();
    ensure!(history.len() >= 2, "challenge follows no claim: {}", key);
    let claim = match history[history.len() - 2] {
        Action::Claim(c) => c,
        Action::Dudo => bail!("challenge follows no claim: {}", key),
    };
    let actual = rank_count(&rolled);
    if actual[claim.rank as usize - 1] >= claim.count {
        Ok(1.0)
    } else {
        Ok(-1.0)
    }
}
