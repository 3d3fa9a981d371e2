pub mod eval;
pub mod game;
pub mod node;
pub mod store;
pub mod trainer;
pub mod tree;

pub use game::{
    Action,
    Claim,
    InfoSetKey,
};
pub use trainer::{
    Config,
    Trainer,
    Variant,
};
pub use tree::GameTree;
