use std::path::PathBuf;

use anyhow::Result;
use clap::{
    Parser,
    ValueHint,
};
use log::info;

use dudo::{
    store,
    Config,
    Trainer,
    Variant,
};

#[derive(Parser)]
struct AppArgs {
    #[clap(long, short, value_enum, default_value_t = Variant::Vanilla)]
    variant: Variant,

    #[clap(long, short, value_parser, default_value_t = 1_000_000)]
    iterations: usize,

    /// Continue training from a previously saved tree.
    #[clap(long, value_parser, value_hint(ValueHint::FilePath))]
    load_path: Option<PathBuf>,

    #[clap(long, value_parser, value_hint(ValueHint::FilePath))]
    save_path: Option<PathBuf>,

    #[clap(long, value_parser)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    // Initialize env_logger with a default log level of INFO.
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = AppArgs::parse();
    let config = Config::default();

    let mut trainer = match &args.load_path {
        Some(path) => {
            let tree = store::load_tree(path)?;
            info!("continuing from {:?} ({} info sets)", path, tree.len());
            Trainer::with_tree(tree, args.variant, config, args.seed)
        }
        None => Trainer::new(args.variant, config, args.seed),
    };

    trainer.train(args.iterations)?;
    info!("theoretical game value: {}", trainer.game_value()?);

    if let Some(path) = &args.save_path {
        store::save_tree(trainer.tree(), path)?;
        info!("saved trained tree to {:?}", path);
    }
    Ok(())
}
