use std::{env, io};

use anyhow::Context;
use env_logger::Env;
use log::info;

use keypoint_classifier::{
    Config, ModelChoice,
    menu::{self, MODEL_ENV},
    pipeline,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;

    let choice: ModelChoice = match env::var(MODEL_ENV) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("invalid {MODEL_ENV} value"))?,
        Err(_) => menu::prompt(&mut io::stdin().lock(), &mut io::stdout())?,
    };

    let outcome = pipeline::run(&config, choice, &mut io::stdout().lock())?;
    info!(
        "{} model finished with a test accuracy of {:.4}",
        outcome.choice, outcome.accuracy
    );

    Ok(())
}
