use std::env;

use anyhow::{Context, Result};
use log::info;

use wgan::{
    Trainer,
    artifacts::FsSink,
    config,
    data::{DataLoader, mnist},
};

const DEFAULT_RUN_FILE: &str = "params.json";

fn main() -> Result<()> {
    env_logger::init();

    let run_file = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_RUN_FILE.to_string());

    let runs = config::load_runs(&run_file).with_context(|| format!("loading runs from {run_file}"))?;
    info!(runs = runs.len(); "loaded {run_file}");

    for config in runs {
        info!("training {} with epochs: {}, dataset: {}", config.name, config.epochs, config.dataset);
        info!("{config:#?}");

        let dataset = mnist::load(&config.data_dir, &config.dataset, config.output_range)
            .with_context(|| format!("loading dataset {}", config.dataset))?;
        let data = DataLoader::new(dataset, config.batch_size, true);
        let sink = FsSink::from_config(&config);
        let resume = config.resume.clone();

        let mut trainer = Trainer::new(config, data, sink)?;
        if let Some(path) = resume {
            trainer
                .resume_from(&path)
                .with_context(|| format!("resuming from {}", path.display()))?;
        }

        let summary = trainer.run()?;
        info!(
            steps = summary.steps,
            checkpoints = summary.checkpoints.len();
            "loss curve at {}", summary.loss_curve.display()
        );
    }

    Ok(())
}
