use std::{fs, path::PathBuf};

use wgan::{
    Trainer,
    artifacts::{Checkpoint, FsSink, LossReport},
    config::{NetworkConfig, OutputRange, TrainingConfig},
    data::{DataLoader, mnist},
};

const IMAGES: u32 = 16;
const SIDE: u32 = 4;

fn temp_root(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wgan-e2e-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

/// Writes a tiny IDX3 dataset of `IMAGES` gradient-ish images.
fn write_idx(data_dir: &PathBuf, dataset: &str) {
    let mut bytes = Vec::new();
    for field in [0x0000_0803, IMAGES, SIDE, SIDE] {
        bytes.extend(u32::to_be_bytes(field));
    }
    for i in 0..IMAGES * SIDE * SIDE {
        bytes.push(((i * 37) % 256) as u8);
    }

    let dir = data_dir.join(dataset);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(mnist::TRAIN_IMAGES), bytes).unwrap();
}

fn config(root: &PathBuf) -> TrainingConfig {
    TrainingConfig {
        epochs: 1,
        batch_size: 4,
        z_dim: 8,
        critic_update_ratio: 2,
        print_every: 2,
        val_block_size: 2,
        seed: Some(2024),
        data_dir: root.join("data_set"),
        assets_dir: Some(root.join("assets")),
        ckpt_dir: Some(root.join("checkpoints")),
        network: NetworkConfig {
            generator_hidden: vec![16],
            critic_hidden: vec![16],
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn one_epoch_over_four_batches() {
    let root = temp_root("four-batches");
    let config = config(&root);
    write_idx(&config.data_dir, &config.dataset);

    let dataset = mnist::load(&config.data_dir, &config.dataset, OutputRange::Tanh).unwrap();
    let data = DataLoader::new(dataset, config.batch_size, true);
    let sink = FsSink::from_config(&config);

    let summary = Trainer::new(config, data, sink).unwrap().run().unwrap();

    assert_eq!(summary.steps, 4);
    assert_eq!(summary.critic_updates, 4);
    assert_eq!(summary.generator_updates, 2);
    assert_eq!(summary.history.len(), 2);

    let ckpt_path = root.join("checkpoints/wgan-e001.ckpt");
    let grid_path = root.join("assets/digits-e001.png");
    assert_eq!(summary.checkpoints, [ckpt_path.clone()]);
    assert_eq!(summary.grids, [grid_path.clone()]);
    assert_eq!(fs::read_dir(root.join("checkpoints")).unwrap().count(), 1);

    let grid = image::open(&grid_path).unwrap().to_luma8();
    assert_eq!(grid.dimensions(), (2 * SIDE, 2 * SIDE));

    let ckpt = Checkpoint::load(&ckpt_path).unwrap();
    assert_eq!(ckpt.step, 4);
    assert_eq!(ckpt.epoch, 1);
    assert!(!ckpt.generator.is_empty());

    assert!(root.join("assets/digits-losses.png").exists());
    let report: LossReport =
        serde_json::from_str(&fs::read_to_string(root.join("assets/digits-losses.json")).unwrap())
            .unwrap();
    assert_eq!(report.steps, 4);
    assert_eq!(report.history, summary.history);
    assert!(report.elapsed_secs >= 0.);

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn checkpoints_follow_the_save_cadence() {
    let root = temp_root("cadence");
    let config = TrainingConfig {
        epochs: 5,
        save_every: 2,
        ..config(&root)
    };
    write_idx(&config.data_dir, &config.dataset);

    let dataset = mnist::load(&config.data_dir, &config.dataset, OutputRange::Tanh).unwrap();
    let data = DataLoader::new(dataset, config.batch_size, true);
    let sink = FsSink::from_config(&config);

    let summary = Trainer::new(config, data, sink).unwrap().run().unwrap();

    // 0-based epochs 0, 2 and 4 are saved as 1-based 1, 3 and 5
    let names: Vec<String> = summary
        .checkpoints
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["wgan-e001.ckpt", "wgan-e003.ckpt", "wgan-e005.ckpt"]);
    assert_eq!(summary.grids.len(), 3);
    assert_eq!(summary.steps, 20);
    assert_eq!(summary.generator_updates, 10);

    fs::remove_dir_all(root).unwrap();
}

#[test]
fn missing_dataset_fails_before_training() {
    let root = temp_root("missing");
    let config = config(&root);

    assert!(mnist::load(&config.data_dir, &config.dataset, OutputRange::Tanh).is_err());
}
