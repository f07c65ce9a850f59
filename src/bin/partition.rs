//! 学習用画像を Training / Validation / Test に分割するツール
//!
//! 使い方:
//!   partition            # 全画像を分割
//!   partition sample     # カテゴリごとに少数のサンプルのみコピー

use anyhow::Result;
use clap::Parser;
use distracted_driver_lib::dataset::{partition, PartitionMode, RngDraws};
use distracted_driver_lib::logging;
use distracted_driver_lib::model::AppConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "partition", about = "学習用画像を Training / Validation / Test に分割")]
struct Args {
    /// "sample" でサンプルモード、それ以外（または省略）で全画像を分割
    mode: Option<String>,

    /// 設定ファイルのパス
    #[arg(long)]
    config: Option<PathBuf>,

    /// 元画像ディレクトリ（設定ファイルの値を上書き）
    #[arg(long)]
    source: Option<PathBuf>,

    /// 出力先ディレクトリ（設定ファイルの値を上書き）
    #[arg(long)]
    destination: Option<PathBuf>,

    /// コピー結果を書き出すCSVのパス
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// 乱数シード（省略時は実行ごとに異なる分割）
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let config = AppConfig::load_from(args.config.as_deref())?;
    let mut settings = config.partition;

    let mode = PartitionMode::from_arg(args.mode.as_deref());
    match (&args.mode, mode) {
        (None, _) => println!("No arguments are passed. Using default."),
        (Some(_), PartitionMode::Sample) => println!(
            "Use {} imgs per class as sample.",
            settings.sample_per_category
        ),
        (Some(_), PartitionMode::FullSplit) => {}
    }

    if let Some(source) = args.source {
        settings.source_dir = source;
    }
    if let Some(destination) = args.destination {
        match mode {
            PartitionMode::Sample => settings.sample_dir = destination,
            PartitionMode::FullSplit => settings.split_dir = destination,
        }
    }

    let destination_root = mode.destination_root(&settings);
    match mode {
        PartitionMode::Sample => println!(
            "Copy sample data from {} into {}",
            settings.source_dir.display(),
            destination_root.display()
        ),
        PartitionMode::FullSplit => println!(
            "Split data from {} into Training, Validation and Test data under {}",
            settings.source_dir.display(),
            destination_root.display()
        ),
    }

    let report = match args.seed {
        Some(seed) => partition(&settings, mode, &mut RngDraws::new(StdRng::seed_from_u64(seed)))?,
        None => partition(&settings, mode, &mut RngDraws::new(rand::thread_rng()))?,
    };

    report.print_summary();

    if let Some(manifest) = args.manifest {
        report.write_manifest(&manifest)?;
        println!("Manifest written to {}", manifest.display());
    }

    Ok(())
}
