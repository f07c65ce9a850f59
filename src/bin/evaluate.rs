//! ラベル付きディレクトリに対するモデルの分類精度を評価するツール

use anyhow::Result;
use burn::backend::Wgpu;
use burn_wgpu::WgpuDevice;
use clap::Parser;
use distracted_driver_lib::dataset::Split;
use distracted_driver_lib::logging;
use distracted_driver_lib::ml::{evaluate_directory, InferenceEngine};
use distracted_driver_lib::model::{print_metadata_info, AppConfig, DeviceType};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "evaluate", about = "ラベル付き画像ディレクトリでモデルを評価")]
struct Args {
    /// 評価するモデルバンドル（省略時は設定の学習出力先）
    model: Option<PathBuf>,

    /// 評価用ディレクトリ（省略時は <split_dir>/TestData）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// カテゴリごとに10枚のみ評価し、個々の予測を表示
    #[arg(long)]
    sample: bool,

    /// 設定ファイルのパス
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();
    let config = AppConfig::load_from(args.config.as_deref())?;

    let model_path = args.model.unwrap_or(config.training.output_path);
    let data_dir = args
        .data_dir
        .unwrap_or_else(|| config.partition.split_dir.join(Split::Test.dir_name()));

    let device = match config.device_type {
        DeviceType::Wgpu => WgpuDevice::default(),
        DeviceType::Cpu => WgpuDevice::Cpu,
    };
    let engine = InferenceEngine::<Wgpu>::load(&model_path, device)?;
    print_metadata_info(engine.metadata());

    let limit = args.sample.then_some(config.partition.sample_per_category);
    let tally = evaluate_directory(&engine, &data_dir, limit)?;
    tally.print_report();

    Ok(())
}
