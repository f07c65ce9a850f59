//! 運転者行動分類モデルの学習ツール

use anyhow::Result;
use clap::Parser;
use distracted_driver_lib::logging;
use distracted_driver_lib::ml::{train_model, TrainingRun};
use distracted_driver_lib::model::{AppConfig, DeviceType};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "train", about = "運転者行動分類CNNを学習（Burn + WGPU）")]
struct Args {
    /// 設定ファイルのパス
    #[arg(long)]
    config: Option<PathBuf>,

    /// ラベル付き学習画像ディレクトリ（カテゴリごとのサブディレクトリ）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 学習済みモデルの出力先
    #[arg(long)]
    output: Option<PathBuf>,

    /// エポック数
    #[arg(long)]
    epochs: Option<usize>,

    /// バッチサイズ
    #[arg(long)]
    batch_size: Option<usize>,

    /// CPUデバイスで学習
    #[arg(long)]
    cpu: bool,
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let mut config = AppConfig::load_from(args.config.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        config.training.data_dir = data_dir;
    }
    if let Some(output) = args.output {
        config.training.output_path = output;
    }
    if let Some(epochs) = args.epochs {
        config.training.num_epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    if args.cpu {
        config.device_type = DeviceType::Cpu;
    }
    config.validate()?;
    config.display();

    let outcome = train_model(TrainingRun::from_config(&config))?;

    println!(
        "学習完了: {} に保存しました ({} クラス)",
        outcome.model_path.display(),
        outcome.class_labels.len()
    );

    Ok(())
}
