//! 学習済みモデルをモバイル推論形式に変換するツール

use anyhow::Result;
use clap::Parser;
use distracted_driver_lib::logging;
use distracted_driver_lib::ml::convert_model;
use distracted_driver_lib::model::{print_metadata_info, AppConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "convert_model", about = "学習済みモデルをモバイル推論形式に変換")]
struct Args {
    /// 学習済みモデル（省略時は設定の学習出力先）
    input: Option<PathBuf>,

    /// 変換後の出力先（省略時は設定の変換出力先）
    output: Option<PathBuf>,

    /// 半精度に変換せず f32 のまま保存
    #[arg(long)]
    full_precision: bool,

    /// 設定ファイルのパス
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();
    let config = AppConfig::load_from(args.config.as_deref())?;

    let input = args.input.unwrap_or(config.training.output_path);
    let output = args.output.unwrap_or_else(|| config.conversion.output_path.clone());

    let mut settings = config.conversion;
    if args.full_precision {
        settings.half_precision = false;
    }

    let (written, metadata) = convert_model(&input, &output, &settings)?;
    print_metadata_info(&metadata);
    println!("{}", metadata.description);
    println!("Saved to {}", written.display());

    Ok(())
}
