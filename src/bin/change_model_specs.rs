//! 変換済みモデルの画像入力に受け付け可能なサイズを追加するツール

use anyhow::Result;
use clap::Parser;
use distracted_driver_lib::logging;
use distracted_driver_lib::model::{
    add_enumerated_image_sizes, load_model_with_metadata, save_model_with_metadata,
    with_bundle_suffix, AppConfig, ImageSize,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "change_model_specs", about = "モデルの画像入力に受け付け可能なサイズを追加")]
struct Args {
    /// 対象のモデルバンドル（省略時は設定の変換出力先）
    input: Option<PathBuf>,

    /// 出力先（省略時は入力名 + "_spec"）
    #[arg(long)]
    output: Option<PathBuf>,

    /// 対象の入力フィーチャ名（省略時は設定の input_name）
    #[arg(long)]
    feature: Option<String>,

    /// 追加するサイズ（高さx幅、複数指定可）
    #[arg(long = "size", default_value = "480x640")]
    sizes: Vec<ImageSize>,

    /// 設定ファイルのパス
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();
    let config = AppConfig::load_from(args.config.as_deref())?;

    let input = args.input.unwrap_or(config.conversion.output_path);
    let output = args
        .output
        .unwrap_or_else(|| with_bundle_suffix(&input, "_spec"));
    let feature = args.feature.unwrap_or(config.conversion.input_name);

    let (mut metadata, model_binary) = load_model_with_metadata(&input)?;

    println!("Description before adding new sizes");
    println!("{}", metadata.description);

    let added = add_enumerated_image_sizes(&mut metadata.description, &feature, &args.sizes)?;
    info!("{} 個のサイズを '{}' に追加しました", added, feature);

    println!("Description after adding new sizes");
    println!("{}", metadata.description);

    let written = save_model_with_metadata(&output, &metadata, &model_binary)?;
    info!("保存しました: {}", written.display());

    Ok(())
}
