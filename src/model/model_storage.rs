//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（クラスラベル、入力サイズ、入出力記述など）
//! - model.bin       - モデルの重み（バイナリ）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// 保存先のパスを `.tar.gz` に正規化
pub fn bundle_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

/// バンドル名の末尾（`.tar.gz` の前）に `suffix` を付けたパス
///
/// `Model/a.mobile.tar.gz` + `_spec` -> `Model/a.mobile_spec.tar.gz`
pub fn with_bundle_suffix(bundle: &Path, suffix: &str) -> PathBuf {
    let name = bundle
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".tar.gz")
        .or_else(|| name.strip_suffix(".gz"))
        .unwrap_or(&name);
    bundle.with_file_name(format!("{}{}.tar.gz", stem, suffix))
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 実際に書き込んだパスを返します。
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = bundle_path(output_path);

    // 親ディレクトリが存在しない場合は作成
    if let Some(parent) = tar_gz_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
        }
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

    let encoder = tar_builder
        .into_inner()
        .context("Failed to finalize tar.gz archive")?;
    encoder.finish().context("Failed to finish gzip stream")?;

    Ok(tar_gz_path)
}

fn append_entry<W: std::io::Write>(
    builder: &mut Builder<W>,
    name: &str,
    data: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .with_context(|| format!("Failed to add {} to tar", name))
}

fn open_archive(tar_gz_path: &Path) -> Result<Archive<GzDecoder<File>>> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;
    Ok(Archive::new(GzDecoder::new(tar_gz_file)))
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let mut archive = open_archive(tar_gz_path)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_str() == Some(METADATA_ENTRY) {
            let mut json_str = String::new();
            entry.read_to_string(&mut json_str)?;
            return ModelMetadata::from_json_string(&json_str);
        }
    }

    Err(anyhow::anyhow!("metadata.json not found in tar.gz archive"))
}

/// Tar.gzからモデルバイナリを読み込む
pub fn load_model_binary(tar_gz_path: &Path) -> Result<Vec<u8>> {
    let mut archive = open_archive(tar_gz_path)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_str() == Some(MODEL_ENTRY) {
            let mut buffer = Vec::new();
            entry.read_to_end(&mut buffer)?;
            return Ok(buffer);
        }
    }

    Err(anyhow::anyhow!("model.bin not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let mut archive = open_archive(tar_gz_path)?;

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().to_string();

        match path.as_str() {
            METADATA_ENTRY => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
            }
            MODEL_ENTRY => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    match (metadata_opt, model_binary_opt) {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(anyhow::anyhow!("metadata.json not found in tar.gz archive")),
        (_, None) => Err(anyhow::anyhow!("model.bin not found in tar.gz archive")),
    }
}

/// メタデータをコンソールに表示
pub fn print_metadata_info(metadata: &ModelMetadata) {
    println!("\n=== モデルメタデータ ===");
    println!("クラスラベル: {}", metadata.class_labels.join(", "));
    println!("入力サイズ: {}x{}", metadata.image_width, metadata.image_height);
    println!("全結合層ユニット数: {}", metadata.fc_units);
    println!("重みの精度: {}", metadata.precision);
    println!("学習エポック数: {}", metadata.num_epochs);
    if let Some(scores) = &metadata.scores {
        println!("検証 Loss: {:.4} Accuracy: {:.4}", scores.loss, scores.accuracy);
    }
    println!("学習日時: {}", metadata.trained_at);
    if let Some(converted_at) = &metadata.converted_at {
        println!("変換日時: {}", converted_at);
    }
    println!("========================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mobile_spec::{DescriptionMetadata, ModelDescription};

    fn sample_metadata() -> ModelMetadata {
        let labels = vec!["c0".to_string(), "c1".to_string()];
        let description = ModelDescription::image_classifier(
            "input",
            "softmax",
            64,
            48,
            &labels,
            DescriptionMetadata::default(),
        );
        ModelMetadata::new(labels, 64, 48, 16, 1, description)
    }

    #[test]
    fn test_bundle_path_extension() {
        assert_eq!(bundle_path(Path::new("m/model.tar.gz")), PathBuf::from("m/model.tar.gz"));
        assert_eq!(bundle_path(Path::new("m/model")), PathBuf::from("m/model.tar.gz"));
        assert_eq!(bundle_path(Path::new("m/model.bin")), PathBuf::from("m/model.tar.gz"));
    }

    #[test]
    fn test_with_bundle_suffix() {
        assert_eq!(
            with_bundle_suffix(Path::new("Model/a.mobile.tar.gz"), "_spec"),
            PathBuf::from("Model/a.mobile_spec.tar.gz")
        );
        assert_eq!(
            with_bundle_suffix(Path::new("model"), "_spec"),
            PathBuf::from("model_spec.tar.gz")
        );
    }

    #[test]
    fn test_save_and_load_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let metadata = sample_metadata();
        let binary = vec![1u8, 2, 3, 4, 5];

        let path = save_model_with_metadata(&tmp.path().join("nested/model"), &metadata, &binary)
            .unwrap();
        assert!(path.ends_with("nested/model.tar.gz"));

        let loaded = load_metadata(&path).unwrap();
        assert_eq!(loaded.class_labels, metadata.class_labels);
        assert_eq!(load_model_binary(&path).unwrap(), binary);

        let (meta, bin) = load_model_with_metadata(&path).unwrap();
        assert_eq!(meta.description, metadata.description);
        assert_eq!(bin, binary);
    }

    #[test]
    fn test_missing_bundle_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_metadata(&tmp.path().join("nothing.tar.gz")).is_err());
    }
}
