//! 学習済みモデルのモバイル推論形式への変換
//!
//! 学習済みバンドルの重みを読み込み、必要に応じて半精度で再エンコードし、
//! 名前付きの画像入力を持つモデル記述と共に新しいバンドルとして保存します。

use anyhow::Result;
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, HalfPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use burn_ndarray::{NdArray, NdArrayDevice};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::ml::driver_model::{DriverClassifier, ModelConfig};
use crate::model::config::ConversionSettings;
use crate::model::mobile_spec::{DescriptionMetadata, ModelDescription};
use crate::model::model_metadata::{ModelMetadata, WeightPrecision};
use crate::model::model_storage::{load_model_with_metadata, save_model_with_metadata};

type ClassifierRecord<B> = <DriverClassifier<B> as Module<B>>::Record;

/// モデルの重みをバイト列にエンコード
pub fn encode_weights<B: Backend>(
    model: DriverClassifier<B>,
    precision: WeightPrecision,
) -> Result<Vec<u8>> {
    let record = model.into_record();
    let bytes = match precision {
        WeightPrecision::Full => <BinBytesRecorder<FullPrecisionSettings> as Recorder<B>>::record(
            &BinBytesRecorder::default(),
            record,
            (),
        ),
        WeightPrecision::Half => <BinBytesRecorder<HalfPrecisionSettings> as Recorder<B>>::record(
            &BinBytesRecorder::default(),
            record,
            (),
        ),
    };
    bytes.map_err(|e| anyhow::anyhow!("モデル重みのエンコードエラー: {:?}", e))
}

/// メタデータと重みのバイト列からモデルを復元
pub fn decode_classifier<B: Backend>(
    metadata: &ModelMetadata,
    model_binary: Vec<u8>,
    device: &B::Device,
) -> Result<DriverClassifier<B>> {
    let model = ModelConfig::from_metadata(metadata).init::<B>(device)?;

    let record: ClassifierRecord<B> = match metadata.precision {
        WeightPrecision::Full => <BinBytesRecorder<FullPrecisionSettings> as Recorder<B>>::load(
            &BinBytesRecorder::default(),
            model_binary,
            device,
        ),
        WeightPrecision::Half => <BinBytesRecorder<HalfPrecisionSettings> as Recorder<B>>::load(
            &BinBytesRecorder::default(),
            model_binary,
            device,
        ),
    }
    .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

    Ok(model.load_record(record))
}

/// 学習済みバンドルをモバイル推論形式のバンドルに変換
///
/// 実際に書き込んだパスと新しいメタデータを返します。
pub fn convert_model(
    input_path: &Path,
    output_path: &Path,
    settings: &ConversionSettings,
) -> Result<(PathBuf, ModelMetadata)> {
    let (metadata, model_binary) = load_model_with_metadata(input_path)?;
    info!(
        "モデルを読み込みました: {} ({} クラス, 精度 {})",
        input_path.display(),
        metadata.num_classes(),
        metadata.precision
    );

    let device = NdArrayDevice::Cpu;
    let model = decode_classifier::<NdArray<f32>>(&metadata, model_binary, &device)?;

    let precision = if settings.half_precision {
        WeightPrecision::Half
    } else {
        WeightPrecision::Full
    };
    let converted_binary = encode_weights(model, precision)?;

    let mut converted = metadata;
    converted.precision = precision;
    converted.description = ModelDescription::image_classifier(
        &settings.input_name,
        &settings.output_name,
        converted.image_width,
        converted.image_height,
        &converted.class_labels,
        DescriptionMetadata {
            author: settings.author.clone(),
            short_description: settings.short_description.clone(),
            license: settings.license.clone(),
            version: settings.version.clone(),
        },
    );
    converted.converted_at = Some(chrono::Local::now().to_rfc3339());

    let written = save_model_with_metadata(output_path, &converted, &converted_binary)?;
    info!(
        "変換後のモデルを保存しました: {} (精度 {}, {} バイト)",
        written.display(),
        precision,
        converted_binary.len()
    );

    Ok((written, converted))
}
