//! モデル推論機能

use anyhow::Result;
use burn::{
    backend::Wgpu,
    tensor::{backend::Backend, Tensor, TensorData},
};
use std::path::Path;

use crate::ml::conversion::decode_classifier;
use crate::ml::dataset::{load_image, to_chw};
use crate::ml::driver_model::{DriverClassifier, INPUT_CHANNELS};
use crate::model::model_metadata::ModelMetadata;
use crate::model::model_storage::load_model_with_metadata;

/// 1枚分の分類結果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub label: String,
    /// Softmax後の確率
    pub confidence: f32,
}

/// 推論エンジン
pub struct InferenceEngine<B: Backend = Wgpu> {
    model: DriverClassifier<B>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path.as_ref())?;
        let model = decode_classifier::<B>(&metadata, model_binary, &device)?;
        Ok(Self::from_parts(model, metadata, device))
    }

    pub fn from_parts(
        model: DriverClassifier<B>,
        metadata: ModelMetadata,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            metadata,
            device,
        }
    }

    /// 単一画像を分類
    pub fn classify_image<P: AsRef<Path>>(&self, image_path: P) -> Result<Prediction> {
        let mut predictions = self.classify_batch(&[image_path])?;
        predictions
            .pop()
            .ok_or_else(|| anyhow::anyhow!("推論結果が空です"))
    }

    /// 複数画像をまとめて分類
    pub fn classify_batch(&self, image_paths: &[impl AsRef<Path>]) -> Result<Vec<Prediction>> {
        if image_paths.is_empty() {
            return Ok(Vec::new());
        }

        let width = self.metadata.image_width;
        let height = self.metadata.image_height;
        let pixels_per_image = INPUT_CHANNELS * (width * height) as usize;
        let mut pixels = Vec::with_capacity(image_paths.len() * pixels_per_image);
        for path in image_paths {
            let image = load_image(path.as_ref(), width, height)?;
            pixels.extend(to_chw(&image));
        }

        let input = Tensor::<B, 4>::from_data(
            TensorData::new(
                pixels,
                [image_paths.len(), INPUT_CHANNELS, height as usize, width as usize],
            ),
            &self.device,
        );

        let num_classes = self.metadata.num_classes();
        if num_classes == 0 {
            anyhow::bail!("メタデータにクラスラベルがありません");
        }
        let probabilities = self
            .model
            .predict_proba(input)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("推論結果の取得エラー: {:?}", e))?;

        probabilities
            .chunks(num_classes)
            .map(|row| self.best_class(row))
            .collect()
    }

    fn best_class(&self, row: &[f32]) -> Result<Prediction> {
        let (class_index, confidence) = row
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| anyhow::anyhow!("クラス数が0です"))?;

        let label = self
            .metadata
            .class_label(class_index)
            .ok_or_else(|| anyhow::anyhow!("クラスインデックス {} は範囲外です", class_index))?
            .to_string();

        Ok(Prediction {
            class_index,
            label,
            confidence,
        })
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
