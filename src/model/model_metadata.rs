//! モデルメタデータの定義
//!
//! tar.gz形式のモデルバンドルに `metadata.json` として格納されます。
//! 学習直後のバンドルと、モバイル推論形式に変換したバンドルで共通の形式です。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::mobile_spec::ModelDescription;

/// 重みの保存精度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightPrecision {
    /// f32
    #[default]
    Full,
    /// f16
    Half,
}

impl std::fmt::Display for WeightPrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeightPrecision::Full => write!(f, "full (f32)"),
            WeightPrecision::Half => write!(f, "half (f16)"),
        }
    }
}

/// 評価結果（損失と正解率）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    pub loss: f64,
    pub accuracy: f64,
}

/// モデルメタデータ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// クラスラベル（クラスIDの順）
    pub class_labels: Vec<String>,

    /// モデル入力の幅（ピクセル）
    pub image_width: u32,

    /// モデル入力の高さ（ピクセル）
    pub image_height: u32,

    /// 全結合層のユニット数
    pub fc_units: usize,

    /// 学習エポック数
    pub num_epochs: u32,

    /// 重みの保存精度
    #[serde(default)]
    pub precision: WeightPrecision,

    /// 学習後に検証データで計算した評価値
    #[serde(default)]
    pub scores: Option<EvaluationScores>,

    /// 入出力の記述
    pub description: ModelDescription,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,

    /// モバイル形式へ変換した時刻
    #[serde(default)]
    pub converted_at: Option<String>,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        class_labels: Vec<String>,
        image_width: u32,
        image_height: u32,
        fc_units: usize,
        num_epochs: u32,
        description: ModelDescription,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            class_labels,
            image_width,
            image_height,
            fc_units,
            num_epochs,
            precision: WeightPrecision::Full,
            scores: None,
            description,
            trained_at,
            converted_at: None,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// クラスインデックスからラベルを取得
    pub fn class_label(&self, index: usize) -> Option<&str> {
        self.class_labels.get(index).map(|s| s.as_str())
    }

    /// 最初の入力フィーチャの名前
    pub fn input_name(&self) -> Option<&str> {
        self.description.inputs.first().map(|f| f.name.as_str())
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mobile_spec::DescriptionMetadata;

    fn sample_metadata() -> ModelMetadata {
        let labels: Vec<String> = (0..10).map(|i| format!("c{}", i)).collect();
        let description = ModelDescription::image_classifier(
            "input",
            "softmax",
            360,
            480,
            &labels,
            DescriptionMetadata::default(),
        );
        ModelMetadata::new(labels, 360, 480, 1024, 4, description)
    }

    #[test]
    fn test_json_round_trip() {
        let mut metadata = sample_metadata();
        metadata.scores = Some(EvaluationScores {
            loss: 0.5,
            accuracy: 0.875,
        });

        let json = metadata.to_json_string().unwrap();
        let back = ModelMetadata::from_json_string(&json).unwrap();

        assert_eq!(back.class_labels, metadata.class_labels);
        assert_eq!(back.precision, WeightPrecision::Full);
        assert_eq!(back.scores, metadata.scores);
        assert_eq!(back.description, metadata.description);
    }

    #[test]
    fn test_class_label_lookup() {
        let metadata = sample_metadata();
        assert_eq!(metadata.num_classes(), 10);
        assert_eq!(metadata.class_label(0), Some("c0"));
        assert_eq!(metadata.class_label(9), Some("c9"));
        assert_eq!(metadata.class_label(10), None);
        assert_eq!(metadata.input_name(), Some("input"));
    }

    #[test]
    fn test_precision_serialized_lowercase() {
        assert_eq!(serde_json::to_string(&WeightPrecision::Half).unwrap(), "\"half\"");
    }
}
