//! アプリケーション設定管理モジュール
//!
//! データ分割・学習・変換の各設定をJSON形式で保存・読み込みします。
//! 設定は不変の値として各処理のエントリポイントに渡されます。

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::dataset::split::SplitThresholds;

/// 畳み込みブロックの出力チャネル数（入力側から順に）
pub const CONV_CHANNELS: [usize; 4] = [128, 64, 32, 16];

/// 計算デバイスの種類
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    #[default]
    Wgpu,
    /// WGPU の CPU デバイス
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "WGPU (CPU)"),
        }
    }
}

/// データ分割設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionSettings {
    /// カテゴリごとのサブディレクトリを含む元画像ディレクトリ
    pub source_dir: PathBuf,
    /// サンプルモードの出力先
    pub sample_dir: PathBuf,
    /// TrainingData / ValidationData / TestData を作成するディレクトリ
    pub split_dir: PathBuf,
    /// サンプルモードでカテゴリごとにコピーする最大枚数
    pub sample_per_category: usize,
    /// 分割の閾値
    pub thresholds: SplitThresholds,
    /// 出力先のカテゴリディレクトリが無い場合に作成するか
    pub create_missing_dirs: bool,
}

impl Default for PartitionSettings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("../data/imgs/train"),
            sample_dir: PathBuf::from("../data/imgs/sample"),
            split_dir: PathBuf::from("../DistractedDriverCreateML/DistractedDriverCreateML"),
            sample_per_category: 10,
            thresholds: SplitThresholds::default(),
            create_missing_dirs: true,
        }
    }
}

/// データ拡張設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationSettings {
    /// せん断角の範囲（度）
    pub shear_range: f32,
    /// 拡大縮小の範囲（1 ± zoom_range）
    pub zoom_range: f32,
    /// ランダムに左右反転するか
    pub horizontal_flip: bool,
}

impl Default for AugmentationSettings {
    fn default() -> Self {
        Self {
            shear_range: 0.2,
            zoom_range: 0.2,
            horizontal_flip: true,
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// ラベル付き画像ディレクトリ（カテゴリごとのサブディレクトリ）
    pub data_dir: PathBuf,
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 入力画像の幅（リサイズ後）
    pub image_width: u32,
    /// 入力画像の高さ（リサイズ後）
    pub image_height: u32,
    /// 学習率
    pub learning_rate: f64,
    /// 検証データの割合
    pub validation_split: f32,
    /// ランダムシード
    pub seed: u64,
    /// データ拡張
    pub augmentation: AugmentationSettings,
    /// 学習済みモデルの保存先
    pub output_path: PathBuf,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("../data/imgs/train"),
            num_epochs: 4,
            batch_size: 16,
            image_width: 360,
            image_height: 480,
            learning_rate: 1e-3,
            validation_split: 0.2,
            seed: 42,
            augmentation: AugmentationSettings::default(),
            output_path: PathBuf::from("Model/distracted_driver.tar.gz"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// 分類クラス数（c0〜c9）
    pub num_classes: usize,
    /// 全結合層のユニット数
    pub fc_units: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            num_classes: 10,
            fc_units: 1024,
        }
    }
}

/// モバイル推論形式への変換設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// 画像入力の名前
    pub input_name: String,
    /// 出力の名前
    pub output_name: String,
    /// 変換後モデルの保存先
    pub output_path: PathBuf,
    /// 重みを半精度で保存するか
    pub half_precision: bool,
    pub author: String,
    pub short_description: String,
    pub license: String,
    pub version: String,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            input_name: "input1".to_string(),
            output_name: "output1".to_string(),
            output_path: PathBuf::from("Model/DistractedDriver.mobile.tar.gz"),
            half_precision: true,
            author: String::new(),
            short_description: "Predict class of behavior for possibly distracted driver (c0-c9)"
                .to_string(),
            license: "GPL".to_string(),
            version: "0.1".to_string(),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    /// データ分割設定
    pub partition: PartitionSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
    /// モデル設定
    pub model: ModelSettings,
    /// 変換設定
    pub conversion: ConversionSettings,
}

/// 畳み込み(3x3, パディング無し) + プーリング(2x2) を全ブロック通した後の一辺の長さ
///
/// 途中で0になる場合は `None` を返します。
pub fn feature_map_extent(size: u32) -> Option<u32> {
    let mut extent = size;
    for _ in 0..CONV_CHANNELS.len() {
        extent = extent.checked_sub(2)? / 2;
        if extent == 0 {
            return None;
        }
    }
    Some(extent)
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("../config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// デフォルトパスから設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        if path.exists() {
            match Self::load(&path) {
                Ok(config) => {
                    info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {:#}",
                        path.display(),
                        e
                    );
                    warn!("デフォルト設定を使用します");
                    Self::default()
                }
            }
        } else {
            info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 明示的に指定されたパスがあればそこから読み込み、無ければデフォルト動作
    ///
    /// 明示されたファイルの読み込み失敗はエラーとして返します。
    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let config = Self::load(path)?;
                info!("設定ファイルを読み込みました: {}", path.display());
                config
            }
            None => Self::load_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// 値の整合性を検証
    pub fn validate(&self) -> anyhow::Result<()> {
        self.partition.thresholds.validate()?;

        let training = &self.training;
        if training.batch_size == 0 {
            anyhow::bail!("batch_size は1以上である必要があります");
        }
        if !(0.0..1.0).contains(&training.validation_split) {
            anyhow::bail!(
                "validation_split は [0, 1) の範囲である必要があります: {}",
                training.validation_split
            );
        }
        if feature_map_extent(training.image_width).is_none()
            || feature_map_extent(training.image_height).is_none()
        {
            anyhow::bail!(
                "入力サイズが小さすぎます: {}x{} (畳み込み{}層を通せません)",
                training.image_width,
                training.image_height,
                CONV_CHANNELS.len()
            );
        }
        if self.model.num_classes < 2 {
            anyhow::bail!("num_classes は2以上である必要があります");
        }
        Ok(())
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("計算デバイス: {}", self.device_type);
        println!("\n--- データ分割設定 ---");
        println!("入力ディレクトリ: {}", self.partition.source_dir.display());
        println!("サンプル出力先: {}", self.partition.sample_dir.display());
        println!("分割出力先: {}", self.partition.split_dir.display());
        println!(
            "閾値: training < {}, validation < {}",
            self.partition.thresholds.training_below, self.partition.thresholds.validation_below
        );
        println!("\n--- トレーニング設定 ---");
        println!("データディレクトリ: {}", self.training.data_dir.display());
        println!("エポック数: {}", self.training.num_epochs);
        println!("バッチサイズ: {}", self.training.batch_size);
        println!(
            "入力サイズ: {}x{}",
            self.training.image_width, self.training.image_height
        );
        println!("学習率: {}", self.training.learning_rate);
        println!("シード: {}", self.training.seed);
        println!("\n--- モデル設定 ---");
        println!("分類クラス数: {}", self.model.num_classes);
        println!("全結合層ユニット数: {}", self.model.fc_units);
        println!("========================\n");
    }
}
