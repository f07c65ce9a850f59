//! 運転者行動分類用CNNモデル
//!
//! # アーキテクチャ
//! - {Conv 3x3 (no padding) + ReLU + MaxPool 2x2} x 4ブロック (128 / 64 / 32 / 16 チャネル)
//! - Flatten
//! - FC: d -> fc_units + ReLU
//! - FC: fc_units -> num_classes
//! - Softmax (分類時)

use anyhow::Result;
use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};

use crate::model::config::{feature_map_extent, ModelSettings, TrainingSettings, CONV_CHANNELS};
use crate::model::model_metadata::ModelMetadata;

/// 入力のチャネル数（RGB）
pub const INPUT_CHANNELS: usize = 3;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 全結合層のユニット数
    #[config(default = 1024)]
    pub fc_units: usize,
    /// 入力画像の幅
    #[config(default = 360)]
    pub image_width: usize,
    /// 入力画像の高さ
    #[config(default = 480)]
    pub image_height: usize,
}

impl ModelConfig {
    /// 学習設定から作成
    pub fn from_settings(model: &ModelSettings, training: &TrainingSettings) -> Self {
        Self {
            num_classes: model.num_classes,
            fc_units: model.fc_units,
            image_width: training.image_width as usize,
            image_height: training.image_height as usize,
        }
    }

    /// 保存済みモデルのメタデータから作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            num_classes: metadata.num_classes(),
            fc_units: metadata.fc_units,
            image_width: metadata.image_width as usize,
            image_height: metadata.image_height as usize,
        }
    }

    /// 最後の畳み込みブロック後の特徴マップサイズ (高さ, 幅)
    pub fn feature_map_size(&self) -> Result<(usize, usize)> {
        let extent = |size: usize| {
            u32::try_from(size)
                .ok()
                .and_then(feature_map_extent)
                .map(|e| e as usize)
        };

        match (extent(self.image_height), extent(self.image_width)) {
            (Some(h), Some(w)) => Ok((h, w)),
            _ => anyhow::bail!(
                "入力サイズが小さすぎます: {}x{} (最小46x46が必要)",
                self.image_width,
                self.image_height
            ),
        }
    }

    /// Flatten後の特徴次元
    pub fn flattened_features(&self) -> Result<usize> {
        let (h, w) = self.feature_map_size()?;
        Ok(CONV_CHANNELS[CONV_CHANNELS.len() - 1] * h * w)
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<DriverClassifier<B>> {
        if self.num_classes == 0 {
            anyhow::bail!("クラス数が0です。少なくとも1クラス必要です");
        }
        let d = self.flattened_features()?;
        let [c1, c2, c3, c4] = CONV_CHANNELS;

        Ok(DriverClassifier {
            conv1: Conv2dConfig::new([INPUT_CHANNELS, c1], [3, 3]).init(device),
            conv2: Conv2dConfig::new([c1, c2], [3, 3]).init(device),
            conv3: Conv2dConfig::new([c2, c3], [3, 3]).init(device),
            conv4: Conv2dConfig::new([c3, c4], [3, 3]).init(device),
            pool: MaxPool2dConfig::new([2, 2]).init(),
            fc1: LinearConfig::new(d, self.fc_units).init(device),
            fc2: LinearConfig::new(self.fc_units, self.num_classes).init(device),
            activation: Relu::new(),
        })
    }

    /// 各層の出力形状とパラメータ数を表示
    pub fn print_summary(&self) -> Result<()> {
        let d = self.flattened_features()?;

        println!("_________________________________________________________________");
        println!("{:<28} {:<22} {:>12}", "Layer (type)", "Output Shape", "Param #");
        println!("=================================================================");
        println!(
            "{:<28} {:<22} {:>12}",
            "input (InputLayer)",
            format!("({}, {}, {})", self.image_height, self.image_width, INPUT_CHANNELS),
            0
        );

        let mut total = 0usize;
        let (mut h, mut w, mut channels) = (self.image_height, self.image_width, INPUT_CHANNELS);

        for (i, &out_channels) in CONV_CHANNELS.iter().enumerate() {
            h -= 2;
            w -= 2;
            let params = (3 * 3 * channels + 1) * out_channels;
            total += params;
            println!(
                "{:<28} {:<22} {:>12}",
                format!("conv_{} (Conv2D)", i + 1),
                format!("({}, {}, {})", h, w, out_channels),
                params
            );

            h /= 2;
            w /= 2;
            channels = out_channels;
            println!(
                "{:<28} {:<22} {:>12}",
                format!("pool_{} (MaxPooling2D)", i + 1),
                format!("({}, {}, {})", h, w, channels),
                0
            );
        }

        println!("{:<28} {:<22} {:>12}", "flatten (Flatten)", format!("({})", d), 0);

        let fc1_params = (d + 1) * self.fc_units;
        let fc2_params = (self.fc_units + 1) * self.num_classes;
        total += fc1_params + fc2_params;
        println!(
            "{:<28} {:<22} {:>12}",
            "fc_1 (Dense)",
            format!("({})", self.fc_units),
            fc1_params
        );
        println!(
            "{:<28} {:<22} {:>12}",
            "softmax (Dense)",
            format!("({})", self.num_classes),
            fc2_params
        );
        println!("=================================================================");
        println!("Total params: {}", total);
        println!("_________________________________________________________________");

        Ok(())
    }
}

/// 運転者行動分類用CNNモデル
#[derive(Module, Debug)]
pub struct DriverClassifier<B: Backend> {
    conv1: Conv2d<B>, // 3 -> 128
    conv2: Conv2d<B>, // 128 -> 64
    conv3: Conv2d<B>, // 64 -> 32
    conv4: Conv2d<B>, // 32 -> 16
    pool: MaxPool2d,  // 2x2

    fc1: Linear<B>, // d -> fc_units
    fc2: Linear<B>, // fc_units -> num_classes

    activation: Relu,
}

impl<B: Backend> DriverClassifier<B> {
    fn block(&self, conv: &Conv2d<B>, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = conv.forward(x);
        let x = self.activation.forward(x);
        self.pool.forward(x)
    }

    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, height, width]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.block(&self.conv1, images);
        let x = self.block(&self.conv2, x);
        let x = self.block(&self.conv3, x);
        let x = self.block(&self.conv4, x);

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]
    pub fn predict_proba(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// 順伝播と損失計算（学習用）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}
