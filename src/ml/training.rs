//! モデル学習
//!
//! ラベル付き画像ディレクトリを学習用・検証用に分割し、
//! データ拡張付きで学習した後、検証データで評価してバンドルとして保存します。

use anyhow::Result;
use burn::{
    backend::{Autodiff, Wgpu},
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    optim::AdamConfig,
    tensor::backend::{AutodiffBackend, Backend},
    train::{
        metric::{AccuracyMetric, LossMetric},
        ClassificationOutput, LearnerBuilder, LearningStrategy, TrainOutput, TrainStep, ValidStep,
    },
};
use burn_wgpu::WgpuDevice;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::ml::conversion::encode_weights;
use crate::ml::dataset::{DriverBatch, DriverBatcher, DriverImageDataset, DriverItem};
use crate::ml::driver_model::{DriverClassifier, ModelConfig};
use crate::ml::evaluation::evaluate_loader;
use crate::model::config::{AppConfig, DeviceType, ModelSettings, TrainingSettings};
use crate::model::mobile_spec::{DescriptionMetadata, ModelDescription};
use crate::model::model_metadata::{EvaluationScores, ModelMetadata, WeightPrecision};
use crate::model::model_storage::save_model_with_metadata;

/// 学習済みモデルの入出力名
const TRAINED_INPUT_NAME: &str = "input";
const TRAINED_OUTPUT_NAME: &str = "softmax";

static RUN_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// TrainStep実装 (学習時の順伝播 + 逆伝播)
impl<B: AutodiffBackend> TrainStep<DriverBatch<B>, ClassificationOutput<B>>
    for DriverClassifier<B>
{
    fn step(&self, batch: DriverBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        let grads = item.loss.backward();
        TrainOutput::new(self, grads, item)
    }
}

/// ValidStep実装 (検証時の順伝播のみ)
impl<B: Backend> ValidStep<DriverBatch<B>, ClassificationOutput<B>> for DriverClassifier<B> {
    fn step(&self, batch: DriverBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

/// 1回の学習に必要な設定一式
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub training: TrainingSettings,
    pub model: ModelSettings,
    pub device_type: DeviceType,
}

impl TrainingRun {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            training: config.training.clone(),
            model: config.model.clone(),
            device_type: config.device_type.clone(),
        }
    }

    fn device(&self) -> WgpuDevice {
        match self.device_type {
            DeviceType::Wgpu => WgpuDevice::default(),
            DeviceType::Cpu => WgpuDevice::Cpu,
        }
    }
}

/// 学習結果
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model_path: PathBuf,
    pub scores: EvaluationScores,
    pub class_labels: Vec<String>,
}

/// 設定のデバイス種別に従い WGPU バックエンドで学習を実行
pub fn train_model(run: TrainingRun) -> Result<TrainingOutcome> {
    let device = run.device();
    train_model_on::<Autodiff<Wgpu>>(run, device)
}

/// 任意の Autodiff バックエンドでモデル学習を実行
pub fn train_model_on<B: AutodiffBackend>(
    run: TrainingRun,
    device: B::Device,
) -> Result<TrainingOutcome> {
    let settings = &run.training;

    let dataset = DriverImageDataset::from_directory(&settings.data_dir)?;
    if dataset.num_classes() != run.model.num_classes {
        anyhow::bail!(
            "クラス数が設定と一致しません: ディレクトリ {} クラス, 設定 {} クラス ({})",
            dataset.num_classes(),
            run.model.num_classes,
            settings.data_dir.display()
        );
    }
    let class_labels = dataset.class_names().to_vec();

    let (dataset_train, dataset_val) = dataset.split(settings.validation_split, settings.seed);
    info!("学習データ: {} 枚", dataset_train.len());
    info!("検証データ: {} 枚", dataset_val.len());
    if dataset_val.len() == 0 {
        anyhow::bail!("検証データが0枚です。validation_split かデータ量を見直してください");
    }

    let model_config = ModelConfig::from_settings(&run.model, settings);
    model_config.print_summary()?;

    info!("{} モードで学習を開始します ({:?})", run.device_type, device);

    let width = settings.image_width as usize;
    let height = settings.image_height as usize;

    let dataloader_train: Arc<dyn DataLoader<B, DriverBatch<B>>> =
        DataLoaderBuilder::<B, DriverItem, DriverBatch<B>>::new(
            DriverBatcher::training(width, height, settings.augmentation.clone()),
        )
        .batch_size(settings.batch_size)
        .shuffle(settings.seed)
        .num_workers(0)
        .set_device(device.clone())
        .build(dataset_train);

    let dataloader_val: Arc<dyn DataLoader<B::InnerBackend, DriverBatch<B::InnerBackend>>> =
        DataLoaderBuilder::<B::InnerBackend, DriverItem, DriverBatch<B::InnerBackend>>::new(
            DriverBatcher::evaluation(width, height),
        )
        .batch_size(settings.batch_size)
        .num_workers(0)
        .set_device(device.clone())
        .build(dataset_val);

    let model = model_config.init::<B>(&device)?;

    // アーティファクトディレクトリ（学習ログ・チェックポイント）
    let artifact_dir = std::env::temp_dir().join(format!(
        "distracted_driver_training_{}_{}",
        std::process::id(),
        RUN_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::create_dir_all(&artifact_dir)?;
    let artifact_dir_str = artifact_dir.to_string_lossy().to_string();

    info!(
        "エポック数: {}, バッチサイズ: {}, 学習率: {}",
        settings.num_epochs, settings.batch_size, settings.learning_rate
    );

    let learner = LearnerBuilder::new(&artifact_dir_str)
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .learning_strategy(LearningStrategy::SingleDevice(device.clone()))
        .num_epochs(settings.num_epochs)
        .summary()
        .build(model, AdamConfig::new().init(), settings.learning_rate);

    let trained = learner.fit(dataloader_train, dataloader_val.clone()).model;
    info!("学習が完了しました");

    let scores = evaluate_loader(&trained, &dataloader_val)?;
    println!("Loss: {} Accuracy: {}", scores.loss, scores.accuracy);

    let model_binary = encode_weights(trained, WeightPrecision::Full)?;

    let description = ModelDescription::image_classifier(
        TRAINED_INPUT_NAME,
        TRAINED_OUTPUT_NAME,
        settings.image_width,
        settings.image_height,
        &class_labels,
        DescriptionMetadata::default(),
    );
    let mut metadata = ModelMetadata::new(
        class_labels.clone(),
        settings.image_width,
        settings.image_height,
        run.model.fc_units,
        settings.num_epochs as u32,
        description,
    );
    metadata.scores = Some(scores);

    let model_path = save_model_with_metadata(&settings.output_path, &metadata, &model_binary)?;
    info!("モデルを保存しました: {}", model_path.display());

    if let Err(e) = std::fs::remove_dir_all(&artifact_dir) {
        warn!(
            "アーティファクトディレクトリを削除できませんでした {}: {}",
            artifact_dir.display(),
            e
        );
    }

    Ok(TrainingOutcome {
        model_path,
        scores,
        class_labels,
    })
}
