//! ラベル付き画像ディレクトリのデータセットとバッチャー

use anyhow::{Context, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Int, Tensor, TensorData},
};
use image::{imageops::FilterType, RgbImage};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::dataset::layout::{discover_categories, list_category_files};
use crate::ml::augmentation::augment;
use crate::ml::driver_model::INPUT_CHANNELS;
use crate::model::config::AugmentationSettings;

/// 学習対象とする画像の拡張子
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// 学習データセット（パスのリストのみ保持）
#[derive(Debug, Clone)]
pub struct DriverImageDataset {
    samples: Vec<(PathBuf, usize)>, // (画像パス, クラスID)
    class_names: Vec<String>,
}

impl DriverImageDataset {
    /// ディレクトリから学習データを読み込む
    ///
    /// サブディレクトリ名をクラス名とし、名前順にクラスIDを割り当てます。
    pub fn from_directory(data_dir: &Path) -> Result<Self> {
        let mut samples = Vec::new();
        let mut class_names = Vec::new();

        for (class_id, category) in discover_categories(data_dir)?.into_iter().enumerate() {
            for path in list_category_files(&category)? {
                if is_image_file(&path) {
                    samples.push((path, class_id));
                }
            }
            class_names.push(category.name);
        }

        if samples.is_empty() {
            anyhow::bail!("No training samples found in {}", data_dir.display());
        }

        let dataset = Self {
            samples,
            class_names,
        };

        info!(
            "{} 枚の画像を {} クラスから読み込みました",
            dataset.samples.len(),
            dataset.class_names.len()
        );
        for (name, count) in dataset.class_names.iter().zip(dataset.class_counts()) {
            info!("  クラス '{}': {} 枚", name, count);
        }

        Ok(dataset)
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// クラスごとのサンプル数
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.class_names.len()];
        for (_, class_id) in &self.samples {
            counts[*class_id] += 1;
        }
        counts
    }

    /// データセットを学習用と検証用に分割
    pub fn split(self, validation_ratio: f32, seed: u64) -> (Self, Self) {
        let mut samples = self.samples;
        let mut rng = StdRng::seed_from_u64(seed);
        samples.shuffle(&mut rng);

        let total_len = samples.len();
        let val_len = ((total_len as f32) * validation_ratio)
            .round()
            .clamp(0.0, total_len as f32) as usize;
        let val_samples = samples.split_off(total_len - val_len);

        let train_dataset = Self {
            samples,
            class_names: self.class_names.clone(),
        };
        let val_dataset = Self {
            samples: val_samples,
            class_names: self.class_names,
        };

        (train_dataset, val_dataset)
    }
}

/// データセットアイテム（画像パスのみ保持）
#[derive(Clone, Debug)]
pub struct DriverItem {
    pub path: PathBuf,
    pub label: usize,
}

impl Dataset<DriverItem> for DriverImageDataset {
    fn get(&self, index: usize) -> Option<DriverItem> {
        let (path, label) = self.samples.get(index)?;
        Some(DriverItem {
            path: path.clone(),
            label: *label,
        })
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// 画像を読み込んでモデル入力サイズにリサイズ
pub fn load_image(path: &Path, width: u32, height: u32) -> Result<RgbImage> {
    let image = image::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?
        .to_rgb8();

    if image.dimensions() == (width, height) {
        Ok(image)
    } else {
        Ok(image::imageops::resize(&image, width, height, FilterType::Triangle))
    }
}

/// 画素値を [0, 1] にスケーリングし (C, H, W) の順で平坦化
pub fn to_chw(image: &RgbImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let mut data = Vec::with_capacity(INPUT_CHANNELS * (width * height) as usize);

    for channel in 0..INPUT_CHANNELS {
        for y in 0..height {
            for x in 0..width {
                data.push(image.get_pixel(x, y)[channel] as f32 / 255.0);
            }
        }
    }

    data
}

/// バッチャー
#[derive(Clone, Debug)]
pub struct DriverBatcher {
    width: usize,
    height: usize,
    augmentation: Option<AugmentationSettings>,
}

impl DriverBatcher {
    /// 学習用（データ拡張あり）
    pub fn training(width: usize, height: usize, augmentation: AugmentationSettings) -> Self {
        Self {
            width,
            height,
            augmentation: Some(augmentation),
        }
    }

    /// 検証・評価用（データ拡張なし）
    pub fn evaluation(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            augmentation: None,
        }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct DriverBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, DriverItem, DriverBatch<B>> for DriverBatcher {
    fn batch(&self, items: Vec<DriverItem>, device: &B::Device) -> DriverBatch<B> {
        let batch_size = items.len();
        let pixels_per_image = INPUT_CHANNELS * self.width * self.height;
        let mut pixels = Vec::with_capacity(batch_size * pixels_per_image);
        let mut labels: Vec<i64> = Vec::with_capacity(batch_size);
        let mut rng = rand::thread_rng();

        for item in items {
            match load_image(&item.path, self.width as u32, self.height as u32) {
                Ok(image) => {
                    let image = match &self.augmentation {
                        Some(settings) => augment(image, settings, &mut rng),
                        None => image,
                    };
                    pixels.extend(to_chw(&image));
                }
                Err(e) => {
                    // 読み込めない画像はゼロで埋める
                    warn!("画像読み込み失敗 {}: {:#}", item.path.display(), e);
                    pixels.extend(std::iter::repeat(0.0f32).take(pixels_per_image));
                }
            }
            labels.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, INPUT_CHANNELS, self.height, self.width]),
            device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [batch_size]), device);

        DriverBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use image::Rgb;

    fn write_image(path: &Path, width: u32, height: u32, value: u8) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
            .save(path)
            .unwrap();
    }

    fn build_tree(root: &Path) {
        for (class, count) in [("c0", 6), ("c1", 4)] {
            for i in 0..count {
                write_image(&root.join(class).join(format!("img_{}.png", i)), 8, 6, 255);
            }
        }
        std::fs::write(root.join("c0").join("notes.txt"), b"not an image").unwrap();
        std::fs::create_dir_all(root.join(".DS_Store")).unwrap();
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b.jpg")));
        assert!(is_image_file(Path::new("a/b.JPEG")));
        assert!(is_image_file(Path::new("b.png")));
        assert!(!is_image_file(Path::new("b.txt")));
        assert!(!is_image_file(Path::new("b")));
    }

    #[test]
    fn test_from_directory_and_split() {
        let tmp = tempfile::tempdir().unwrap();
        build_tree(tmp.path());

        let dataset = DriverImageDataset::from_directory(tmp.path()).unwrap();
        assert_eq!(dataset.class_names(), &["c0".to_string(), "c1".to_string()]);
        assert_eq!(dataset.class_counts(), vec![6, 4]);
        assert_eq!(dataset.len(), 10);

        let (train, val) = dataset.split(0.2, 42);
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        assert_eq!(train.num_classes(), 2);

        let mut all: Vec<PathBuf> = (0..train.len())
            .map(|i| train.get(i).unwrap().path)
            .chain((0..val.len()).map(|i| val.get(i).unwrap().path))
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("c0")).unwrap();
        assert!(DriverImageDataset::from_directory(tmp.path()).is_err());
    }

    #[test]
    fn test_to_chw_layout_and_scaling() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 51]));
        image.put_pixel(1, 0, Rgb([0, 255, 102]));

        let data = to_chw(&image);
        assert_eq!(data.len(), 6);
        assert_eq!(&data[0..2], &[1.0, 0.0]);
        assert_eq!(&data[2..4], &[0.0, 1.0]);
        assert!((data[4] - 0.2).abs() < 1e-6);
        assert!((data[5] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_load_image_resizes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("big.png");
        write_image(&path, 20, 10, 128);

        let image = load_image(&path, 8, 6).unwrap();
        assert_eq!(image.dimensions(), (8, 6));
    }

    #[test]
    fn test_batcher_shapes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c0/a.png");
        write_image(&path, 12, 10, 255);

        let items = vec![
            DriverItem { path: path.clone(), label: 0 },
            DriverItem { path: tmp.path().join("missing.png"), label: 1 },
        ];
        let batcher = DriverBatcher::evaluation(12, 10);
        let batch: DriverBatch<NdArray<f32>> =
            Batcher::<NdArray<f32>, DriverItem, DriverBatch<NdArray<f32>>>::batch(
                &batcher,
                items,
                &NdArrayDevice::Cpu,
            );

        assert_eq!(batch.images.dims(), [2, 3, 10, 12]);
        assert_eq!(batch.targets.dims(), [2]);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        let per_image = 3 * 10 * 12;
        assert!(values[..per_image].iter().all(|v| (*v - 1.0).abs() < 1e-6));
        assert!(values[per_image..].iter().all(|v| *v == 0.0));
    }
}
