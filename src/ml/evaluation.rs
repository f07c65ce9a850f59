//! モデルの評価
//!
//! - 学習直後の検証データに対する損失・正解率
//! - ラベル付きディレクトリ全体を1枚ずつ分類した際のクラス別集計

use anyhow::Result;
use burn::{
    data::dataloader::DataLoader,
    tensor::{backend::Backend, ElementConversion},
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::dataset::layout::{discover_categories, list_category_files};
use crate::ml::dataset::{is_image_file, DriverBatch};
use crate::ml::driver_model::DriverClassifier;
use crate::ml::inference::InferenceEngine;
use crate::model::model_metadata::EvaluationScores;

/// データローダー全体の平均損失と正解率を計算
pub fn evaluate_loader<B: Backend>(
    model: &DriverClassifier<B>,
    loader: &Arc<dyn DataLoader<B, DriverBatch<B>>>,
) -> Result<EvaluationScores> {
    let mut loss_sum = 0.0f64;
    let mut correct = 0i64;
    let mut examples = 0usize;

    for batch in loader.iter() {
        let batch_size = batch.targets.dims()[0];
        let output = model.forward_classification(batch.images, batch.targets);

        let loss: f64 = output.loss.into_scalar().elem();
        loss_sum += loss * batch_size as f64;

        let hits: i64 = output
            .output
            .argmax(1)
            .reshape([batch_size])
            .equal(output.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();
        correct += hits;
        examples += batch_size;
    }

    if examples == 0 {
        anyhow::bail!("評価データが空です");
    }

    Ok(EvaluationScores {
        loss: loss_sum / examples as f64,
        accuracy: correct as f64 / examples as f64,
    })
}

/// クラス別の分類結果の集計
#[derive(Debug, Clone)]
pub struct ClassificationTally {
    labels: Vec<String>,
    expected: Vec<usize>,
    predicted: Vec<usize>,
    correct: usize,
    failed: usize,
    elapsed: Duration,
}

impl ClassificationTally {
    pub fn new(labels: Vec<String>) -> Self {
        let n = labels.len();
        Self {
            labels,
            expected: vec![0; n],
            predicted: vec![0; n],
            correct: 0,
            failed: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// 1枚分の結果を記録（`predicted` が `None` なら分類失敗）
    pub fn record(&mut self, expected: usize, predicted: Option<usize>, elapsed: Duration) {
        self.elapsed += elapsed;
        if let Some(count) = self.expected.get_mut(expected) {
            *count += 1;
        }
        match predicted.and_then(|p| self.predicted.get_mut(p).map(|c| (p, c))) {
            Some((p, count)) => {
                *count += 1;
                if p == expected {
                    self.correct += 1;
                }
            }
            None => self.failed += 1,
        }
    }

    /// 記録した画像数
    pub fn total(&self) -> usize {
        self.expected.iter().sum()
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn predicted_count(&self, index: usize) -> usize {
        self.predicted.get(index).copied().unwrap_or(0)
    }

    /// クラスごとの予測数と正解数の差の絶対値の合計
    pub fn classification_errors(&self) -> usize {
        self.expected
            .iter()
            .zip(&self.predicted)
            .map(|(e, p)| e.abs_diff(*p))
            .sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct as f64 / total as f64
        }
    }

    pub fn average_time(&self) -> Duration {
        match u32::try_from(self.total()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.elapsed / n,
        }
    }

    /// 集計結果を表示
    pub fn print_report(&self) {
        println!("Classifications collected:");
        for (i, label) in self.labels.iter().enumerate() {
            println!(
                "{} : {} (expected {})",
                label, self.predicted[i], self.expected[i]
            );
        }
        println!(
            "Failed classifications (could not make classification): {}",
            self.failed
        );
        println!(
            "Classification errors: ({}) / ({})",
            self.classification_errors(),
            self.total()
        );
        println!("Accuracy: {:.4}", self.accuracy());
        println!("Average classification time {:?}", self.average_time());
    }
}

/// ラベル付きディレクトリの画像を1枚ずつ分類して集計
///
/// `limit_per_class` を指定すると各クラスの先頭から指定枚数のみ評価し、
/// 個々の予測結果も表示します。
pub fn evaluate_directory<B: Backend>(
    engine: &InferenceEngine<B>,
    data_dir: &Path,
    limit_per_class: Option<usize>,
) -> Result<ClassificationTally> {
    let mut tally = ClassificationTally::new(engine.metadata().class_labels.clone());

    for category in discover_categories(data_dir)? {
        let Some(expected) = tally.label_index(&category.name) else {
            warn!("モデルに存在しないクラスのためスキップ: {}", category.name);
            continue;
        };

        let files: Vec<_> = list_category_files(&category)?
            .into_iter()
            .filter(|p| is_image_file(p))
            .take(limit_per_class.unwrap_or(usize::MAX))
            .collect();

        if limit_per_class.is_some() {
            println!("PREDICTIONS FOR LABEL {}:", category.name);
        }

        for (idx, path) in files.iter().enumerate() {
            let start = Instant::now();
            let result = engine.classify_image(path);
            let elapsed = start.elapsed();

            match result {
                Ok(prediction) => {
                    if limit_per_class.is_some() {
                        println!(
                            "\tPredicting image {} as {} ({:.3})",
                            idx, prediction.label, prediction.confidence
                        );
                    }
                    tally.record(expected, Some(prediction.class_index), elapsed);
                }
                Err(e) => {
                    warn!("分類に失敗しました {}: {:#}", path.display(), e);
                    tally.record(expected, None, elapsed);
                }
            }
        }
    }

    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["c0".to_string(), "c1".to_string(), "c2".to_string()]
    }

    #[test]
    fn test_tally_counts_and_errors() {
        let mut tally = ClassificationTally::new(labels());
        let ms = Duration::from_millis(10);

        tally.record(0, Some(0), ms);
        tally.record(0, Some(1), ms);
        tally.record(1, Some(1), ms);
        tally.record(2, None, ms);

        assert_eq!(tally.total(), 4);
        assert_eq!(tally.failed(), 1);
        assert_eq!(tally.predicted_count(0), 1);
        assert_eq!(tally.predicted_count(1), 2);
        assert_eq!(tally.predicted_count(2), 0);
        // |2-1| + |1-2| + |1-0|
        assert_eq!(tally.classification_errors(), 3);
        assert!((tally.accuracy() - 0.5).abs() < 1e-12);
        assert_eq!(tally.average_time(), ms);
    }

    #[test]
    fn test_out_of_range_prediction_counts_as_failure() {
        let mut tally = ClassificationTally::new(labels());
        tally.record(0, Some(7), Duration::ZERO);
        assert_eq!(tally.failed(), 1);
        assert_eq!(tally.accuracy(), 0.0);
    }

    #[test]
    fn test_empty_tally() {
        let tally = ClassificationTally::new(labels());
        assert_eq!(tally.total(), 0);
        assert_eq!(tally.accuracy(), 0.0);
        assert_eq!(tally.average_time(), Duration::ZERO);
        assert_eq!(tally.label_index("c2"), Some(2));
        assert_eq!(tally.label_index("c9"), None);
    }
}
