//! 学習用画像のパーティショナ
//!
//! 元画像ディレクトリの各ファイルを Training / Validation / Test のいずれかへ
//! コピーします（サンプルモードではカテゴリごとに少数のみコピー）。
//! 元ファイルは変更・削除しません。

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::dataset::layout::{discover_categories, list_category_files, prepare_layout, Category};
use crate::dataset::split::{DrawSource, Split};
use crate::model::config::PartitionSettings;

/// 実行モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    /// カテゴリごとに少数の画像のみコピー
    Sample,
    /// すべての画像を3つの分割先に振り分け
    FullSplit,
}

impl PartitionMode {
    /// コマンドライン引数から判定（"sample" 以外はすべて FullSplit）
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some("sample") => PartitionMode::Sample,
            _ => PartitionMode::FullSplit,
        }
    }

    /// 出力先のルートディレクトリ
    pub fn destination_root<'a>(&self, settings: &'a PartitionSettings) -> &'a Path {
        match self {
            PartitionMode::Sample => &settings.sample_dir,
            PartitionMode::FullSplit => &settings.split_dir,
        }
    }
}

/// カテゴリごとのコピー枚数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub training: usize,
    pub validation: usize,
    pub test: usize,
    pub sampled: usize,
}

impl CategoryCounts {
    fn record(&mut self, split: Option<Split>) {
        match split {
            Some(Split::Training) => self.training += 1,
            Some(Split::Validation) => self.validation += 1,
            Some(Split::Test) => self.test += 1,
            None => self.sampled += 1,
        }
    }

    pub fn get(&self, split: Split) -> usize {
        match split {
            Split::Training => self.training,
            Split::Validation => self.validation,
            Split::Test => self.test,
        }
    }

    pub fn total(&self) -> usize {
        self.training + self.validation + self.test + self.sampled
    }
}

/// コピー1件分の記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub category: String,
    /// サンプルモードでは `None`
    pub split: Option<Split>,
}

#[derive(Serialize)]
struct ManifestRow<'a> {
    file: String,
    category: &'a str,
    split: String,
    destination: String,
}

/// 実行結果
#[derive(Debug, Clone)]
pub struct PartitionReport {
    pub mode: PartitionMode,
    pub destination_root: PathBuf,
    pub counts: BTreeMap<String, CategoryCounts>,
    pub copies: Vec<CopyRecord>,
    /// 新たに作成した出力先ディレクトリ数
    pub created_dirs: usize,
}

impl PartitionReport {
    fn new(mode: PartitionMode, destination_root: PathBuf) -> Self {
        Self {
            mode,
            destination_root,
            counts: BTreeMap::new(),
            copies: Vec::new(),
            created_dirs: 0,
        }
    }

    fn record(&mut self, record: CopyRecord) {
        self.counts
            .entry(record.category.clone())
            .or_default()
            .record(record.split);
        self.copies.push(record);
    }

    /// コピーしたファイル総数
    pub fn total_copied(&self) -> usize {
        self.copies.len()
    }

    /// 指定した分割先へコピーしたファイル数
    pub fn split_total(&self, split: Split) -> usize {
        self.counts.values().map(|c| c.get(split)).sum()
    }

    /// コピー結果をCSVに書き出す
    pub fn write_manifest(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create manifest directory: {}", parent.display())
                })?;
            }
        }

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create manifest: {}", path.display()))?;

        for copy in &self.copies {
            let file = copy
                .source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            writer.serialize(ManifestRow {
                file,
                category: &copy.category,
                split: copy
                    .split
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "sample".to_string()),
                destination: copy.destination.display().to_string(),
            })?;
        }

        writer.flush()?;
        Ok(())
    }

    /// カテゴリごとの集計を表示
    pub fn print_summary(&self) {
        println!("\n=== 分割結果 ({}) ===", self.destination_root.display());
        match self.mode {
            PartitionMode::Sample => {
                println!("{:<12} {:>8}", "category", "sample");
                for (name, counts) in &self.counts {
                    println!("{:<12} {:>8}", name, counts.sampled);
                }
            }
            PartitionMode::FullSplit => {
                println!(
                    "{:<12} {:>10} {:>10} {:>10}",
                    "category", "training", "validation", "test"
                );
                for (name, counts) in &self.counts {
                    println!(
                        "{:<12} {:>10} {:>10} {:>10}",
                        name, counts.training, counts.validation, counts.test
                    );
                }
                println!(
                    "{:<12} {:>10} {:>10} {:>10}",
                    "total",
                    self.split_total(Split::Training),
                    self.split_total(Split::Validation),
                    self.split_total(Split::Test)
                );
            }
        }
        println!("コピー総数: {}", self.total_copied());
        println!("========================");
    }
}

/// データ分割を実行
///
/// 抽選値がどの分割先にも対応しない場合は、その時点で処理全体を中断します。
/// コピー済みのファイルはそのまま残ります。
pub fn partition(
    settings: &PartitionSettings,
    mode: PartitionMode,
    draws: &mut dyn DrawSource,
) -> Result<PartitionReport> {
    let destination_root = mode.destination_root(settings).to_path_buf();
    let categories = discover_categories(&settings.source_dir)?;
    info!(
        "{} 個のカテゴリを検出しました: {}",
        categories.len(),
        settings.source_dir.display()
    );

    let mut report = PartitionReport::new(mode, destination_root.clone());

    if settings.create_missing_dirs {
        report.created_dirs = create_destination_dirs(&destination_root, mode, &categories)?;
        if report.created_dirs > 0 {
            info!("出力先ディレクトリを {} 個作成しました", report.created_dirs);
        }
    }

    for category in &categories {
        let files = list_category_files(category)?;

        match mode {
            PartitionMode::Sample => {
                let dst_dir = destination_root.join(&category.name);
                for source in files.iter().take(settings.sample_per_category) {
                    let destination = copy_into(source, &dst_dir)?;
                    report.record(CopyRecord {
                        source: source.clone(),
                        destination,
                        category: category.name.clone(),
                        split: None,
                    });
                }
            }
            PartitionMode::FullSplit => {
                for source in &files {
                    let value = draws.draw();
                    let split = match settings.thresholds.assign(value) {
                        Some(split) => split,
                        None => anyhow::bail!(
                            "File does not belong to any set (training, validation, test): {} (draw = {})",
                            source.display(),
                            value
                        ),
                    };

                    let dst_dir = destination_root.join(split.dir_name()).join(&category.name);
                    let destination = copy_into(source, &dst_dir)?;
                    report.record(CopyRecord {
                        source: source.clone(),
                        destination,
                        category: category.name.clone(),
                        split: Some(split),
                    });
                }
            }
        }

        let copied = report
            .counts
            .get(&category.name)
            .map(|c| c.total())
            .unwrap_or(0);
        info!(
            "カテゴリ '{}': {} / {} 枚をコピーしました",
            category.name,
            copied,
            files.len()
        );
    }

    Ok(report)
}

/// モードに応じた出力先のカテゴリディレクトリを作成
fn create_destination_dirs(
    destination_root: &Path,
    mode: PartitionMode,
    categories: &[Category],
) -> Result<usize> {
    let names = || categories.iter().map(|c| c.name.as_str());

    match mode {
        PartitionMode::Sample => prepare_layout(destination_root, names()),
        PartitionMode::FullSplit => {
            let mut created = 0;
            for split in Split::ALL {
                created += prepare_layout(&destination_root.join(split.dir_name()), names())?;
            }
            Ok(created)
        }
    }
}

/// ファイル名を保ったまま `dst_dir` にコピー（既存ファイルは上書き）
fn copy_into(source: &Path, dst_dir: &Path) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid file path: {}", source.display()))?;
    let destination = dst_dir.join(file_name);

    std::fs::copy(source, &destination).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            source.display(),
            destination.display()
        )
    })?;
    debug!("{} -> {}", source.display(), destination.display());

    Ok(destination)
}
