//! データ分割の割り当て
//!
//! ファイルごとに [0, 100] の整数を1つ引き、固定の閾値で分割先を決めます。
//!
//! | 値                               | 分割先     |
//! |----------------------------------|------------|
//! | `value < training_below`         | Training   |
//! | `value < validation_below`       | Validation |
//! | `value <= DRAW_MAX`              | Test       |
//!
//! 乱数源は [`DrawSource`] として注入します。本番では未シードの
//! `thread_rng` を使うため、実行ごとに分割結果が変わります。

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 1回の抽選で得られる値の上限（この値を含む）
pub const DRAW_MAX: u32 = 100;

/// 分割先
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Split {
    Training,
    Validation,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Training, Split::Validation, Split::Test];

    /// 出力先のディレクトリ名
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Training => "TrainingData",
            Split::Validation => "ValidationData",
            Split::Test => "TestData",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Training => write!(f, "training"),
            Split::Validation => write!(f, "validation"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// 分割の閾値
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitThresholds {
    /// この値未満は Training
    pub training_below: u32,
    /// この値未満（かつ training_below 以上）は Validation、それ以外は Test
    pub validation_below: u32,
}

impl Default for SplitThresholds {
    fn default() -> Self {
        Self {
            training_below: 75,
            validation_below: 80,
        }
    }
}

impl SplitThresholds {
    /// 閾値の整合性を検証
    pub fn validate(&self) -> Result<()> {
        if self.training_below > self.validation_below {
            anyhow::bail!(
                "training_below ({}) は validation_below ({}) 以下である必要があります",
                self.training_below,
                self.validation_below
            );
        }
        if self.validation_below > DRAW_MAX + 1 {
            anyhow::bail!(
                "validation_below ({}) は {} 以下である必要があります",
                self.validation_below,
                DRAW_MAX + 1
            );
        }
        Ok(())
    }

    /// 抽選値を分割先に変換
    ///
    /// 値が [0, DRAW_MAX] の範囲外の場合は `None` を返します。
    pub fn assign(&self, value: u32) -> Option<Split> {
        if value < self.training_below {
            Some(Split::Training)
        } else if value < self.validation_below {
            Some(Split::Validation)
        } else if value <= DRAW_MAX {
            Some(Split::Test)
        } else {
            None
        }
    }

    /// 各分割先に割り当てられる確率の理論値
    pub fn expected_share(&self, split: Split) -> f64 {
        let total = (DRAW_MAX + 1) as f64;
        let training_end = self.training_below.min(DRAW_MAX + 1);
        let validation_end = self.validation_below.clamp(training_end, DRAW_MAX + 1);

        let width = match split {
            Split::Training => training_end,
            Split::Validation => validation_end - training_end,
            Split::Test => DRAW_MAX + 1 - validation_end,
        };
        width as f64 / total
    }
}

/// 分割用の抽選値の供給源
pub trait DrawSource {
    /// [0, DRAW_MAX] の値を1つ返す
    fn draw(&mut self) -> u32;
}

/// 任意の乱数生成器による一様抽選
pub struct RngDraws<R> {
    rng: R,
}

impl<R: Rng> RngDraws<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> DrawSource for RngDraws<R> {
    fn draw(&mut self) -> u32 {
        self.rng.gen_range(0..=DRAW_MAX)
    }
}

/// 事前に決めた値を順番に返す抽選源
///
/// 値を使い切った後は範囲外の値（`u32::MAX`）を返します。
#[derive(Debug, Clone, Default)]
pub struct ScriptedDraws {
    values: VecDeque<u32>,
}

impl ScriptedDraws {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

impl DrawSource for ScriptedDraws {
    fn draw(&mut self) -> u32 {
        self.values.pop_front().unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_assign_boundaries() {
        let thresholds = SplitThresholds::default();
        assert_eq!(thresholds.assign(0), Some(Split::Training));
        assert_eq!(thresholds.assign(74), Some(Split::Training));
        assert_eq!(thresholds.assign(75), Some(Split::Validation));
        assert_eq!(thresholds.assign(79), Some(Split::Validation));
        assert_eq!(thresholds.assign(80), Some(Split::Test));
        assert_eq!(thresholds.assign(100), Some(Split::Test));
        assert_eq!(thresholds.assign(101), None);
    }

    #[test]
    fn test_every_draw_maps_to_exactly_one_split() {
        let thresholds = SplitThresholds::default();
        for value in 0..=DRAW_MAX {
            assert!(thresholds.assign(value).is_some(), "value {} unassigned", value);
        }
    }

    #[test]
    fn test_validate() {
        assert!(SplitThresholds::default().validate().is_ok());
        assert!(SplitThresholds { training_below: 90, validation_below: 80 }.validate().is_err());
        assert!(SplitThresholds { training_below: 0, validation_below: 102 }.validate().is_err());
        assert!(SplitThresholds { training_below: 101, validation_below: 101 }.validate().is_ok());
    }

    #[test]
    fn test_expected_share_sums_to_one() {
        let thresholds = SplitThresholds::default();
        let total: f64 = Split::ALL.iter().map(|s| thresholds.expected_share(*s)).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((thresholds.expected_share(Split::Validation) - 5.0 / 101.0).abs() < 1e-12);
    }

    #[test]
    fn test_proportions_converge() {
        let thresholds = SplitThresholds::default();
        let mut draws = RngDraws::new(StdRng::seed_from_u64(7));
        let trials = 200_000;
        let mut counts = [0usize; 3];

        for _ in 0..trials {
            let value = draws.draw();
            assert!(value <= DRAW_MAX);
            match thresholds.assign(value) {
                Some(Split::Training) => counts[0] += 1,
                Some(Split::Validation) => counts[1] += 1,
                Some(Split::Test) => counts[2] += 1,
                None => panic!("draw {} out of range", value),
            }
        }

        for (i, split) in Split::ALL.iter().enumerate() {
            let observed = counts[i] as f64 / trials as f64;
            let expected = thresholds.expected_share(*split);
            assert!(
                (observed - expected).abs() < 0.01,
                "{}: observed {} expected {}",
                split,
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_scripted_draws_run_out_of_range() {
        let mut draws = ScriptedDraws::new([3, 77]);
        assert_eq!(draws.draw(), 3);
        assert_eq!(draws.remaining(), 1);
        assert_eq!(draws.draw(), 77);
        assert_eq!(draws.draw(), u32::MAX);
    }

    #[test]
    fn test_dir_names() {
        assert_eq!(Split::Training.dir_name(), "TrainingData");
        assert_eq!(Split::Validation.dir_name(), "ValidationData");
        assert_eq!(Split::Test.dir_name(), "TestData");
    }
}
