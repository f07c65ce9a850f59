//! Distracted Driver 画像分類プロジェクトの補助ツール群
//!
//! - `dataset`: 学習用画像を Training / Validation / Test に振り分けるパーティショナ
//! - `model`: 設定、モデルメタデータ、モデルバンドル（tar.gz）の永続化
//! - `ml`: Burn によるCNNの学習・変換・推論（`ml` フィーチャ）

#![recursion_limit = "256"]
pub mod logging;

pub mod dataset;
pub mod model;
#[cfg(feature = "ml")]
pub mod ml;

