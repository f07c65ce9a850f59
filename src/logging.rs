//! ログ出力の初期化
//!
//! 各バイナリの `main` の先頭で一度だけ呼び出します。
//! `RUST_LOG` が設定されていればそれに従い、未設定なら `info` レベルで出力します。

use tracing_subscriber::EnvFilter;

/// tracing のフォーマッタを標準エラー出力に登録
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // テストなどで二重に初期化された場合は無視する
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
