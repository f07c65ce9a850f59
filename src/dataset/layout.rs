//! 画像ディレクトリの走査と出力先レイアウトの作成
//!
//! 入力は `<root>/<カテゴリ>/<ファイル>` の2階層を前提とします。
//! `.DS_Store` のような隠しエントリはカテゴリとしてもファイルとしても扱いません。

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 分類ラベルに対応するディレクトリ
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Category {
    /// ディレクトリ名（ラベル）
    pub name: String,
    pub path: PathBuf,
}

/// OSのメタデータなどの隠しエントリかどうか
pub fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// ルート直下のカテゴリディレクトリを名前順で列挙
///
/// ディレクトリ以外のエントリと隠しエントリは警告を出してスキップします。
pub fn discover_categories(root: &Path) -> Result<Vec<Category>> {
    let mut categories = Vec::new();

    let entries = std::fs::read_dir(root)
        .with_context(|| format!("Failed to read source directory: {}", root.display()))?;

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let path = entry.path();

        if is_hidden(&name) {
            debug!("隠しエントリをスキップ: {}", path.display());
            continue;
        }

        if !path.is_dir() {
            warn!("カテゴリディレクトリではないためスキップ: {}", path.display());
            continue;
        }

        match name.to_str() {
            Some(name) => categories.push(Category {
                name: name.to_string(),
                path,
            }),
            None => warn!("ディレクトリ名がUTF-8ではないためスキップ: {}", path.display()),
        }
    }

    categories.sort();
    Ok(categories)
}

/// カテゴリ内のファイルを名前順で列挙
///
/// サブディレクトリと隠しファイルは対象外です。
pub fn list_category_files(category: &Category) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let entries = std::fs::read_dir(&category.path).with_context(|| {
        format!("Failed to read category directory: {}", category.path.display())
    })?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        if is_hidden(&entry.file_name()) {
            debug!("隠しファイルをスキップ: {}", path.display());
            continue;
        }

        if path.is_dir() {
            warn!("カテゴリ内のサブディレクトリはスキップします: {}", path.display());
            continue;
        }

        files.push(path);
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// `<root>/<カテゴリ>` ディレクトリを作成（存在する場合は何もしない）
///
/// 新たに作成したディレクトリ数を返します。
pub fn prepare_layout<'a, I>(root: &Path, category_names: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut created = 0;

    for name in category_names {
        let dir = root.join(name);
        if dir.is_dir() {
            continue;
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        debug!("ディレクトリを作成: {}", dir.display());
        created += 1;
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_hidden() {
        assert!(is_hidden(OsStr::new(".DS_Store")));
        assert!(is_hidden(OsStr::new(".git")));
        assert!(!is_hidden(OsStr::new("c0")));
        assert!(!is_hidden(OsStr::new("img_1.jpg")));
    }

    #[test]
    fn test_discover_categories_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["c2", "c0", "c1", ".DS_Store"] {
            fs::create_dir_all(tmp.path().join(name)).unwrap();
        }
        fs::write(tmp.path().join("README.txt"), b"stray").unwrap();

        let categories = discover_categories(tmp.path()).unwrap();
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn test_list_category_files_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("c0");
        fs::create_dir_all(dir.join("nested")).unwrap();
        for name in ["b.jpg", "a.jpg", "c.jpg", ".DS_Store"] {
            fs::write(dir.join(name), name.as_bytes()).unwrap();
        }

        let category = Category {
            name: "c0".to_string(),
            path: dir,
        };
        let files = list_category_files(&category).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn test_prepare_layout_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("TrainingData");

        assert_eq!(prepare_layout(&root, ["c0", "c1"]).unwrap(), 2);
        assert!(root.join("c0").is_dir());
        assert!(root.join("c1").is_dir());
        assert_eq!(prepare_layout(&root, ["c0", "c1", "c2"]).unwrap(), 1);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_categories(&tmp.path().join("does_not_exist")).is_err());
    }
}
