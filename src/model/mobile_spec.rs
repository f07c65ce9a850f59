//! モバイル推論形式のモデル記述
//!
//! 入出力フィーチャの名前と型、作成者などの説明情報を保持します。
//! 画像入力には基本サイズに加えて、推論時に受け付ける
//! 列挙サイズ（enumerated sizes）を追加できます。

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 画像サイズ（高さ x 幅）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
}

impl ImageSize {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// `"<高さ>x<幅>"` 形式（例: `480x640`）
impl FromStr for ImageSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (height, width) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow::anyhow!("画像サイズは <高さ>x<幅> の形式で指定してください: {}", s))?;
        let height: u32 = height.trim().parse()?;
        let width: u32 = width.trim().parse()?;
        if height == 0 || width == 0 {
            anyhow::bail!("画像サイズに0は指定できません: {}", s);
        }
        Ok(Self { height, width })
    }
}

/// 画像の色空間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Rgb,
    Grayscale,
}

/// 画像フィーチャの型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFeatureType {
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpace,
    /// 基本サイズ以外に受け付けるサイズ
    #[serde(default)]
    pub enumerated_sizes: Vec<ImageSize>,
}

/// フィーチャの型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FeatureType {
    Image(ImageFeatureType),
    MultiArray { shape: Vec<usize> },
    Dictionary { labels: Vec<String> },
}

/// 入力または出力のフィーチャ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescription {
    pub name: String,
    #[serde(default)]
    pub short_description: String,
    pub feature_type: FeatureType,
}

/// 作成者などの説明情報
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionMetadata {
    pub author: String,
    pub short_description: String,
    pub license: String,
    pub version: String,
}

/// モデルの入出力記述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescription {
    pub inputs: Vec<FeatureDescription>,
    pub outputs: Vec<FeatureDescription>,
    #[serde(default)]
    pub metadata: DescriptionMetadata,
}

impl ModelDescription {
    /// 画像1枚を入力し、クラスごとの確率を出力する分類器の記述
    pub fn image_classifier(
        input_name: &str,
        output_name: &str,
        width: u32,
        height: u32,
        class_labels: &[String],
        metadata: DescriptionMetadata,
    ) -> Self {
        Self {
            inputs: vec![FeatureDescription {
                name: input_name.to_string(),
                short_description: String::new(),
                feature_type: FeatureType::Image(ImageFeatureType {
                    width,
                    height,
                    color_space: ColorSpace::Rgb,
                    enumerated_sizes: Vec::new(),
                }),
            }],
            outputs: vec![FeatureDescription {
                name: output_name.to_string(),
                short_description: String::new(),
                feature_type: FeatureType::Dictionary {
                    labels: class_labels.to_vec(),
                },
            }],
            metadata,
        }
    }

    pub fn input(&self, name: &str) -> Option<&FeatureDescription> {
        self.inputs.iter().find(|f| f.name == name)
    }

    /// 入力画像の受け付け可能サイズ（基本サイズ + 列挙サイズ）
    pub fn accepted_image_sizes(&self, feature_name: &str) -> Option<Vec<ImageSize>> {
        match &self.input(feature_name)?.feature_type {
            FeatureType::Image(image) => {
                let mut sizes = vec![ImageSize::new(image.height, image.width)];
                for size in &image.enumerated_sizes {
                    if !sizes.contains(size) {
                        sizes.push(*size);
                    }
                }
                Some(sizes)
            }
            _ => None,
        }
    }
}

/// 画像入力に受け付け可能なサイズを追加
///
/// 既に登録済みのサイズは無視します。追加したサイズ数を返します。
pub fn add_enumerated_image_sizes(
    description: &mut ModelDescription,
    feature_name: &str,
    sizes: &[ImageSize],
) -> Result<usize> {
    let available: Vec<String> = description.inputs.iter().map(|f| f.name.clone()).collect();
    let feature = description
        .inputs
        .iter_mut()
        .find(|f| f.name == feature_name)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "入力フィーチャ '{}' が見つかりません (利用可能: {})",
                feature_name,
                available.join(", ")
            )
        })?;

    let image = match &mut feature.feature_type {
        FeatureType::Image(image) => image,
        _ => anyhow::bail!("入力フィーチャ '{}' は画像型ではありません", feature_name),
    };

    // 基本サイズが列挙に含まれていないと、追加後に基本サイズで推論できなくなる
    let base = ImageSize::new(image.height, image.width);
    if image.enumerated_sizes.is_empty() && !sizes.is_empty() {
        image.enumerated_sizes.push(base);
    }

    let mut added = 0;
    for size in sizes {
        if !image.enumerated_sizes.contains(size) {
            image.enumerated_sizes.push(*size);
            added += 1;
        }
    }

    Ok(added)
}

impl std::fmt::Display for FeatureDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  {{")?;
        writeln!(f, "    name: \"{}\"", self.name)?;
        if !self.short_description.is_empty() {
            writeln!(f, "    shortDescription: \"{}\"", self.short_description)?;
        }
        match &self.feature_type {
            FeatureType::Image(image) => {
                writeln!(f, "    type {{ imageType {{")?;
                writeln!(f, "      width: {}", image.width)?;
                writeln!(f, "      height: {}", image.height)?;
                writeln!(f, "      colorSpace: {:?}", image.color_space)?;
                if !image.enumerated_sizes.is_empty() {
                    writeln!(f, "      enumeratedSizes {{")?;
                    for size in &image.enumerated_sizes {
                        writeln!(
                            f,
                            "        sizes {{ width: {} height: {} }}",
                            size.width, size.height
                        )?;
                    }
                    writeln!(f, "      }}")?;
                }
                writeln!(f, "    }} }}")?;
            }
            FeatureType::MultiArray { shape } => {
                writeln!(f, "    type {{ multiArrayType {{ shape: {:?} }} }}", shape)?;
            }
            FeatureType::Dictionary { labels } => {
                writeln!(f, "    type {{ dictionaryType {{ labels: [{}] }} }}", labels.join(", "))?;
            }
        }
        write!(f, "  }}")
    }
}

impl std::fmt::Display for ModelDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for input in &self.inputs {
            writeln!(f, "input")?;
            writeln!(f, "{}", input)?;
        }
        for output in &self.outputs {
            writeln!(f, "output")?;
            writeln!(f, "{}", output)?;
        }
        writeln!(f, "metadata {{")?;
        writeln!(f, "  shortDescription: \"{}\"", self.metadata.short_description)?;
        writeln!(f, "  versionString: \"{}\"", self.metadata.version)?;
        writeln!(f, "  author: \"{}\"", self.metadata.author)?;
        writeln!(f, "  license: \"{}\"", self.metadata.license)?;
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        (0..10).map(|i| format!("c{}", i)).collect()
    }

    fn classifier() -> ModelDescription {
        ModelDescription::image_classifier(
            "input1",
            "output1",
            360,
            480,
            &labels(),
            DescriptionMetadata::default(),
        )
    }

    #[test]
    fn test_parse_image_size() {
        assert_eq!("480x640".parse::<ImageSize>().unwrap(), ImageSize::new(480, 640));
        assert_eq!(" 299 X 299 ".trim().parse::<ImageSize>().unwrap(), ImageSize::new(299, 299));
        assert!("480".parse::<ImageSize>().is_err());
        assert!("0x640".parse::<ImageSize>().is_err());
        assert!("ax640".parse::<ImageSize>().is_err());
    }

    #[test]
    fn test_add_enumerated_sizes_keeps_base_size() {
        let mut description = classifier();
        let added =
            add_enumerated_image_sizes(&mut description, "input1", &[ImageSize::new(480, 640)])
                .unwrap();
        assert_eq!(added, 1);

        let sizes = description.accepted_image_sizes("input1").unwrap();
        assert_eq!(sizes, vec![ImageSize::new(480, 360), ImageSize::new(480, 640)]);
    }

    #[test]
    fn test_add_enumerated_sizes_is_deduplicated() {
        let mut description = classifier();
        let size = ImageSize::new(480, 640);
        add_enumerated_image_sizes(&mut description, "input1", &[size, size]).unwrap();
        let added = add_enumerated_image_sizes(&mut description, "input1", &[size]).unwrap();
        assert_eq!(added, 0);

        match &description.inputs[0].feature_type {
            FeatureType::Image(image) => assert_eq!(image.enumerated_sizes.len(), 2),
            other => panic!("unexpected feature type: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_or_non_image_feature_is_rejected() {
        let mut description = classifier();
        let size = [ImageSize::new(480, 640)];
        assert!(add_enumerated_image_sizes(&mut description, "image", &size).is_err());

        description.inputs.push(FeatureDescription {
            name: "features".to_string(),
            short_description: String::new(),
            feature_type: FeatureType::MultiArray { shape: vec![3] },
        });
        assert!(add_enumerated_image_sizes(&mut description, "features", &size).is_err());
    }

    #[test]
    fn test_display_mentions_enumerated_sizes() {
        let mut description = classifier();
        assert!(!description.to_string().contains("enumeratedSizes"));

        add_enumerated_image_sizes(&mut description, "input1", &[ImageSize::new(480, 640)])
            .unwrap();
        let text = description.to_string();
        assert!(text.contains("enumeratedSizes"));
        assert!(text.contains("sizes { width: 640 height: 480 }"));
    }

    #[test]
    fn test_json_round_trip_of_feature_type() {
        let description = classifier();
        let json = serde_json::to_string(&description).unwrap();
        assert!(json.contains("\"type\":\"image\""));
        let back: ModelDescription = serde_json::from_str(&json).unwrap();
        assert_eq!(back, description);
    }
}
