//! 学習時のデータ拡張
//!
//! 画像中心を基準にした拡大縮小・せん断と、左右反転を行います。
//! 範囲外の座標は最も近い端の画素で埋めます。

use image::{ImageBuffer, RgbImage};
use rand::Rng;

use crate::model::config::AugmentationSettings;

/// 設定に従ってランダムにデータ拡張を適用
pub fn augment<R: Rng>(image: RgbImage, settings: &AugmentationSettings, rng: &mut R) -> RgbImage {
    let zoom_range = settings.zoom_range.max(0.0);
    let (zoom_x, zoom_y) = if zoom_range > 0.0 {
        (
            rng.gen_range(1.0 - zoom_range..=1.0 + zoom_range),
            rng.gen_range(1.0 - zoom_range..=1.0 + zoom_range),
        )
    } else {
        (1.0, 1.0)
    };

    let shear_range = settings.shear_range.max(0.0);
    let shear = if shear_range > 0.0 {
        rng.gen_range(-shear_range..=shear_range).to_radians().tan()
    } else {
        0.0
    };

    let mut output = if zoom_x == 1.0 && zoom_y == 1.0 && shear == 0.0 {
        image
    } else {
        affine_transform(&image, zoom_x, zoom_y, shear)
    };

    if settings.horizontal_flip && rng.gen_bool(0.5) {
        output = image::imageops::flip_horizontal(&output);
    }

    output
}

/// 出力画素 (x, y) を元画像の座標へ逆写像して最近傍の画素を取る
///
/// `shear` はせん断角の正接です。
pub fn affine_transform(image: &RgbImage, zoom_x: f32, zoom_y: f32, shear: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;

    ImageBuffer::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let src_x = (cx + zoom_x * (dx + shear * dy)).round().clamp(0.0, max_x);
        let src_y = (cy + zoom_y * dy).round().clamp(0.0, max_y);
        *image.get_pixel(src_x as u32, src_y as u32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, (x + y) as u8]))
    }

    #[test]
    fn test_identity_transform() {
        let image = gradient(16, 12);
        assert_eq!(affine_transform(&image, 1.0, 1.0, 0.0), image);
    }

    #[test]
    fn test_zoom_in_keeps_center() {
        let image = gradient(17, 17);
        let zoomed = affine_transform(&image, 0.5, 0.5, 0.0);
        assert_eq!(zoomed.get_pixel(8, 8), image.get_pixel(8, 8));
        // 拡大すると端の画素は中心寄りの画素になる
        assert_eq!(zoomed.get_pixel(0, 8), image.get_pixel(4, 8));
    }

    #[test]
    fn test_zoom_out_clamps_to_edges() {
        let image = gradient(9, 9);
        let zoomed = affine_transform(&image, 2.0, 2.0, 0.0);
        assert_eq!(zoomed.get_pixel(0, 0), image.get_pixel(0, 0));
        assert_eq!(zoomed.get_pixel(8, 8), image.get_pixel(8, 8));
    }

    #[test]
    fn test_disabled_augmentation_is_noop() {
        let settings = AugmentationSettings {
            shear_range: 0.0,
            zoom_range: 0.0,
            horizontal_flip: false,
        };
        let image = gradient(10, 6);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(augment(image.clone(), &settings, &mut rng), image);
    }

    #[test]
    fn test_flip_only_yields_original_or_mirror() {
        let settings = AugmentationSettings {
            shear_range: 0.0,
            zoom_range: 0.0,
            horizontal_flip: true,
        };
        let image = gradient(10, 6);
        let mirrored = image::imageops::flip_horizontal(&image);
        let mut rng = StdRng::seed_from_u64(3);

        let mut seen_flip = false;
        let mut seen_original = false;
        for _ in 0..32 {
            let out = augment(image.clone(), &settings, &mut rng);
            if out == mirrored {
                seen_flip = true;
            } else {
                assert_eq!(out, image);
                seen_original = true;
            }
        }
        assert!(seen_flip && seen_original);
    }

    #[test]
    fn test_augment_preserves_dimensions() {
        let settings = AugmentationSettings::default();
        let mut rng = StdRng::seed_from_u64(11);
        let out = augment(gradient(40, 30), &settings, &mut rng);
        assert_eq!(out.dimensions(), (40, 30));
    }
}
