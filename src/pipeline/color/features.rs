//! Illumination-normalised colour fingerprint of a nail region.
//!
//! Every nail statistic is divided by the same statistic of a reference
//! region captured in the same frame, which cancels most of the ambient
//! lighting and white-balance variation between phones.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::regions::center_crop;
use super::spaces::{gray, is_saturated, rgb_to_hls, rgb_to_hsv, rgb_to_lab, rgb_to_yiq};
use super::stats::{ratio, ChannelStats};
use crate::pipeline::{FeatureVector, RawImage};

/// Length of the assembled feature vector.
pub const COLOR_FEATURE_DIM: usize = 332;

/// Percentile grid: 5, 10, …, 90.
pub const PERCENTILES: [u32; 18] = [
    5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60, 65, 70, 75, 80, 85, 90,
];

/// Regions larger than this are subsampled.
pub const MAX_PIXELS: usize = 80_000;

/// Fixed seed so subsampling is reproducible across calls.
const SUBSAMPLE_SEED: u64 = 0x5EED_0A1E;

/// Feature name prefix used by the fitted artifacts.
pub const DEFAULT_PREFIX: &str = "NAIL";

/// All channel samples of one region.
struct RegionStats {
    rgb: [ChannelStats; 3],
    hls: [ChannelStats; 3],
    hsv: [ChannelStats; 3],
    lab: [ChannelStats; 3],
    yiq: [ChannelStats; 3],
    gray: ChannelStats,
    saturated_fraction: f64,
}

impl RegionStats {
    fn from_pixels(pixels: &[[u8; 3]]) -> Self {
        let n = pixels.len();
        let mut columns: [Vec<f32>; 16] = std::array::from_fn(|_| Vec::with_capacity(n));
        let mut saturated = 0usize;

        for &px in pixels {
            let [r, g, b] = px;
            let hls = rgb_to_hls(px);
            let hsv = rgb_to_hsv(px);
            let lab = rgb_to_lab(px);
            let yiq = rgb_to_yiq(px);
            let row = [
                r as f32, g as f32, b as f32, hls[0], hls[1], hls[2], hsv[0], hsv[1], hsv[2],
                lab[0], lab[1], lab[2], yiq[0], yiq[1], yiq[2], gray(px),
            ];
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
            if is_saturated(px) {
                saturated += 1;
            }
        }

        let [r, g, b, hls_h, hls_l, hls_s, hsv_h, hsv_s, hsv_v, lab_l, lab_a, lab_b, y, i, q, gray] =
            columns.map(ChannelStats::new);

        Self {
            rgb: [r, g, b],
            hls: [hls_h, hls_l, hls_s],
            hsv: [hsv_h, hsv_s, hsv_v],
            lab: [lab_l, lab_a, lab_b],
            yiq: [y, i, q],
            gray,
            saturated_fraction: saturated as f64 / n.max(1) as f64,
        }
    }
}

/// Centre-crop and flatten a region, subsampling large regions.
fn region_pixels(region: &RawImage) -> Vec<[u8; 3]> {
    let cropped = center_crop(region);
    let pixels: Vec<[u8; 3]> = cropped.pixels().pixels().map(|p| p.0).collect();
    if pixels.len() <= MAX_PIXELS {
        return pixels;
    }
    let mut rng = StdRng::seed_from_u64(SUBSAMPLE_SEED);
    rand::seq::index::sample(&mut rng, pixels.len(), MAX_PIXELS)
        .into_iter()
        .map(|i| pixels[i])
        .collect()
}

fn percentile_key(prefix: &str, channel: &str, p: u32) -> String {
    format!("{prefix}_{channel}_p={p}")
}

/// Compute the named colour features of `nail` against `reference`.
///
/// Keys are `<prefix>_<feature>`; the map iterates in the key order the
/// assembled vector uses.
pub fn color_feature_map(
    nail: &RawImage,
    reference: &RawImage,
    prefix: &str,
) -> BTreeMap<String, f32> {
    let n = RegionStats::from_pixels(&region_pixels(nail));
    let w = RegionStats::from_pixels(&region_pixels(reference));
    let mut features: BTreeMap<String, f64> = BTreeMap::new();

    // Absolute (non-ratio) scalars
    features.insert(format!("{prefix}_WHITE_Lab_L_MED"), w.lab[0].median());
    features.insert(format!("{prefix}_WHITE_sat_frac"), w.saturated_fraction);
    features.insert(format!("{prefix}_NAIL_sat_frac"), n.saturated_fraction);
    features.insert(format!("{prefix}_WHITE_gray_MED"), w.gray.median());

    // RGB normalised by the reference
    for (idx, name) in ["R", "G", "B"].into_iter().enumerate() {
        let (nc, wc) = (&n.rgb[idx], &w.rgb[idx]);
        features.insert(format!("{prefix}_{name}_MEAN"), ratio(nc.mean(), wc.mean()));
        features.insert(format!("{prefix}_{name}_STD"), ratio(nc.std(), wc.std()));
        for p in PERCENTILES {
            let pf = p as f64;
            features.insert(
                percentile_key(prefix, name, p),
                ratio(nc.percentile(pf), wc.percentile(pf)),
            );
        }
    }

    // Cross-channel terms on the normalised values
    let mean = |f: &BTreeMap<String, f64>, c: &str| {
        f.get(&format!("{prefix}_{c}_MEAN")).copied().unwrap_or(0.0)
    };
    let (r, g, b) = (mean(&features, "R"), mean(&features, "G"), mean(&features, "B"));
    features.insert(format!("{prefix}_R-G_MEAN"), r - g);
    features.insert(format!("{prefix}_R-B_MEAN"), r - b);
    features.insert(format!("{prefix}_G-B_MEAN"), g - b);
    features.insert(format!("{prefix}_R+B_MEAN"), r + b);
    for p in PERCENTILES {
        let get = |c: &str| {
            features
                .get(&percentile_key(prefix, c, p))
                .copied()
                .unwrap_or(0.0)
        };
        let sum = get("R") + get("B");
        features.insert(percentile_key(prefix, "R+B", p), sum);
    }

    // Median + percentile ratios for the derived spaces
    let spaces: [(&str, &[ChannelStats; 3], &[ChannelStats; 3], [&str; 3]); 3] = [
        ("HLS", &n.hls, &w.hls, ["H", "L", "S"]),
        ("HSV", &n.hsv, &w.hsv, ["H", "S", "V"]),
        ("LAB", &n.lab, &w.lab, ["L", "A", "B"]),
    ];
    for (space, nail_channels, ref_channels, names) in spaces {
        for idx in 0..3 {
            let channel = format!("{space}_{}", names[idx]);
            insert_median_and_percentiles(
                &mut features,
                prefix,
                &channel,
                &nail_channels[idx],
                &ref_channels[idx],
            );
        }
    }
    for (idx, name) in ["Y", "I", "Q"].into_iter().enumerate() {
        insert_median_and_percentiles(&mut features, prefix, name, &n.yiq[idx], &w.yiq[idx]);
    }

    // Grayscale: percentiles only
    for p in PERCENTILES {
        let pf = p as f64;
        features.insert(
            percentile_key(prefix, "gsc", p),
            ratio(n.gray.percentile(pf), w.gray.percentile(pf)),
        );
    }

    features.into_iter().map(|(k, v)| (k, v as f32)).collect()
}

fn insert_median_and_percentiles(
    features: &mut BTreeMap<String, f64>,
    prefix: &str,
    channel: &str,
    nail: &ChannelStats,
    reference: &ChannelStats,
) {
    features.insert(
        format!("{prefix}_{channel}_MEDIAN"),
        ratio(nail.median(), reference.median()),
    );
    for p in PERCENTILES {
        let pf = p as f64;
        features.insert(
            percentile_key(prefix, channel, p),
            ratio(nail.percentile(pf), reference.percentile(pf)),
        );
    }
}

/// 332 colour features of `nail` normalised by `reference`, in key order.
pub fn extract_color_features(nail: &RawImage, reference: &RawImage) -> FeatureVector {
    color_feature_map(nail, reference, DEFAULT_PREFIX)
        .into_values()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RawImage {
        RawImage::new(RgbImage::from_pixel(width, height, Rgb(color))).unwrap()
    }

    fn textured(width: u32, height: u32, seed: u32) -> RawImage {
        RawImage::new(RgbImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(31).wrapping_add(y.wrapping_mul(17)).wrapping_add(seed);
            Rgb([(v % 200 + 30) as u8, (v / 3 % 150 + 40) as u8, (v / 7 % 120 + 60) as u8])
        }))
        .unwrap()
    }

    #[test]
    fn vector_has_332_features() {
        let v = extract_color_features(&textured(100, 120, 1), &textured(100, 120, 9));
        assert_eq!(v.len(), COLOR_FEATURE_DIM);
        let map = color_feature_map(&textured(10, 10, 1), &solid(10, 10, [250, 250, 250]), "NAIL");
        assert_eq!(map.len(), COLOR_FEATURE_DIM);
    }

    #[test]
    fn length_does_not_depend_on_content() {
        let small = extract_color_features(&solid(1, 1, [0, 0, 0]), &solid(3, 2, [255, 255, 255]));
        let large = extract_color_features(&textured(300, 200, 4), &textured(250, 180, 5));
        assert_eq!(small.len(), large.len());
    }

    #[test]
    fn extraction_is_bit_identical_across_calls() {
        // 500x500 → 300x300 after the centre crop, above MAX_PIXELS.
        let nail = textured(500, 500, 3);
        let reference = textured(500, 500, 11);
        let a = extract_color_features(&nail, &reference);
        let b = extract_color_features(&nail, &reference);
        assert_eq!(
            a.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            b.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn keys_are_sorted_lexicographically() {
        let map = color_feature_map(&textured(20, 20, 1), &textured(20, 20, 2), "NAIL");
        let keys: Vec<&String> = map.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(keys.first().map(|k| k.as_str()), Some("NAIL_B_MEAN"));
    }

    #[test]
    fn identical_regions_give_unit_ratios() {
        let patch = solid(20, 20, [180, 120, 110]);
        let map = color_feature_map(&patch, &patch, "NAIL");
        assert!((map["NAIL_R_MEAN"] - 1.0).abs() < 1e-4);
        assert!((map["NAIL_LAB_L_MEDIAN"] - 1.0).abs() < 1e-4);
        assert!((map["NAIL_gsc_p=50"] - 1.0).abs() < 1e-4);
        assert!((map["NAIL_R+B_MEAN"] - 2.0).abs() < 1e-4);
        assert!(map["NAIL_R-G_MEAN"].abs() < 1e-4);
        // Zero spread on both sides: 0 / (0 + ε)
        assert_eq!(map["NAIL_R_STD"], 0.0);
    }

    #[test]
    fn ratios_follow_the_reference() {
        let nail = solid(20, 20, [100, 50, 25]);
        let white = solid(20, 20, [200, 200, 200]);
        let map = color_feature_map(&nail, &white, "NAIL");
        assert!((map["NAIL_R_MEAN"] - 0.5).abs() < 1e-4);
        assert!((map["NAIL_G_p=25"] - 0.25).abs() < 1e-4);
        assert!((map["NAIL_B_p=90"] - 0.125).abs() < 1e-4);
        assert!((map["NAIL_WHITE_gray_MED"] - 200.0).abs() < 1e-4);
    }

    #[test]
    fn saturation_fractions_are_absolute() {
        let nail = solid(10, 10, [255, 10, 10]);
        let white = solid(10, 10, [200, 200, 200]);
        let map = color_feature_map(&nail, &white, "NAIL");
        assert_eq!(map["NAIL_NAIL_sat_frac"], 1.0);
        assert_eq!(map["NAIL_WHITE_sat_frac"], 0.0);
    }

    #[test]
    fn prefix_does_not_change_values() {
        let nail = textured(30, 30, 1);
        let skin = textured(30, 30, 2);
        let a: Vec<f32> = color_feature_map(&nail, &skin, "NAIL").into_values().collect();
        let b: Vec<f32> = color_feature_map(&nail, &skin, "SKIN").into_values().collect();
        assert_eq!(a, b);
    }
}
