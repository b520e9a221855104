//! Per-pixel colour space conversions.
//!
//! HLS, HSV and Lab follow the 8-bit conventions of the camera tooling the
//! fitted artifacts were trained against: hue in [0, 180), every other
//! channel in [0, 255], Lab with L scaled by 255/100 and a/b offset by 128
//! (D65 white point). YIQ works on [0, 1] RGB and is left unquantised.

/// YIQ transform rows applied to [0, 1] RGB.
const YIQ: [[f32; 3]; 3] = [
    [0.299, 0.587, 0.114],
    [0.5959, -0.2746, -0.3213],
    [0.2115, -0.5227, 0.3112],
];

/// D65 reference white used to normalise XYZ.
const WHITE_X: f32 = 0.950_456;
const WHITE_Z: f32 = 1.088_754;

/// sRGB → XYZ (D65).
const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412_453, 0.357_580, 0.180_423],
    [0.212_671, 0.715_160, 0.072_169],
    [0.019_334, 0.119_193, 0.950_227],
];

const LAB_EPSILON: f32 = 0.008_856;

/// Saturating conversion to the 8-bit range with round-half-to-even.
fn quantize(value: f32) -> f32 {
    value.round_ties_even().clamp(0.0, 255.0)
}

/// Fixed-point precision of the 8-bit HSV division tables.
const HSV_SHIFT: u32 = 12;
const HSV_ROUND: i32 = 1 << (HSV_SHIFT - 1);

/// `round((255 << 12) / v)`, the saturation divisor for value `v`.
fn saturation_divisor(v: i32) -> i32 {
    if v == 0 {
        return 0;
    }
    (f64::from(255 << HSV_SHIFT) / f64::from(v)).round_ties_even() as i32
}

/// `round((180 << 12) / (6 * diff))`, the hue divisor for chroma `diff`.
fn hue_divisor(diff: i32) -> i32 {
    if diff == 0 {
        return 0;
    }
    (f64::from(180 << HSV_SHIFT) / (6.0 * f64::from(diff))).round_ties_even() as i32
}

/// RGB → HLS (H in [0,180], L and S in [0,255]).
pub fn rgb_to_hls([r, g, b]: [u8; 3]) -> [f32; 3] {
    let (r, g, b) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let vmax = r.max(g).max(b);
    let vmin = r.min(g).min(b);
    let diff = vmax - vmin;
    let l = (vmax + vmin) * 0.5;

    let (h, s) = if diff > f32::EPSILON {
        let s = if l < 0.5 {
            diff / (vmax + vmin)
        } else {
            diff / (2.0 - vmax - vmin)
        };
        let scale = 60.0 / diff;
        let mut h = if vmax == r {
            (g - b) * scale
        } else if vmax == g {
            (b - r) * scale + 120.0
        } else {
            (r - g) * scale + 240.0
        };
        if h < 0.0 {
            h += 360.0;
        }
        (h * 0.5, s)
    } else {
        (0.0, 0.0)
    };

    [quantize(h), quantize(l * 255.0), quantize(s * 255.0)]
}

/// RGB → HSV (H in [0,180), S and V in [0,255]).
///
/// Integer arithmetic with 12-bit reciprocal tables, so ties resolve the
/// way the 8-bit camera conversion resolves them (76.5 becomes 76).
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [f32; 3] {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let v = r.max(g).max(b);
    let diff = v - r.min(g).min(b);

    let s = (diff * saturation_divisor(v) + HSV_ROUND) >> HSV_SHIFT;

    let raw = if v == r {
        g - b
    } else if v == g {
        b - r + 2 * diff
    } else {
        r - g + 4 * diff
    };
    // Arithmetic shift floors negative hues before the wrap.
    let mut h = (raw * hue_divisor(diff) + HSV_ROUND) >> HSV_SHIFT;
    if h < 0 {
        h += 180;
    }

    [h as f32, s as f32, v as f32]
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

/// RGB → CIE-Lab, 8-bit scaled (L·255/100, a+128, b+128).
pub fn rgb_to_lab([r, g, b]: [u8; 3]) -> [f32; 3] {
    let rgb = [
        srgb_to_linear(r as f32 / 255.0),
        srgb_to_linear(g as f32 / 255.0),
        srgb_to_linear(b as f32 / 255.0),
    ];
    let dot = |row: &[f32; 3]| row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2];
    let x = dot(&RGB_TO_XYZ[0]) / WHITE_X;
    let y = dot(&RGB_TO_XYZ[1]);
    let z = dot(&RGB_TO_XYZ[2]) / WHITE_Z;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let l = if y > LAB_EPSILON {
        116.0 * fy - 16.0
    } else {
        903.3 * y
    };
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);

    [
        quantize(l * 255.0 / 100.0),
        quantize(a + 128.0),
        quantize(b + 128.0),
    ]
}

/// RGB → YIQ on [0,1]-scaled channels.
pub fn rgb_to_yiq([r, g, b]: [u8; 3]) -> [f32; 3] {
    let rgb = [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0];
    let mut out = [0.0f32; 3];
    for (o, row) in out.iter_mut().zip(YIQ.iter()) {
        *o = row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2];
    }
    out
}

/// Unweighted channel mean.
pub fn gray([r, g, b]: [u8; 3]) -> f32 {
    (r as f32 + g as f32 + b as f32) / 3.0
}

/// Pixel is clipped when any channel sits at the sensor limits.
pub fn is_saturated([r, g, b]: [u8; 3]) -> bool {
    r.min(g).min(b) == 0 || r.max(g).max(b) == 255
}
