//! Per-pixel blend modes, using the same 8-bit integer arithmetic as Aseprite so output matches it bit for bit.

use crate::doc::BlendMode;

/// A straight-alpha RGBA pixel.
pub type Rgba = [u8; 4];

/// Multiply two 8-bit fractions, rounding to nearest.
pub fn mul_un8(a: u8, b: u8) -> u8 {
    let t = u32::from(a) * u32::from(b) + 0x80;
    (((t >> 8) + t) >> 8) as u8
}

fn div_un8(a: u32, b: u32) -> u32 {
    (a * 0xff + b / 2) / b
}

/// Blend `src` onto `backdrop` with `mode`, scaling the source alpha by `opacity`.
pub fn blend(mode: BlendMode, backdrop: Rgba, src: Rgba, opacity: u8) -> Rgba {
    let blended = match mode {
        BlendMode::Normal => return normal(backdrop, src, opacity),
        BlendMode::Hue | BlendMode::Saturation | BlendMode::Color | BlendMode::Luminosity => {
            blend_hsl(mode, backdrop, src)
        }
        _ => [0, 1, 2].map(|i| blend_channel(mode, backdrop[i].into(), src[i].into()) as u8),
    };
    // Where the backdrop is transparent the source shows through in its own color.
    let backdrop_alpha = i32::from(backdrop[3]);
    let mix = |i: usize| {
        let (s, b) = (i32::from(src[i]), i32::from(blended[i]));
        (s + (b - s) * backdrop_alpha / 255) as u8
    };
    normal(backdrop, [mix(0), mix(1), mix(2), src[3]], opacity)
}

fn normal(backdrop: Rgba, src: Rgba, opacity: u8) -> Rgba {
    if backdrop[3] == 0 {
        return [src[0], src[1], src[2], mul_un8(src[3], opacity)];
    }
    if src[3] == 0 {
        return backdrop;
    }

    let src_alpha = mul_un8(src[3], opacity);
    let backdrop_alpha = backdrop[3];
    let alpha = i32::from(src_alpha) + i32::from(backdrop_alpha) - i32::from(mul_un8(backdrop_alpha, src_alpha));
    if alpha == 0 {
        return [0; 4];
    }
    let channel = |i: usize| {
        let (b, s) = (i32::from(backdrop[i]), i32::from(src[i]));
        (b + (s - b) * i32::from(src_alpha) / alpha) as u8
    };
    [channel(0), channel(1), channel(2), alpha as u8]
}

fn blend_channel(mode: BlendMode, b: u32, s: u32) -> u32 {
    match mode {
        BlendMode::Multiply => multiply(b, s),
        BlendMode::Screen => screen(b, s),
        BlendMode::Overlay => hard_light(s, b),
        BlendMode::Darken => b.min(s),
        BlendMode::Lighten => b.max(s),
        BlendMode::ColorDodge => color_dodge(b, s),
        BlendMode::ColorBurn => color_burn(b, s),
        BlendMode::HardLight => hard_light(b, s),
        BlendMode::SoftLight => soft_light(b, s),
        BlendMode::Difference => b.abs_diff(s),
        BlendMode::Exclusion => b + s - 2 * multiply(b, s),
        BlendMode::Addition => (b + s).min(0xff),
        BlendMode::Subtract => b.saturating_sub(s),
        BlendMode::Divide => divide(b, s),
        BlendMode::Normal | BlendMode::Hue | BlendMode::Saturation | BlendMode::Color | BlendMode::Luminosity => s,
    }
}

fn multiply(b: u32, s: u32) -> u32 {
    mul_un8(b as u8, s as u8).into()
}

fn screen(b: u32, s: u32) -> u32 {
    b + s - multiply(b, s)
}

fn hard_light(b: u32, s: u32) -> u32 {
    if s < 128 {
        multiply(b, s << 1)
    } else {
        screen(b, (s << 1) - 255)
    }
}

fn color_dodge(b: u32, s: u32) -> u32 {
    if b == 0 {
        return 0;
    }
    let s = 255 - s;
    if b >= s {
        255
    } else {
        div_un8(b, s)
    }
}

fn color_burn(b: u32, s: u32) -> u32 {
    if b == 255 {
        return 255;
    }
    let b = 255 - b;
    if b >= s {
        0
    } else {
        255 - div_un8(b, s)
    }
}

fn soft_light(b: u32, s: u32) -> u32 {
    let (b, s) = (f64::from(b) / 255.0, f64::from(s) / 255.0);
    let d = if b <= 0.25 { ((16.0 * b - 12.0) * b + 4.0) * b } else { b.sqrt() };
    let r = if s <= 0.5 { b - (1.0 - 2.0 * s) * b * (1.0 - b) } else { b + (2.0 * s - 1.0) * (d - b) };
    (r * 255.0 + 0.5) as u32
}

fn divide(b: u32, s: u32) -> u32 {
    if b == 0 {
        0
    } else if b >= s {
        255
    } else {
        div_un8(b, s)
    }
}

//
// non-separable modes
//

fn blend_hsl(mode: BlendMode, backdrop: Rgba, src: Rgba) -> [u8; 3] {
    let unit = |pixel: Rgba| pixel.map(|channel| f64::from(channel) / 255.0);
    let [br, bg, bb, _] = unit(backdrop);
    let [sr, sg, sb, _] = unit(src);
    let (backdrop, src) = ([br, bg, bb], [sr, sg, sb]);

    let color = match mode {
        BlendMode::Hue => set_lum(set_sat(src, sat(backdrop)), lum(backdrop)),
        BlendMode::Saturation => set_lum(set_sat(backdrop, sat(src)), lum(backdrop)),
        BlendMode::Color => set_lum(src, lum(backdrop)),
        _ => set_lum(backdrop, lum(src)),
    };
    color.map(|channel| (255.0 * channel) as u8)
}

fn lum([r, g, b]: [f64; 3]) -> f64 {
    0.3 * r + 0.59 * g + 0.11 * b
}

fn sat([r, g, b]: [f64; 3]) -> f64 {
    r.max(g).max(b) - r.min(g).min(b)
}

fn clip_color(color: [f64; 3]) -> [f64; 3] {
    let l = lum(color);
    let n = color[0].min(color[1]).min(color[2]);
    let x = color[0].max(color[1]).max(color[2]);
    let mut color = color;
    if n < 0.0 {
        color = color.map(|c| l + (c - l) * l / (l - n));
    }
    if x > 1.0 {
        color = color.map(|c| l + (c - l) * (1.0 - l) / (x - l));
    }
    color
}

fn set_lum(color: [f64; 3], l: f64) -> [f64; 3] {
    let d = l - lum(color);
    clip_color(color.map(|c| c + d))
}

fn set_sat(color: [f64; 3], s: f64) -> [f64; 3] {
    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| color[a].total_cmp(&color[b]));
    let [min, mid, max] = order;

    let mut result = [0.0; 3];
    if color[max] > color[min] {
        result[mid] = (color[mid] - color[min]) * s / (color[max] - color[min]);
        result[max] = s;
    }
    result
}
