//! Just enough CSS color handling for deriving hosted-element hover states
//! from computed storefront styles.

use serde::Serialize;

/// WCAG AA threshold for normal-size text.
const READABLE_CONTRAST: f64 = 4.5;

/// Lightness step, in percent, applied to hover backgrounds.
const HOVER_STEP: f64 = 7.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const WHITE: Rgba = Rgba { r: 255.0, g: 255.0, b: 255.0, a: 1.0 };

    /// Parse hex (`#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`), `rgb()`/`rgba()`
    /// in comma or space syntax, and a handful of keywords.
    pub fn parse(input: &str) -> Option<Rgba> {
        let s = input.trim().to_ascii_lowercase();
        match s.as_str() {
            "" => return None,
            "black" => return Some(Rgba::BLACK),
            "white" => return Some(Rgba::WHITE),
            "transparent" => return Some(Rgba { a: 0.0, ..Rgba::BLACK }),
            _ => {}
        }
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex);
        }
        let body = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))?
            .strip_suffix(')')?;
        parse_rgb_body(body)
    }

    /// Perceived brightness on a 0–255 scale.
    pub fn brightness(&self) -> f64 {
        (self.r * 299.0 + self.g * 587.0 + self.b * 114.0) / 1000.0
    }

    /// Relative luminance as defined by WCAG.
    pub fn luminance(&self) -> f64 {
        fn channel(c: f64) -> f64 {
            let c = c / 255.0;
            if c <= 0.03928 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        0.2126 * channel(self.r) + 0.7152 * channel(self.g) + 0.0722 * channel(self.b)
    }

    pub fn contrast(&self, other: &Rgba) -> f64 {
        let (a, b) = (self.luminance(), other.luminance());
        (a.max(b) + 0.05) / (a.min(b) + 0.05)
    }

    pub fn is_readable_on(&self, background: &Rgba) -> bool {
        self.contrast(background) >= READABLE_CONTRAST
    }

    pub fn darken(&self, percent: f64) -> Rgba {
        self.shift_lightness(-percent / 100.0)
    }

    pub fn lighten(&self, percent: f64) -> Rgba {
        self.shift_lightness(percent / 100.0)
    }

    fn shift_lightness(&self, delta: f64) -> Rgba {
        let (h, s, l) = self.to_hsl();
        let (r, g, b) = hsl_to_rgb(h, s, (l + delta).clamp(0.0, 1.0));
        Rgba { r, g, b, a: self.a }
    }

    fn to_hsl(&self) -> (f64, f64, f64) {
        let (r, g, b) = (self.r / 255.0, self.g / 255.0, self.b / 255.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        if max == min {
            return (0.0, 0.0, l);
        }
        let d = max - min;
        let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        (h / 6.0, s, l)
    }

    /// `rgb(r, g, b)` or `rgba(r, g, b, a)` with rounded channels.
    pub fn to_rgb_string(&self) -> String {
        let (r, g, b) = (self.r.round(), self.g.round(), self.b.round());
        if self.a >= 1.0 {
            format!("rgb({}, {}, {})", r, g, b)
        } else {
            format!("rgba({}, {}, {}, {})", r, g, b, (self.a * 100.0).round() / 100.0)
        }
    }
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        let v = l * 255.0;
        return (v, v, v);
    }
    fn hue(p: f64, q: f64, mut t: f64) -> f64 {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue(p, q, h + 1.0 / 3.0) * 255.0,
        hue(p, q, h) * 255.0,
        hue(p, q, h - 1.0 / 3.0) * 255.0,
    )
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match hex.len() {
        3 | 4 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 | 8 => hex.to_string(),
        _ => return None,
    };
    let byte = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok().map(f64::from);
    let a = if expanded.len() == 8 { byte(6)? / 255.0 } else { 1.0 };
    Some(Rgba { r: byte(0)?, g: byte(2)?, b: byte(4)?, a })
}

fn parse_rgb_body(body: &str) -> Option<Rgba> {
    let parts: Vec<&str> = body
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |p: &str| -> Option<f64> {
        let v = match p.strip_suffix('%') {
            Some(pct) => pct.parse::<f64>().ok()? * 2.55,
            None => p.parse::<f64>().ok()?,
        };
        Some(v.clamp(0.0, 255.0))
    };
    let a = match parts.get(3) {
        Some(p) => match p.strip_suffix('%') {
            Some(pct) => pct.parse::<f64>().ok()? / 100.0,
            None => p.parse::<f64>().ok()?,
        }
        .clamp(0.0, 1.0),
        None => 1.0,
    };
    Some(Rgba {
        r: channel(parts[0])?,
        g: channel(parts[1])?,
        b: channel(parts[2])?,
        a,
    })
}

/// Background/foreground pair for a hovered tab.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoverColors {
    pub background_color: String,
    pub color: String,
}

/// Derive hover colors from a tab's resting colors.
///
/// Both fields are empty when either input does not parse.
pub fn generate_hover_colors(background_color: &str, color: &str) -> HoverColors {
    let (Some(background), Some(foreground)) = (Rgba::parse(background_color), Rgba::parse(color))
    else {
        return HoverColors::default();
    };

    let hover_background = if background.brightness() > 50.0 {
        background.darken(HOVER_STEP)
    } else {
        background.lighten(HOVER_STEP)
    };

    let hover_foreground = if foreground.is_readable_on(&hover_background) {
        foreground
    } else {
        [foreground, Rgba::BLACK, Rgba::WHITE]
            .into_iter()
            .max_by(|a, b| {
                a.contrast(&hover_background)
                    .total_cmp(&b.contrast(&hover_background))
            })
            .unwrap_or(foreground)
    };

    HoverColors {
        background_color: hover_background.to_rgb_string(),
        color: hover_foreground.to_rgb_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_notations() {
        assert_eq!(Rgba::parse("#fff"), Some(Rgba::WHITE));
        assert_eq!(Rgba::parse("#000000"), Some(Rgba::BLACK));
        assert_eq!(
            Rgba::parse("rgb(10, 20, 30)"),
            Some(Rgba { r: 10.0, g: 20.0, b: 30.0, a: 1.0 })
        );
        assert_eq!(Rgba::parse("rgba(10, 20, 30, 0.5)").map(|c| c.a), Some(0.5));
        assert_eq!(Rgba::parse("rgb(10 20 30 / 50%)").map(|c| c.a), Some(0.5));
        assert_eq!(Rgba::parse("transparent").map(|c| c.a), Some(0.0));
        assert_eq!(Rgba::parse("#12"), None);
        assert_eq!(Rgba::parse("rgb(1, 2)"), None);
        assert_eq!(Rgba::parse("not-a-color"), None);
    }

    #[test]
    fn unparseable_inputs_yield_empty_hover_colors() {
        assert_eq!(generate_hover_colors("bogus", "#000"), HoverColors::default());
        assert_eq!(generate_hover_colors("#fff", ""), HoverColors::default());
    }

    #[test]
    fn light_backgrounds_darken() {
        let hover = generate_hover_colors("#ffffff", "#000000");
        assert_eq!(hover.background_color, "rgb(237, 237, 237)");
        assert_eq!(hover.color, "rgb(0, 0, 0)");
    }

    #[test]
    fn dark_backgrounds_lighten() {
        let hover = generate_hover_colors("rgb(0, 0, 0)", "rgb(255, 255, 255)");
        assert_eq!(hover.background_color, "rgb(18, 18, 18)");
        assert_eq!(hover.color, "rgb(255, 255, 255)");
    }

    #[test]
    fn unreadable_foreground_is_replaced() {
        // Light grey on white stays unreadable after darkening.
        let hover = generate_hover_colors("#ffffff", "#eeeeee");
        let background = Rgba::parse(&hover.background_color).unwrap();
        let color = Rgba::parse(&hover.color).unwrap();
        assert_eq!(color, Rgba::BLACK);
        assert!(color.is_readable_on(&background));
    }

    #[test]
    fn saturated_colors_keep_hue_when_darkened() {
        let base = Rgba::parse("#3366cc").unwrap();
        let darker = base.darken(7.0);
        assert!(darker.brightness() < base.brightness());
        assert!(darker.b > darker.r);
    }
}
