//! ARGB colors and their persisted text form.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

const NAMED: &[(&str, Color)] = &[
    ("White", Color::WHITE),
    ("Black", Color::argb(255, 0, 0, 0)),
    ("Red", Color::argb(255, 255, 0, 0)),
    ("Green", Color::argb(255, 0, 128, 0)),
    ("Lime", Color::argb(255, 0, 255, 0)),
    ("Blue", Color::argb(255, 0, 0, 255)),
    ("Yellow", Color::argb(255, 255, 255, 0)),
    ("Cyan", Color::argb(255, 0, 255, 255)),
    ("Magenta", Color::argb(255, 255, 0, 255)),
    ("Orange", Color::argb(255, 255, 165, 0)),
    ("Gray", Color::argb(255, 128, 128, 128)),
    ("LightBlue", Color::argb(255, 173, 216, 230)),
    ("Transparent", Color::argb(0, 255, 255, 255)),
];

impl Color {
    pub const WHITE: Color = Color::argb(255, 255, 255, 255);

    pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self { a, r, g, b }
    }

    pub fn named(name: &str) -> Option<Color> {
        NAMED
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
            .map(|(_, c)| *c)
    }

    pub fn to_save_string(&self) -> String {
        format!("ARGBColor:{}:{}:{}:{}", self.a, self.r, self.g, self.b)
    }

    /// Accepts `ARGBColor:a:r:g:b`, `NamedColor:Name` or a bare name.
    /// Anything else is white.
    pub fn from_save_string(text: &str) -> Color {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix("ARGBColor:") {
            let parts: Vec<u8> = rest.split(':').filter_map(|p| p.trim().parse().ok()).collect();
            if let [a, r, g, b] = parts[..] {
                return Color::argb(a, r, g, b);
            }
            return Color::WHITE;
        }
        let name = text.strip_prefix("NamedColor:").unwrap_or(text);
        Color::named(name).unwrap_or(Color::WHITE)
    }

    /// `[r, g, b, a]` in the unit interval.
    pub fn to_unit(&self) -> [f64; 4] {
        [
            self.r as f64 / 255.0,
            self.g as f64 / 255.0,
            self.b as f64 / 255.0,
            self.a as f64 / 255.0,
        ]
    }

    pub fn from_unit(r: f64, g: f64, b: f64, a: f64) -> Color {
        let q = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Color::argb(q(a), q(r), q(g), q(b))
    }

    pub fn to_rgba_f32(&self) -> [f32; 4] {
        let [r, g, b, a] = self.to_unit();
        [r as f32, g as f32, b as f32, a as f32]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_string_forms() {
        let c = Color::argb(255, 175, 216, 230);
        assert_eq!(c.to_save_string(), "ARGBColor:255:175:216:230");
        assert_eq!(Color::from_save_string("ARGBColor:255:175:216:230"), c);
        assert_eq!(Color::from_save_string("NamedColor:Red"), Color::argb(255, 255, 0, 0));
        assert_eq!(Color::from_save_string("yellow"), Color::argb(255, 255, 255, 0));
        assert_eq!(Color::from_save_string("ARGBColor:1:2"), Color::WHITE);
        assert_eq!(Color::from_save_string("Chartreuse-ish"), Color::WHITE);
    }

    #[test]
    fn test_unit_conversion_clamps() {
        let c = Color::from_unit(1.5, 0.5, -1.0, 1.0);
        assert_eq!(c, Color::argb(255, 255, 128, 0));
        assert_eq!(Color::WHITE.to_unit(), [1.0, 1.0, 1.0, 1.0]);
    }
}
