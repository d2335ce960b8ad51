//! Distance units for orbital semi-major axes.

pub const METERS_PER_FOOT: f64 = 1.0 / 3.2808399;
pub const METERS_PER_AU: f64 = 149_598_000.0 * 1000.0;
pub const AU_PER_LIGHT_YEAR: f64 = 63239.6717;
pub const AU_PER_PARSEC: f64 = 206264.806;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AltUnit {
    #[default]
    Meters,
    Feet,
    Inches,
    Miles,
    Kilometers,
    AstronomicalUnits,
    LightYears,
    Parsecs,
    MegaParsecs,
    Custom,
}

impl AltUnit {
    pub const ALL: [AltUnit; 10] = [
        AltUnit::Meters,
        AltUnit::Feet,
        AltUnit::Inches,
        AltUnit::Miles,
        AltUnit::Kilometers,
        AltUnit::AstronomicalUnits,
        AltUnit::LightYears,
        AltUnit::Parsecs,
        AltUnit::MegaParsecs,
        AltUnit::Custom,
    ];

    pub fn to_meters(&self) -> f64 {
        match self {
            AltUnit::Meters => 1.0,
            AltUnit::Feet => METERS_PER_FOOT,
            AltUnit::Inches => METERS_PER_FOOT / 12.0,
            AltUnit::Miles => 1609.344,
            AltUnit::Kilometers => 1000.0,
            AltUnit::AstronomicalUnits => METERS_PER_AU,
            AltUnit::LightYears => AU_PER_LIGHT_YEAR * METERS_PER_AU,
            AltUnit::Parsecs => AU_PER_PARSEC * METERS_PER_AU,
            AltUnit::MegaParsecs => AU_PER_PARSEC * METERS_PER_AU * 1_000_000.0,
            AltUnit::Custom => 1.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AltUnit::Meters => "Meters",
            AltUnit::Feet => "Feet",
            AltUnit::Inches => "Inches",
            AltUnit::Miles => "Miles",
            AltUnit::Kilometers => "Kilometers",
            AltUnit::AstronomicalUnits => "AstronomicalUnits",
            AltUnit::LightYears => "LightYears",
            AltUnit::Parsecs => "Parsecs",
            AltUnit::MegaParsecs => "MegaParsecs",
            AltUnit::Custom => "Custom",
        }
    }

    pub fn from_label(text: &str) -> Option<AltUnit> {
        Self::ALL.iter().copied().find(|u| u.label().eq_ignore_ascii_case(text.trim()))
    }
}
