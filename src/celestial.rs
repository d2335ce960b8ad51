use crate::reference_frame::Reference;

/// Bodies that make up the built-in frame skeleton.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CelestialBody {
    Sun,
    Mercury,
    Venus,
    Earth,
    Mars,
    Jupiter,
    Saturn,
    Uranus,
    Neptune,
    Pluto,
    Moon,
    Io,
    Europa,
    Ganymede,
    Callisto,
}

impl CelestialBody {
    pub const ALL: [CelestialBody; 15] = [
        CelestialBody::Sun,
        CelestialBody::Mercury,
        CelestialBody::Venus,
        CelestialBody::Earth,
        CelestialBody::Mars,
        CelestialBody::Jupiter,
        CelestialBody::Saturn,
        CelestialBody::Uranus,
        CelestialBody::Neptune,
        CelestialBody::Pluto,
        CelestialBody::Moon,
        CelestialBody::Io,
        CelestialBody::Europa,
        CelestialBody::Ganymede,
        CelestialBody::Callisto,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CelestialBody::Sun => "Sun",
            CelestialBody::Mercury => "Mercury",
            CelestialBody::Venus => "Venus",
            CelestialBody::Earth => "Earth",
            CelestialBody::Mars => "Mars",
            CelestialBody::Jupiter => "Jupiter",
            CelestialBody::Saturn => "Saturn",
            CelestialBody::Uranus => "Uranus",
            CelestialBody::Neptune => "Neptune",
            CelestialBody::Pluto => "Pluto",
            CelestialBody::Moon => "Moon",
            CelestialBody::Io => "Io",
            CelestialBody::Europa => "Europa",
            CelestialBody::Ganymede => "Ganymede",
            CelestialBody::Callisto => "Callisto",
        }
    }

    pub fn from_label(name: &str) -> Option<CelestialBody> {
        Self::ALL.iter().copied().find(|b| b.label() == name)
    }

    /// The body this one is drawn under in the frame tree.
    pub fn parent(&self) -> Option<CelestialBody> {
        match self {
            CelestialBody::Sun => None,
            CelestialBody::Moon => Some(CelestialBody::Earth),
            CelestialBody::Io
            | CelestialBody::Europa
            | CelestialBody::Ganymede
            | CelestialBody::Callisto => Some(CelestialBody::Jupiter),
            _ => Some(CelestialBody::Sun),
        }
    }

    pub fn reference(&self) -> Reference {
        match self {
            CelestialBody::Sun => Reference::Sun,
            CelestialBody::Mercury => Reference::Mercury,
            CelestialBody::Venus => Reference::Venus,
            CelestialBody::Earth => Reference::Earth,
            CelestialBody::Mars => Reference::Mars,
            CelestialBody::Jupiter => Reference::Jupiter,
            CelestialBody::Saturn => Reference::Saturn,
            CelestialBody::Uranus => Reference::Uranus,
            CelestialBody::Neptune => Reference::Neptune,
            CelestialBody::Pluto => Reference::Pluto,
            CelestialBody::Moon => Reference::Moon,
            CelestialBody::Io => Reference::Io,
            CelestialBody::Europa => Reference::Europa,
            CelestialBody::Ganymede => Reference::Ganymede,
            CelestialBody::Callisto => Reference::Callisto,
        }
    }

    pub fn from_reference(reference: Reference) -> Option<CelestialBody> {
        Self::ALL.iter().copied().find(|b| b.reference() == reference)
    }

    pub fn radius_km(&self) -> f64 {
        match self {
            CelestialBody::Sun => 696000.0,
            CelestialBody::Mercury => 2439.7,
            CelestialBody::Venus => 6051.8,
            CelestialBody::Earth => 6371.0,
            CelestialBody::Mars => 3390.0,
            CelestialBody::Jupiter => 69911.0,
            CelestialBody::Saturn => 58232.0,
            CelestialBody::Uranus => 25362.0,
            CelestialBody::Neptune => 24622.0,
            CelestialBody::Pluto => 1161.0,
            CelestialBody::Moon => 1737.1,
            CelestialBody::Io => 1821.5,
            CelestialBody::Europa => 1561.0,
            CelestialBody::Ganymede => 2631.2,
            CelestialBody::Callisto => 2410.3,
        }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_km() * 1000.0
    }

    /// Gravitational parameter, km^3/s^2.
    pub fn mu(&self) -> f64 {
        match self {
            CelestialBody::Sun => 132712440018.0,
            CelestialBody::Mercury => 22032.0,
            CelestialBody::Venus => 324859.0,
            CelestialBody::Earth => 398600.4418,
            CelestialBody::Mars => 42828.37,
            CelestialBody::Jupiter => 126686534.0,
            CelestialBody::Saturn => 37931187.0,
            CelestialBody::Uranus => 5793939.0,
            CelestialBody::Neptune => 6836529.0,
            CelestialBody::Pluto => 869.6,
            CelestialBody::Moon => 4902.8,
            CelestialBody::Io => 5959.9,
            CelestialBody::Europa => 3202.7,
            CelestialBody::Ganymede => 9887.8,
            CelestialBody::Callisto => 7179.3,
        }
    }

    /// Gravitational parameter in the m^3/s^2 form TLE import expects.
    pub fn gm_si(&self) -> f64 {
        self.mu() * 1.0e9
    }

    pub fn rotation_period_hours(&self) -> f64 {
        match self {
            CelestialBody::Sun => 609.12,
            CelestialBody::Mercury => 1407.6,
            CelestialBody::Venus => -5832.5,
            CelestialBody::Earth => 23.9345,
            CelestialBody::Mars => 24.6229,
            CelestialBody::Jupiter => 9.925,
            CelestialBody::Saturn => 10.656,
            CelestialBody::Uranus => -17.24,
            CelestialBody::Neptune => 16.11,
            CelestialBody::Pluto => -153.29,
            CelestialBody::Moon => 655.7,
            CelestialBody::Io => 42.46,
            CelestialBody::Europa => 85.23,
            CelestialBody::Ganymede => 171.71,
            CelestialBody::Callisto => 400.54,
        }
    }

    /// Rotation period in days, the unit reference frames spin with.
    pub fn rotation_period_days(&self) -> f64 {
        self.rotation_period_hours() / 24.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skeleton_parents() {
        assert_eq!(CelestialBody::Sun.parent(), None);
        assert_eq!(CelestialBody::Moon.parent(), Some(CelestialBody::Earth));
        assert_eq!(CelestialBody::Europa.parent(), Some(CelestialBody::Jupiter));
        assert_eq!(CelestialBody::Pluto.parent(), Some(CelestialBody::Sun));
    }

    #[test]
    fn test_reference_round_trip() {
        for body in CelestialBody::ALL {
            assert_eq!(CelestialBody::from_reference(body.reference()), Some(body));
            assert_eq!(CelestialBody::from_label(body.label()), Some(body));
        }
        assert_eq!(CelestialBody::from_reference(Reference::Sky), None);
    }

    #[test]
    fn test_earth_gm_matches_tle_constant() {
        approx::assert_relative_eq!(CelestialBody::Earth.gm_si(), 398600441800000.0, max_relative = 1e-12);
    }
}
