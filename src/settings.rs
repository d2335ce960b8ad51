//! Engine settings and the named property bridge.
//!
//! Hosts address settings by their camelCase key (`"solarSystemOrbits"`)
//! through [`EngineSettings::get_property`] / [`EngineSettings::set_property`];
//! there is no per-field accessor code. The bridge goes through
//! `serde_json::Value`, so every serialized field is reachable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Unknown setting: {0}")]
    UnknownProperty(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },

    #[error("Settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub solar_system_orbits: bool,
    pub solar_system_minor_orbits: bool,
    pub solar_system_scale: f64,
    pub orbit_segments: usize,
    pub moon_file_url: String,
    pub iss_tle_url: String,
    pub cors_proxy_url: String,
    pub fetch_timeout_secs: u64,
    #[serde(skip)]
    pub version: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            solar_system_orbits: true,
            solar_system_minor_orbits: true,
            solar_system_scale: 1.0,
            orbit_segments: 360,
            moon_file_url: "https://worldwidetelescope.org/wwtweb/catalog.aspx?Q=moons".to_string(),
            iss_tle_url: "https://worldwidetelescope.org/wwtweb/isstle.aspx".to_string(),
            cors_proxy_url: "https://worldwidetelescope.org/webserviceproxy.aspx?targeturl=".to_string(),
            fetch_timeout_secs: 30,
            version: 0,
        }
    }
}

impl EngineSettings {
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn property_names(&self) -> Vec<String> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn get_property(&self, name: &str) -> Option<serde_json::Value> {
        serde_json::to_value(self).ok()?.get(name).cloned()
    }

    /// Sets one named property. Returns whether the stored value changed;
    /// `version` only advances when it did.
    pub fn set_property(&mut self, name: &str, value: serde_json::Value) -> Result<bool, SettingsError> {
        let mut doc = serde_json::to_value(&*self)?;
        let Some(map) = doc.as_object_mut() else {
            return Err(SettingsError::UnknownProperty(name.to_string()));
        };
        if !map.contains_key(name) {
            return Err(SettingsError::UnknownProperty(name.to_string()));
        }
        map.insert(name.to_string(), value);

        let mut updated: EngineSettings =
            serde_json::from_value(doc).map_err(|e| SettingsError::InvalidValue {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        updated.version = self.version;
        if updated == *self {
            return Ok(false);
        }
        updated.version += 1;
        *self = updated;
        Ok(true)
    }
}
