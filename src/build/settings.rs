//! Settings axes a package varies over, and the values one build uses.
//!
//! Values are taken as given: host detection supplies `os` and `arch`, the
//! caller may override any axis. Nothing is negotiated.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One axis a recipe declares it varies over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsAxis {
    Os,
    Compiler,
    BuildType,
    Arch,
}

impl SettingsAxis {
    pub const ALL: [SettingsAxis; 4] = [
        SettingsAxis::Os,
        SettingsAxis::Compiler,
        SettingsAxis::BuildType,
        SettingsAxis::Arch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsAxis::Os => "os",
            SettingsAxis::Compiler => "compiler",
            SettingsAxis::BuildType => "build_type",
            SettingsAxis::Arch => "arch",
        }
    }
}

impl fmt::Display for SettingsAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingsAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "os" => Ok(SettingsAxis::Os),
            "compiler" => Ok(SettingsAxis::Compiler),
            "build_type" | "build-type" => Ok(SettingsAxis::BuildType),
            "arch" => Ok(SettingsAxis::Arch),
            other => Err(format!(
                "unknown settings axis '{}'; expected one of: os, compiler, build_type, arch",
                other
            )),
        }
    }
}

/// Concrete value for every axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<SettingsAxis, String>,
}

impl Settings {
    /// Host-detected defaults: `os`/`arch` from the running platform,
    /// `compiler = gcc`, `build_type = Release`.
    pub fn detect() -> Self {
        let values = BTreeMap::from([
            (SettingsAxis::Os, host_os().to_string()),
            (SettingsAxis::Compiler, "gcc".to_string()),
            (SettingsAxis::BuildType, "Release".to_string()),
            (SettingsAxis::Arch, host_arch().to_string()),
        ]);
        Self { values }
    }

    pub fn get(&self, axis: SettingsAxis) -> Option<&str> {
        self.values.get(&axis).map(String::as_str)
    }

    pub fn set(&mut self, axis: SettingsAxis, value: impl Into<String>) {
        self.values.insert(axis, value.into());
    }

    /// Apply a `key=value` override, as given on the command line.
    pub fn apply_override(&mut self, raw: &str) -> Result<(), String> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| format!("setting '{}' must look like key=value", raw))?;
        let axis = key.parse::<SettingsAxis>()?;
        let value = value.trim();
        if value.is_empty() {
            return Err(format!("setting '{}' has an empty value", key.trim()));
        }
        self.set(axis, value);
        Ok(())
    }

    /// Only the axes a recipe declares, in axis order.
    pub fn restricted_to(&self, axes: &[SettingsAxis]) -> BTreeMap<SettingsAxis, String> {
        self.values
            .iter()
            .filter(|(axis, _)| axes.contains(axis))
            .map(|(axis, value)| (*axis, value.clone()))
            .collect()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::detect()
    }
}

fn host_os() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Macos",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        other => other,
    }
}

fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x86_64",
        "aarch64" => "armv8",
        "x86" => "x86",
        "arm" => "armv7",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_fills_every_axis() {
        let settings = Settings::detect();
        for axis in SettingsAxis::ALL {
            assert!(settings.get(axis).is_some(), "{} missing", axis);
        }
        assert_eq!(settings.get(SettingsAxis::BuildType), Some("Release"));
    }

    #[test]
    fn override_replaces_value() {
        let mut settings = Settings::detect();
        settings.apply_override("build_type=Debug").unwrap();
        settings.apply_override("compiler = clang").unwrap();
        assert_eq!(settings.get(SettingsAxis::BuildType), Some("Debug"));
        assert_eq!(settings.get(SettingsAxis::Compiler), Some("clang"));
    }

    #[test]
    fn override_rejects_malformed_input() {
        let mut settings = Settings::detect();
        assert!(settings.apply_override("build_type").is_err());
        assert!(settings.apply_override("flavour=spicy").is_err());
        assert!(settings.apply_override("os=").is_err());
    }

    #[test]
    fn restriction_keeps_declared_axes_only() {
        let settings = Settings::detect();
        let subset = settings.restricted_to(&[SettingsAxis::Os, SettingsAxis::BuildType]);
        assert_eq!(subset.len(), 2);
        assert!(subset.contains_key(&SettingsAxis::Os));
        assert!(!subset.contains_key(&SettingsAxis::Compiler));
    }

    #[test]
    fn axis_names_round_trip_through_display() {
        for axis in SettingsAxis::ALL {
            assert_eq!(axis.to_string().parse::<SettingsAxis>().unwrap(), axis);
        }
    }
}
