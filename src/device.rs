use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Capability a device provides to an acquisition stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Camera,
    Storage,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceKind::Camera => "camera",
            DeviceKind::Storage => "storage",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier {
    pub kind: DeviceKind,
    pub name: String,
}

impl DeviceIdentifier {
    pub fn new(kind: DeviceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.name)
    }
}

/// Ordered registry of the devices a runtime exposes.
#[derive(Debug, Clone, Default)]
pub struct DeviceManager {
    devices: Vec<DeviceIdentifier>,
}

impl DeviceManager {
    pub fn new(devices: impl IntoIterator<Item = DeviceIdentifier>) -> Self {
        Self {
            devices: devices.into_iter().collect(),
        }
    }

    pub fn devices(&self) -> &[DeviceIdentifier] {
        &self.devices
    }

    pub fn contains(&self, identifier: &DeviceIdentifier) -> bool {
        self.devices.contains(identifier)
    }

    /// Select the first device of `kind` whose name matches `pattern` in full.
    ///
    /// An empty pattern selects the first device of `kind`.
    ///
    /// # Errors
    /// Returns [`Error::Regex`] if `pattern` is not a valid regular expression,
    /// and [`Error::DeviceNotFound`] if no device matches.
    pub fn select(&self, kind: DeviceKind, pattern: &str) -> Result<DeviceIdentifier> {
        let re = Regex::new(&format!("^(?:{pattern})$"))?;
        let found = self
            .devices
            .iter()
            .filter(|d| d.kind == kind)
            .find(|d| pattern.is_empty() || re.is_match(&d.name));
        match found {
            Some(device) => {
                log::debug!("selected {device} for pattern {pattern:?}");
                Ok(device.clone())
            }
            None => Err(Error::DeviceNotFound {
                kind,
                pattern: pattern.to_string(),
            }),
        }
    }
}
