//! Networking knobs carried alongside the generated config.

use crate::domain::NetworkingSpec;
use serde_json::Value;
use tracing::warn;

/// Port the server listens on when the spec does not say.
pub const DEFAULT_SERVER_PORT: u16 = 8321;

/// Whether to expose the server externally, and under which hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExposeSetting {
    pub enabled: bool,
    pub hostname: Option<String>,
}

/// Interpret the `expose` toggle.
///
/// - absent or `null`: disabled
/// - `true` / `false`: that value
/// - `{}`: enabled
/// - `{enabled: b, hostname: h}`: `b` (default `true`) and `h`
///
/// Any other shape is treated as disabled.
pub fn parse_expose(value: Option<&Value>) -> ExposeSetting {
    match value {
        None | Some(Value::Null) => ExposeSetting::default(),
        Some(Value::Bool(enabled)) => ExposeSetting {
            enabled: *enabled,
            hostname: None,
        },
        Some(Value::Object(obj)) => {
            let hostname = obj
                .get("hostname")
                .and_then(Value::as_str)
                .filter(|h| !h.is_empty())
                .map(String::from);
            let enabled = obj.get("enabled").and_then(Value::as_bool).unwrap_or(true);
            ExposeSetting { enabled, hostname }
        }
        Some(other) => {
            warn!(value = %other, "unrecognised expose value, treating as disabled");
            ExposeSetting::default()
        }
    }
}

impl NetworkingSpec {
    /// Configured port, else [`DEFAULT_SERVER_PORT`].
    pub fn port_or_default(&self) -> u16 {
        self.port.filter(|p| *p > 0).unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn expose_setting(&self) -> ExposeSetting {
        parse_expose(self.expose.as_ref())
    }
}
