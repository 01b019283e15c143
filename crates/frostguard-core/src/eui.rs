//! LoRaWAN Hardware Identifiers
//!
//! Validated newtypes for the 64-bit extended unique identifiers printed on
//! device and gateway labels. EUIs are stored normalized: 16 uppercase hex
//! characters, no separators.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Error returned when an EUI fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {eui_type}: {message}")]
pub struct EuiError {
    /// The EUI type that failed to parse.
    pub eui_type: &'static str,
    /// What was wrong with the input.
    pub message: String,
}

fn normalize(eui_type: &'static str, raw: &str) -> Result<String, EuiError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | ' '))
        .collect::<String>()
        .to_uppercase();

    if cleaned.len() != 16 {
        return Err(EuiError {
            eui_type,
            message: format!("expected 16 hex characters, got {}", cleaned.len()),
        });
    }
    if !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EuiError {
            eui_type,
            message: "contains non-hex characters".to_string(),
        });
    }
    Ok(cleaned)
}

macro_rules! define_eui {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and normalize an EUI. Accepts `:`/`-`/space separators.
            pub fn parse(raw: &str) -> Result<Self, EuiError> {
                normalize(stringify!($name), raw).map(Self)
            }

            /// The normalized 16-character uppercase hex form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Last 8 hex characters, lowercased. Used for deriving
            /// human-readable remote identifiers.
            #[must_use]
            pub fn short_suffix(&self) -> String {
                self.0[8..].to_lowercase()
            }

            /// Full EUI lowercased, as remote systems expect in ids.
            #[must_use]
            pub fn to_lowercase(&self) -> String {
                self.0.to_lowercase()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = EuiError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = EuiError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s)
            }
        }

        impl From<$name> for String {
            fn from(eui: $name) -> String {
                eui.0
            }
        }
    };
}

define_eui!(
    /// Device EUI: the hardware identifier of a LoRaWAN end device.
    DevEui
);

define_eui!(
    /// Join EUI (formerly AppEUI): identifies the join server an end device
    /// authenticates against.
    JoinEui
);

define_eui!(
    /// Gateway EUI: the hardware identifier of a LoRaWAN gateway.
    GatewayEui
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case_and_separators() {
        let eui = DevEui::parse("00:80:00:00:a0:00:09:ef").unwrap();
        assert_eq!(eui.as_str(), "00800000A00009EF");
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let err = GatewayEui::parse("00800000A00009").unwrap_err();
        assert_eq!(err.eui_type, "GatewayEui");
        assert!(err.message.contains("16 hex characters"));
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        assert!(JoinEui::parse("00800000A00009ZZ").is_err());
    }

    #[test]
    fn test_short_suffix() {
        let eui = GatewayEui::parse("00800000A00009EF").unwrap();
        assert_eq!(eui.short_suffix(), "a00009ef");
    }

    #[test]
    fn test_serde_roundtrip_rejects_invalid() {
        let ok: Result<DevEui, _> = serde_json::from_str("\"00800000A00009EF\"");
        assert!(ok.is_ok());
        let bad: Result<DevEui, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
