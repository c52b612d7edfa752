//! PFC Watchdog types and structures.

use sonic_orch_common::FieldValue;
use sonic_sai::SaiError;
use std::fmt;
use thiserror::Error;

/// Number of traffic classes a port can carry.
pub const PFC_WD_TC_MAX: u8 = 8;

pub const MIN_DETECTION_TIME_MS: u32 = 100;
pub const MAX_DETECTION_TIME_MS: u32 = 5000;
pub const MIN_RESTORATION_TIME_MS: u32 = 100;
pub const MAX_RESTORATION_TIME_MS: u32 = 60000;

/// Configuration field names of the `PFC_WD` table.
pub const PFC_WD_ACTION: &str = "action";
pub const PFC_WD_DETECTION_TIME: &str = "detection_time";
pub const PFC_WD_RESTORATION_TIME: &str = "restoration_time";

/// PFC watchdog action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PfcWdAction {
    Unknown,
    Forward,
    #[default]
    Drop,
    Alert,
}

impl PfcWdAction {
    /// Parses a configured action. Matching is exact: `"Drop"` is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "forward" => Some(Self::Forward),
            "drop" => Some(Self::Drop),
            "alert" => Some(Self::Alert),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Forward => "forward",
            Self::Drop => "drop",
            Self::Alert => "alert",
        }
    }
}

impl fmt::Display for PfcWdAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detection time (100-5000 ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionTime(u32);

impl DetectionTime {
    pub fn new(value: u32) -> Result<Self, PfcWdConfigError> {
        if (MIN_DETECTION_TIME_MS..=MAX_DETECTION_TIME_MS).contains(&value) {
            Ok(Self(value))
        } else {
            Err(PfcWdConfigError::invalid_value(
                PFC_WD_DETECTION_TIME,
                value,
                format!(
                    "must be {}-{}ms",
                    MIN_DETECTION_TIME_MS, MAX_DETECTION_TIME_MS
                ),
            ))
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Restoration time (0 or 100-60000 ms, 0 = disabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestorationTime(u32);

impl RestorationTime {
    pub fn new(value: u32) -> Result<Self, PfcWdConfigError> {
        if value == 0 || (MIN_RESTORATION_TIME_MS..=MAX_RESTORATION_TIME_MS).contains(&value) {
            Ok(Self(value))
        } else {
            Err(PfcWdConfigError::invalid_value(
                PFC_WD_RESTORATION_TIME,
                value,
                format!(
                    "must be 0 or {}-{}ms",
                    MIN_RESTORATION_TIME_MS, MAX_RESTORATION_TIME_MS
                ),
            ))
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// The detector does not signal restoration on its own.
    pub fn is_disabled(&self) -> bool {
        self.0 == 0
    }
}

/// Why a `PFC_WD` record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PfcWdConfigError {
    #[error("Unknown PFC watchdog field '{field}'")]
    UnknownField { field: String },

    #[error("Invalid {field} '{value}': {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid PFC watchdog action '{0}'")]
    InvalidAction(String),

    #[error("Missing or zero detection_time")]
    MissingDetectionTime,
}

impl PfcWdConfigError {
    fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        PfcWdConfigError::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Validated watchdog configuration of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PfcWdConfig {
    pub detection_time: DetectionTime,
    pub restoration_time: RestorationTime,
    pub action: PfcWdAction,
}

impl PfcWdConfig {
    pub fn new(
        action: PfcWdAction,
        detection_time: DetectionTime,
        restoration_time: RestorationTime,
    ) -> Self {
        Self {
            detection_time,
            restoration_time,
            action,
        }
    }

    /// Parses every field of a SET record before anything is applied.
    ///
    /// The first bad field rejects the whole record. A missing `action`
    /// means drop; a missing `restoration_time` means disabled.
    pub fn from_fields(fvs: &[FieldValue]) -> Result<Self, PfcWdConfigError> {
        let mut detection_time = None;
        let mut restoration_time = RestorationTime::default();
        let mut action = PfcWdAction::default();

        for (field, value) in fvs {
            match field.as_str() {
                PFC_WD_DETECTION_TIME => {
                    let ms = parse_ms(field, value)?;
                    if ms == 0 {
                        return Err(PfcWdConfigError::MissingDetectionTime);
                    }
                    detection_time = Some(DetectionTime::new(ms)?);
                }
                PFC_WD_RESTORATION_TIME => {
                    restoration_time = RestorationTime::new(parse_ms(field, value)?)?;
                }
                PFC_WD_ACTION => {
                    action = PfcWdAction::parse(value)
                        .ok_or_else(|| PfcWdConfigError::InvalidAction(value.clone()))?;
                }
                _ => {
                    return Err(PfcWdConfigError::UnknownField {
                        field: field.clone(),
                    })
                }
            }
        }

        let detection_time = detection_time.ok_or(PfcWdConfigError::MissingDetectionTime)?;
        Ok(Self::new(action, detection_time, restoration_time))
    }
}

fn parse_ms(field: &str, value: &str) -> Result<u32, PfcWdConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|e| PfcWdConfigError::invalid_value(field, value, e.to_string()))
}

/// Errors reported by the watchdog orchestrator and engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PfcWdError {
    #[error("Invalid PFC watchdog configuration for {port}: {source}")]
    InvalidConfig {
        port: String,
        #[source]
        source: PfcWdConfigError,
    },

    #[error("Port {0} not found")]
    PortNotFound(String),

    #[error("Port {0} is not a physical port")]
    NotPhysicalPort(String),

    #[error("Port {0} is not registered with the PFC watchdog")]
    PortNotRegistered(String),

    #[error("SAI call on {object} failed: {source}")]
    Sai {
        object: String,
        #[source]
        source: SaiError,
    },
}

impl PfcWdError {
    pub fn sai(object: impl Into<String>, source: SaiError) -> Self {
        PfcWdError::Sai {
            object: object.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fvs(pairs: &[(&str, &str)]) -> Vec<FieldValue> {
        pairs
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_action_parse_is_exact() {
        assert_eq!(PfcWdAction::parse("forward"), Some(PfcWdAction::Forward));
        assert_eq!(PfcWdAction::parse("drop"), Some(PfcWdAction::Drop));
        assert_eq!(PfcWdAction::parse("alert"), Some(PfcWdAction::Alert));
        assert_eq!(PfcWdAction::parse("Drop"), None);
        assert_eq!(PfcWdAction::parse("unknown"), None);
        assert_eq!(PfcWdAction::default(), PfcWdAction::Drop);
        assert_eq!(PfcWdAction::Forward.to_string(), "forward");
    }

    #[test]
    fn test_detection_time_bounds() {
        assert!(DetectionTime::new(99).is_err());
        assert!(DetectionTime::new(100).is_ok());
        assert!(DetectionTime::new(5000).is_ok());
        assert!(DetectionTime::new(5001).is_err());
    }

    #[test]
    fn test_restoration_time_bounds() {
        assert!(RestorationTime::new(0).unwrap().is_disabled());
        assert!(RestorationTime::new(1).is_err());
        assert!(RestorationTime::new(99).is_err());
        assert!(RestorationTime::new(100).is_ok());
        assert!(RestorationTime::new(60000).is_ok());
        assert!(RestorationTime::new(60001).is_err());
    }

    #[test]
    fn test_from_fields_full_record() {
        let config = PfcWdConfig::from_fields(&fvs(&[
            ("detection_time", "400"),
            ("restoration_time", "1000"),
            ("action", "alert"),
        ]))
        .unwrap();

        assert_eq!(config.detection_time.value(), 400);
        assert_eq!(config.restoration_time.value(), 1000);
        assert_eq!(config.action, PfcWdAction::Alert);
    }

    #[test]
    fn test_from_fields_defaults() {
        let config = PfcWdConfig::from_fields(&fvs(&[("detection_time", "200")])).unwrap();
        assert_eq!(config.action, PfcWdAction::Drop);
        assert!(config.restoration_time.is_disabled());
    }

    #[test]
    fn test_from_fields_rejections() {
        assert_eq!(
            PfcWdConfig::from_fields(&fvs(&[("restoration_time", "200")])),
            Err(PfcWdConfigError::MissingDetectionTime)
        );
        assert_eq!(
            PfcWdConfig::from_fields(&fvs(&[("detection_time", "0")])),
            Err(PfcWdConfigError::MissingDetectionTime)
        );
        assert_eq!(
            PfcWdConfig::from_fields(&fvs(&[("detection_time", "200"), ("bogus", "1")])),
            Err(PfcWdConfigError::UnknownField {
                field: "bogus".to_string()
            })
        );
        assert_eq!(
            PfcWdConfig::from_fields(&fvs(&[("detection_time", "200"), ("action", "bogus")])),
            Err(PfcWdConfigError::InvalidAction("bogus".to_string()))
        );
        assert!(matches!(
            PfcWdConfig::from_fields(&fvs(&[("detection_time", "fast")])),
            Err(PfcWdConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            PfcWdConfig::from_fields(&fvs(&[("detection_time", "50")])),
            Err(PfcWdConfigError::InvalidValue { .. })
        ));
    }
}
