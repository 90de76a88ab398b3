//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{RecoveryError, RecoveryResult};

/// Capacities of the fixed-size registries.
///
/// Registries never grow after construction, so slot indices stay stable for
/// the lifetime of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Number of group slots in the process-wide registry.
    pub max_groups: usize,
    /// Number of member slots per group.
    pub max_members: usize,
    /// Circular-buffer slots per member for groups created with depth -1.
    pub unbounded_depth_capacity: usize,
    /// Largest depth a group may be created with.
    pub max_depth: i64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_groups: 32,
            max_members: 512,
            unbounded_depth_capacity: 16,
            max_depth: 1024,
        }
    }
}

impl RecoveryConfig {
    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> RecoveryResult<Self> {
        let config: RecoveryConfig =
            serde_json::from_str(json).map_err(|e| RecoveryError::InvalidConfig {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects zero capacities and a negative depth limit.
    pub fn validate(&self) -> RecoveryResult<()> {
        if self.max_depth < 0 {
            return Err(RecoveryError::InvalidConfig {
                reason: format!("max_depth {} must be non-negative", self.max_depth),
            });
        }
        let checks = [
            ("max_groups", self.max_groups),
            ("max_members", self.max_members),
            ("unbounded_depth_capacity", self.unbounded_depth_capacity),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(RecoveryError::InvalidConfig {
                    reason: format!("{} must be positive", name),
                });
            }
        }
        Ok(())
    }

    /// Snapshot slots per member for a group of the given depth.
    ///
    /// Depth `d >= 0` keeps the current snapshot plus `d` older ones. Depth -1
    /// is unbounded in the window sense but still capped by
    /// `unbounded_depth_capacity` slots. Depths outside `-1..=max_depth` are
    /// rejected.
    pub fn version_capacity(&self, depth: i64) -> RecoveryResult<usize> {
        let invalid = RecoveryError::InvalidDepth {
            depth,
            max_depth: self.max_depth,
        };
        match depth {
            -1 => Ok(self.unbounded_depth_capacity),
            d if d < -1 || d > self.max_depth => Err(invalid),
            d => usize::try_from(d)
                .ok()
                .and_then(|d| d.checked_add(1))
                .ok_or(invalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RecoveryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = RecoveryConfig {
            max_members: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("max_members"));
    }

    #[test]
    fn test_from_json_partial() {
        let config = RecoveryConfig::from_json(r#"{"max_groups": 4}"#).unwrap();
        assert_eq!(config.max_groups, 4);
        assert_eq!(config.max_members, 512);
    }

    #[test]
    fn test_from_json_garbage() {
        assert!(RecoveryConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_version_capacity() {
        let config = RecoveryConfig::default();
        assert_eq!(config.version_capacity(0).unwrap(), 1);
        assert_eq!(config.version_capacity(5).unwrap(), 6);
        assert_eq!(config.version_capacity(-1).unwrap(), 16);
        assert_eq!(config.version_capacity(1024).unwrap(), 1025);
    }

    #[test]
    fn test_version_capacity_rejects_out_of_range_depth() {
        let config = RecoveryConfig::default();
        for depth in [-2, 1025, i64::MAX, i64::MIN] {
            assert!(matches!(
                config.version_capacity(depth),
                Err(RecoveryError::InvalidDepth { max_depth: 1024, .. })
            ));
        }
    }

    #[test]
    fn test_negative_max_depth_rejected() {
        let config = RecoveryConfig {
            max_depth: -1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
