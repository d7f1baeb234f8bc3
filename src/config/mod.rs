use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::tracker::{GeofenceZone, is_valid_coordinate};

// 时间类参数上限（一年），保证换算成 chrono::Duration 时不会溢出
const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid GEOFENCE_ZONES: {0}")]
    Geofence(#[from] serde_json::Error),

    #[error("Invalid geofence zone #{index}: {reason}")]
    Zone { index: usize, reason: &'static str },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub tracker: TrackerConfig,
}

/// 追踪引擎参数
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub tick_interval_secs: u64,
    pub location_ttl_secs: u64,
    pub tracking_ttl_secs: u64,
    /// 判定为“在一起”的最大距离（公里）
    pub max_distance_km: f64,
    pub base_reward: f64,
    pub geofence_multiplier: f64,
    pub store_timeout_ms: u64,
    pub geofences: Vec<GeofenceZone>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            location_ttl_secs: 30,
            tracking_ttl_secs: 600,
            max_distance_km: 0.008,
            base_reward: 1.0,
            geofence_multiplier: 2.0,
            store_timeout_ms: 2000,
            geofences: Vec::new(),
        }
    }
}

impl TrackerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn location_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.location_ttl_secs as i64)
    }

    pub fn tracking_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.tracking_ttl_secs as i64)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// 校验数值范围：时间必须为正且不超过一年，距离和奖励必须是非负有限数
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("TICK_INTERVAL_SECS", self.tick_interval_secs),
            ("LOCATION_TTL_SECS", self.location_ttl_secs),
            ("TRACKING_TTL_SECS", self.tracking_ttl_secs),
        ];
        for (key, secs) in durations {
            if secs == 0 || secs > MAX_DURATION_SECS {
                return Err(ConfigError::Invalid {
                    key,
                    value: secs.to_string(),
                });
            }
        }
        if self.store_timeout_ms == 0 || self.store_timeout_ms > MAX_DURATION_SECS * 1000 {
            return Err(ConfigError::Invalid {
                key: "STORE_TIMEOUT_MS",
                value: self.store_timeout_ms.to_string(),
            });
        }

        let amounts = [
            ("MAX_DISTANCE_KM", self.max_distance_km),
            ("BASE_REWARD", self.base_reward),
            ("GEOFENCE_MULTIPLIER", self.geofence_multiplier),
        ];
        for (key, value) in amounts {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                });
            }
        }

        for (index, zone) in self.geofences.iter().enumerate() {
            if !is_valid_coordinate(zone.latitude, zone.longitude) {
                return Err(ConfigError::Zone {
                    index,
                    reason: "center out of range",
                });
            }
            if !zone.radius_meters.is_finite() || zone.radius_meters < 0.0 {
                return Err(ConfigError::Zone {
                    index,
                    reason: "radius must be a non-negative number",
                });
            }
        }

        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 通过任意 key 查询函数构建配置，方便测试
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let defaults = TrackerConfig::default();
        let geofences = match lookup("GEOFENCE_ZONES") {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)?,
            _ => Vec::new(),
        };

        let tracker = TrackerConfig {
            tick_interval_secs: parse_or(&lookup, "TICK_INTERVAL_SECS", defaults.tick_interval_secs)?,
            location_ttl_secs: parse_or(&lookup, "LOCATION_TTL_SECS", defaults.location_ttl_secs)?,
            tracking_ttl_secs: parse_or(&lookup, "TRACKING_TTL_SECS", defaults.tracking_ttl_secs)?,
            max_distance_km: parse_or(&lookup, "MAX_DISTANCE_KM", defaults.max_distance_km)?,
            base_reward: parse_or(&lookup, "BASE_REWARD", defaults.base_reward)?,
            geofence_multiplier: parse_or(&lookup, "GEOFENCE_MULTIPLIER", defaults.geofence_multiplier)?,
            store_timeout_ms: parse_or(&lookup, "STORE_TIMEOUT_MS", defaults.store_timeout_ms)?,
            geofences,
        };

        tracker.validate()?;

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            api_base_uri: lookup("API_BASE_URI").unwrap_or_else(|| "/api".into()),
            rate_limit_window_secs: parse_or(&lookup, "RATE_LIMIT_WINDOW", 60)?,
            rate_limit_requests: parse_or(&lookup, "RATE_LIMIT_REQUESTS", 100)?,
            tracker,
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/friendex"),
        ("REDIS_URL", "redis://localhost"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn defaults_apply_when_optional_values_missing() {
        let config = Config::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.api_base_uri, "/api");
        assert_eq!(config.tracker.tick_interval_secs, 5);
        assert_eq!(config.tracker.max_distance_km, 0.008);
        assert_eq!(config.tracker.geofence_multiplier, 2.0);
        assert!(config.tracker.geofences.is_empty());
    }

    #[test]
    fn missing_required_value_is_reported() {
        let err = Config::from_lookup(lookup_from(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn parses_geofence_zones_and_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((
            "GEOFENCE_ZONES",
            r#"[{"latitude": -33.8688, "longitude": 151.2093, "radius_meters": 100.0}]"#,
        ));
        pairs.push(("TRACKING_TTL_SECS", "120"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.tracker.tracking_ttl_secs, 120);
        assert_eq!(config.tracker.geofences.len(), 1);
        assert_eq!(config.tracker.geofences[0].radius_meters, 100.0);
    }

    #[test]
    fn rejects_garbage_numbers_and_zero_interval() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SERVER_PORT", "eighty"));
        assert!(matches!(
            Config::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { key: "SERVER_PORT", .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TICK_INTERVAL_SECS", "0"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn rejects_non_finite_or_negative_amounts() {
        for (key, value) in [
            ("BASE_REWARD", "NaN"),
            ("GEOFENCE_MULTIPLIER", "inf"),
            ("MAX_DISTANCE_KM", "-0.5"),
        ] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, value));
            let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: k, .. } if k == key),
                "{key}={value}: {err}"
            );
        }
    }

    #[test]
    fn rejects_durations_that_overflow() {
        // u64::MAX
        let huge = "18446744073709551615";
        for key in ["LOCATION_TTL_SECS", "TRACKING_TTL_SECS", "TICK_INTERVAL_SECS"] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, huge));
            assert!(
                matches!(
                    Config::from_lookup(lookup_from(&pairs)),
                    Err(ConfigError::Invalid { key: k, .. }) if k == key
                ),
                "{key}"
            );
        }

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STORE_TIMEOUT_MS", "0"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn rejects_invalid_geofence_zones() {
        let cases = [
            r#"[{"latitude": 91.0, "longitude": 0.0, "radius_meters": 10.0}]"#,
            r#"[{"latitude": 0.0, "longitude": 0.0, "radius_meters": -1.0}]"#,
        ];
        for raw in cases {
            let mut pairs = REQUIRED.to_vec();
            pairs.push(("GEOFENCE_ZONES", raw));
            assert!(matches!(
                Config::from_lookup(lookup_from(&pairs)),
                Err(ConfigError::Zone { index: 0, .. })
            ));
        }
    }
}
