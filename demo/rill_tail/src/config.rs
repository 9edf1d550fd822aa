use std::fs;
use std::path::Path;
use std::time::Duration;

use rill_core::{RatioMetric, RillConfig};

/// Configuration of the tail demo
#[derive(Clone, Debug)]
pub struct TailConfig {
    pub rill: RillConfig,
    /// How often the terminal view is refreshed
    pub refresh_ms: u64,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            // Library defaults already consider RILL_* env vars
            rill: RillConfig::from_env(),
            refresh_ms: std::env::var("RILL_REFRESH_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(250),
        }
    }
}

impl TailConfig {
    /// Load configuration from a TOML file (path via RILL_CONFIG or ./rill.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("RILL_CONFIG").unwrap_or_else(|_| "rill.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "rill_tail", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<TailToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "rill_tail", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "rill_tail", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.max(10))
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct TailToml {
    pub refresh_ms: Option<u64>,
    pub http: Option<HttpToml>,
    pub decoder: Option<DecoderToml>,
    pub rate: Option<RateToml>,
}

impl TailToml {
    fn overlay(self, mut base: TailConfig) -> TailConfig {
        if let Some(v) = self.refresh_ms {
            base.refresh_ms = v;
        }
        if let Some(h) = self.http {
            h.apply(&mut base.rill);
        }
        if let Some(d) = self.decoder {
            d.apply(&mut base.rill);
        }
        if let Some(r) = self.rate {
            r.apply(&mut base.rill);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct HttpToml {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_ms: Option<u64>,
}
impl HttpToml {
    fn apply(self, c: &mut RillConfig) {
        if let Some(v) = self.base_url {
            c.http.base_url = v;
        }
        if let Some(v) = self.api_key.filter(|s| !s.is_empty()) {
            c.http.api_key = Some(v);
        }
        if let Some(v) = self.request_timeout_ms {
            c.http.request_timeout_ms = v;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct DecoderToml {
    pub max_line_bytes: Option<usize>,
    pub default_kind: Option<String>,
}
impl DecoderToml {
    fn apply(self, c: &mut RillConfig) {
        if let Some(v) = self.max_line_bytes {
            c.controller.decoder.max_line_bytes = v;
        }
        if let Some(v) = self.default_kind {
            c.controller.decoder.default_kind = Some(v).filter(|s| !s.is_empty());
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RateToml {
    pub history_capacity: Option<usize>,
    pub timestamp_field: Option<String>,
    pub gauges: Option<Vec<String>>,
    pub ratios: Option<Vec<RatioToml>>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct RatioToml {
    pub name: String,
    pub hit: String,
    pub read: String,
}

impl RateToml {
    fn apply(self, c: &mut RillConfig) {
        if let Some(v) = self.history_capacity {
            c.rate.history_capacity = v;
        }
        if let Some(v) = self.timestamp_field {
            c.rate.timestamp_field = v;
        }
        if let Some(v) = self.gauges {
            c.rate.gauges = v;
        }
        if let Some(v) = self.ratios {
            c.rate.ratios = v
                .into_iter()
                .map(|r| RatioMetric::new(r.name, r.hit, r.read))
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_replaces_only_present_fields() {
        let toml = r#"
            refresh_ms = 1000

            [http]
            base_url = "http://pg-monitor:9000"

            [decoder]
            default_kind = "snapshot"

            [rate]
            history_capacity = 120
            ratios = [{ name = "idx_hit_pct", hit = "idx_blks_hit", read = "idx_blks_read" }]
        "#;
        let parsed: TailToml = toml::from_str(toml).unwrap();
        let mut base = TailConfig::default();
        base.rill.http.request_timeout_ms = 1234;

        let cfg = parsed.overlay(base);
        assert_eq!(cfg.refresh_ms, 1000);
        assert_eq!(cfg.rill.http.base_url, "http://pg-monitor:9000");
        assert_eq!(cfg.rill.http.request_timeout_ms, 1234);
        assert_eq!(cfg.rill.controller.decoder.default_kind.as_deref(), Some("snapshot"));
        assert_eq!(cfg.rill.rate.history_capacity, 120);
        assert_eq!(cfg.rill.rate.ratios.len(), 1);
        assert_eq!(cfg.rill.rate.ratios[0].name, "idx_hit_pct");
    }
}
