//! Logging verbosity configuration

use serde::{Deserialize, Serialize};

/// Trace level for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl TraceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }
}

impl std::fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TraceLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DebugConfig {
    /// Level applied to the flipmask targets when `RUST_LOG` is unset
    #[serde(default)]
    pub trace_level: TraceLevel,

    /// Extra tracing targets; empty means the flipmask crates only
    #[serde(default)]
    pub trace_targets: Vec<String>,
}

impl DebugConfig {
    /// Build an `EnvFilter`-compatible directive string, e.g.
    /// `flipmask=info,flipmask_core=info`.
    pub fn filter_directive(&self) -> String {
        let targets: Vec<&str> = if self.trace_targets.is_empty() {
            crate::constants::defaults::TRACE_TARGETS.split(',').collect()
        } else {
            self.trace_targets.iter().map(String::as_str).collect()
        };
        targets
            .iter()
            .map(|target| format!("{target}={}", self.trace_level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_level_parsing() {
        assert_eq!(TraceLevel::parse("error"), Some(TraceLevel::Error));
        assert_eq!(TraceLevel::parse("WARN"), Some(TraceLevel::Warn));
        assert_eq!(TraceLevel::parse(" debug "), Some(TraceLevel::Debug));
        assert_eq!(TraceLevel::parse("loud"), None);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        #[derive(Deserialize)]
        struct Wrapper {
            level: TraceLevel,
        }
        let parsed: Wrapper = toml::from_str("level = \"shouting\"").unwrap();
        assert_eq!(parsed.level, TraceLevel::Info);
    }

    #[test]
    fn directive_covers_every_flipmask_crate_by_default() {
        let cfg = DebugConfig {
            trace_level: TraceLevel::Debug,
            trace_targets: Vec::new(),
        };
        let directive = cfg.filter_directive();
        assert!(directive.contains("flipmask=debug"));
        assert!(directive.contains("flipmask_core=debug"));
    }

    #[test]
    fn explicit_targets_replace_defaults() {
        let cfg = DebugConfig {
            trace_level: TraceLevel::Warn,
            trace_targets: vec!["flipmask_core::gate".to_string()],
        };
        assert_eq!(cfg.filter_directive(), "flipmask_core::gate=warn");
    }
}
