use config::{Config, ConfigError, Environment};
use log::debug;
use serde::Deserialize;

/// Builtin system probes. Each is enabled unless set to `false`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BuiltinProbes {
    pub cpu: Option<bool>,
    pub memory: Option<bool>,
    pub load_average: Option<bool>,
    pub process: Option<bool>,
}

impl BuiltinProbes {
    pub fn cpu_enabled(&self) -> bool {
        self.cpu.unwrap_or(true)
    }

    pub fn memory_enabled(&self) -> bool {
        self.memory.unwrap_or(true)
    }

    pub fn load_average_enabled(&self) -> bool {
        self.load_average.unwrap_or(true)
    }

    pub fn process_enabled(&self) -> bool {
        self.process.unwrap_or(true)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub enable_minutely_probes: Option<bool>,
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default)]
    pub builtin_probes: BuiltinProbes,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let s = Config::builder()
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = s.try_deserialize()?;
        debug!("Parsed settings: {:?}", settings);
        Ok(settings)
    }

    pub fn minutely_probes_enabled(&self) -> bool {
        self.enable_minutely_probes.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_load_settings() {
        unsafe {
            std::env::set_var("ENABLE_MINUTELY_PROBES", "false");
            std::env::set_var("BUILTIN_PROBES__LOAD_AVERAGE", "false");
            std::env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "collector:4317");
        }

        let settings = Settings::new().expect("Failed to load settings");

        assert!(!settings.minutely_probes_enabled());
        assert_eq!(settings.builtin_probes.load_average, Some(false));
        assert!(!settings.builtin_probes.load_average_enabled());
        assert_eq!(
            settings.otel_exporter_otlp_endpoint.as_deref(),
            Some("collector:4317")
        );

        unsafe {
            std::env::remove_var("ENABLE_MINUTELY_PROBES");
            std::env::remove_var("BUILTIN_PROBES__LOAD_AVERAGE");
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        }
    }

    #[test]
    fn test_defaults_enable_everything() {
        let settings = Settings::default();

        assert!(settings.minutely_probes_enabled());
        assert!(settings.builtin_probes.cpu_enabled());
        assert!(settings.builtin_probes.memory_enabled());
        assert!(settings.builtin_probes.load_average_enabled());
        assert!(settings.builtin_probes.process_enabled());
        assert!(settings.otel_exporter_otlp_endpoint.is_none());
    }
}
