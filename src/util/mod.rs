//! Utility functions and macros

/// Collection of utility macros
pub mod macros {
    /// Macro for timing code execution
    #[macro_export]
    macro_rules! time_execution {
        ($name:expr, $code:block) => {{
            let start = std::time::Instant::now();
            let result = $code;
            let duration = start.elapsed();
            tracing::info!("{} completed in {:?}", $name, duration);
            result
        }};
    }
}

/// Logs its lifetime when dropped
pub struct Timer {
    name: String,
    start: std::time::Instant,
}

impl Timer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: std::time::Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.elapsed();
        tracing::debug!("Timer '{}' finished in {:?}", self.name, duration);
    }
}

/// Configuration utilities
pub mod config {
    use std::path::Path;

    use serde::{Deserialize, Serialize};

    use crate::{Error, Result};

    /// Prefix of environment variables overriding the reader configuration,
    /// e.g. `VISTLE_VPIC_MAX_GHOST_LEVEL=2`
    pub const ENV_PREFIX: &str = "VISTLE_VPIC";

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ReaderConfig {
        /// Stride applied when a dataset is opened
        pub default_stride: [usize; 3],
        /// Upper bound on requested ghost levels
        pub max_ghost_level: usize,
        /// Load the parts of one rank on the rayon pool
        pub parallel_part_loads: bool,
        pub log_level: String,
    }

    impl Default for ReaderConfig {
        fn default() -> Self {
            Self {
                default_stride: [1, 1, 1],
                max_ghost_level: 1,
                parallel_part_loads: true,
                log_level: "info".to_string(),
            }
        }
    }

    impl ReaderConfig {
        /// Layer the optional TOML file and the environment over the defaults.
        pub fn load(path: Option<&Path>) -> Result<Self> {
            let mut builder = config::Config::builder();
            if let Some(path) = path {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            let settings = builder
                .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
                .build()?;
            Ok(settings.try_deserialize()?)
        }

        pub fn from_toml(text: &str) -> Result<Self> {
            toml::from_str(text).map_err(|e| Error::InvalidArgument(format!("reader configuration: {e}")))
        }

        pub fn to_toml(&self) -> Result<String> {
            toml::to_string(self).map_err(|e| Error::InvalidArgument(format!("reader configuration: {e}")))
        }
    }
}

/// Math utilities for scientific computing
pub mod math {
    use ndarray::ArrayView1;

    /// Compute basic statistics for an array
    pub fn compute_stats(data: ArrayView1<'_, f32>) -> ArrayStats {
        if data.is_empty() {
            return ArrayStats {
                count: 0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                std_dev: 0.0,
            };
        }

        let min = data.fold(f32::INFINITY, |a, &b| a.min(b));
        let max = data.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let sum: f64 = data.iter().map(|&x| x as f64).sum();
        let mean = (sum / data.len() as f64) as f32;

        let variance: f32 = data.iter().map(|&x| (x - mean).powi(2)).sum::<f32>() / data.len() as f32;
        let std_dev = variance.sqrt();

        ArrayStats {
            count: data.len(),
            min,
            max,
            mean,
            std_dev,
        }
    }

    #[derive(Debug, Clone)]
    pub struct ArrayStats {
        pub count: usize,
        pub min: f32,
        pub max: f32,
        pub mean: f32,
        pub std_dev: f32,
    }
}

#[cfg(test)]
mod tests {
    use super::config::ReaderConfig;
    use super::math::compute_stats;
    use ndarray::ArrayView1;
    use std::io::Write;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ReaderConfig::from_toml("max_ghost_level = 3\n").unwrap();
        assert_eq!(config.max_ghost_level, 3);
        assert_eq!(config.default_stride, [1, 1, 1]);
        assert!(config.parallel_part_loads);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ReaderConfig {
            default_stride: [2, 2, 1],
            parallel_part_loads: false,
            ..ReaderConfig::default()
        };
        let text = config.to_toml().unwrap();
        assert_eq!(ReaderConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "default_stride = [4, 2, 1]").unwrap();
        writeln!(file, "log_level = \"debug\"").unwrap();
        let config = ReaderConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.default_stride, [4, 2, 1]);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_bad_toml_is_error() {
        assert!(ReaderConfig::from_toml("max_ghost_level = \"many\"").is_err());
    }

    #[test]
    fn test_compute_stats() {
        let data = [1.0f32, 2.0, 3.0, 4.0];
        let stats = compute_stats(ArrayView1::from(&data[..]));
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.mean, 2.5);
        assert!((stats.std_dev - 1.118034).abs() < 1e-5);

        let empty: [f32; 0] = [];
        assert_eq!(compute_stats(ArrayView1::from(&empty[..])).count, 0);
    }

    #[test]
    fn test_timer_measures() {
        let timer = super::Timer::new("test");
        assert!(timer.elapsed() <= std::time::Duration::from_secs(60));
    }
}
