use faceshare_core::DetectionParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which [`faceshare_core::FaceEngine`] implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Onnx,
    Mock,
}

impl FromStr for EngineKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(EngineKind::Onnx),
            "mock" => Ok(EngineKind::Mock),
            other => Err(ConfigError::Invalid(format!(
                "unknown engine {other:?} (expected \"onnx\" or \"mock\")"
            ))),
        }
    }
}

/// CLI configuration: defaults, then an optional TOML file, then `FACESHARE_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub engine: EngineKind,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Minimum detector score for a face to be kept.
    pub detection_threshold: f32,
    /// IoU above which overlapping detections are suppressed.
    pub nms_threshold: f32,
    /// Cosine similarity threshold for a positive match.
    pub match_threshold: f32,
    /// Longer image side is downscaled to at most this many pixels.
    pub max_image_size: u32,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        let detection = DetectionParams::default();
        Self {
            engine: EngineKind::Onnx,
            model_dir: faceshare_core::default_model_dir(),
            detection_threshold: detection.detection_threshold,
            nms_threshold: detection.nms_threshold,
            match_threshold: faceshare_core::DEFAULT_MATCH_THRESHOLD,
            max_image_size: 1280,
            intra_threads: 2,
        }
    }
}

impl Config {
    /// Load from `file` (or `$FACESHARE_CONFIG`) and the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os("FACESHARE_CONFIG").map(PathBuf::from);
        let base = match file.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FACESHARE_*` overrides looked up through `lookup`.
    ///
    /// Numeric values that do not parse are ignored with a warning; an unknown
    /// engine name is an error.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(engine) = lookup("FACESHARE_ENGINE") {
            self.engine = engine.parse()?;
        }
        if let Some(dir) = lookup("FACESHARE_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        override_parsed(&lookup, "FACESHARE_DETECTION_THRESHOLD", &mut self.detection_threshold);
        override_parsed(&lookup, "FACESHARE_NMS_THRESHOLD", &mut self.nms_threshold);
        override_parsed(&lookup, "FACESHARE_MATCH_THRESHOLD", &mut self.match_threshold);
        override_parsed(&lookup, "FACESHARE_MAX_IMAGE_SIZE", &mut self.max_image_size);
        override_parsed(&lookup, "FACESHARE_INTRA_THREADS", &mut self.intra_threads);
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("detection_threshold", self.detection_threshold, 0.0, 1.0)?;
        check_range("nms_threshold", self.nms_threshold, 0.0, 1.0)?;
        check_range("match_threshold", self.match_threshold, -1.0, 1.0)?;
        if self.max_image_size == 0 {
            return Err(ConfigError::Invalid("max_image_size must be positive".into()));
        }
        if self.intra_threads == 0 {
            return Err(ConfigError::Invalid("intra_threads must be at least 1".into()));
        }
        Ok(())
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            detection_threshold: self.detection_threshold,
            nms_threshold: self.nms_threshold,
        }
    }
}

fn override_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable setting"),
    }
}

pub fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be within [{min}, {max}], got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine, EngineKind::Onnx);
        assert_eq!(config.detection_threshold, 0.3);
        assert_eq!(config.nms_threshold, 0.4);
        assert_eq!(config.match_threshold, 0.4);
        assert_eq!(config.max_image_size, 1280);
        assert!(config.model_dir.ends_with("faceshare/models"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial() {
        let config = Config::from_toml_str(
            r#"
            engine = "mock"
            match_threshold = 0.55
            model_dir = "/opt/models"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine, EngineKind::Mock);
        assert_eq!(config.match_threshold, 0.55);
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.nms_threshold, 0.4);
    }

    #[test]
    fn test_toml_rejects_unknown_keys() {
        assert!(matches!(
            Config::from_toml_str("similarity = 0.3"),
            Err(ConfigError::Parse(_))
        ));
        assert!(Config::from_toml_str("engine = \"gpu\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_overrides(lookup(&[
                ("FACESHARE_ENGINE", "MOCK"),
                ("FACESHARE_DETECTION_THRESHOLD", "0.5"),
                ("FACESHARE_MAX_IMAGE_SIZE", " 640 "),
                ("FACESHARE_INTRA_THREADS", "4"),
            ]))
            .unwrap();
        assert_eq!(config.engine, EngineKind::Mock);
        assert_eq!(config.detection_threshold, 0.5);
        assert_eq!(config.max_image_size, 640);
        assert_eq!(config.intra_threads, 4);
        assert_eq!(config.match_threshold, 0.4);
    }

    #[test]
    fn test_unparsable_override_keeps_previous() {
        let config = Config::default()
            .with_overrides(lookup(&[("FACESHARE_MATCH_THRESHOLD", "high")]))
            .unwrap();
        assert_eq!(config.match_threshold, 0.4);
    }

    #[test]
    fn test_unknown_engine_is_error() {
        let err = Config::default()
            .with_overrides(lookup(&[("FACESHARE_ENGINE", "cuda")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.match_threshold = -0.2;
        assert!(config.validate().is_ok());

        config.match_threshold = 1.5;
        assert!(config.validate().is_err());

        config = Config::default();
        config.detection_threshold = f32::NAN;
        assert!(config.validate().is_err());

        config = Config::default();
        config.intra_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/faceshare.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
