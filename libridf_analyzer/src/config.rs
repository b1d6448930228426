use std::path::Path;

use fxhash::FxHashMap;
use serde::Serialize;
use serde_json::{json, Value};

use super::error::ConfigError;

/// Signal polarity of a detector channel.
///
/// Negative pulses are the hardware default; the analyzer flips them so the
/// peak search always looks for a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    /// Anything other than the literal "positive" reads as negative
    fn parse(value: &str) -> Self {
        if value == "positive" {
            Self::Positive
        } else {
            Self::Negative
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }
}

/// One layer of the analysis configuration. Every field is optional; a
/// layer only overrides what it sets.
#[derive(Debug, Clone, Default)]
pub struct ConfigNode {
    pub enabled: Option<bool>,
    pub sample_rate_ns: Option<f64>,
    pub polarity: Option<Polarity>,
    pub baseline_start: Option<i32>,
    pub baseline_end: Option<i32>,
    pub ma_window_size: Option<i32>,
    pub dcfd_enabled: Option<bool>,
    pub dcfd_delay: Option<i32>,
    pub dcfd_fraction: Option<f64>,
}

/// Detector-level overrides plus any per-channel overrides beneath them.
#[derive(Debug, Clone, Default)]
pub struct DetectorNode {
    pub detector: ConfigNode,
    pub channels: FxHashMap<i32, ConfigNode>,
}

/// The full layered analysis configuration.
///
/// Resolution order for a `(detector, channel)` pair is fixed: built-in
/// defaults, then `global`, then `default_detector`, then the matching
/// detector entry, then the matching channel entry under it.
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    pub global: ConfigNode,
    pub default_detector: ConfigNode,
    pub detectors: FxHashMap<i32, DetectorNode>,
}

/// Fully-resolved parameter set handed to the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedParams {
    pub enabled: bool,
    pub sample_rate_ns: f64,
    pub polarity: Polarity,
    pub baseline_start: i32,
    pub baseline_end: i32,
    pub ma_window_size: i32,
    pub dcfd_enabled: bool,
    pub dcfd_delay: i32,
    pub dcfd_fraction: f64,
}

impl Default for ResolvedParams {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate_ns: 2.0,
            polarity: Polarity::Negative,
            baseline_start: 0,
            baseline_end: 50,
            ma_window_size: 1,
            dcfd_enabled: false,
            dcfd_delay: 3,
            dcfd_fraction: 0.3,
        }
    }
}

impl ResolvedParams {
    fn apply(&mut self, node: &ConfigNode) {
        if let Some(v) = node.enabled {
            self.enabled = v;
        }
        if let Some(v) = node.sample_rate_ns {
            self.sample_rate_ns = v;
        }
        if let Some(v) = node.polarity {
            self.polarity = v;
        }
        if let Some(v) = node.baseline_start {
            self.baseline_start = v;
        }
        if let Some(v) = node.baseline_end {
            self.baseline_end = v;
        }
        if let Some(v) = node.ma_window_size {
            self.ma_window_size = v;
        }
        if let Some(v) = node.dcfd_enabled {
            self.dcfd_enabled = v;
        }
        if let Some(v) = node.dcfd_delay {
            self.dcfd_delay = v;
        }
        if let Some(v) = node.dcfd_fraction {
            self.dcfd_fraction = v;
        }
    }

    /// Clamp the numeric fields into their working ranges.
    ///
    /// A non-positive sample rate cannot be repaired and fails the resolve.
    /// The moving-average window must be odd so the average stays centered.
    fn sanitize(mut self) -> Option<Self> {
        if self.sample_rate_ns <= 0.0 {
            return None;
        }

        if self.ma_window_size < 1 {
            self.ma_window_size = 1;
        } else if self.ma_window_size > 1 && self.ma_window_size % 2 == 0 {
            self.ma_window_size += 1;
        }

        if self.dcfd_delay < 1 {
            self.dcfd_delay = 1;
        }

        self.dcfd_fraction = self.dcfd_fraction.clamp(0.01, 0.99);

        Some(self)
    }
}

impl AnalysisConfig {
    /// The configuration used when no file is given: everything enabled at
    /// 2 ns sampling, negative polarity, baseline over the first 50 samples.
    pub fn default_config() -> Self {
        let mut config = Self::default();
        config.global.enabled = Some(true);
        config.global.sample_rate_ns = Some(2.0);
        config.global.polarity = Some(Polarity::Negative);
        config.global.baseline_start = Some(0);
        config.global.baseline_end = Some(50);

        config.default_detector.enabled = Some(true);
        config.default_detector.polarity = Some(Polarity::Negative);
        config.default_detector.baseline_start = Some(0);
        config.default_detector.baseline_end = Some(50);
        config
    }

    /// Read the analysis configuration from a JSON file.
    ///
    /// The document layout is described in the crate documentation. Unknown
    /// keys are ignored; a recognized key with the wrong type logs a warning
    /// and keeps its default.
    pub fn read_config_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::BadFilePath(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let doc: Value = serde_json::from_str(&text)?;
        Self::from_document(&doc)
    }

    /// Build a configuration from an already-parsed JSON document.
    pub fn from_document(doc: &Value) -> Result<Self, ConfigError> {
        let root = doc.as_object().ok_or(ConfigError::NotAnObject)?;
        let mut config = Self::default_config();

        if let Some(global) = root.get("global") {
            parse_node(global, &mut config.global, "global")?;
        }

        if let Some(detectors) = root.get("detectors") {
            let detectors = detectors.as_object().ok_or_else(|| {
                ConfigError::SchemaViolation("detectors must be an object".into())
            })?;

            if let Some(default) = detectors.get("default") {
                parse_node(default, &mut config.default_detector, "detectors.default")?;
            }

            for (key, value) in detectors {
                if key == "default" {
                    continue;
                }
                // Non-numeric detector ids are silently skipped
                let Ok(det_id) = key.parse::<i32>() else {
                    continue;
                };

                let mut node = DetectorNode::default();
                let context = format!("detectors.{key}");
                parse_node(value, &mut node.detector, &context)?;

                if let Some(channels) = value.get("channels") {
                    let channels = channels.as_object().ok_or_else(|| {
                        ConfigError::SchemaViolation(format!("{context}.channels must be an object"))
                    })?;
                    for (ch_key, ch_value) in channels {
                        let Ok(ch_id) = ch_key.parse::<i32>() else {
                            continue;
                        };
                        let mut ch_node = ConfigNode::default();
                        parse_node(ch_value, &mut ch_node, &format!("{context}.channels.{ch_key}"))?;
                        node.channels.insert(ch_id, ch_node);
                    }
                }

                config.detectors.insert(det_id, node);
            }
        }

        Ok(config)
    }

    /// Resolve the parameters for one `(detector, channel)` pair.
    ///
    /// Returns None when the resolved sample rate is non-positive; the
    /// caller should treat the channel as unanalyzable.
    pub fn resolve(&self, det: i32, ch: i32) -> Option<ResolvedParams> {
        let mut params = ResolvedParams::default();
        params.apply(&self.global);
        params.apply(&self.default_detector);
        if let Some(node) = self.detectors.get(&det) {
            params.apply(&node.detector);
            if let Some(ch_node) = node.channels.get(&ch) {
                params.apply(ch_node);
            }
        }
        params.sanitize()
    }
}

/// Fill `node` from a JSON object, field by field.
///
/// A recognized field with the wrong JSON type logs a warning and keeps its
/// default; the rest of the document still loads.
fn parse_node(value: &Value, node: &mut ConfigNode, context: &str) -> Result<(), ConfigError> {
    let object = value
        .as_object()
        .ok_or_else(|| ConfigError::SchemaViolation(format!("{context} must be an object")))?;

    if let Some(v) = object.get("enabled") {
        match v.as_bool() {
            Some(b) => node.enabled = Some(b),
            None => spdlog::warn!("[{}] enabled must be boolean, using default", context),
        }
    }
    if let Some(v) = object.get("sample_rate_ns") {
        match v.as_f64() {
            Some(f) => node.sample_rate_ns = Some(f),
            None => spdlog::warn!("[{}] sample_rate_ns must be a number, using default", context),
        }
    }
    if let Some(v) = object.get("polarity") {
        match v.as_str() {
            Some(s) => node.polarity = Some(Polarity::parse(s)),
            None => spdlog::warn!("[{}] polarity must be a string, using default", context),
        }
    }
    if let Some(v) = object.get("baseline_start") {
        match v.as_i64() {
            Some(i) => node.baseline_start = Some(i as i32),
            None => spdlog::warn!("[{}] baseline_start must be an integer, using default", context),
        }
    }
    if let Some(v) = object.get("baseline_end") {
        match v.as_i64() {
            Some(i) => node.baseline_end = Some(i as i32),
            None => spdlog::warn!("[{}] baseline_end must be an integer, using default", context),
        }
    }
    if let Some(v) = object.get("ma_window_size") {
        match v.as_i64() {
            Some(i) => node.ma_window_size = Some(i as i32),
            None => spdlog::warn!("[{}] ma_window_size must be an integer, using default", context),
        }
    }
    if let Some(v) = object.get("dcfd_enabled") {
        match v.as_bool() {
            Some(b) => node.dcfd_enabled = Some(b),
            None => spdlog::warn!("[{}] dcfd_enabled must be boolean, using default", context),
        }
    }
    if let Some(v) = object.get("dcfd_delay") {
        match v.as_i64() {
            Some(i) => node.dcfd_delay = Some(i as i32),
            None => spdlog::warn!("[{}] dcfd_delay must be an integer, using default", context),
        }
    }
    if let Some(v) = object.get("dcfd_fraction") {
        match v.as_f64() {
            Some(f) => node.dcfd_fraction = Some(f),
            None => spdlog::warn!("[{}] dcfd_fraction must be a number, using default", context),
        }
    }

    Ok(())
}

/// The seed document handed to users: every recognized field at its default
/// plus one worked detector-override example.
pub fn template_document() -> Value {
    json!({
        "_comment": "RFSoC waveform analysis configuration",
        "global": {
            "sample_rate_ns": 2.0,
            "polarity": "negative",
            "baseline_start": 0,
            "baseline_end": 50,
            "ma_window_size": 1,
            "dcfd_enabled": false,
            "dcfd_delay": 3,
            "dcfd_fraction": 0.3
        },
        "detectors": {
            "default": {
                "enabled": true,
                "polarity": "negative",
                "baseline_start": 0,
                "baseline_end": 50
            },
            "1": {
                "polarity": "positive",
                "baseline_start": 10,
                "baseline_end": 60,
                "channels": {
                    "0": { "baseline_start": 5, "baseline_end": 55 },
                    "2": { "enabled": false }
                }
            }
        }
    })
}

/// Write the template configuration to `path`.
pub fn write_template(path: &Path) -> Result<(), ConfigError> {
    let text = serde_json::to_string_pretty(&template_document())?;
    std::fs::write(path, text + "\n")?;
    Ok(())
}
