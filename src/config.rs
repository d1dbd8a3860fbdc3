use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::OccupancyError;
use crate::frame::DEFAULT_JPEG_QUALITY;

const DEFAULT_IMAGE_PATH: &str = "parking.jpg";
const DEFAULT_REGIONS_PATH: &str = "slots.json";
const DEFAULT_API_ADDR: &str = "127.0.0.1:9000";
const DEFAULT_STREAM_INTERVAL_MS: u64 = 500;

pub const DEFAULT_TEXTURE_RATIO_THRESHOLD: f64 = 0.15;
pub const DEFAULT_EDGE_RATIO_THRESHOLD: f64 = 0.05;
pub const DEFAULT_BLUR_KERNEL: u32 = 5;
pub const DEFAULT_ADAPTIVE_BLOCK_SIZE: u32 = 25;
pub const DEFAULT_ADAPTIVE_BIAS: i32 = 16;
pub const DEFAULT_CANNY_LOW: u32 = 50;
pub const DEFAULT_CANNY_HIGH: u32 = 150;
pub const DEFAULT_CLOSE_ITERATIONS: u8 = 2;

/// Thresholds and kernel sizes for one classification pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Texture (adaptive threshold) density above which a slot is occupied.
    pub texture_ratio_threshold: f64,
    /// Edge density above which a slot is occupied.
    pub edge_ratio_threshold: f64,
    pub blur_kernel: u32,
    pub adaptive_block_size: u32,
    pub adaptive_bias: i32,
    pub canny_low: u32,
    pub canny_high: u32,
    pub close_iterations: u8,
    /// When false the edge mask is empty and only the texture signal counts.
    pub edge_detection: bool,
    /// Treat a region with no pixels inside the frame as an error instead of a warning.
    pub strict_regions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            texture_ratio_threshold: DEFAULT_TEXTURE_RATIO_THRESHOLD,
            edge_ratio_threshold: DEFAULT_EDGE_RATIO_THRESHOLD,
            blur_kernel: DEFAULT_BLUR_KERNEL,
            adaptive_block_size: DEFAULT_ADAPTIVE_BLOCK_SIZE,
            adaptive_bias: DEFAULT_ADAPTIVE_BIAS,
            canny_low: DEFAULT_CANNY_LOW,
            canny_high: DEFAULT_CANNY_HIGH,
            close_iterations: DEFAULT_CLOSE_ITERATIONS,
            edge_detection: true,
            strict_regions: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("texture_ratio_threshold", self.texture_ratio_threshold),
            ("edge_ratio_threshold", self.edge_ratio_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(OccupancyError::configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                ))
                .into());
            }
        }
        for (name, value) in [
            ("blur_kernel", self.blur_kernel),
            ("adaptive_block_size", self.adaptive_block_size),
        ] {
            if value == 0 || value % 2 == 0 {
                return Err(OccupancyError::configuration(format!(
                    "{} must be a positive odd number, got {}",
                    name, value
                ))
                .into());
            }
        }
        if self.adaptive_block_size < 3 {
            return Err(OccupancyError::configuration(format!(
                "adaptive_block_size must be at least 3, got {}",
                self.adaptive_block_size
            ))
            .into());
        }
        if self.canny_low > self.canny_high {
            return Err(OccupancyError::configuration(format!(
                "canny_low ({}) must not exceed canny_high ({})",
                self.canny_low, self.canny_high
            ))
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ServiceConfigFile {
    image_path: Option<PathBuf>,
    regions_path: Option<PathBuf>,
    api: Option<ApiConfigFile>,
    stream: Option<StreamConfigFile>,
    refresh_secs: Option<u64>,
    engine: Option<EngineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    interval_ms: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EngineConfigFile {
    texture_ratio_threshold: Option<f64>,
    edge_ratio_threshold: Option<f64>,
    blur_kernel: Option<u32>,
    adaptive_block_size: Option<u32>,
    adaptive_bias: Option<i32>,
    canny_low: Option<u32>,
    canny_high: Option<u32>,
    close_iterations: Option<u8>,
    edge_detection: Option<bool>,
    strict_regions: Option<bool>,
}

impl EngineConfigFile {
    fn apply(self, cfg: &mut EngineConfig) {
        if let Some(v) = self.texture_ratio_threshold {
            cfg.texture_ratio_threshold = v;
        }
        if let Some(v) = self.edge_ratio_threshold {
            cfg.edge_ratio_threshold = v;
        }
        if let Some(v) = self.blur_kernel {
            cfg.blur_kernel = v;
        }
        if let Some(v) = self.adaptive_block_size {
            cfg.adaptive_block_size = v;
        }
        if let Some(v) = self.adaptive_bias {
            cfg.adaptive_bias = v;
        }
        if let Some(v) = self.canny_low {
            cfg.canny_low = v;
        }
        if let Some(v) = self.canny_high {
            cfg.canny_high = v;
        }
        if let Some(v) = self.close_iterations {
            cfg.close_iterations = v;
        }
        if let Some(v) = self.edge_detection {
            cfg.edge_detection = v;
        }
        if let Some(v) = self.strict_regions {
            cfg.strict_regions = v;
        }
    }
}

/// Settings for the `slotwatchd` service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub image_path: PathBuf,
    pub regions_path: PathBuf,
    pub api_addr: String,
    pub stream_interval: Duration,
    pub jpeg_quality: u8,
    /// Re-read image and regions and reclassify on this period.
    pub refresh: Option<Duration>,
    pub engine: EngineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            image_path: PathBuf::from(DEFAULT_IMAGE_PATH),
            regions_path: PathBuf::from(DEFAULT_REGIONS_PATH),
            api_addr: DEFAULT_API_ADDR.to_string(),
            stream_interval: Duration::from_millis(DEFAULT_STREAM_INTERVAL_MS),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            refresh: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Defaults, then the file named by `SLOTWATCH_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SLOTWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file path without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Self {
        let defaults = Self::default();
        let mut engine = EngineConfig::default();
        if let Some(engine_file) = file.engine {
            engine_file.apply(&mut engine);
        }
        Self {
            image_path: file.image_path.unwrap_or(defaults.image_path),
            regions_path: file.regions_path.unwrap_or(defaults.regions_path),
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or(defaults.api_addr),
            stream_interval: file
                .stream
                .as_ref()
                .and_then(|stream| stream.interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.stream_interval),
            jpeg_quality: file
                .stream
                .and_then(|stream| stream.jpeg_quality)
                .unwrap_or(defaults.jpeg_quality),
            refresh: file.refresh_secs.map(Duration::from_secs),
            engine,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SLOTWATCH_IMAGE") {
            if !path.trim().is_empty() {
                self.image_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("SLOTWATCH_REGIONS") {
            if !path.trim().is_empty() {
                self.regions_path = PathBuf::from(path);
            }
        }
        if let Ok(addr) = std::env::var("SLOTWATCH_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(refresh) = std::env::var("SLOTWATCH_REFRESH_SECS") {
            let seconds: u64 = refresh.trim().parse().map_err(|_| {
                anyhow!("SLOTWATCH_REFRESH_SECS must be an integer number of seconds")
            })?;
            self.refresh = (seconds > 0).then(|| Duration::from_secs(seconds));
        }
        if let Ok(strict) = std::env::var("SLOTWATCH_STRICT_REGIONS") {
            self.engine.strict_regions = parse_bool(&strict)
                .ok_or_else(|| anyhow!("SLOTWATCH_STRICT_REGIONS must be true or false"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.api_addr.parse::<std::net::SocketAddr>().map_err(|_| {
            OccupancyError::configuration(format!(
                "api addr must be a socket address, got '{}'",
                self.api_addr
            ))
        })?;
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(OccupancyError::configuration(format!(
                "jpeg_quality must be in 1..=100, got {}",
                self.jpeg_quality
            ))
            .into());
        }
        if self.stream_interval.is_zero() {
            return Err(
                OccupancyError::configuration("stream interval must be greater than zero").into(),
            );
        }
        if self.refresh.is_some_and(|r| r.is_zero()) {
            return Err(OccupancyError::configuration("refresh_secs must be greater than zero").into());
        }
        Ok(())
    }
}

/// Parse a service config file; `.toml` files are TOML, anything else is JSON.
fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{error_kind, ErrorKind};

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn threshold_out_of_range_is_configuration_error() {
        let cfg = EngineConfig {
            texture_ratio_threshold: 1.5,
            ..EngineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
    }

    #[test]
    fn even_or_zero_kernels_are_rejected() {
        for cfg in [
            EngineConfig {
                blur_kernel: 0,
                ..EngineConfig::default()
            },
            EngineConfig {
                blur_kernel: 4,
                ..EngineConfig::default()
            },
            EngineConfig {
                adaptive_block_size: 24,
                ..EngineConfig::default()
            },
        ] {
            let err = cfg.validate().unwrap_err();
            assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
        }
    }

    #[test]
    fn inverted_canny_thresholds_are_rejected() {
        let cfg = EngineConfig {
            canny_low: 200,
            canny_high: 100,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_engine_section_keeps_defaults() {
        let file: ServiceConfigFile =
            serde_json::from_str(r#"{"engine": {"edge_ratio_threshold": 0.2}}"#).unwrap();
        let cfg = ServiceConfig::from_file(file);
        assert_eq!(cfg.engine.edge_ratio_threshold, 0.2);
        assert_eq!(cfg.engine.texture_ratio_threshold, 0.15);
        assert_eq!(cfg.engine.adaptive_block_size, 25);
        assert_eq!(cfg.api_addr, "127.0.0.1:9000");
    }

    #[test]
    fn parses_bool_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
