//! Settings for the effect pipeline
//!
//! Loaded from an XML file at startup. Settings are read-only input; the
//! pipeline never writes them back.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use quick_xml::de::from_str;
use serde::{Deserialize, Deserializer};

use crate::effects::{PipelineOptions, RangePolicy};
use crate::telemetry::LogConfig;

/// Largest surface edge accepted from a settings file
pub const MAX_SURFACE_DIMENSION: u32 = 16384;

/// Formats usable for the pipeline's scratch framebuffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScratchFormat {
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Rgba16Float,
}

impl ScratchFormat {
    pub const ALL: [ScratchFormat; 4] = [
        ScratchFormat::Rgba8Unorm,
        ScratchFormat::Rgba8UnormSrgb,
        ScratchFormat::Bgra8Unorm,
        ScratchFormat::Rgba16Float,
    ];

    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            ScratchFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            ScratchFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            ScratchFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            ScratchFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

impl FromStr for ScratchFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgba8unorm" => Ok(ScratchFormat::Rgba8Unorm),
            "rgba8unormsrgb" | "rgba8unorm-srgb" => Ok(ScratchFormat::Rgba8UnormSrgb),
            "bgra8unorm" => Ok(ScratchFormat::Bgra8Unorm),
            "rgba16float" => Ok(ScratchFormat::Rgba16Float),
            other => Err(format!("unsupported scratch format '{}'", other)),
        }
    }
}

/// Deserialize a `FromStr` value from element text, treating empty text as the default
fn deserialize_parsed_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: std::fmt::Display,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s.trim().is_empty() {
        Ok(T::default())
    } else {
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn deserialize_range_policy<'de, D>(deserializer: D) -> Result<RangePolicy, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "reject" => Ok(RangePolicy::Reject),
        "clamp" => Ok(RangePolicy::Clamp),
        other => Err(serde::de::Error::custom(format!(
            "unknown range policy '{}' (expected reject or clamp)",
            other
        ))),
    }
}

/// Pipeline settings stored in XML files
///
/// ```xml
/// <SpectaculumSettings>
///   <surfaceWidth>1280</surfaceWidth>
///   <surfaceHeight>720</surfaceHeight>
///   <scratchFormat>rgba8unorm</scratchFormat>
///   <enableNewEffects>true</enableNewEffects>
///   <rangePolicy>clamp</rangePolicy>
///   <log><defaultLevel>debug</defaultLevel></log>
/// </SpectaculumSettings>
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename = "SpectaculumSettings", default)]
pub struct PipelineSettings {
    /// Initial surface width
    #[serde(rename = "surfaceWidth")]
    pub surface_width: u32,

    /// Initial surface height
    #[serde(rename = "surfaceHeight")]
    pub surface_height: u32,

    /// Format of the scratch framebuffers and effect outputs
    #[serde(rename = "scratchFormat", deserialize_with = "deserialize_parsed_or_default")]
    pub scratch_format: ScratchFormat,

    /// Whether effects start enabled when added to the pipeline
    #[serde(rename = "enableNewEffects")]
    pub enable_new_effects: bool,

    /// Out-of-range handling for parameter values
    #[serde(rename = "rangePolicy", deserialize_with = "deserialize_range_policy")]
    pub range_policy: RangePolicy,

    #[serde(rename = "log")]
    pub log: LogConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            surface_width: 1280,
            surface_height: 720,
            scratch_format: ScratchFormat::default(),
            enable_new_effects: false,
            range_policy: RangePolicy::Reject,
            log: LogConfig::default(),
        }
    }
}

impl PipelineSettings {
    /// Load settings from an XML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_xml_str(&contents)
    }

    /// Parse settings from XML text
    pub fn from_xml_str(xml: &str) -> Result<Self, SettingsError> {
        let mut settings: Self = from_str(xml)?;
        settings.clamp();
        Ok(settings)
    }

    /// Bring loaded values into their valid ranges
    pub fn clamp(&mut self) {
        self.surface_width = self.surface_width.clamp(1, MAX_SURFACE_DIMENSION);
        self.surface_height = self.surface_height.clamp(1, MAX_SURFACE_DIMENSION);
        if self.log.default_level.trim().is_empty() {
            self.log.default_level = LogConfig::default().default_level;
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            scratch_format: self.scratch_format.texture_format(),
            enable_new_effects: self.enable_new_effects,
            range_policy: self.range_policy,
        }
    }
}

/// Settings-related errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),
}
