use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const DEFAULT_FRAME_RATE: u32 = 30;
const DEFAULT_NOISE_SEED: u64 = 0x746f_6631;
const DEFAULT_CONTROLS: [(&str, &str); 3] = [
    ("phaseDepthBits", "12"),
    ("abBits", "16"),
    ("confidenceBits", "8"),
];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    frame_rate: Option<u32>,
    modes: Option<Vec<ModeConfigFile>>,
    controls: Option<BTreeMap<String, serde_json::Value>>,
    synthetic: Option<SyntheticConfigFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModeConfigFile {
    id: u32,
    name: String,
    width: u32,
    height: u32,
    ir_only: Option<bool>,
    raw_subelements: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SyntheticConfigFile {
    noise_seed: Option<u64>,
    fail_after_frames: Option<u64>,
    fail_stop: Option<bool>,
}

/// Camera configuration passed to `Camera::initialize`.
///
/// Loaded from the CONFIG json given on the command line. Fields missing from
/// the file fall back to the defaults of a 1 MP ToF module.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub frame_rate: u32,
    pub modes: Vec<ModeSpec>,
    /// Device controls, e.g. `phaseDepthBits`. Values are kept as strings the
    /// way the device reports them.
    pub controls: BTreeMap<String, String>,
    pub synthetic: SyntheticSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSpec {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Passive (IR only) modes carry no depth, confidence or raw phase data.
    pub ir_only: bool,
    /// 16-bit subelements per raw pixel.
    pub raw_subelements: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SyntheticSettings {
    pub noise_seed: u64,
    /// Fail every frame request after this many frames were delivered.
    pub fail_after_frames: Option<u64>,
    /// Make `stop` report an error after streaming has stopped.
    pub fail_stop: bool,
}

impl ModeSpec {
    pub fn new(id: u32, name: &str, width: u32, height: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            width,
            height,
            ir_only: false,
            raw_subelements: 1,
        }
    }

    pub fn ir_only(mut self) -> Self {
        self.ir_only = true;
        self
    }

    pub fn with_raw_subelements(mut self, count: u32) -> Self {
        self.raw_subelements = count;
        self
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            modes: default_modes(),
            controls: DEFAULT_CONTROLS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            synthetic: SyntheticSettings {
                noise_seed: DEFAULT_NOISE_SEED,
                fail_after_frames: None,
                fail_stop: false,
            },
        }
    }
}

fn default_modes() -> Vec<ModeSpec> {
    vec![
        ModeSpec::new(0, "sr-native", 1024, 1024),
        ModeSpec::new(1, "lr-native", 1024, 1024),
        ModeSpec::new(2, "sr-qnative", 512, 512),
        ModeSpec::new(3, "lr-qnative", 512, 512),
        ModeSpec::new(4, "pcm-native", 1024, 1024).ir_only(),
        ModeSpec::new(5, "lr-mixed", 512, 512),
        ModeSpec::new(6, "sr-mixed", 512, 512),
        ModeSpec::new(7, "mp", 1024, 1024).with_raw_subelements(4),
        ModeSpec::new(8, "qmp", 512, 512).with_raw_subelements(3),
    ]
}

impl CameraConfig {
    /// Load from a json file, then apply `TOF_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let file_cfg = read_config_file(path)?;
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file_cfg: CameraConfigFile =
            serde_json::from_str(raw).map_err(|e| anyhow!("invalid camera config: {}", e))?;
        let cfg = Self::from_file(file_cfg)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CameraConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let modes = match file.modes {
            Some(modes) => modes
                .into_iter()
                .map(|mode| ModeSpec {
                    id: mode.id,
                    name: mode.name,
                    width: mode.width,
                    height: mode.height,
                    ir_only: mode.ir_only.unwrap_or(false),
                    raw_subelements: mode.raw_subelements.unwrap_or(1),
                })
                .collect(),
            None => defaults.modes,
        };
        let mut controls = defaults.controls;
        if let Some(file_controls) = file.controls {
            for (key, value) in file_controls {
                let value = control_value_to_string(&key, value)?;
                controls.insert(key, value);
            }
        }
        let synthetic = file.synthetic.unwrap_or_default();
        Ok(Self {
            frame_rate: file.frame_rate.unwrap_or(defaults.frame_rate),
            modes,
            controls,
            synthetic: SyntheticSettings {
                noise_seed: synthetic
                    .noise_seed
                    .unwrap_or(defaults.synthetic.noise_seed),
                fail_after_frames: synthetic.fail_after_frames,
                fail_stop: synthetic.fail_stop.unwrap_or(false),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(rate) = std::env::var("TOF_FRAME_RATE") {
            self.frame_rate = rate
                .trim()
                .parse()
                .map_err(|_| anyhow!("TOF_FRAME_RATE must be an integer number of frames"))?;
        }
        if let Ok(overrides) = std::env::var("TOF_CONTROL_OVERRIDES") {
            for entry in split_csv(&overrides) {
                let (key, value) = entry.split_once('=').ok_or_else(|| {
                    anyhow!(
                        "TOF_CONTROL_OVERRIDES entries must look like key=value, got '{}'",
                        entry
                    )
                })?;
                self.controls
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_rate == 0 {
            return Err(anyhow!("frame_rate must be greater than zero"));
        }
        if self.modes.is_empty() {
            return Err(anyhow!("camera config must define at least one mode"));
        }
        let mut ids = BTreeSet::new();
        let mut names = BTreeSet::new();
        for mode in &self.modes {
            if mode.name.trim().is_empty() {
                return Err(anyhow!("mode {} has an empty name", mode.id));
            }
            if !ids.insert(mode.id) {
                return Err(anyhow!("duplicate mode id {}", mode.id));
            }
            if !names.insert(mode.name.as_str()) {
                return Err(anyhow!("duplicate mode name '{}'", mode.name));
            }
            if mode.width == 0 || mode.height == 0 {
                return Err(anyhow!(
                    "mode '{}' must have non-zero dimensions",
                    mode.name
                ));
            }
            if mode.raw_subelements == 0 {
                return Err(anyhow!(
                    "mode '{}' must have at least one raw subelement",
                    mode.name
                ));
            }
        }
        Ok(())
    }

    pub fn mode(&self, name: &str) -> Option<&ModeSpec> {
        self.modes.iter().find(|mode| mode.name == name)
    }

    pub fn mode_by_id(&self, id: u32) -> Option<&ModeSpec> {
        self.modes.iter().find(|mode| mode.id == id)
    }

    pub fn control(&self, key: &str) -> Option<&str> {
        self.controls.get(key).map(String::as_str)
    }
}

fn read_config_file(path: &Path) -> Result<CameraConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn control_value_to_string(key: &str, value: serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(if b { "1" } else { "0" }.to_string()),
        other => Err(anyhow!(
            "control '{}' must be a string or number, got {}",
            key,
            other
        )),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
