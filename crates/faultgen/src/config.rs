use anyhow::{Context, Result};
use faultgen_packer::{FaultMatrix, ReadoutMap, RunInfo, ScenarioId, SetupError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub run: RunConfig,
    pub readout: ReadoutConfig,
    pub mode: RunMode,
    #[serde(default)]
    pub faults: FaultConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,

    #[serde(skip)]
    config_file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub experiment: u16,
    pub run: u16,
    pub subrun: u8,
    pub base_time_ns: u64,
    pub event_spacing_ns: u64,
    /// Events 0..events are generated or checked
    pub events: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadoutConfig {
    /// Controller id -> module id per port, -1 for a disabled port
    pub controllers: BTreeMap<u32, Vec<i64>>,
    #[serde(default)]
    pub invert_mapping: bool,
    #[serde(default)]
    pub trigger_type: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Write packets for a decoder to consume
    Generate,
    /// Judge the masks a decoder reported
    Check,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Scenarios stacked on events in addition to the canonical ones
    #[serde(default)]
    pub extra: BTreeMap<u32, Vec<ScenarioId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub packets: PathBuf,
    pub reported: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            anyhow::bail!(
                "Configuration file not found: {}\n\
                 Run `faultgen init` to create a new configuration",
                config_path.display()
            );
        }

        let contents =
            fs::read_to_string(&config_path).context("Failed to read configuration file")?;

        let mut config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse configuration file")?;

        config.config_file_path = config_path;

        Ok(config)
    }

    /// Create a new default configuration and save it
    pub fn create_default(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);
        let data_dir = data_dir.unwrap_or_else(Self::default_data_dir);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&data_dir)?;

        let config = Self::with_data_dir(config_path.clone(), &data_dir);

        let yaml = serde_yaml::to_string(&config)?;
        fs::write(&config_path, yaml)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;

        Ok(config)
    }

    /// Default configuration with outputs under `data_dir`, not saved
    pub fn with_data_dir(config_path: PathBuf, data_dir: &Path) -> Self {
        let info = RunInfo::default();
        let mut controllers = BTreeMap::new();
        controllers.insert(0, vec![0x02, 0x03, 0x04, 0x05, -1]);
        controllers.insert(1, vec![0x22, 0x23, 0x24, -1, -1]);

        Config {
            run: RunConfig {
                experiment: info.experiment,
                run: info.run,
                subrun: info.subrun,
                base_time_ns: info.base_time_ns,
                event_spacing_ns: info.event_spacing_ns,
                events: FaultMatrix::canonical().last_event() + 1,
            },
            readout: ReadoutConfig {
                controllers,
                invert_mapping: false,
                trigger_type: 0,
            },
            mode: RunMode::Generate,
            faults: FaultConfig::default(),
            output: OutputConfig {
                packets: data_dir.join("packets.bin"),
                reported: data_dir.join("reported.jsonl"),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: None,
            },
            config_file_path: config_path,
        }
    }

    pub fn run_info(&self) -> RunInfo {
        RunInfo {
            experiment: self.run.experiment,
            run: self.run.run,
            subrun: self.run.subrun,
            base_time_ns: self.run.base_time_ns,
            event_spacing_ns: self.run.event_spacing_ns,
        }
    }

    /// Validate the readout topology
    pub fn readout_map(&self) -> Result<ReadoutMap, SetupError> {
        Ok(ReadoutMap::new(&self.readout.controllers)?
            .with_invert_mapping(self.readout.invert_mapping)
            .with_trigger_type(self.readout.trigger_type))
    }

    /// Canonical matrix plus the configured extra scenarios
    pub fn fault_matrix(&self) -> Result<FaultMatrix, SetupError> {
        self.faults
            .extra
            .iter()
            .try_fold(FaultMatrix::canonical(), |matrix, (&event, scenarios)| {
                matrix.with_scenarios(event, scenarios.iter().copied())
            })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_file_path
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("faultgen")
            .join("config.yaml")
    }

    fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("faultgen")
    }
}
