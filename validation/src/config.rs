use std::{fmt, fs, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValError};

/// The perception task being evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    #[default]
    Classify,
    Detect,
    Segment,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Task::Classify => "classify",
            Task::Detect => "detect",
            Task::Segment => "segment",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Task {
    type Err = ValError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "classify" => Ok(Task::Classify),
            "detect" => Ok(Task::Detect),
            "segment" => Ok(Task::Segment),
            other => Err(ValError::Configuration(format!("unknown task '{other}'"))),
        }
    }
}

/// The mode a run directory is named after.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Train,
    #[default]
    Val,
    Predict,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Train => "train",
            Mode::Val => "val",
            Mode::Predict => "predict",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Mode {
    type Err = ValError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Mode::Train),
            "val" => Ok(Mode::Val),
            "predict" => Ok(Mode::Predict),
            other => Err(ValError::Configuration(format!("unknown mode '{other}'"))),
        }
    }
}

/// Every option a validation run reads.
///
/// `RunConfig::default()` is the documented default configuration, any field missing from a
/// JSON config file takes its value from there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub task: Task,
    pub mode: Mode,
    /// Parent of the run directory, `runs/<task>` when unset.
    pub project: Option<PathBuf>,
    /// Name of the run directory, the mode when unset.
    pub name: Option<String>,
    /// Reuse an existing run directory instead of incrementing.
    pub exist_ok: bool,
    pub device: String,
    pub batch_size: usize,
    pub imgsz: usize,
    pub half: bool,
    /// Dataset locator, a descriptor file or a dataset directory.
    pub data: Option<String>,
    pub save_txt: bool,
    pub save_json: bool,
    pub plots: bool,
    pub dnn: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            task: Task::default(),
            mode: Mode::default(),
            project: None,
            name: None,
            exist_ok: false,
            device: String::new(),
            batch_size: 16,
            imgsz: 640,
            half: false,
            data: None,
            save_txt: false,
            save_json: false,
            plots: false,
            dnn: false,
        }
    }
}

impl RunConfig {
    /// Reads a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        Ok(cfg)
    }

    /// Sets a single option from its textual form.
    ///
    /// # Arguments
    /// * `key` - The option name, as it appears in the JSON config.
    /// * `value` - The raw value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "task" => self.task = value.parse()?,
            "mode" => self.mode = value.parse()?,
            "project" => self.project = non_empty(value).map(PathBuf::from),
            "name" => self.name = non_empty(value).map(str::to_string),
            "exist_ok" => self.exist_ok = parse_flag(key, value)?,
            "device" => self.device = value.to_string(),
            "batch_size" | "batch" => self.batch_size = parse_count(key, value)?,
            "imgsz" => self.imgsz = parse_count(key, value)?,
            "half" => self.half = parse_flag(key, value)?,
            "data" => self.data = non_empty(value).map(str::to_string),
            "save_txt" => self.save_txt = parse_flag(key, value)?,
            "save_json" => self.save_json = parse_flag(key, value)?,
            "plots" => self.plots = parse_flag(key, value)?,
            "dnn" => self.dnn = parse_flag(key, value)?,
            other => {
                return Err(ValError::Configuration(format!("unknown option '{other}'")));
            }
        }

        Ok(())
    }

    /// Applies `key=value` overrides in order.
    pub fn apply_overrides<I, S>(&mut self, overrides: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in overrides {
            let raw = raw.as_ref();
            let Some((key, value)) = raw.split_once('=') else {
                return Err(ValError::Configuration(format!(
                    "override '{raw}' is not of the form key=value"
                )));
            };

            self.set(key.trim(), value.trim())?;
        }

        Ok(())
    }

    /// Checks the options that have no sensible zero value.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ValError::Configuration("batch_size must be positive".into()));
        }

        if self.imgsz == 0 {
            return Err(ValError::Configuration("imgsz must be positive".into()));
        }

        Ok(())
    }

    /// The run directory this configuration asks for, before incrementing.
    pub fn run_dir(&self) -> PathBuf {
        let project = self
            .project
            .clone()
            .unwrap_or_else(|| PathBuf::from("runs").join(self.task.to_string()));

        let name = self.name.clone().unwrap_or_else(|| self.mode.to_string());
        project.join(name)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    match value {
        "" | "none" | "null" => None,
        v => Some(v),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ValError::Configuration(format!(
            "option '{key}' expects a boolean, got '{value}'"
        ))),
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| {
        ValError::Configuration(format!("option '{key}' expects an integer, got '{value}'"))
    })
}
