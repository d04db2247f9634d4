use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where the splits of a dataset live and how its classes are named.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Root the split paths are relative to.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub train: Option<PathBuf>,
    #[serde(default)]
    pub val: Option<PathBuf>,
    #[serde(default)]
    pub test: Option<PathBuf>,
    #[serde(default)]
    pub names: Vec<String>,
}

impl DatasetDescriptor {
    /// Returns the number of named classes.
    pub fn nc(&self) -> usize {
        self.names.len()
    }

    /// Returns the split used for evaluation: `val`, falling back to `test`.
    pub fn eval_split(&self) -> Option<&Path> {
        self.val.as_deref().or(self.test.as_deref())
    }
}
