use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use machine_learning::data::DatasetDescriptor;

use crate::error::{Result, ValError};

/// Turns a dataset locator into a descriptor of its splits.
pub trait DatasetResolver {
    fn resolve(&self, locator: &str) -> Result<DatasetDescriptor>;
}

/// Resolves either a JSON descriptor file or a dataset directory.
///
/// A directory holds its splits as `train.csv`, `val.csv` and `test.csv`, and optionally a
/// `names.txt` with one class name per line. Every path in the returned descriptor is joined
/// onto the dataset root.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResolver;

impl DefaultResolver {
    fn from_descriptor_file(locator: &str, file: &Path) -> Result<DatasetDescriptor> {
        let raw = fs::read_to_string(file).map_err(|e| ValError::dataset(locator, e))?;
        let mut data: DatasetDescriptor =
            serde_json::from_str(&raw).map_err(|e| ValError::dataset(locator, e))?;

        let parent = file.parent().unwrap_or(Path::new("."));
        let root = match data.path.take() {
            Some(p) if p.is_absolute() => p,
            Some(p) => parent.join(p),
            None => parent.to_path_buf(),
        };

        for split in [&mut data.train, &mut data.val, &mut data.test] {
            if let Some(p) = split.take() {
                *split = Some(if p.is_absolute() { p } else { root.join(p) });
            }
        }

        data.path = Some(root);
        Ok(data)
    }

    fn from_directory(dir: &Path) -> Result<DatasetDescriptor> {
        let split = |name: &str| -> Option<PathBuf> {
            let p = dir.join(format!("{name}.csv"));
            p.is_file().then_some(p)
        };

        let names_file = dir.join("names.txt");
        let names = if names_file.is_file() {
            fs::read_to_string(&names_file)?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };

        Ok(DatasetDescriptor {
            path: Some(dir.to_path_buf()),
            train: split("train"),
            val: split("val"),
            test: split("test"),
            names,
        })
    }
}

impl DatasetResolver for DefaultResolver {
    fn resolve(&self, locator: &str) -> Result<DatasetDescriptor> {
        let path = Path::new(locator);

        let data = if path.is_dir() {
            Self::from_directory(path).map_err(|e| ValError::dataset(locator, e))?
        } else if path.extension().is_some_and(|e| e == "json") {
            Self::from_descriptor_file(locator, path)?
        } else if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
            return Err(ValError::dataset(
                locator,
                "YAML descriptors are not supported, convert it to a JSON descriptor",
            ));
        } else {
            return Err(ValError::dataset(
                locator,
                "expected a JSON descriptor file or a dataset directory",
            ));
        };

        let Some(split) = data.eval_split() else {
            return Err(ValError::dataset(locator, "no 'val' or 'test' split"));
        };

        if !split.is_file() {
            return Err(ValError::dataset(
                locator,
                format!("split '{}' does not exist", split.display()),
            ));
        }

        debug!("resolved dataset {locator} to {} classes", data.nc());
        Ok(data)
    }
}
