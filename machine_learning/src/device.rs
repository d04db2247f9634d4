use std::{env, fmt, str::FromStr};

use log::info;

use crate::{MlErr, Result};

/// The device a model is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

impl Device {
    /// Whether the device has an accelerated half precision path.
    pub fn supports_half(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(i) => write!(f, "cuda:{i}"),
        }
    }
}

impl FromStr for Device {
    type Err = MlErr;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();

        match s.as_str() {
            "" | "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            other => {
                let index = other.strip_prefix("cuda:").unwrap_or(other);
                index
                    .parse()
                    .map(Device::Cuda)
                    .map_err(|_| MlErr::InvalidDevice(format!("unknown device '{other}'")))
            }
        }
    }
}

/// Resolves a requested device string into a `Device`.
///
/// Accelerator indices are checked against `CUDA_VISIBLE_DEVICES` when it is set.
///
/// # Arguments
/// * `requested` - The device string, e.g. `"cpu"`, `"0"` or `"cuda:1"`.
/// * `batch_size` - The batch size the device will run with, used for logging.
///
/// # Returns
/// The selected device or an error if the request is invalid.
pub fn select_device(requested: &str, batch_size: usize) -> Result<Device> {
    let device: Device = requested.parse()?;

    if let Device::Cuda(index) = device {
        let visible = env::var("CUDA_VISIBLE_DEVICES").unwrap_or_default();
        let count = visible.split(',').filter(|s| !s.trim().is_empty()).count();

        if count == 0 || index as usize >= count {
            return Err(MlErr::InvalidDevice(format!(
                "{device} requested but {count} accelerator(s) are visible"
            )));
        }
    }

    info!("selected device {device} (batch size {batch_size})");
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_strings() {
        assert_eq!("".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:2".parse::<Device>().unwrap(), Device::Cuda(2));
        assert_eq!("1".parse::<Device>().unwrap(), Device::Cuda(1));
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn only_accelerators_support_half() {
        assert!(!Device::Cpu.supports_half());
        assert!(Device::Cuda(0).supports_half());
    }

    #[test]
    fn cpu_is_always_selectable() {
        assert_eq!(select_device("cpu", 8).unwrap(), Device::Cpu);
    }
}
