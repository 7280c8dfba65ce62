//! Device configuration for local inference.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::MimirError;

/// Compute device a model instance is bound to.
///
/// Part of every request fingerprint: the same model on a different device
/// is a different instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// CPU execution (default).
    #[default]
    Cpu,

    /// CUDA GPU execution.
    Cuda {
        /// GPU device ID (0-indexed).
        device_id: u32,
    },

    /// Apple Metal execution.
    Metal,
}

impl Device {
    /// Create CPU device.
    pub fn cpu() -> Self {
        Self::Cpu
    }

    /// Create CUDA device with the given device ID.
    pub fn cuda(device_id: u32) -> Self {
        Self::Cuda { device_id }
    }

    /// Get the device name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::Cuda { .. } => "CUDA",
            Self::Metal => "Metal",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda { device_id } => write!(f, "cuda:{device_id}"),
            Self::Metal => f.write_str("metal"),
        }
    }
}

/// Parses `cpu`, `metal`, `cuda` (device 0) and `cuda:N`.
impl FromStr for Device {
    type Err = MimirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "metal" => Ok(Self::Metal),
            "cuda" => Ok(Self::cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|id| id.parse().ok())
                .map(Self::cuda)
                .ok_or_else(|| MimirError::InvalidInput(format!("unknown device '{s}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_cpu() {
        assert_eq!(Device::default(), Device::Cpu);
    }

    #[test]
    fn cpu_constructor() {
        assert_eq!(Device::cpu(), Device::Cpu);
    }

    #[test]
    fn cpu_name() {
        assert_eq!(Device::Cpu.name(), "CPU");
    }

    #[test]
    fn cuda_constructor() {
        let device = Device::cuda(0);
        assert_eq!(device, Device::Cuda { device_id: 0 });
    }

    #[test]
    fn cuda_name() {
        assert_eq!(Device::cuda(0).name(), "CUDA");
    }

    #[test]
    fn parse_devices() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::cuda(0));
        assert_eq!("cuda:3".parse::<Device>().unwrap(), Device::cuda(3));
        assert_eq!("metal".parse::<Device>().unwrap(), Device::Metal);
        assert!("tpu".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for device in [Device::Cpu, Device::cuda(1), Device::Metal] {
            assert_eq!(device.to_string().parse::<Device>().unwrap(), device);
        }
    }
}
