//! Compute device selection for local embedding and generation backends.
//!
//! Device resolution is a startup concern: [`select_device`] is a pure
//! function from a request and the number of visible GPUs to a concrete
//! [`Device`], and the pipeline only ever sees the resolved handle inside
//! an [`AcceleratorConfig`]. Nothing here is mutated after construction.

use std::fmt;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RagError, Result};

/// A resolved compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "index")]
pub enum Device {
    /// Host CPU.
    Cpu,
    /// CUDA GPU with the given device index.
    Cuda(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

/// A device request as it appears in configuration, before resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceRequest {
    /// Pick the first GPU if any is visible, otherwise the CPU.
    #[default]
    Auto,
    /// Force the CPU.
    Cpu,
    /// Request a specific CUDA device.
    Cuda(u32),
}

impl FromStr for DeviceRequest {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DeviceRequest::Auto),
            "cpu" => Ok(DeviceRequest::Cpu),
            "cuda" => Ok(DeviceRequest::Cuda(0)),
            other => {
                if let Some(index) = other.strip_prefix("cuda:") {
                    let index = index.parse::<u32>().map_err(|_| {
                        RagError::InvalidConfig(format!("invalid device '{other}'"))
                    })?;
                    Ok(DeviceRequest::Cuda(index))
                } else {
                    Err(RagError::InvalidConfig(format!(
                        "invalid device '{other}' (expected auto, cpu, cuda, or cuda:N)"
                    )))
                }
            }
        }
    }
}

/// Resolve a device request against the number of visible GPUs.
///
/// Fallback rules:
/// - a CUDA request with no GPU visible falls back to the CPU,
/// - an out-of-range GPU index falls back to GPU 0,
/// - `Auto` picks GPU 0 when available, otherwise the CPU.
pub fn select_device(requested: DeviceRequest, available_gpus: u32) -> Device {
    match requested {
        DeviceRequest::Cpu => Device::Cpu,
        DeviceRequest::Cuda(_) if available_gpus == 0 => {
            warn!("CUDA requested but no GPU is visible, falling back to CPU");
            Device::Cpu
        }
        DeviceRequest::Cuda(index) if index >= available_gpus => {
            warn!(
                requested = index,
                available = available_gpus,
                "GPU index out of range, using GPU 0"
            );
            Device::Cuda(0)
        }
        DeviceRequest::Cuda(index) => Device::Cuda(index),
        DeviceRequest::Auto => {
            if available_gpus > 0 {
                Device::Cuda(0)
            } else {
                info!("no GPU detected, using CPU");
                Device::Cpu
            }
        }
    }
}

/// Count the CUDA GPUs visible to this process.
///
/// Checks `/proc/driver/nvidia/gpus` first and falls back to
/// `nvidia-smi -L`. Returns 0 when neither source is usable.
pub fn detect_gpu_count() -> u32 {
    let proc_gpus = Path::new("/proc/driver/nvidia/gpus");
    if let Ok(entries) = std::fs::read_dir(proc_gpus) {
        return entries.count() as u32;
    }

    match Command::new("nvidia-smi").arg("-L").output() {
        Ok(output) if output.status.success() => {
            let listing = String::from_utf8_lossy(&output.stdout);
            listing.lines().filter(|l| l.starts_with("GPU ")).count() as u32
        }
        _ => 0,
    }
}

/// Accelerator settings resolved once at startup and passed by reference
/// into provider constructors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorConfig {
    /// The resolved compute device.
    pub device: Device,
    /// Fraction of accelerator memory the backend may claim, in `(0, 1]`.
    pub memory_fraction: f32,
}

impl AcceleratorConfig {
    /// Create a validated accelerator configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `memory_fraction` is not in `(0, 1]`.
    pub fn new(device: Device, memory_fraction: f32) -> Result<Self> {
        if !(memory_fraction > 0.0 && memory_fraction <= 1.0) {
            return Err(RagError::InvalidConfig(format!(
                "memory_fraction ({memory_fraction}) must be in (0, 1]"
            )));
        }
        Ok(Self { device, memory_fraction })
    }
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self { device: Device::Cpu, memory_fraction: 0.8 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_cpu_is_honored_even_with_gpus() {
        assert_eq!(select_device(DeviceRequest::Cpu, 4), Device::Cpu);
    }

    #[test]
    fn cuda_without_gpu_falls_back_to_cpu() {
        assert_eq!(select_device(DeviceRequest::Cuda(0), 0), Device::Cpu);
    }

    #[test]
    fn out_of_range_index_falls_back_to_gpu_zero() {
        assert_eq!(select_device(DeviceRequest::Cuda(3), 2), Device::Cuda(0));
    }

    #[test]
    fn in_range_index_is_kept() {
        assert_eq!(select_device(DeviceRequest::Cuda(1), 2), Device::Cuda(1));
    }

    #[test]
    fn auto_prefers_gpu_when_available() {
        assert_eq!(select_device(DeviceRequest::Auto, 1), Device::Cuda(0));
        assert_eq!(select_device(DeviceRequest::Auto, 0), Device::Cpu);
    }

    #[test]
    fn device_request_parses() {
        assert_eq!("auto".parse::<DeviceRequest>().unwrap(), DeviceRequest::Auto);
        assert_eq!("CPU".parse::<DeviceRequest>().unwrap(), DeviceRequest::Cpu);
        assert_eq!("cuda".parse::<DeviceRequest>().unwrap(), DeviceRequest::Cuda(0));
        assert_eq!("cuda:2".parse::<DeviceRequest>().unwrap(), DeviceRequest::Cuda(2));
        assert!("tpu".parse::<DeviceRequest>().is_err());
        assert!("cuda:x".parse::<DeviceRequest>().is_err());
    }

    #[test]
    fn memory_fraction_is_validated() {
        assert!(AcceleratorConfig::new(Device::Cpu, 0.5).is_ok());
        assert!(AcceleratorConfig::new(Device::Cpu, 1.0).is_ok());
        assert!(AcceleratorConfig::new(Device::Cpu, 0.0).is_err());
        assert!(AcceleratorConfig::new(Device::Cpu, 1.5).is_err());
    }
}
