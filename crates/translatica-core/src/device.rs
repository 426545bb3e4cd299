//! Compute device selection for inference.

use candle_core::Device;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

use crate::config::DevicePreference;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cuda,
    Metal,
    Cpu,
}

impl DeviceKind {
    pub fn is_cpu(&self) -> bool {
        matches!(self, DeviceKind::Cpu)
    }

    pub fn is_accelerator(&self) -> bool {
        !self.is_cpu()
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Cuda => "cuda",
            DeviceKind::Metal => "metal",
            DeviceKind::Cpu => "cpu",
        };
        f.write_str(name)
    }
}

/// A resolved device together with its kind
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub device: Device,
    pub kind: DeviceKind,
}

impl DeviceProfile {
    pub fn cpu() -> Self {
        Self {
            device: Device::Cpu,
            kind: DeviceKind::Cpu,
        }
    }

    /// Wait for queued kernels so freed buffers are returned to the driver.
    pub fn synchronize(&self) {
        if self.kind.is_accelerator() {
            if let Err(err) = self.device.synchronize() {
                debug!("Device synchronize after release failed: {}", err);
            }
        }
    }
}

pub struct DeviceSelector;

impl DeviceSelector {
    fn try_cuda() -> Option<DeviceProfile> {
        let device = std::panic::catch_unwind(|| Device::cuda_if_available(0))
            .ok()?
            .ok()?;
        if device.is_cuda() {
            Some(DeviceProfile {
                device,
                kind: DeviceKind::Cuda,
            })
        } else {
            None
        }
    }

    fn try_metal() -> Option<DeviceProfile> {
        let device = std::panic::catch_unwind(|| {
            if candle_core::utils::metal_is_available() {
                Device::new_metal(0)
            } else {
                Ok(Device::Cpu)
            }
        })
            .ok()?
            .ok()?;
        if device.is_metal() {
            Some(DeviceProfile {
                device,
                kind: DeviceKind::Metal,
            })
        } else {
            None
        }
    }

    fn try_accelerator() -> Option<DeviceProfile> {
        if cfg!(target_os = "macos") {
            Self::try_metal().or_else(Self::try_cuda)
        } else {
            Self::try_cuda().or_else(Self::try_metal)
        }
    }

    /// Resolve a preference to a concrete device.
    ///
    /// `Auto` falls back to CPU when no accelerator is usable. An explicit
    /// `Accelerator` request skips that fallback and fails instead.
    pub fn resolve(preference: DevicePreference) -> Result<DeviceProfile> {
        match preference {
            DevicePreference::Cpu => {
                info!("Using CPU for inference (explicitly requested)");
                Ok(DeviceProfile::cpu())
            }
            DevicePreference::Accelerator => match Self::try_accelerator() {
                Some(profile) => {
                    info!("Using {} device for inference", profile.kind);
                    Ok(profile)
                }
                None => Err(Error::DeviceUnavailable(
                    "no CUDA or Metal device found (is the crate built with the cuda/metal feature?)"
                        .to_string(),
                )),
            },
            DevicePreference::Auto => {
                if let Some(profile) = Self::try_accelerator() {
                    info!("Using {} device for inference", profile.kind);
                    return Ok(profile);
                }
                info!("Falling back to CPU for inference");
                Ok(DeviceProfile::cpu())
            }
        }
    }
}
