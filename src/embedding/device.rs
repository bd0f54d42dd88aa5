//! Compute device selection for local inference.

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider,
    ExecutionProviderDispatch,
};

/// Where a forward pass runs, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Device {
    /// Dedicated accelerator.
    Cuda,
    /// Secondary accelerator (Apple Neural Engine / GPU).
    CoreMl,
    Cpu,
}

impl Device {
    pub const PRIORITY: [Device; 3] = [Device::Cuda, Device::CoreMl, Device::Cpu];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::CoreMl => "coreml",
            Self::Cpu => "cpu",
        }
    }

    /// The ONNX Runtime execution provider for this device.
    pub(crate) fn execution_provider(&self) -> ExecutionProviderDispatch {
        match self {
            Self::Cuda => CUDAExecutionProvider::default().build().error_on_failure(),
            Self::CoreMl => CoreMLExecutionProvider::default().build().error_on_failure(),
            Self::Cpu => CPUExecutionProvider::default().build(),
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reports which devices are usable right now. Must be side-effect free.
pub trait DeviceProbe: Send + Sync {
    fn is_available(&self, device: Device) -> bool;
}

/// Asks ONNX Runtime which execution providers were compiled in and can start.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrtDeviceProbe;

impl DeviceProbe for OrtDeviceProbe {
    fn is_available(&self, device: Device) -> bool {
        let available = match device {
            Device::Cuda => CUDAExecutionProvider::default().is_available(),
            Device::CoreMl => CoreMLExecutionProvider::default().is_available(),
            Device::Cpu => return true,
        };
        available.unwrap_or(false)
    }
}

/// Always reports the CPU only.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuOnly;

impl DeviceProbe for CpuOnly {
    fn is_available(&self, device: Device) -> bool {
        device == Device::Cpu
    }
}

/// Highest-priority device the probe reports as available. The CPU is always
/// the last resort.
pub fn select_device(probe: &dyn DeviceProbe) -> Device {
    Device::PRIORITY
        .into_iter()
        .find(|&device| probe.is_available(device))
        .unwrap_or(Device::Cpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Only(&'static [Device]);

    impl DeviceProbe for Only {
        fn is_available(&self, device: Device) -> bool {
            self.0.contains(&device)
        }
    }

    #[test]
    fn prefers_dedicated_accelerator() {
        assert_eq!(
            select_device(&Only(&[Device::Cpu, Device::CoreMl, Device::Cuda])),
            Device::Cuda
        );
    }

    #[test]
    fn secondary_accelerator_before_cpu() {
        assert_eq!(select_device(&Only(&[Device::Cpu, Device::CoreMl])), Device::CoreMl);
    }

    #[test]
    fn cpu_when_nothing_else() {
        assert_eq!(select_device(&CpuOnly), Device::Cpu);
        assert_eq!(select_device(&Only(&[])), Device::Cpu);
    }
}
