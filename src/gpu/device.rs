// gpu/device.rs — wgpu device, hardware profile and workgroup sizing.
//
// Responsibilities:
//   - Enumerate Vulkan adapters and pick a hardware one, falling back to
//     whatever exists (logged, so a software renderer is never a surprise).
//   - Carry a `DeviceProfile` that caps requested limits to a small target
//     (Raspberry Pi) while developing on a desktop GPU.
//   - Provide the validated `WorkgroupSize` every mask kernel is compiled
//     with, and the matching dispatch size for a frame.
//
// DEVICE LIMITS
// ─────────────
// Under a non-Native profile we request *lower* limits than the adapter
// supports. wgpu validates every dispatch and texture against the requested
// limits, so a kernel that would fail on the Pi fails on the laptop first.
//
// WORKGROUP SIZES
// ───────────────
// naga does not accept `override` constants inside `@workgroup_size`, so
// each kernel's WGSL carries `{{WG_X}}` / `{{WG_Y}}` placeholders that
// `WorkgroupSize::specialize` fills in before the module is created.

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use crate::error::ConfigError;

/// Hardware profile controlling device limits and default workgroup sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// The adapter's own limits.
    Native,
    /// Raspberry Pi 4/5 (VideoCore VI/VII, V3DV). 256 invocations per
    /// workgroup, 4096² textures.
    RaspberryPi,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::RaspberryPi => write!(f, "RaspberryPi (simulated limits)"),
        }
    }
}

/// 2D workgroup size for the per-pixel mask kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// Validated constructor: both sides non-zero and x * y within `max`
    /// invocations.
    pub fn new(x: u32, y: u32, max: u32) -> Result<Self, GpuError> {
        if x == 0 || y == 0 {
            return Err(GpuError::EmptyWorkgroup { x, y });
        }
        match x.checked_mul(y) {
            Some(total) if total <= max => Ok(WorkgroupSize { x, y }),
            _ => Err(GpuError::WorkgroupTooLarge { x, y, max }),
        }
    }

    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Default for a profile: 16×8 on desktop GPUs (four 32-wide warps,
    /// two 64-wide wavefronts), 8×8 on the Pi.
    pub fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 16, y: 8 },
            DeviceProfile::RaspberryPi => WorkgroupSize { x: 8, y: 8 },
        }
    }

    /// Substitute `{{WG_X}}` and `{{WG_Y}}` in a WGSL template.
    pub fn specialize(&self, template: &str) -> String {
        template
            .replace("{{WG_X}}", &self.x.to_string())
            .replace("{{WG_Y}}", &self.y.to_string())
    }

    /// Workgroups needed to cover `width × height` pixels (ceiling
    /// division). Kernels guard the overhanging invocations themselves.
    pub fn dispatch_size(&self, width: u32, height: u32) -> (u32, u32) {
        ((width + self.x - 1) / self.x, (height + self.y - 1) / self.y)
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Adapter details kept for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl From<wgpu::AdapterInfo> for AdapterInfo {
    fn from(raw: wgpu::AdapterInfo) -> Self {
        AdapterInfo {
            name: raw.name,
            vendor: raw.vendor,
            device: raw.device,
            device_type: raw.device_type,
            backend: raw.backend,
        }
    }
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Adapter, device, queue and active profile.
///
/// Hold one per process and share it between feeds; every GPU stage
/// borrows it for construction and dispatch.
///
/// # Field drop order
/// Fields drop top to bottom. `_instance` is last so the Vulkan instance
/// outlives `device` and `queue`; dzn on WSL2 crashes when the instance
/// goes first.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// First suitable Vulkan adapter with `DeviceProfile::Native` limits.
    pub fn new() -> Result<Self, GpuError> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, GpuError> {
        // dzn (D3D12→Vulkan on WSL2) reports itself non-conformant and is
        // hidden unless asked for.
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            flags,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(wgpu::Backends::VULKAN);
        if adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }
        for a in &adapters {
            let info = a.get_info();
            info!(name = %info.name, backend = ?info.backend, kind = ?info.device_type, "vulkan adapter");
        }

        // Hardware first; a CPU rasterizer only as a last resort.
        let mut adapters = adapters.into_iter();
        let adapter = match adapters
            .by_ref()
            .find(|a| !matches!(a.get_info().device_type, wgpu::DeviceType::Cpu))
        {
            Some(a) => a,
            None => {
                let fallback = instance
                    .enumerate_adapters(wgpu::Backends::VULKAN)
                    .into_iter()
                    .next()
                    .ok_or(GpuError::NoSuitableAdapter)?;
                warn!(name = %fallback.get_info().name, "no hardware adapter; using software renderer");
                fallback
            }
        };

        let adapter_info = AdapterInfo::from(adapter.get_info());

        // GpuDevice::new() on a Pi should not need the caller to know it
        // is on a Pi.
        let profile = match profile {
            DeviceProfile::Native if adapter_info.name.to_ascii_lowercase().contains("v3d") => {
                info!("V3D adapter detected, switching to RaspberryPi profile");
                DeviceProfile::RaspberryPi
            }
            other => other,
        };

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("footfall"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits_for_profile(profile),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        let workgroup_size = WorkgroupSize::for_profile(profile);
        info!(adapter = %adapter_info, %profile, workgroup = %workgroup_size, "gpu device ready");

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            workgroup_size,
            _instance: instance,
        })
    }

    /// Override the default workgroup size. Rejected when either side is
    /// zero or x * y exceeds the profile's invocation limit. Affects stages
    /// built afterwards.
    pub fn set_workgroup_size(&mut self, x: u32, y: u32) -> Result<(), GpuError> {
        self.workgroup_size = WorkgroupSize::new(x, y, max_invocations_for_profile(self.profile))?;
        Ok(())
    }

    /// Dispatch dimensions covering an image with the active workgroup
    /// size.
    pub fn dispatch_size(&self, img_w: u32, img_h: u32) -> (u32, u32) {
        self.workgroup_size.dispatch_size(img_w, img_h)
    }

    /// Compile a WGSL template with this device's workgroup size.
    pub(crate) fn shader_module(&self, label: &str, template: &str) -> wgpu::ShaderModule {
        let source = self.workgroup_size.specialize(template);
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {} }}",
            self.adapter_info, self.profile, self.workgroup_size
        )
    }
}

// ============================================================
// Limits helpers
// ============================================================

fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),
        DeviceProfile::RaspberryPi => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_texture_dimension_2d: 4096,
            // The history ring is one array layer per frame.
            max_texture_array_layers: 256,
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

fn max_invocations_for_profile(profile: DeviceProfile) -> u32 {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default().max_compute_invocations_per_workgroup,
        DeviceProfile::RaspberryPi => 256,
    }
}

// ============================================================
// Error type
// ============================================================

/// Errors from GPU setup and GPU stage construction.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No Vulkan adapter at all. On WSL2 check that `vulkaninfo` lists
    /// a device.
    #[error("no suitable Vulkan adapter found")]
    NoSuitableAdapter,

    #[error("device request failed: {0}")]
    DeviceRequest(#[source] wgpu::RequestDeviceError),

    #[error("workgroup size {x}×{y} has a zero side")]
    EmptyWorkgroup { x: u32, y: u32 },

    #[error("workgroup size {x}×{y} exceeds profile limit of {max} invocations")]
    WorkgroupTooLarge { x: u32, y: u32, max: u32 },

    #[error("invalid stage configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Mapping a readback staging buffer failed.
    #[error("readback buffer map failed: {0}")]
    BufferMap(#[source] wgpu::BufferAsyncError),
}

// ============================================================
// Tests
// ============================================================
