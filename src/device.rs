//! Device identity for allocator lookup
//!
//! A [`DeviceKey`] names the (device, memory type) pair an allocator serves.
//! The registry keys on the typed value; the packed `i32` form exists for
//! logging and for callers that need a compact, collision-free integer.
//!
//! # Encoding
//!
//! ```text
//! bits 28..31  device type      (4 bits)
//! bits 24..27  device mem kind  (4 bits)
//! bits 16..23  mem type + 2     (8 bits)
//! bits  0..15  ordinal          (16 bits)
//! ```

use std::fmt;

/// Ordinal of a device within its type (GPU 0, GPU 1, ...)
pub type DeviceOrdinal = u16;

/// Physical device kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DeviceType {
    Cpu = 0,
    Gpu = 1,
    Fpga = 2,
    Npu = 3,
}

impl DeviceType {
    pub const ALL: [DeviceType; 4] = [
        DeviceType::Cpu,
        DeviceType::Gpu,
        DeviceType::Fpga,
        DeviceType::Npu,
    ];

    fn from_bits(bits: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| *t as u32 == bits)
    }
}

/// Kind of memory on a device
///
/// Pinned kinds are host memory registered with an accelerator runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum DeviceMemKind {
    #[default]
    Default = 0,
    CudaPinned = 1,
    HipPinned = 2,
    CannPinned = 3,
}

impl DeviceMemKind {
    pub const ALL: [DeviceMemKind; 4] = [
        DeviceMemKind::Default,
        DeviceMemKind::CudaPinned,
        DeviceMemKind::HipPinned,
        DeviceMemKind::CannPinned,
    ];

    fn from_bits(bits: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| *k as u32 == bits)
    }
}

/// How a kernel uses memory from an allocator
///
/// `CpuInput` and `CpuOutput` are host-accessible buffers owned by a
/// non-CPU provider; `Default` is the provider's own device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(i8)]
pub enum MemType {
    CpuInput = -2,
    CpuOutput = -1,
    #[default]
    Default = 0,
}

impl MemType {
    /// Alias used by providers that only distinguish CPU-visible memory
    pub const CPU: MemType = MemType::CpuOutput;

    pub const ALL: [MemType; 3] = [MemType::CpuInput, MemType::CpuOutput, MemType::Default];

    fn to_bits(self) -> u32 {
        (self as i32 + 2) as u32
    }

    fn from_bits(bits: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.to_bits() == bits)
    }
}

/// A physical device plus the kind of memory it exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Device {
    pub device_type: DeviceType,
    pub mem_kind: DeviceMemKind,
    pub ordinal: DeviceOrdinal,
}

impl Device {
    pub fn new(device_type: DeviceType, mem_kind: DeviceMemKind, ordinal: DeviceOrdinal) -> Self {
        Self {
            device_type,
            mem_kind,
            ordinal,
        }
    }

    /// The host CPU
    pub fn cpu() -> Self {
        Self::new(DeviceType::Cpu, DeviceMemKind::Default, 0)
    }

    /// Default memory of GPU `ordinal`
    pub fn gpu(ordinal: DeviceOrdinal) -> Self {
        Self::new(DeviceType::Gpu, DeviceMemKind::Default, ordinal)
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.device_type {
            DeviceType::Cpu => "cpu",
            DeviceType::Gpu => "gpu",
            DeviceType::Fpga => "fpga",
            DeviceType::Npu => "npu",
        };
        write!(f, "{}:{}", name, self.ordinal)?;
        if self.mem_kind != DeviceMemKind::Default {
            write!(f, "/{:?}", self.mem_kind)?;
        }
        Ok(())
    }
}

/// Registry identity of an allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    pub mem_type: MemType,
    pub device: Device,
}

impl DeviceKey {
    const TYPE_SHIFT: u32 = 28;
    const MEM_KIND_SHIFT: u32 = 24;
    const MEM_TYPE_SHIFT: u32 = 16;
    const NIBBLE: u32 = 0xF;
    const BYTE: u32 = 0xFF;
    const ORDINAL_MASK: u32 = 0xFFFF;

    pub fn new(mem_type: MemType, device: Device) -> Self {
        Self { mem_type, device }
    }

    /// Pack into a single `i32`
    pub fn encode(&self) -> i32 {
        let bits = (self.device.device_type as u32) << Self::TYPE_SHIFT
            | (self.device.mem_kind as u32) << Self::MEM_KIND_SHIFT
            | self.mem_type.to_bits() << Self::MEM_TYPE_SHIFT
            | self.device.ordinal as u32;
        bits as i32
    }

    /// Inverse of [`DeviceKey::encode`]; `None` for codes no key produces
    pub fn decode(code: i32) -> Option<Self> {
        let bits = code as u32;
        let device_type = DeviceType::from_bits((bits >> Self::TYPE_SHIFT) & Self::NIBBLE)?;
        let mem_kind = DeviceMemKind::from_bits((bits >> Self::MEM_KIND_SHIFT) & Self::NIBBLE)?;
        let mem_type = MemType::from_bits((bits >> Self::MEM_TYPE_SHIFT) & Self::BYTE)?;
        let ordinal = (bits & Self::ORDINAL_MASK) as DeviceOrdinal;
        Some(Self::new(
            mem_type,
            Device::new(device_type, mem_kind, ordinal),
        ))
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.device, self.mem_type)
    }
}

/// Whether an allocator hands out device memory directly or pools it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
    Device,
    Arena,
}

/// Descriptor every allocator exposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryInfo {
    pub name: String,
    pub kind: AllocatorKind,
    pub device: Device,
    pub mem_type: MemType,
}

impl MemoryInfo {
    pub fn new(name: impl Into<String>, kind: AllocatorKind, device: Device, mem_type: MemType) -> Self {
        Self {
            name: name.into(),
            kind,
            device,
            mem_type,
        }
    }

    /// Registry identity of the allocator described by this info
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.mem_type, self.device)
    }

    /// Same descriptor with a different kind, used by wrapping allocators
    pub fn with_kind(&self, kind: AllocatorKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }
}
