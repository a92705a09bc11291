//! 设备内存块句柄.
//!
//! 内存分配与映射由外部协作方负责, 本核心只持有不透明句柄,
//! 地址写入以"句柄 + 块内偏移"的形式记录为重定位项,
//! 由提交阶段换算成物理地址.

/// 设备内存块句柄 (由外部分配器发放)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// 内存块用途
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// 仅 VPU 可见
    VpuOnly,
    /// CPU 与 VPU 均可见 (创建后需要 CPU 端写入初始数据)
    CpuVpu,
}

/// 设备地址引用: 内存块 + 块内偏移
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferLocation {
    pub buffer: BufferHandle,
    pub offset: u32,
}

impl BufferLocation {
    pub const fn new(buffer: BufferHandle, offset: u32) -> Self {
        Self { buffer, offset }
    }

    /// 块起始地址
    pub const fn base(buffer: BufferHandle) -> Self {
        Self { buffer, offset: 0 }
    }
}
