//! 外部协作者接口.
//!
//! 内存块的实际分配、物理提交、栅栏与硬件去块滤波都由调用方完成,
//! 本 crate 只通过这里的 trait 与之交互.

use bitflags::bitflags;
use vdx_cmdbuf::CmdBuf;
use vdx_core::{BufferHandle, BufferUsage, SurfaceId, VdxResult};

bitflags! {
    /// 随命令缓冲提交的固件标志
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SubmitFlags: u32 {
        /// 本图的首个切片
        const FIRST_SLICE     = 0x0001;
        /// MBAFF 编码图
        const MBAFF           = 0x0002;
        /// 需要第二遍去块
        const TWO_PASS_DEBLOCK = 0x0004;
    }
}

/// 一次命令缓冲提交
pub struct SubmitRequest {
    pub cmdbuf: CmdBuf,
    pub flags: SubmitFlags,
    /// 本切片首宏块, (y << 8) | x
    pub first_mb: u32,
    /// 本图末宏块, (y << 8) | x
    pub last_mb: u32,
}

/// 一次硬件去块提交
#[derive(Clone, Copy, Debug)]
pub struct DeblockRequest {
    /// 去块滤波的源内存块
    pub source_buf: BufferHandle,
    /// 目的内存块 (标准路径缺省为源, 可为旋转面)
    pub dest_buf: Option<BufferHandle>,
    pub colocated_buf: Option<BufferHandle>,
    pub picture_width_mb: u32,
    pub picture_height_mb: u32,
    pub rotation_flags: u32,
    pub field_type: u32,
    pub ext_stride: u32,
    pub chroma_offset_src: u32,
    pub chroma_offset_dst: u32,
    /// 环外帧内去块路径
    pub is_oold: bool,
}

/// 解码宿主: 缓冲分配、数据上载与提交通道
pub trait DecodeHost {
    /// 分配一个设备内存块
    fn create_buffer(&mut self, size: u32, usage: BufferUsage) -> VdxResult<BufferHandle>;

    /// 把字节数据上载到内存块起始处
    fn upload(&mut self, buffer: BufferHandle, data: &[u8]) -> VdxResult<()>;

    /// 把表面的色度平面填为中性灰 (单色图用)
    fn fill_chroma_neutral(&mut self, surface: SurfaceId, value: u8) -> VdxResult<()>;

    /// 提交一个已收口的命令缓冲
    fn submit(&mut self, request: SubmitRequest) -> VdxResult<()>;

    /// 提交一次硬件去块
    fn submit_deblock(&mut self, request: DeblockRequest) -> VdxResult<()>;

    /// 冲刷所有挂起的提交
    fn flush(&mut self) -> VdxResult<()>;
}
