//! 解码表面抽象与持久标注.
//!
//! 表面本体 (重建图像内存) 由外部表面池所有, 本核心通过 [`SurfacePool`]
//! 按句柄查找, 并在表面上维护一小块跨图像的标注状态 (side channel):
//! DPB 索引与引用标志逐图像重新推导, 共置缓冲表索引一经分配即对
//! 表面生命期稳定.

use std::collections::HashMap;

use crate::buffer::BufferHandle;

/// 表面句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

/// 输出旋转模式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Rot90,
    Rot180,
    Rot270,
}

impl Rotation {
    /// 硬件旋转模式编码
    pub const fn hw_mode(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Rot90 => 1,
            Rotation::Rot180 => 2,
            Rotation::Rot270 => 3,
        }
    }
}

/// 表面持久标注.
///
/// `dpb_idx` 与 `in_use` 每图像重新推导, 属易失状态;
/// `colocated_index` 为 1 基索引, `None` 表示未分配,
/// 一经分配在表面生命期内不再改变.
#[derive(Clone, Copy, Debug, Default)]
pub struct SurfaceAnnotation {
    /// 当前图像是否实际引用此表面
    pub in_use: bool,
    /// 缓存的共置图像寄存器映像 (由图像参数阶段写入, B slice 阶段读回)
    pub col_pic_params: u32,
    /// 当前 DPB 索引 (0..16)
    pub dpb_idx: Option<u8>,
    /// 共置缓冲表 1 基索引
    pub colocated_index: Option<u32>,
}

/// 旋转输出表面
#[derive(Clone, Copy, Debug)]
pub struct RotateSurface {
    pub buf: BufferHandle,
    pub chroma_offset: u32,
    pub stride_mode: u32,
    pub rotation: Rotation,
}

/// 解码表面
#[derive(Clone, Debug)]
pub struct Surface {
    /// 重建图像内存块
    pub buf: BufferHandle,
    /// 色度平面在块内的偏移
    pub chroma_offset: u32,
    /// 行跨度 (字节)
    pub stride: u32,
    /// 行跨度模式编码
    pub stride_mode: u32,
    /// 环内缓冲 (仅支持带外去块的管线存在, 两遍模式的第一遍输出)
    pub in_loop_buf: Option<BufferHandle>,
    /// 旋转输出表面
    pub rotate: Option<RotateSurface>,
    /// 作为参考帧时硬件读取的内存块 (标准路径即 `buf`)
    pub ref_buf: BufferHandle,
    /// 持久标注
    pub annotation: SurfaceAnnotation,
}

impl Surface {
    /// 以重建块创建表面, 参考块默认指向重建块
    pub fn new(buf: BufferHandle, chroma_offset: u32, stride: u32) -> Self {
        Self {
            buf,
            chroma_offset,
            stride,
            stride_mode: 0,
            in_loop_buf: None,
            rotate: None,
            ref_buf: buf,
            annotation: SurfaceAnnotation::default(),
        }
    }
}

/// 表面池: 句柄到表面的映射, 表面本体由调用方所有
#[derive(Default)]
pub struct SurfacePool {
    surfaces: HashMap<SurfaceId, Surface>,
}

impl SurfacePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记表面, 同句柄重复登记覆盖旧表面
    pub fn insert(&mut self, id: SurfaceId, surface: Surface) {
        self.surfaces.insert(id, surface);
    }

    pub fn get(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn get_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}
