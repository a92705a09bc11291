//! # vdx-core
//!
//! vdx 解码驱动核心类型库, 提供统一错误类型、寄存器位域打包原语、
//! 设备内存块句柄与解码表面抽象.
//!
//! 本 crate 不依赖任何硬件细节, 为上层命令流装配 crate 提供底层基础设施.

pub mod buffer;
pub mod error;
pub mod regio;
pub mod surface;

// 重导出常用类型
pub use buffer::{BufferHandle, BufferLocation, BufferUsage};
pub use error::{VdxError, VdxResult};
pub use regio::Field;
pub use surface::{RotateSurface, Rotation, Surface, SurfaceAnnotation, SurfaceId, SurfacePool};
