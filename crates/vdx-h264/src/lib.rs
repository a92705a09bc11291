//! H.264 固定功能解码硬件的宿主端命令流装配.
//!
//! 本 crate 消费逐图/逐切片参数记录, 产出驱动前端熵解码单元与后端
//! 重建单元的二进制命令流: 寄存器写块 + rendec 数据块 + 码流 DMA 链.
//! 熵解码本身由硬件完成, 这里只负责把参数打包成硬件期待的形状,
//! 并维护跨图的会话状态 (DPB 索引映射, 同位运动矢量缓冲表).
//!
//! 入口是 [`DecodeContext`]: begin_picture / render / end_picture
//! 三段式生命周期, 与上层逐图调用一一对应.

pub mod colocated;
pub mod context;
pub mod emitter;
pub mod geometry;
pub mod host;
pub mod params;
pub mod refmap;
pub mod regs;
pub mod slice_queue;

pub use colocated::ColocatedTable;
pub use context::{ContextConfig, DeblockMode, DecodeContext};
pub use geometry::{sign_trunc, PictureGeometry, PictureKind};
pub use host::{DeblockRequest, DecodeHost, SubmitFlags, SubmitRequest};
pub use params::{
    IqMatrix, PicFlags, PictureParams, PictureRef, Profile, RenderRecord, SliceDataFlag,
    SliceParams, SliceType,
};
