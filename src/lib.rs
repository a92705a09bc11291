//! vdx - 固定功能视频解码硬件的宿主端命令流装配库.
//!
//! 门面 crate, 把各成员 crate 的公共接口聚合到一个命名空间:
//!
//! - [`core`]: 统一错误, 寄存器位域, 内存块与表面抽象
//! - [`cmdbuf`]: 两区命令缓冲构造器
//! - [`h264`]: H.264 逐切片命令流装配与图生命周期
//!
//! ```no_run
//! use vdx::h264::{ContextConfig, DecodeContext, Profile};
//! use vdx::core::Rotation;
//!
//! # fn demo(host: &mut dyn vdx::h264::DecodeHost) -> vdx::core::VdxResult<()> {
//! let config = ContextConfig {
//!     profile: Profile::High,
//!     width: 1280,
//!     height: 720,
//!     num_render_targets: 4,
//!     out_of_loop_deblock: false,
//!     rotation: Rotation::None,
//! };
//! let ctx = DecodeContext::new(config, host)?;
//! # let _ = ctx;
//! # Ok(())
//! # }
//! ```

pub use vdx_cmdbuf as cmdbuf;
pub use vdx_core as core;
pub use vdx_h264 as h264;

pub use vdx_core::{VdxError, VdxResult};
