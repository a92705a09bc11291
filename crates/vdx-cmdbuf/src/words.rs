//! 命令流字编码常量.
//!
//! 每个命令字的高 4 位为操作码, 低位携带操作码相关的载荷
//! (块内字数、目的寄存器偏移等). 块头命令在块结束时回填字数.

use vdx_core::regio::Field;

/// 寄存器写块头, 载荷为偏移/值对数量
pub const CMD_REGVALPAIR_WRITE: u32 = 0x9000_0000;
/// rendec 写块头, 载荷为字数与目的寄存器偏移
pub const CMD_RENDEC_BLOCK: u32 = 0x5000_0000;
/// 条件跳过块头, 载荷为块内字数与跳过条件
pub const CMD_CONDITIONAL_SKIP: u32 = 0x3000_0000;
/// 图像级命令头, 其后紧随前向保留槽位
pub const CMD_HEADER: u32 = 0x7000_0000;
/// 码流 DMA 启动, 载荷为传输标志与比特偏移
pub const CMD_BITSTREAM_DMA: u32 = 0xa000_0000;
/// 暂存区 DMA 载入 (熵表上载)
pub const CMD_DMA_LOAD: u32 = 0xb000_0000;
/// 预载暂存区保存
pub const CMD_PRELOAD_SAVE: u32 = 0xb100_0000;
/// 预载暂存区恢复
pub const CMD_PRELOAD_RESTORE: u32 = 0xb200_0000;
/// 完成标记
pub const CMD_COMPLETION: u32 = 0x6000_0000;

/// 块头中的字数位域 (rendec 块与跳过块共用)
pub const BLOCK_WORD_COUNT: Field = Field::new(16, 8);
/// rendec 块头中的目的寄存器偏移位域
pub const BLOCK_REG_OFFSET: Field = Field::new(0, 16);
/// 寄存器写块头中的对数位域
pub const BLOCK_PAIR_COUNT: Field = Field::new(0, 16);

/// 跳过条件: 硬件上下文未切换时跳过本块
pub const SKIP_ON_CONTEXT_SWITCH: u32 = 0x0000_0001;

/// 码流 DMA 标志: 启用 RBDU 头提取
pub const DMA_ENABLE_RBDU_EXTRACTION: u32 = 0x0000_0001;
