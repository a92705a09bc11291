//! # vdx-cmdbuf
//!
//! vdx 解码驱动命令缓冲构造库.
//!
//! 命令缓冲分为两类区段: 固定寄存器块 (直接的寄存器偏移/值对) 与
//! rendec 块 (以目的寄存器偏移为基准的流式写入). 设备地址以重定位项
//! 记录, 由外部提交协作方换算; 需要后算先占位的字通过
//! `reserve()/patch()` 两阶段写入.

pub mod cmdbuf;
pub mod words;

// 重导出常用类型
pub use cmdbuf::{BitstreamDma, CmdBuf, DmaDescriptor, Reloc, Slot};
