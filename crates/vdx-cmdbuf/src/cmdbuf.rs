//! 两区命令缓冲构造器.
//!
//! 构造过程是纯 CPU 侧的字序列拼装: 寄存器块与 rendec 块的块头在
//! 开块时占位、收块时回填字数; 设备地址一律写 0 并记录重定位项;
//! 码流载荷不拷贝, 以 DMA 描述符链引用调用方的内存块.

use log::debug;
use vdx_core::{BufferHandle, BufferLocation, VdxError, VdxResult};

use crate::words;

/// 前向保留槽位句柄: 指向命令缓冲中一个待回填的字
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot(usize);

/// 重定位项: 指定字在提交时以内存块物理地址改写
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reloc {
    /// 待改写字的索引
    pub word_index: usize,
    /// 目标地址
    pub location: BufferLocation,
}

/// 码流 DMA 描述符: 引用一段调用方内存块
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DmaDescriptor {
    pub location: BufferLocation,
    pub size: u32,
}

/// 一次逻辑码流传输: 首描述符由 BEGIN/ALL 建立, 后续分片以描述符链接续
#[derive(Clone, Debug)]
pub struct BitstreamDma {
    pub descriptors: Vec<DmaDescriptor>,
    pub bit_offset: u32,
    pub flags: u32,
}

impl BitstreamDma {
    /// 链上所有描述符的总字节数
    pub fn total_size(&self) -> u32 {
        self.descriptors.iter().map(|d| d.size).sum()
    }
}

/// 两区命令缓冲
pub struct CmdBuf {
    words: Vec<u32>,
    relocs: Vec<Reloc>,
    bitstream: Option<BitstreamDma>,
    /// 打开中的寄存器块头索引
    reg_block: Option<usize>,
    reg_pairs: u32,
    /// 打开中的 rendec 块头索引
    rendec_block: Option<usize>,
    rendec_words: u32,
    /// 打开中的条件跳过块头索引
    skip_block: Option<usize>,
    completed: bool,
}

impl CmdBuf {
    pub fn new() -> Self {
        Self {
            words: Vec::with_capacity(256),
            relocs: Vec::new(),
            bitstream: None,
            reg_block: None,
            reg_pairs: 0,
            rendec_block: None,
            rendec_words: 0,
            skip_block: None,
            completed: false,
        }
    }

    // ============================================================
    // 原始字与前向保留槽位
    // ============================================================

    /// 追加一个原始命令字
    pub fn push_raw(&mut self, word: u32) {
        self.count_in_open_blocks();
        self.words.push(word);
    }

    /// 保留一个槽位, 写入占位 0, 之后用 [`CmdBuf::patch`] 回填
    pub fn reserve(&mut self) -> Slot {
        let idx = self.words.len();
        self.push_raw(0);
        Slot(idx)
    }

    /// 回填保留槽位
    pub fn patch(&mut self, slot: Slot, value: u32) {
        self.words[slot.0] = value;
    }

    /// 以设备地址回填保留槽位 (记录重定位项)
    pub fn patch_address(&mut self, slot: Slot, location: BufferLocation) {
        self.relocs.push(Reloc {
            word_index: slot.0,
            location,
        });
    }

    /// 读取槽位当前值 (测试与诊断用)
    pub fn slot_value(&self, slot: Slot) -> u32 {
        self.words[slot.0]
    }

    // ============================================================
    // 寄存器块
    // ============================================================

    /// 打开寄存器写块
    pub fn reg_start_block(&mut self) -> VdxResult<()> {
        if self.reg_block.is_some() || self.rendec_block.is_some() {
            return Err(VdxError::Internal("寄存器块嵌套打开".into()));
        }
        let idx = self.words.len();
        self.push_raw(words::CMD_REGVALPAIR_WRITE);
        self.reg_block = Some(idx);
        self.reg_pairs = 0;
        Ok(())
    }

    /// 写一个寄存器偏移/值对
    pub fn reg_set(&mut self, offset: u32, value: u32) -> VdxResult<()> {
        if self.reg_block.is_none() {
            return Err(VdxError::Internal("寄存器块未打开".into()));
        }
        self.words.push(offset);
        self.words.push(value);
        self.reg_pairs += 1;
        Ok(())
    }

    /// 写一个寄存器偏移/设备地址对
    pub fn reg_set_address(&mut self, offset: u32, location: BufferLocation) -> VdxResult<()> {
        if self.reg_block.is_none() {
            return Err(VdxError::Internal("寄存器块未打开".into()));
        }
        self.words.push(offset);
        self.relocs.push(Reloc {
            word_index: self.words.len(),
            location,
        });
        self.words.push(0);
        self.reg_pairs += 1;
        Ok(())
    }

    /// 收寄存器块, 回填偏移/值对数量
    pub fn reg_end_block(&mut self) -> VdxResult<()> {
        let Some(idx) = self.reg_block.take() else {
            return Err(VdxError::Internal("收块时寄存器块未打开".into()));
        };
        let mut header = words::CMD_REGVALPAIR_WRITE;
        words::BLOCK_PAIR_COUNT.set(&mut header, self.reg_pairs);
        self.words[idx] = header;
        Ok(())
    }

    // ============================================================
    // rendec 块
    // ============================================================

    /// 打开 rendec 写块, `reg_offset` 为目的寄存器偏移
    pub fn rendec_start(&mut self, reg_offset: u32) -> VdxResult<()> {
        if self.rendec_block.is_some() || self.reg_block.is_some() {
            return Err(VdxError::Internal("rendec 块嵌套打开".into()));
        }
        let idx = self.words.len();
        let mut header = words::CMD_RENDEC_BLOCK;
        words::BLOCK_REG_OFFSET.set(&mut header, reg_offset);
        self.push_raw(header);
        self.rendec_block = Some(idx);
        self.rendec_words = 0;
        Ok(())
    }

    /// 写一个 rendec 字
    pub fn rendec_write(&mut self, value: u32) -> VdxResult<()> {
        if self.rendec_block.is_none() {
            return Err(VdxError::Internal("rendec 块未打开".into()));
        }
        self.words.push(value);
        self.rendec_words += 1;
        Ok(())
    }

    /// 写一个 rendec 设备地址字
    pub fn rendec_write_address(&mut self, location: BufferLocation) -> VdxResult<()> {
        if self.rendec_block.is_none() {
            return Err(VdxError::Internal("rendec 块未打开".into()));
        }
        self.relocs.push(Reloc {
            word_index: self.words.len(),
            location,
        });
        self.words.push(0);
        self.rendec_words += 1;
        Ok(())
    }

    /// 写一段字节块, 按小端 4 字节一字打包, 末尾补零
    pub fn rendec_write_block(&mut self, data: &[u8]) -> VdxResult<()> {
        for chunk in data.chunks(4) {
            let mut word = 0u32;
            for (i, byte) in chunk.iter().enumerate() {
                word |= (*byte as u32) << (8 * i);
            }
            self.rendec_write(word)?;
        }
        Ok(())
    }

    /// 收 rendec 块, 回填字数
    pub fn rendec_end(&mut self) -> VdxResult<()> {
        let Some(idx) = self.rendec_block.take() else {
            return Err(VdxError::Internal("收块时 rendec 块未打开".into()));
        };
        let mut header = self.words[idx];
        words::BLOCK_WORD_COUNT.set(&mut header, self.rendec_words);
        self.words[idx] = header;
        Ok(())
    }

    // ============================================================
    // 条件跳过块
    // ============================================================

    /// 打开条件跳过块, `condition` 为跳过条件编码
    pub fn skip_start_block(&mut self, condition: u32) -> VdxResult<()> {
        if self.skip_block.is_some() {
            return Err(VdxError::Internal("跳过块嵌套打开".into()));
        }
        let idx = self.words.len();
        self.words.push(words::CMD_CONDITIONAL_SKIP | condition);
        self.skip_block = Some(idx);
        Ok(())
    }

    /// 收条件跳过块, 回填块内字数
    pub fn skip_end_block(&mut self) -> VdxResult<()> {
        let Some(idx) = self.skip_block.take() else {
            return Err(VdxError::Internal("收块时跳过块未打开".into()));
        };
        let count = (self.words.len() - idx - 1) as u32;
        let mut header = self.words[idx];
        words::BLOCK_WORD_COUNT.set(&mut header, count);
        self.words[idx] = header;
        Ok(())
    }

    // ============================================================
    // DMA
    // ============================================================

    /// 建立本缓冲的码流传输 (BEGIN/ALL 分片)
    pub fn begin_bitstream(
        &mut self,
        location: BufferLocation,
        size: u32,
        bit_offset: u32,
        flags: u32,
    ) -> VdxResult<()> {
        if self.bitstream.is_some() {
            return Err(VdxError::Protocol("码流传输已建立, 不能重复建立".into()));
        }
        self.push_raw(words::CMD_BITSTREAM_DMA | flags);
        self.relocs.push(Reloc {
            word_index: self.words.len(),
            location,
        });
        self.words.push(0);
        self.words.push(size);
        self.words.push(bit_offset);
        self.bitstream = Some(BitstreamDma {
            descriptors: vec![DmaDescriptor { location, size }],
            bit_offset,
            flags,
        });
        Ok(())
    }

    /// 接续码流传输 (MID/END 分片), 以链式描述符延长同一逻辑传输
    pub fn chain_bitstream(&mut self, buffer: BufferHandle, size: u32) -> VdxResult<()> {
        let Some(dma) = self.bitstream.as_mut() else {
            return Err(VdxError::Protocol("码流传输未建立, 无从接续".into()));
        };
        dma.descriptors.push(DmaDescriptor {
            location: BufferLocation::base(buffer),
            size,
        });
        debug!(
            "cmdbuf: 码流链接续, 分片 {} 字节, 累计 {} 字节",
            size,
            dma.total_size()
        );
        Ok(())
    }

    /// 上载一段暂存数据 (熵表等)
    pub fn dma_load(&mut self, location: BufferLocation, size: u32) {
        self.push_raw(words::CMD_DMA_LOAD);
        self.relocs.push(Reloc {
            word_index: self.words.len(),
            location,
        });
        self.words.push(0);
        self.words.push(size);
    }

    /// 预载暂存区保存/恢复对
    pub fn preload_transfer(&mut self, save: bool, location: BufferLocation, size: u32) {
        let cmd = if save {
            words::CMD_PRELOAD_SAVE
        } else {
            words::CMD_PRELOAD_RESTORE
        };
        self.push_raw(cmd);
        self.relocs.push(Reloc {
            word_index: self.words.len(),
            location,
        });
        self.words.push(0);
        self.words.push(size);
    }

    // ============================================================
    // 完成与访问
    // ============================================================

    /// 写完成标记, 此后缓冲只读
    pub fn write_completion(&mut self) -> VdxResult<()> {
        if self.reg_block.is_some() || self.rendec_block.is_some() || self.skip_block.is_some() {
            return Err(VdxError::Internal("存在未收口的块, 不能写完成标记".into()));
        }
        self.words.push(words::CMD_COMPLETION);
        self.completed = true;
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn relocs(&self) -> &[Reloc] {
        &self.relocs
    }

    pub fn bitstream(&self) -> Option<&BitstreamDma> {
        self.bitstream.as_ref()
    }

    fn count_in_open_blocks(&mut self) {
        if self.rendec_block.is_some() {
            self.rendec_words += 1;
        }
    }
}

impl Default for CmdBuf {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdx_core::BufferHandle;

    #[test]
    fn test_reserve_and_patch() {
        let mut buf = CmdBuf::new();
        buf.push_raw(words::CMD_HEADER);
        let slot = buf.reserve();
        buf.push_raw(0x1234);
        buf.patch(slot, 0xabcd_0000);
        assert_eq!(buf.words()[1], 0xabcd_0000, "保留槽位应被回填为真实值");
    }

    #[test]
    fn test_rendec_block_backfills_word_count() {
        let mut buf = CmdBuf::new();
        buf.rendec_start(0x0d00).unwrap();
        buf.rendec_write(1).unwrap();
        buf.rendec_write(2).unwrap();
        buf.rendec_write_address(BufferLocation::base(BufferHandle(7)))
            .unwrap();
        buf.rendec_end().unwrap();

        let header = buf.words()[0];
        assert_eq!(words::BLOCK_WORD_COUNT.get(header), 3, "块头应回填字数");
        assert_eq!(words::BLOCK_REG_OFFSET.get(header), 0x0d00);
        assert_eq!(buf.relocs().len(), 1);
        assert_eq!(buf.relocs()[0].word_index, 3);
    }

    #[test]
    fn test_reg_block_backfills_pair_count() {
        let mut buf = CmdBuf::new();
        buf.reg_start_block().unwrap();
        buf.reg_set(0x0c00, 0x11).unwrap();
        buf.reg_set(0x0c04, 0x22).unwrap();
        buf.reg_end_block().unwrap();
        assert_eq!(words::BLOCK_PAIR_COUNT.get(buf.words()[0]), 2);
    }

    #[test]
    fn test_write_block_packs_bytes_little_endian() {
        let mut buf = CmdBuf::new();
        buf.rendec_start(0).unwrap();
        buf.rendec_write_block(&[0x01, 0x02, 0x03, 0x04, 0x05]).unwrap();
        buf.rendec_end().unwrap();
        assert_eq!(buf.words()[1], 0x0403_0201, "4 字节按小端打包为一字");
        assert_eq!(buf.words()[2], 0x0000_0005, "尾部不足 4 字节补零");
    }

    #[test]
    fn test_bitstream_chain_totals() {
        let mut buf = CmdBuf::new();
        buf.begin_bitstream(BufferLocation::base(BufferHandle(1)), 100, 0, 0)
            .unwrap();
        buf.chain_bitstream(BufferHandle(2), 50).unwrap();
        let dma = buf.bitstream().unwrap();
        assert_eq!(dma.descriptors.len(), 2);
        assert_eq!(dma.total_size(), 150, "链式传输应累计所有分片字节数");
    }

    #[test]
    fn test_chain_without_begin_is_rejected() {
        let mut buf = CmdBuf::new();
        let err = buf.chain_bitstream(BufferHandle(1), 50).unwrap_err();
        assert!(matches!(err, VdxError::Protocol(_)), "未建立传输时接续应报协议违例");
    }

    #[test]
    fn test_skip_block_counts_inner_words() {
        let mut buf = CmdBuf::new();
        buf.skip_start_block(words::SKIP_ON_CONTEXT_SWITCH).unwrap();
        buf.push_raw(0xaa);
        buf.push_raw(0xbb);
        buf.skip_end_block().unwrap();
        assert_eq!(words::BLOCK_WORD_COUNT.get(buf.words()[0]), 2);
    }

    #[test]
    fn test_completion_rejects_open_block() {
        let mut buf = CmdBuf::new();
        buf.rendec_start(0).unwrap();
        assert!(buf.write_completion().is_err(), "未收口的块不能写完成标记");
        buf.rendec_end().unwrap();
        buf.write_completion().unwrap();
        assert!(buf.is_completed());
        assert_eq!(*buf.words().last().unwrap(), words::CMD_COMPLETION);
    }
}
