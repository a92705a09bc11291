//! 寄存器位域打包原语.
//!
//! 固定功能硬件的寄存器按命名位域编程. 本模块提供位域描述与打包操作,
//! 位域的具体位置由上层 crate 的常量表定义, 此处只负责移位与掩码.

/// 寄存器位域描述: 起始位与位宽
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    /// 起始位 (0 为最低位)
    pub shift: u32,
    /// 位宽
    pub width: u32,
}

impl Field {
    /// 定义一个位域
    pub const fn new(shift: u32, width: u32) -> Self {
        debug_assert!(width >= 1 && shift + width <= 32);
        Self { shift, width }
    }

    /// 位域在寄存器中占据的掩码
    pub const fn mask(self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            ((1u32 << self.width) - 1) << self.shift
        }
    }

    /// 写入无符号位域值, 其余位保持不变
    pub fn set(self, reg: &mut u32, value: u32) {
        *reg = (*reg & !self.mask()) | (value.wrapping_shl(self.shift) & self.mask());
    }

    /// 写入有符号位域值, 先按位宽截断为补码表示
    pub fn set_signed(self, reg: &mut u32, value: i32) {
        self.set(reg, value as u32);
    }

    /// 读取位域值
    pub const fn get(self, reg: u32) -> u32 {
        (reg & self.mask()) >> self.shift
    }

    /// 单独打包位域值 (其余位为 0)
    pub fn pack(self, value: u32) -> u32 {
        let mut reg = 0;
        self.set(&mut reg, value);
        reg
    }
}
