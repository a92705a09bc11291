//! 切片参数队列.
//!
//! 切片参数记录先排队, 等切片数据记录到达时统一与数据块配对消费.
//! 无论消费成功与否, 一轮配对之后队列都被清空.

use crate::params::SliceParams;

#[derive(Default)]
pub struct SliceQueue {
    entries: Vec<SliceParams>,
}

impl SliceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队一条记录携带的全部切片参数元素
    pub fn push_record(&mut self, elements: Vec<SliceParams>) {
        if self.entries.len() + elements.len() > self.entries.capacity() {
            self.entries.reserve(8);
        }
        self.entries.extend(elements);
    }

    /// 取走全部排队元素, 队列清空
    pub fn take_all(&mut self) -> Vec<SliceParams> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
