//! 同位运动矢量缓冲表.
//!
//! 每个渲染目标表面在整个会话里对应一块同位缓冲, 只增不减.
//! 表面标注里存 1 基索引 (`None` 即未分配), 分配是幂等的.

use log::debug;
use vdx_core::{BufferHandle, BufferUsage, SurfaceAnnotation, VdxError, VdxResult};

use crate::host::DecodeHost;

pub struct ColocatedTable {
    blocks: Vec<BufferHandle>,
    capacity: usize,
}

impl ColocatedTable {
    /// 容量等于上下文创建时声明的渲染目标数
    pub fn new(capacity: u32) -> Self {
        Self {
            blocks: Vec::with_capacity(capacity as usize),
            capacity: capacity as usize,
        }
    }

    /// 给表面分配同位缓冲. 标注里已有索引时直接复用.
    pub fn allocate(
        &mut self,
        host: &mut dyn DecodeHost,
        annotation: &mut SurfaceAnnotation,
        size: u32,
    ) -> VdxResult<BufferHandle> {
        if let Some(index) = annotation.colocated_index {
            return Ok(self.blocks[index as usize - 1]);
        }
        if self.blocks.len() >= self.capacity {
            return Err(VdxError::CapacityExhausted(format!(
                "同位缓冲表已满, 容量 {}",
                self.capacity
            )));
        }
        let buf = host.create_buffer(size, BufferUsage::VpuOnly)?;
        self.blocks.push(buf);
        annotation.colocated_index = Some(self.blocks.len() as u32);
        debug!(
            "H264: 分配同位缓冲 {} 字节, 槽位 {}/{}",
            size,
            self.blocks.len(),
            self.capacity
        );
        Ok(buf)
    }

    /// 查表面对应的同位缓冲
    pub fn lookup(&self, annotation: &SurfaceAnnotation) -> Option<BufferHandle> {
        annotation
            .colocated_index
            .map(|index| self.blocks[index as usize - 1])
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DeblockRequest, SubmitRequest};
    use vdx_core::SurfaceId;

    struct CountingHost {
        next: u32,
    }

    impl DecodeHost for CountingHost {
        fn create_buffer(&mut self, _size: u32, _usage: BufferUsage) -> VdxResult<BufferHandle> {
            self.next += 1;
            Ok(BufferHandle(self.next))
        }
        fn upload(&mut self, _buffer: BufferHandle, _data: &[u8]) -> VdxResult<()> {
            Ok(())
        }
        fn fill_chroma_neutral(&mut self, _surface: SurfaceId, _value: u8) -> VdxResult<()> {
            Ok(())
        }
        fn submit(&mut self, _request: SubmitRequest) -> VdxResult<()> {
            Ok(())
        }
        fn submit_deblock(&mut self, _request: DeblockRequest) -> VdxResult<()> {
            Ok(())
        }
        fn flush(&mut self) -> VdxResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_allocate_is_idempotent() {
        let mut table = ColocatedTable::new(4);
        let mut host = CountingHost { next: 0 };
        let mut annotation = SurfaceAnnotation::default();

        let first = table.allocate(&mut host, &mut annotation, 0x1000).unwrap();
        let second = table.allocate(&mut host, &mut annotation, 0x1000).unwrap();
        assert_eq!(first, second, "重复分配返回同一块");
        assert_eq!(table.len(), 1, "表里只占一个槽位");
        assert_eq!(annotation.colocated_index, Some(1), "标注存 1 基索引");
    }

    #[test]
    fn test_capacity_exhaustion() {
        let mut table = ColocatedTable::new(1);
        let mut host = CountingHost { next: 0 };

        let mut a = SurfaceAnnotation::default();
        table.allocate(&mut host, &mut a, 0x1000).unwrap();

        let mut b = SurfaceAnnotation::default();
        let err = table.allocate(&mut host, &mut b, 0x1000).unwrap_err();
        assert!(
            matches!(err, VdxError::CapacityExhausted(_)),
            "容量耗尽是图级错误"
        );
    }

    #[test]
    fn test_lookup_unset_is_none() {
        let table = ColocatedTable::new(2);
        let annotation = SurfaceAnnotation::default();
        assert!(table.lookup(&annotation).is_none());
    }
}
