//! 统一错误类型定义.
//!
//! 所有 vdx crate 共用的错误类型, 按失败影响范围分级:
//! 会话级错误使整个解码上下文不可用, 图像级错误仅中止当前图像,
//! 上下文本身保持可用并可继续解码下一图像.

use thiserror::Error;

/// vdx 统一错误类型
#[derive(Debug, Error)]
pub enum VdxError {
    /// 设备内存块分配失败 (会话级: 上下文创建阶段发生时整个会话终止)
    #[error("内存块分配失败: {0}")]
    Allocation(String),

    /// 不支持的配置 (profile 或分辨率超出硬件能力, 会话级)
    #[error("不支持的配置: {0}")]
    Unsupported(String),

    /// 参数记录无效 (元素数或内容不符, 图像级)
    #[error("参数记录无效: {0}")]
    InvalidRecord(String),

    /// slice 数据先于图像参数到达 (图像级)
    #[error("缺少图像参数记录")]
    MissingPictureParams,

    /// 固定容量表已耗尽 (共置缓冲表等, 图像级)
    #[error("固定容量表已耗尽: {0}")]
    CapacityExhausted(String),

    /// 调用协议违例 (如 MID 分片先于 BEGIN 到达, 图像级, 属调用方误用)
    #[error("调用协议违例: {0}")]
    Protocol(String),

    /// 未找到指定表面
    #[error("未找到表面: id={0}")]
    SurfaceNotFound(u32),

    /// 外部提交协作方报告错误
    #[error("提交失败: {0}")]
    Submit(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// vdx 统一 Result 类型
pub type VdxResult<T> = Result<T, VdxError>;
