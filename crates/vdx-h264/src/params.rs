//! 逐图/逐切片参数记录.
//!
//! 这些结构是上层喂给解码上下文的输入, 字段布局跟随码流语法元素,
//! 不做任何硬件打包; 打包统一发生在 geometry 与 emitter.

use bitflags::bitflags;
use vdx_core::{BufferHandle, SurfaceId};

/// 受支持的档次
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Baseline,
    Main,
    High,
}

impl Profile {
    /// 硬件档次码
    pub fn hw_profile(self) -> u32 {
        match self {
            Profile::Baseline => 0,
            Profile::Main => 1,
            Profile::High => 2,
        }
    }

    /// 码流 profile_idc 的硬件编码
    pub fn profile_idc(self) -> u32 {
        match self {
            Profile::Baseline => 0,
            Profile::Main => 1,
            Profile::High => 3,
        }
    }

    /// 档次允许的最大图像尺寸 (宽, 高), 单位像素
    pub fn max_size(self) -> (u32, u32) {
        match self {
            Profile::Baseline => (720, 576),
            Profile::Main | Profile::High => (1920, 1088),
        }
    }
}

bitflags! {
    /// 参考图标志
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PicFlags: u32 {
        /// 无效条目, 查表时视为缺席
        const INVALID              = 0x0001;
        const TOP_FIELD            = 0x0002;
        const BOTTOM_FIELD         = 0x0004;
        const SHORT_TERM_REFERENCE = 0x0008;
        const LONG_TERM_REFERENCE  = 0x0010;
    }
}

impl PicFlags {
    /// 是否作为参考图使用
    pub fn is_reference(self) -> bool {
        self.intersects(PicFlags::SHORT_TERM_REFERENCE | PicFlags::LONG_TERM_REFERENCE)
    }
}

/// 参考图描述: 表面 id + 标志 + 两场的显示序号
#[derive(Clone, Copy, Debug)]
pub struct PictureRef {
    pub surface: SurfaceId,
    pub flags: PicFlags,
    pub frame_idx: u32,
    pub top_poc: i32,
    pub bottom_poc: i32,
}

impl PictureRef {
    /// 缺席条目
    pub fn absent() -> Self {
        Self {
            surface: SurfaceId(0),
            flags: PicFlags::INVALID,
            frame_idx: 0,
            top_poc: 0,
            bottom_poc: 0,
        }
    }
}

impl Default for PictureRef {
    fn default() -> Self {
        Self::absent()
    }
}

/// 逐图参数记录, 字段对应 SPS/PPS 语法元素
#[derive(Clone, Debug)]
pub struct PictureParams {
    pub curr_pic: PictureRef,
    /// DPB 中的参考帧, 最多 16 个
    pub reference_frames: Vec<PictureRef>,
    pub num_ref_frames: u32,

    pub picture_width_in_mbs_minus1: u32,
    pub picture_height_in_mbs_minus1: u32,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,

    // SPS 标志
    pub chroma_format_idc: u32,
    pub residual_colour_transform_flag: bool,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: bool,
    pub direct_8x8_inference_flag: bool,
    pub min_luma_bipred_size_8x8: bool,

    // PPS 标志
    pub entropy_coding_mode_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u32,
    pub transform_8x8_mode_flag: bool,
    pub field_pic_flag: bool,
    pub constrained_intra_pred_flag: bool,

    pub num_slice_groups_minus1: u32,
    pub pic_init_qp_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub second_chroma_qp_index_offset: i32,
}

/// 量化矩阵记录
#[derive(Clone, Debug)]
pub struct IqMatrix {
    pub scaling_list_4x4: [[u8; 16]; 6],
    pub scaling_list_8x8: [[u8; 64]; 2],
}

impl Default for IqMatrix {
    fn default() -> Self {
        Self {
            scaling_list_4x4: [[0; 16]; 6],
            scaling_list_8x8: [[0; 64]; 2],
        }
    }
}

/// 切片类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    /// 从码流 slice_type 值换算 (对 5 取模)
    pub fn from_raw(raw: u32) -> Self {
        match raw % 5 {
            0 => SliceType::P,
            1 => SliceType::B,
            2 => SliceType::I,
            3 => SliceType::Sp,
            _ => SliceType::Si,
        }
    }

    /// 硬件切片类型码: P/SP 走预测, B 走双向, I/SI 走帧内
    pub fn hw_code(self) -> u32 {
        match self {
            SliceType::P | SliceType::Sp => 1,
            SliceType::B => 2,
            SliceType::I | SliceType::Si => 0,
        }
    }

    /// 是否携带 list0 (P 或 B)
    pub fn uses_list0(self) -> bool {
        matches!(self, SliceType::P | SliceType::Sp | SliceType::B)
    }
}

/// 切片数据交付方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceDataFlag {
    /// 完整切片, 一次交付
    All,
    /// 拆分切片的首段
    Begin,
    /// 拆分切片的中段
    Mid,
    /// 拆分切片的末段
    End,
}

/// 逐切片参数记录
#[derive(Clone, Debug)]
pub struct SliceParams {
    pub slice_data_size: u32,
    pub slice_data_offset: u32,
    pub slice_data_bit_offset: u32,
    pub slice_data_flag: SliceDataFlag,

    pub first_mb_in_slice: u32,
    pub slice_type: SliceType,
    pub direct_spatial_mv_pred_flag: bool,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    pub cabac_init_idc: u32,
    pub slice_qp_delta: i32,
    pub disable_deblocking_filter_idc: u32,
    pub slice_alpha_c0_offset_div2: i32,
    pub slice_beta_offset_div2: i32,

    pub ref_pic_list0: Vec<PictureRef>,
    pub ref_pic_list1: Vec<PictureRef>,

    pub luma_log2_weight_denom: u32,
    pub chroma_log2_weight_denom: u32,
    pub luma_weight_l0: [i16; 32],
    pub luma_offset_l0: [i16; 32],
    pub chroma_weight_l0: [[i16; 2]; 32],
    pub chroma_offset_l0: [[i16; 2]; 32],
    pub luma_weight_l1: [i16; 32],
    pub luma_offset_l1: [i16; 32],
    pub chroma_weight_l1: [[i16; 2]; 32],
    pub chroma_offset_l1: [[i16; 2]; 32],
}

impl Default for SliceParams {
    fn default() -> Self {
        Self {
            slice_data_size: 0,
            slice_data_offset: 0,
            slice_data_bit_offset: 0,
            slice_data_flag: SliceDataFlag::All,
            first_mb_in_slice: 0,
            slice_type: SliceType::I,
            direct_spatial_mv_pred_flag: false,
            num_ref_idx_l0_active_minus1: 0,
            num_ref_idx_l1_active_minus1: 0,
            cabac_init_idc: 0,
            slice_qp_delta: 0,
            disable_deblocking_filter_idc: 0,
            slice_alpha_c0_offset_div2: 0,
            slice_beta_offset_div2: 0,
            ref_pic_list0: Vec::new(),
            ref_pic_list1: Vec::new(),
            luma_log2_weight_denom: 0,
            chroma_log2_weight_denom: 0,
            luma_weight_l0: [0; 32],
            luma_offset_l0: [0; 32],
            chroma_weight_l0: [[0; 2]; 32],
            chroma_offset_l0: [[0; 2]; 32],
            luma_weight_l1: [0; 32],
            luma_offset_l1: [0; 32],
            chroma_weight_l1: [[0; 2]; 32],
            chroma_offset_l1: [[0; 2]; 32],
        }
    }
}

/// 渲染调用携带的一条记录
#[derive(Clone, Debug)]
pub enum RenderRecord {
    PictureParams(Box<PictureParams>),
    IqMatrix(Box<IqMatrix>),
    /// 切片组映射表所在的内存块 (借用句柄, 不转移所有权)
    SliceGroupMap(BufferHandle),
    /// 一条记录可以携带多个切片参数元素
    SliceParams(Vec<SliceParams>),
    /// 切片码流数据所在的内存块
    SliceData { buffer: BufferHandle, size: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_type_hw_code_map() {
        assert_eq!(SliceType::from_raw(0).hw_code(), 1, "P 切片映射到硬件码 1");
        assert_eq!(SliceType::from_raw(1).hw_code(), 2, "B 切片映射到硬件码 2");
        assert_eq!(SliceType::from_raw(2).hw_code(), 0, "I 切片映射到硬件码 0");
        assert_eq!(SliceType::from_raw(3).hw_code(), 1, "SP 切片映射到硬件码 1");
        assert_eq!(SliceType::from_raw(4).hw_code(), 0, "SI 切片映射到硬件码 0");
        assert_eq!(SliceType::from_raw(7).hw_code(), 0, "slice_type 对 5 取模, 7 落在 I");
    }

    #[test]
    fn test_profile_codes() {
        assert_eq!(Profile::Baseline.profile_idc(), 0);
        assert_eq!(Profile::Main.profile_idc(), 1);
        assert_eq!(Profile::High.profile_idc(), 3, "High 档次 idc 为 3 而非 2");
        assert_eq!(Profile::High.hw_profile(), 2);
    }

    #[test]
    fn test_reference_flag() {
        let mut r = PictureRef::absent();
        assert!(!r.flags.is_reference());
        r.flags = PicFlags::SHORT_TERM_REFERENCE;
        assert!(r.flags.is_reference());
        r.flags = PicFlags::LONG_TERM_REFERENCE | PicFlags::BOTTOM_FIELD;
        assert!(r.flags.is_reference());
    }
}
