//! 硬件寄存器偏移、位域布局与固化表数据.
//!
//! 偏移分三组: 前端熵解码单元 (VEC), 后端命令单元 (CMDS), 量化矩阵
//! 片上内存 (IQRAM). 位域用 [`Field`] 描述, 打包统一走 `Field::set`.

use vdx_core::regio::Field;

// ============================================================
// 基址与偏移
// ============================================================

pub const VEC_BASE: u32 = 0x0800;
pub const CMDS_BASE: u32 = 0x1000;
pub const IQRAM_BASE: u32 = 0x0700;

/// 前端熵解码控制
pub const VEC_ENTDEC_FE_CONTROL: u32 = VEC_BASE + 0x0094;
/// 后端熵解码控制
pub const VEC_ENTDEC_BE_CONTROL: u32 = VEC_BASE + 0x0098;
/// 熵表基址寄存器组首址, 之后按 4 字节递增
pub const VEC_VLC_TABLE_ADDR0: u32 = VEC_BASE + 0x00f0;

pub const VEC_FE_SPS0: u32 = VEC_BASE + 0x0400;
pub const VEC_FE_PPS0: u32 = VEC_BASE + 0x0404;
pub const VEC_FE_CUR_PIC0: u32 = VEC_BASE + 0x0408;
pub const VEC_FE_SLICE0: u32 = VEC_BASE + 0x040c;
pub const VEC_FE_SLICE1: u32 = VEC_BASE + 0x0410;
pub const VEC_FE_SLICE2: u32 = VEC_BASE + 0x0414;
/// 切片组映射表基址
pub const VEC_FE_BASE_ADDR_SGM: u32 = VEC_BASE + 0x0418;

// rendec 目的偏移
pub const VEC_BE_SPS0: u32 = VEC_BASE + 0x0500;
pub const VEC_BE_FOC0: u32 = VEC_BASE + 0x0540;
pub const VEC_BE_COL_PIC0: u32 = VEC_BASE + 0x0560;
pub const VEC_BE_LIST0: u32 = VEC_BASE + 0x0580;

pub const CMDS_DISPLAY_PICTURE_SIZE: u32 = CMDS_BASE + 0x0000;
pub const CMDS_REFERENCE_PICTURE_BASE_ADDRESSES: u32 = CMDS_BASE + 0x0050;
pub const CMDS_SLICE_PARAMS: u32 = CMDS_BASE + 0x0090;
pub const CMDS_WEIGHTED_FACTORS_A: u32 = CMDS_BASE + 0x0100;
pub const CMDS_WEIGHTED_FACTORS_B: u32 = CMDS_BASE + 0x0200;
pub const CMDS_LUMA_RANGE_MAPPING_BASE_ADDRESS: u32 = CMDS_BASE + 0x0300;
pub const CMDS_ALTERNATIVE_OUTPUT_PICTURE_ROTATION: u32 = CMDS_BASE + 0x0308;

// ============================================================
// 固化常量
// ============================================================

/// 运动补偿缓存的参考偏移
pub const CACHE_REF_OFFSET: u32 = 72;
/// 运动补偿缓存的行偏移
pub const CACHE_ROW_OFFSET: u32 = 4;
/// 帧内参考缓存块大小
pub const REFERENCE_CACHE_SIZE: u32 = 512 * 1024;
/// 预载暂存区条目上限
pub const MAX_PRELOAD_CMDS: u32 = 40 * 2;
/// 预载暂存块字节数: 上下文 id + 块长 + 地址字节表 + 值表
pub const PRELOAD_BUFFER_SIZE: u32 = 4 + 4 + MAX_PRELOAD_CMDS + MAX_PRELOAD_CMDS * 4;

/// 未使用 DPB 槽位与缺席同位面的哨兵值
pub const UNUSED_SENTINEL: u32 = 0xdead_beef;

// ============================================================
// 位域布局
// ============================================================

pub mod fe_control {
    use super::Field;
    pub const PROFILE: Field = Field::new(8, 2);
    pub const MODE: Field = Field::new(0, 4);
}

pub mod sps0 {
    use super::Field;
    pub const PIC_WIDTH_IN_MBS_LESS1: Field = Field::new(0, 8);
    pub const FRAME_MBS_ONLY_FLAG: Field = Field::new(8, 1);
    pub const CHROMA_FORMAT_IDC: Field = Field::new(9, 2);
    pub const DIRECT_8X8_INFERENCE_FLAG: Field = Field::new(11, 1);
    pub const MIN_LUMA_BIPRED_SIZE_8X8: Field = Field::new(12, 1);
    pub const SGM_4BIT_FLAG: Field = Field::new(13, 1);
    pub const PROFILE_IDC: Field = Field::new(14, 2);
    pub const TWO_PASS_FLAG: Field = Field::new(16, 1);
    pub const DEFAULT_MATRIX_FLAG: Field = Field::new(17, 1);
}

pub mod pps0 {
    use super::Field;
    pub const TRANSFORM_8X8_MODE_FLAG: Field = Field::new(0, 1);
    pub const CONSTRAINED_INTRA_PRED_FLAG: Field = Field::new(1, 1);
    pub const ENTROPY_CODING_MODE_FLAG: Field = Field::new(2, 1);
    pub const NUM_SLICE_GROUPS_MINUS1: Field = Field::new(3, 3);
    pub const WEIGHTED_BIPRED_IDC: Field = Field::new(6, 2);
    pub const CHROMA_QP_INDEX_OFFSET: Field = Field::new(8, 5);
    pub const SECOND_CHROMA_QP_INDEX_OFFSET: Field = Field::new(13, 5);
}

pub mod pic0 {
    use super::Field;
    pub const PIC_SIZE_IN_MBS_LESS1: Field = Field::new(0, 16);
    pub const PIC_HEIGHT_IN_MBS_LESS1: Field = Field::new(16, 8);
    pub const REFERENCE_FLAG: Field = Field::new(24, 1);
    pub const MBAFF_FRAME_FLAG: Field = Field::new(25, 1);
    pub const FIELD_PIC_FLAG: Field = Field::new(26, 1);
    pub const BOTTOM_FIELD_FLAG: Field = Field::new(27, 1);
}

pub mod col_pic0 {
    use super::Field;
    pub const NOT_FRAME_FLAG: Field = Field::new(0, 1);
    pub const MBAFF_FRAME_FLAG: Field = Field::new(1, 1);
    pub const BOTTOM_FIELD_FLAG: Field = Field::new(2, 1);
}

pub mod slice0 {
    use super::Field;
    pub const DIRECT_SPATIAL_MV_PRED_FLAG: Field = Field::new(0, 1);
    pub const DISABLE_DEBLOCK_FILTER_IDC: Field = Field::new(1, 2);
    pub const ALPHA_C0_OFFSET_DIV2: Field = Field::new(3, 5);
    pub const BETA_OFFSET_DIV2: Field = Field::new(8, 5);
    pub const FIELD_TYPE: Field = Field::new(13, 2);
    pub const SLICE_TYPE: Field = Field::new(15, 3);
    pub const CABAC_INIT_IDC: Field = Field::new(18, 2);
    pub const SLICE_COUNT: Field = Field::new(20, 12);
}

pub mod slice1 {
    use super::Field;
    pub const FIRST_MB_IN_SLICE_X: Field = Field::new(0, 8);
    pub const FIRST_MB_IN_SLICE_Y: Field = Field::new(8, 8);
    pub const SLICE_QPY: Field = Field::new(16, 6);
    pub const NUM_REF_IDX_L0_ACTIVE_MINUS1: Field = Field::new(22, 5);
    pub const NUM_REF_IDX_L1_ACTIVE_MINUS1: Field = Field::new(27, 5);
}

pub mod slice2 {
    use super::Field;
    pub const FIRST_MB_IN_SLICE: Field = Field::new(0, 16);
}

pub mod foc {
    use super::Field;
    /// 17 位带符号截断的显示序号
    pub const ORDER_CNT: Field = Field::new(0, 17);
}

pub mod ref0 {
    use super::Field;
    pub const LONG_TERM_FRAME_FLAGS: Field = Field::new(0, 16);
}

pub mod picture_size {
    use super::Field;
    pub const WIDTH: Field = Field::new(0, 12);
    pub const HEIGHT: Field = Field::new(12, 12);
}

pub mod operating_mode {
    use super::Field;
    pub const CHROMA_FORMAT: Field = Field::new(0, 2);
    pub const ASYNC_MODE: Field = Field::new(2, 2);
    pub const CODEC_MODE: Field = Field::new(4, 4);
    pub const CODEC_PROFILE: Field = Field::new(8, 2);
    pub const ROW_STRIDE: Field = Field::new(10, 3);
    pub const CHROMA_INTERLEAVED: Field = Field::new(13, 1);
}

pub mod mc_cache {
    use super::Field;
    pub const CONFIG_REF_OFFSET: Field = Field::new(0, 8);
    pub const CONFIG_ROW_OFFSET: Field = Field::new(8, 8);
}

pub mod weighted_factor {
    use super::Field;
    pub const Y: Field = Field::new(0, 8);
    pub const CB: Field = Field::new(8, 8);
    pub const CR: Field = Field::new(16, 8);
}

pub mod weight_denom {
    use super::Field;
    pub const Y_LOG2: Field = Field::new(0, 3);
    pub const C_LOG2: Field = Field::new(8, 3);
}

pub mod slice_params_cmd {
    use super::Field;
    pub const CONSTRAINED_INTRA_PRED: Field = Field::new(0, 1);
    pub const MODE_CONFIG: Field = Field::new(1, 3);
    pub const DISABLE_DEBLOCK_FILTER_IDC: Field = Field::new(4, 2);
    pub const ALPHA_C0_OFFSET_DIV2: Field = Field::new(6, 5);
    pub const BETA_OFFSET_DIV2: Field = Field::new(11, 5);
    pub const FIELD_TYPE: Field = Field::new(16, 2);
    pub const CODE_TYPE: Field = Field::new(18, 3);
}

pub mod alt_output {
    use super::Field;
    pub const ALT_PICTURE_ENABLE: Field = Field::new(0, 1);
    pub const ROTATION_ROW_STRIDE: Field = Field::new(1, 3);
    pub const RECON_WRITE_DISABLE: Field = Field::new(4, 1);
    pub const ROTATION_MODE: Field = Field::new(5, 2);
}

pub mod ext_stride {
    use super::Field;
    pub const EXT_ROW_STRIDE: Field = Field::new(0, 10);
}

// ============================================================
// 固化熵表: 预打包的 H.264 VLC 查找表
// ============================================================

pub static H264_VLC_TABLE_DATA: [u16; 520] = [
    0x4000, 0x4205, 0x440a, 0x2204, 0x2206, 0x0208, 0x040b, 0x400f,
    0x4204, 0x4209, 0x4013, 0x420e, 0x4217, 0x421b, 0x4212, 0x420d,
    0x4208, 0x2a08, 0x0232, 0x0035, 0x0036, 0x441f, 0x4416, 0x4411,
    0x440c, 0x0407, 0x040e, 0x0415, 0x041c, 0x0223, 0x4a35, 0x3a00,
    0x4420, 0x4426, 0x4421, 0x441c, 0x442b, 0x4422, 0x441d, 0x4418,
    0x4433, 0x442e, 0x4429, 0x4428, 0x442f, 0x442a, 0x4425, 0x4424,
    0x443b, 0x4436, 0x4431, 0x4430, 0x4437, 0x4432, 0x442d, 0x442c,
    0x4443, 0x443e, 0x443d, 0x4438, 0x443f, 0x443a, 0x4439, 0x4434,
    0x4240, 0x4242, 0x4241, 0x423c, 0x4227, 0x421e, 0x4219, 0x4214,
    0x4023, 0x401a, 0x4015, 0x4010, 0x0410, 0x0249, 0x024c, 0x004f,
    0x4613, 0x460f, 0x440a, 0x440a, 0x4205, 0x4205, 0x4205, 0x4205,
    0x4200, 0x4200, 0x4200, 0x4200, 0x2a08, 0x0231, 0x0034, 0x0035,
    0x4423, 0x4416, 0x4415, 0x440c, 0x0407, 0x040e, 0x0415, 0x121c,
    0x0222, 0x4a3f, 0x3a00, 0x442f, 0x4426, 0x4425, 0x4420, 0x442b,
    0x4422, 0x4421, 0x441c, 0x442c, 0x442e, 0x442d, 0x4428, 0x4433,
    0x442a, 0x4429, 0x4424, 0x443b, 0x4436, 0x4435, 0x4434, 0x4437,
    0x4432, 0x4431, 0x4430, 0x0203, 0x423a, 0x4238, 0x423d, 0x423c,
    0x423e, 0x4239, 0x4243, 0x4242, 0x4241, 0x4240, 0x4227, 0x421e,
    0x421d, 0x4218, 0x4014, 0x401a, 0x4019, 0x4010, 0x421f, 0x4212,
    0x4211, 0x4208, 0x421b, 0x420e, 0x420d, 0x4204, 0x4017, 0x4009,
    0x2210, 0x0432, 0x0239, 0x023c, 0x600a, 0x6008, 0x003d, 0x003e,
    0x461f, 0x461b, 0x4617, 0x4613, 0x460f, 0x460a, 0x4605, 0x4600,
    0x0403, 0x040a, 0x0611, 0x4433, 0x442e, 0x4429, 0x4424, 0x442f,
    0x442a, 0x4425, 0x4420, 0x4430, 0x4436, 0x4431, 0x442c, 0x4437,
    0x4432, 0x442d, 0x4428, 0x3600, 0x4640, 0x4643, 0x4642, 0x4641,
    0x463c, 0x463f, 0x463e, 0x463d, 0x4638, 0x463b, 0x463a, 0x4639,
    0x4634, 0x4435, 0x4435, 0x441c, 0x4418, 0x4426, 0x4414, 0x442b,
    0x4422, 0x4421, 0x4410, 0x420c, 0x421e, 0x421d, 0x4208, 0x4227,
    0x421a, 0x4219, 0x4204, 0x400d, 0x4023, 0x400e, 0x4009, 0x2208,
    0x5406, 0x540a, 0x540e, 0x5412, 0x5416, 0x541a, 0x541e, 0x5204,
    0x0002, 0x5002, 0x3000, 0x4000, 0x4005, 0x4200, 0x440a, 0x0401,
    0x1208, 0x000a, 0x4410, 0x440c, 0x4408, 0x440f, 0x4409, 0x4404,
    0x4013, 0x4212, 0x4211, 0x400e, 0x400d, 0x4000, 0x4205, 0x440a,
    0x0404, 0x480f, 0x4a13, 0x2609, 0x441b, 0x4417, 0x4412, 0x440e,
    0x440d, 0x4409, 0x4408, 0x4404, 0x0205, 0x0208, 0x020b, 0x020e,
    0x1411, 0x4216, 0x4211, 0x4210, 0x420c, 0x421f, 0x421a, 0x4215,
    0x4214, 0x4223, 0x421e, 0x4219, 0x4218, 0x4222, 0x4221, 0x421d,
    0x421c, 0x3400, 0x3400, 0x3400, 0x4420, 0x4000, 0x0006, 0x0007,
    0x0008, 0x0009, 0x000a, 0x040b, 0x4002, 0x4001, 0x4004, 0x4003,
    0x4006, 0x4005, 0x4008, 0x4007, 0x400a, 0x4009, 0x3400, 0x440f,
    0x440e, 0x440d, 0x420c, 0x420c, 0x420b, 0x420b, 0x1208, 0x000e,
    0x000f, 0x4404, 0x4403, 0x4402, 0x4401, 0x4400, 0x0203, 0x420a,
    0x4209, 0x420e, 0x420d, 0x420c, 0x420b, 0x4008, 0x4007, 0x4006,
    0x4005, 0x0208, 0x000d, 0x000e, 0x4407, 0x4406, 0x4403, 0x4402,
    0x4401, 0x0004, 0x420c, 0x420a, 0x4209, 0x400d, 0x400b, 0x4008,
    0x4005, 0x4004, 0x4000, 0x0208, 0x000b, 0x000c, 0x4408, 0x4406,
    0x4405, 0x4404, 0x4401, 0x420c, 0x420b, 0x420a, 0x4200, 0x4009,
    0x4007, 0x4003, 0x4002, 0x2208, 0x000a, 0x000b, 0x4407, 0x4406,
    0x4405, 0x4404, 0x4403, 0x400a, 0x4209, 0x420b, 0x4008, 0x4002,
    0x4001, 0x4000, 0x2408, 0x4409, 0x4407, 0x4406, 0x4405, 0x4404,
    0x4403, 0x4402, 0x4008, 0x4201, 0x4400, 0x440a, 0x2408, 0x4408,
    0x4406, 0x4404, 0x4403, 0x4402, 0x4205, 0x4205, 0x4007, 0x4201,
    0x4400, 0x4409, 0x2604, 0x0008, 0x4205, 0x4204, 0x4007, 0x4201,
    0x4402, 0x4600, 0x4608, 0x4006, 0x4003, 0x2604, 0x4206, 0x4204,
    0x4203, 0x4005, 0x4202, 0x4407, 0x4600, 0x4601, 0x2404, 0x4205,
    0x4204, 0x4203, 0x4002, 0x4206, 0x4400, 0x4401, 0x4004, 0x0003,
    0x4402, 0x5000, 0x4003, 0x4005, 0x4003, 0x4202, 0x4404, 0x5000,
    0x4002, 0x4203, 0x5000, 0x5000, 0x4002, 0x4000, 0x4001, 0x4000,
    0x4201, 0x4402, 0x4403, 0x4000, 0x4201, 0x4202, 0x4001, 0x4000,
    0x4001, 0x4000, 0x4000, 0x4201, 0x4202, 0x4203, 0x4202, 0x4201,
    0x4200, 0x0004, 0x4202, 0x4201, 0x4200, 0x4004, 0x4003, 0x0203,
    0x4201, 0x4200, 0x4205, 0x4204, 0x4203, 0x4202, 0x4401, 0x4402,
    0x4404, 0x4403, 0x4406, 0x4405, 0x4200, 0x4200, 0x2a08, 0x4406,
    0x4405, 0x4404, 0x4403, 0x4402, 0x4401, 0x4400, 0x4007, 0x4208,
    0x4409, 0x460a, 0x480b, 0x4a0c, 0x2201, 0x400d, 0x420e, 0x3200,
];

/// 熵表各段在片上表内存中的偏移, 上下文切换后需要重写
pub static H264_VLC_TABLE_REG_PAIRS: [(u32, u32); 22] = [
    (VEC_VLC_TABLE_ADDR0 + 0x00, 0x0002_6000),
    (VEC_VLC_TABLE_ADDR0 + 0x04, 0x0007_38a0),
    (VEC_VLC_TABLE_ADDR0 + 0x08, 0x0008_28f4),
    (VEC_VLC_TABLE_ADDR0 + 0x0c, 0x000a_312d),
    (VEC_VLC_TABLE_ADDR0 + 0x10, 0x000b_5959),
    (VEC_VLC_TABLE_ADDR0 + 0x14, 0x000c_517b),
    (VEC_VLC_TABLE_ADDR0 + 0x18, 0x000d_1196),
    (VEC_VLC_TABLE_ADDR0 + 0x1c, 0x000d_b1ad),
    (VEC_VLC_TABLE_ADDR0 + 0x20, 0x000e_21be),
    (VEC_VLC_TABLE_ADDR0 + 0x24, 0x000e_59c8),
    (VEC_VLC_TABLE_ADDR0 + 0x28, 0x000e_79cd),
    (VEC_VLC_TABLE_ADDR0 + 0x2c, 0x000e_b1d3),
    (VEC_VLC_TABLE_ADDR0 + 0x30, 0x000e_d1d8),
    (VEC_VLC_TABLE_ADDR0 + 0x34, 0x000f_09dd),
    (VEC_VLC_TABLE_ADDR0 + 0x38, 0x000f_71e7),
    (VEC_VLC_TABLE_ADDR0 + 0x3c, 0x0000_01f6),
    (VEC_VLC_TABLE_ADDR0 + 0x40, 0x1256_a4dd),
    (VEC_VLC_TABLE_ADDR0 + 0x44, 0x0148_9292),
    (VEC_VLC_TABLE_ADDR0 + 0x48, 0x1124_8050),
    (VEC_VLC_TABLE_ADDR0 + 0x4c, 0x0000_0002),
    (VEC_VLC_TABLE_ADDR0 + 0x50, 0x0000_2a02),
    (VEC_VLC_TABLE_ADDR0 + 0x54, 0x0108_282a),
];

/// 熵表的小端字节序列, 供一次性上载
pub fn vlc_table_bytes() -> Vec<u8> {
    let mut bytes = Vec::with_capacity(H264_VLC_TABLE_DATA.len() * 2);
    for entry in H264_VLC_TABLE_DATA {
        bytes.extend_from_slice(&entry.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlc_table_shape() {
        assert_eq!(H264_VLC_TABLE_DATA.len(), 520, "熵表固定 520 条");
        assert_eq!(vlc_table_bytes().len(), 1040);
        assert_eq!(H264_VLC_TABLE_REG_PAIRS.len(), 22);
        assert_eq!(H264_VLC_TABLE_REG_PAIRS[0].0, VEC_VLC_TABLE_ADDR0);
        assert_eq!(
            H264_VLC_TABLE_REG_PAIRS[21].0,
            VEC_VLC_TABLE_ADDR0 + 21 * 4,
            "偏移按 4 字节递增"
        );
    }

    #[test]
    fn test_preload_buffer_size() {
        assert_eq!(PRELOAD_BUFFER_SIZE, 408, "预载块大小由条目上限推出");
    }
}
