//! 几何推导: 从逐图参数算出宏块网格、位深、采样尺寸与寄存器镜像.
//!
//! 公式编号对应 H.264 标准第 6/7 章, 行为以硬件期待的形状为准.

use crate::params::{PicFlags, PictureParams, Profile};
use crate::regs;

/// 17 位带符号截断: 截取低 16 位, 第 17 位保留符号
pub fn sign_trunc(x: i32) -> u32 {
    (((x >> 15) as u32) & 0x1_0000) | ((x as u32) & 0xffff)
}

/// 当前图的扫描形态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PictureKind {
    Frame,
    TopField,
    BottomField,
}

/// 推导出的逐图几何量与寄存器镜像
#[derive(Clone, Debug)]
pub struct PictureGeometry {
    pub width_mb: u32,
    pub height_mb: u32,
    /// 宏块总数 (7-25)
    pub size_mb: u32,

    pub mb_width_c: u32,
    pub mb_height_c: u32,
    pub bit_depth_l: u32,
    pub bit_depth_c: u32,
    pub qp_bd_offset_l: u32,
    pub qp_bd_offset_c: u32,
    /// 一个宏块的原始比特数 (7-5)
    pub raw_mb_bits: u32,

    pub width_samples_l: u32,
    pub width_samples_c: u32,
    pub height_samples_l: u32,
    pub height_samples_c: u32,
    pub height_map_units: u32,
    pub size_map_units: u32,

    pub kind: PictureKind,
    /// 硬件场类型码: 0 顶场, 1 底场, 2 帧, 3 MBAFF 帧
    pub field_type: u32,
    /// 切片组不连续且非 MBAFF 时需要两遍处理
    pub two_pass: bool,
    /// 同位运动矢量缓冲字节数, 4 KiB 对齐
    pub colocated_size: u32,

    /// 打包好的寄存器镜像, begin 阶段算一次, 逐切片复用
    pub reg_sps0: u32,
    pub reg_pps0: u32,
    pub reg_pic0: u32,
    /// 写回目标表面标注的同位图参数镜像
    pub col_pic_params: u32,
}

impl PictureGeometry {
    pub fn derive(params: &PictureParams, profile: Profile) -> Self {
        // 表 6-1: 色度子采样
        let (mb_width_c, mb_height_c) = match params.chroma_format_idc {
            0 => (0, 0),
            1 => (8, 8),
            2 => (8, 16),
            _ => (16, 16),
        };

        let bit_depth_l = 8 + params.bit_depth_luma_minus8;
        let bit_depth_c = 8 + params.bit_depth_chroma_minus8;
        let qp_bd_offset_l = 6 * params.bit_depth_luma_minus8;
        let qp_bd_offset_c =
            6 * (params.bit_depth_chroma_minus8 + params.residual_colour_transform_flag as u32);

        let width_mb = params.picture_width_in_mbs_minus1 + 1;
        let height_mb = params.picture_height_in_mbs_minus1 + 1;
        let size_mb = width_mb * height_mb;

        let colocated_size = ((size_mb + 100) * 128 + 0xfff) & !0xfff;

        let raw_mb_bits = 256 * bit_depth_l + 2 * mb_width_c * mb_height_c * bit_depth_c;

        let height_map_units = 1 + height_mb / (2 - params.frame_mbs_only_flag as u32);

        let kind = if params.field_pic_flag {
            if params.curr_pic.flags.contains(PicFlags::BOTTOM_FIELD) {
                PictureKind::BottomField
            } else {
                PictureKind::TopField
            }
        } else {
            PictureKind::Frame
        };
        let field_type = match kind {
            PictureKind::TopField => 0,
            PictureKind::BottomField => 1,
            PictureKind::Frame => {
                if params.mb_adaptive_frame_field_flag {
                    3
                } else {
                    2
                }
            }
        };

        let two_pass =
            params.num_slice_groups_minus1 > 0 && !params.mb_adaptive_frame_field_flag;

        let mut reg_sps0 = 0;
        // 基线档次用硬件缺省矩阵, 其余档次用码流提供的矩阵
        regs::sps0::DEFAULT_MATRIX_FLAG.set(&mut reg_sps0, (profile == Profile::Baseline) as u32);
        regs::sps0::TWO_PASS_FLAG.set(&mut reg_sps0, two_pass as u32);
        regs::sps0::SGM_4BIT_FLAG.set(&mut reg_sps0, 0);
        regs::sps0::PROFILE_IDC.set(&mut reg_sps0, profile.profile_idc());
        regs::sps0::MIN_LUMA_BIPRED_SIZE_8X8
            .set(&mut reg_sps0, params.min_luma_bipred_size_8x8 as u32);
        regs::sps0::DIRECT_8X8_INFERENCE_FLAG
            .set(&mut reg_sps0, params.direct_8x8_inference_flag as u32);
        regs::sps0::CHROMA_FORMAT_IDC.set(&mut reg_sps0, params.chroma_format_idc);
        regs::sps0::FRAME_MBS_ONLY_FLAG.set(&mut reg_sps0, params.frame_mbs_only_flag as u32);
        regs::sps0::PIC_WIDTH_IN_MBS_LESS1.set(&mut reg_sps0, width_mb - 1);

        let mut reg_pps0 = 0;
        regs::pps0::TRANSFORM_8X8_MODE_FLAG
            .set(&mut reg_pps0, params.transform_8x8_mode_flag as u32);
        regs::pps0::CONSTRAINED_INTRA_PRED_FLAG
            .set(&mut reg_pps0, params.constrained_intra_pred_flag as u32);
        regs::pps0::ENTROPY_CODING_MODE_FLAG
            .set(&mut reg_pps0, params.entropy_coding_mode_flag as u32);
        regs::pps0::NUM_SLICE_GROUPS_MINUS1.set(&mut reg_pps0, params.num_slice_groups_minus1);
        regs::pps0::WEIGHTED_BIPRED_IDC.set(&mut reg_pps0, params.weighted_bipred_idc);
        regs::pps0::CHROMA_QP_INDEX_OFFSET
            .set_signed(&mut reg_pps0, params.chroma_qp_index_offset);
        regs::pps0::SECOND_CHROMA_QP_INDEX_OFFSET
            .set_signed(&mut reg_pps0, params.second_chroma_qp_index_offset);

        // 场图只覆盖一半的宏块行 (7-23)
        let pic_height_in_mbs = height_mb >> params.field_pic_flag as u32;
        let pic_size_in_mbs = width_mb * pic_height_in_mbs;

        let mut reg_pic0 = 0;
        regs::pic0::PIC_SIZE_IN_MBS_LESS1.set(&mut reg_pic0, pic_size_in_mbs - 1);
        regs::pic0::PIC_HEIGHT_IN_MBS_LESS1.set(&mut reg_pic0, pic_height_in_mbs - 1);
        regs::pic0::REFERENCE_FLAG
            .set(&mut reg_pic0, params.curr_pic.flags.is_reference() as u32);
        regs::pic0::MBAFF_FRAME_FLAG
            .set(&mut reg_pic0, params.mb_adaptive_frame_field_flag as u32);
        regs::pic0::FIELD_PIC_FLAG.set(&mut reg_pic0, params.field_pic_flag as u32);
        regs::pic0::BOTTOM_FIELD_FLAG.set(
            &mut reg_pic0,
            params.curr_pic.flags.contains(PicFlags::BOTTOM_FIELD) as u32,
        );

        let mut col_pic_params = 0;
        regs::col_pic0::NOT_FRAME_FLAG
            .set(&mut col_pic_params, (kind != PictureKind::Frame) as u32);
        regs::col_pic0::MBAFF_FRAME_FLAG
            .set(&mut col_pic_params, params.mb_adaptive_frame_field_flag as u32);

        Self {
            width_mb,
            height_mb,
            size_mb,
            mb_width_c,
            mb_height_c,
            bit_depth_l,
            bit_depth_c,
            qp_bd_offset_l,
            qp_bd_offset_c,
            raw_mb_bits,
            width_samples_l: width_mb * 16,
            width_samples_c: width_mb * mb_width_c,
            height_samples_l: height_mb * 16,
            height_samples_c: height_mb * mb_height_c,
            height_map_units,
            size_map_units: width_mb * height_map_units,
            kind,
            field_type,
            two_pass,
            colocated_size,
            reg_sps0,
            reg_pps0,
            reg_pic0,
            col_pic_params,
        }
    }

    /// 末宏块定位字, (y << 8) | x
    pub fn last_mb(&self, field_pic_flag: bool) -> u32 {
        (((self.height_mb >> field_pic_flag as u32) - 1) << 8) | (self.width_mb - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::PictureRef;

    fn base_params(width_mb: u32, height_mb: u32) -> PictureParams {
        PictureParams {
            curr_pic: PictureRef::absent(),
            reference_frames: Vec::new(),
            num_ref_frames: 0,
            picture_width_in_mbs_minus1: width_mb - 1,
            picture_height_in_mbs_minus1: height_mb - 1,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            chroma_format_idc: 1,
            residual_colour_transform_flag: false,
            frame_mbs_only_flag: true,
            mb_adaptive_frame_field_flag: false,
            direct_8x8_inference_flag: true,
            min_luma_bipred_size_8x8: false,
            entropy_coding_mode_flag: true,
            weighted_pred_flag: false,
            weighted_bipred_idc: 0,
            transform_8x8_mode_flag: false,
            field_pic_flag: false,
            constrained_intra_pred_flag: false,
            num_slice_groups_minus1: 0,
            pic_init_qp_minus26: 0,
            chroma_qp_index_offset: 0,
            second_chroma_qp_index_offset: 0,
        }
    }

    #[test]
    fn test_chroma_mb_dims_per_format() {
        let mut p = base_params(4, 4);
        for (idc, expect) in [(0, (0, 0)), (1, (8, 8)), (2, (8, 16)), (3, (16, 16))] {
            p.chroma_format_idc = idc;
            let g = PictureGeometry::derive(&p, Profile::Main);
            assert_eq!(
                (g.mb_width_c, g.mb_height_c),
                expect,
                "色度宏块尺寸跟随采样格式"
            );
        }
    }

    #[test]
    fn test_colocated_size_page_aligned() {
        let p = base_params(45, 30);
        let g = PictureGeometry::derive(&p, Profile::Main);
        assert_eq!(g.size_mb, 1350);
        assert_eq!(g.colocated_size, ((1350 + 100) * 128 + 0xfff) & !0xfff);
        assert_eq!(g.colocated_size & 0xfff, 0, "同位缓冲按 4 KiB 对齐");
    }

    #[test]
    fn test_two_pass_rule() {
        let mut p = base_params(4, 4);
        p.num_slice_groups_minus1 = 1;
        let g = PictureGeometry::derive(&p, Profile::Main);
        assert!(g.two_pass, "多切片组且非 MBAFF 要求两遍处理");

        p.mb_adaptive_frame_field_flag = true;
        let g = PictureGeometry::derive(&p, Profile::Main);
        assert!(!g.two_pass, "MBAFF 下宏块序连续, 单遍即可");

        p.mb_adaptive_frame_field_flag = false;
        p.num_slice_groups_minus1 = 0;
        let g = PictureGeometry::derive(&p, Profile::Main);
        assert!(!g.two_pass);
    }

    #[test]
    fn test_field_type_codes() {
        let mut p = base_params(4, 4);
        assert_eq!(PictureGeometry::derive(&p, Profile::Main).field_type, 2);

        p.mb_adaptive_frame_field_flag = true;
        assert_eq!(PictureGeometry::derive(&p, Profile::Main).field_type, 3);

        p.mb_adaptive_frame_field_flag = false;
        p.field_pic_flag = true;
        assert_eq!(PictureGeometry::derive(&p, Profile::Main).field_type, 0);

        p.curr_pic.flags = PicFlags::BOTTOM_FIELD;
        let g = PictureGeometry::derive(&p, Profile::Main);
        assert_eq!(g.field_type, 1);
        assert_eq!(g.kind, PictureKind::BottomField);
    }

    #[test]
    fn test_sign_trunc_17bit() {
        assert_eq!(sign_trunc(0), 0);
        assert_eq!(sign_trunc(1), 1);
        assert_eq!(sign_trunc(-1), 0x1ffff, "负数保留第 17 位符号");
        assert_eq!(sign_trunc(0xffff), 0xffff);
        assert_eq!(sign_trunc(-32768), 0x18000);
    }

    #[test]
    fn test_last_mb_word() {
        let p = base_params(120, 68);
        let g = PictureGeometry::derive(&p, Profile::High);
        assert_eq!(g.last_mb(false), (67 << 8) | 119);
        assert_eq!(g.last_mb(true), (33 << 8) | 119, "场图宏块行数减半");
    }
}
