//! 命令流发射: 把打包好的逐图/逐切片状态写成命令缓冲字序列.
//!
//! 缓冲布局固定: 头部 (含五个前向保留槽位) -> 熵表预载段 (条件跳过)
//! -> 码流 DMA -> 寄存器块 -> rendec 各段 -> 完成标记.
//! rendec 段的顺序由硬件消费顺序决定, 不能调换.

use log::warn;
use vdx_cmdbuf::{words, CmdBuf};
use vdx_core::{BufferLocation, SurfacePool, VdxError, VdxResult};

use crate::context::{DeblockMode, DecodeContext, HeaderSlots};
use crate::geometry::sign_trunc;
use crate::params::{IqMatrix, SliceParams, SliceType, Profile};
use crate::refmap;
use crate::regs;

impl DecodeContext {
    /// 逐切片预打包: SLICE0/SLICE1 镜像, 首宏块坐标与去块路径决策
    pub(crate) fn preprocess_slice(&mut self, slice: &SliceParams) -> VdxResult<()> {
        let params = self
            .pic_params
            .as_ref()
            .ok_or(VdxError::MissingPictureParams)?;
        let geometry = self
            .geometry
            .as_mut()
            .ok_or(VdxError::MissingPictureParams)?;

        self.first_mb_x = slice.first_mb_in_slice % geometry.width_mb;
        self.first_mb_y = slice.first_mb_in_slice / geometry.width_mb;
        // MBAFF 帧里宏块对占两行
        if !params.field_pic_flag && params.mb_adaptive_frame_field_flag {
            self.first_mb_y *= 2;
        }

        let slice_qpy = 26 + params.pic_init_qp_minus26 + slice.slice_qp_delta;

        let l0_active =
            refmap::clamp_active_minus1(slice.num_ref_idx_l0_active_minus1, "list0");
        let l1_active =
            refmap::clamp_active_minus1(slice.num_ref_idx_l1_active_minus1, "list1");

        let mut slice0 = 0;
        regs::slice0::DIRECT_SPATIAL_MV_PRED_FLAG
            .set(&mut slice0, slice.direct_spatial_mv_pred_flag as u32);
        regs::slice0::DISABLE_DEBLOCK_FILTER_IDC
            .set(&mut slice0, slice.disable_deblocking_filter_idc);
        regs::slice0::ALPHA_C0_OFFSET_DIV2.set_signed(&mut slice0, slice.slice_alpha_c0_offset_div2);
        regs::slice0::BETA_OFFSET_DIV2.set_signed(&mut slice0, slice.slice_beta_offset_div2);
        regs::slice0::FIELD_TYPE.set(&mut slice0, geometry.field_type);
        regs::slice0::SLICE_TYPE.set(&mut slice0, slice.slice_type.hw_code());
        regs::slice0::CABAC_INIT_IDC.set(&mut slice0, slice.cabac_init_idc);
        regs::slice0::SLICE_COUNT.set(&mut slice0, self.slice_count);
        self.slice0_params = slice0;

        let mut slice1 = 0;
        regs::slice1::FIRST_MB_IN_SLICE_X.set(&mut slice1, self.first_mb_x);
        regs::slice1::FIRST_MB_IN_SLICE_Y.set(&mut slice1, self.first_mb_y);
        regs::slice1::SLICE_QPY.set_signed(&mut slice1, slice_qpy);
        regs::slice1::NUM_REF_IDX_L0_ACTIVE_MINUS1.set(&mut slice1, l0_active);
        regs::slice1::NUM_REF_IDX_L1_ACTIVE_MINUS1.set(&mut slice1, l1_active);
        self.slice1_params = slice1;

        // idc == 1 关闭环内去块, 有环外能力时转两遍路径
        if slice.disable_deblocking_filter_idc == 1 {
            if self.config.out_of_loop_deblock {
                self.deblock_mode = DeblockMode::IntraOold;
                if !geometry.two_pass {
                    geometry.two_pass = true;
                    regs::sps0::TWO_PASS_FLAG.set(&mut geometry.reg_sps0, 1);
                }
            } else {
                self.deblock_mode = DeblockMode::Std;
            }
        } else {
            self.deblock_mode = DeblockMode::Std;
        }
        Ok(())
    }

    /// 缓冲头部: 命令头 + 五个前向保留槽位 + 预载保存/恢复 DMA 对
    pub(crate) fn write_fe_state(&mut self, cmdbuf: &mut CmdBuf) {
        cmdbuf.push_raw(words::CMD_HEADER);
        let slice_params = cmdbuf.reserve();

        cmdbuf.preload_transfer(true, BufferLocation::base(self.preload_buf), regs::PRELOAD_BUFFER_SIZE);
        cmdbuf.preload_transfer(false, BufferLocation::base(self.preload_buf), regs::PRELOAD_BUFFER_SIZE);

        let first_pic_last = cmdbuf.reserve();
        let range_base0 = cmdbuf.reserve();
        let range_base1 = cmdbuf.reserve();
        let alt_output_flags = cmdbuf.reserve();

        self.header_slots = Some(HeaderSlots {
            slice_params,
            first_pic_last,
            range_base0,
            range_base1,
            alt_output_flags,
        });
    }

    /// 熵表预载段: 表数据 DMA + 各段偏移寄存器, 仅上下文切换后生效
    pub(crate) fn write_vlc_tables(&self, cmdbuf: &mut CmdBuf) -> VdxResult<()> {
        cmdbuf.skip_start_block(words::SKIP_ON_CONTEXT_SWITCH)?;

        cmdbuf.dma_load(
            BufferLocation::base(self.vlc_table_buf),
            (regs::H264_VLC_TABLE_DATA.len() * 2) as u32,
        );

        cmdbuf.reg_start_block()?;
        for &(offset, value) in &regs::H264_VLC_TABLE_REG_PAIRS {
            cmdbuf.reg_set(offset, value)?;
        }
        cmdbuf.reg_end_block()?;

        cmdbuf.skip_end_block()
    }

    /// 前端寄存器块: 熵解码控制 + SPS/PPS/PIC/SLICE 镜像
    pub(crate) fn build_register(&self, cmdbuf: &mut CmdBuf, slice: &SliceParams) -> VdxResult<()> {
        let params = self
            .pic_params
            .as_ref()
            .ok_or(VdxError::MissingPictureParams)?;
        let geometry = self
            .geometry
            .as_ref()
            .ok_or(VdxError::MissingPictureParams)?;

        cmdbuf.reg_start_block()?;

        let mut fe_control = 0;
        regs::fe_control::PROFILE.set(&mut fe_control, self.config.profile.hw_profile());
        regs::fe_control::MODE.set(&mut fe_control, 1);
        cmdbuf.reg_set(regs::VEC_ENTDEC_FE_CONTROL, fe_control)?;

        cmdbuf.reg_set(regs::VEC_FE_SPS0, geometry.reg_sps0)?;
        cmdbuf.reg_set(regs::VEC_FE_PPS0, geometry.reg_pps0)?;
        cmdbuf.reg_set(regs::VEC_FE_CUR_PIC0, geometry.reg_pic0)?;
        cmdbuf.reg_set(regs::VEC_FE_SLICE0, self.slice0_params)?;
        cmdbuf.reg_set(regs::VEC_FE_SLICE1, self.slice1_params)?;

        let mut slice2 = 0;
        regs::slice2::FIRST_MB_IN_SLICE.set(&mut slice2, slice.first_mb_in_slice);
        cmdbuf.reg_set(regs::VEC_FE_SLICE2, slice2)?;

        if params.num_slice_groups_minus1 >= 1 {
            let sgm = self.slice_group_map.ok_or_else(|| {
                VdxError::InvalidRecord("多切片组的图缺少切片组映射表记录".into())
            })?;
            cmdbuf.reg_set_address(regs::VEC_FE_BASE_ADDR_SGM, BufferLocation::base(sgm))?;
        }

        cmdbuf.reg_end_block()
    }

    /// 后端 rendec 段, 顺序固定
    pub(crate) fn build_rendec_params(
        &self,
        cmdbuf: &mut CmdBuf,
        surfaces: &mut SurfacePool,
        slice: &SliceParams,
    ) -> VdxResult<()> {
        let params = self
            .pic_params
            .as_ref()
            .ok_or(VdxError::MissingPictureParams)?;
        let geometry = self
            .geometry
            .as_ref()
            .ok_or(VdxError::MissingPictureParams)?;
        let target = self
            .target
            .ok_or_else(|| VdxError::Protocol("发射 rendec 段时没有渲染目标".into()))?;

        // 段 1: 后端熵解码控制
        cmdbuf.rendec_start(regs::VEC_ENTDEC_BE_CONTROL)?;
        let mut be_control = 0;
        regs::fe_control::PROFILE.set(&mut be_control, self.config.profile.hw_profile());
        regs::fe_control::MODE.set(&mut be_control, 1);
        cmdbuf.rendec_write(be_control)?;
        cmdbuf.rendec_end()?;

        // 段 2: 寄存器镜像回显 + 同位基址 + 长期参考位图
        cmdbuf.rendec_start(regs::VEC_BE_SPS0)?;
        cmdbuf.rendec_write(geometry.reg_sps0)?;
        cmdbuf.rendec_write(geometry.reg_pps0)?;
        cmdbuf.rendec_write(geometry.reg_pic0)?;
        cmdbuf.rendec_write(self.slice0_params)?;
        cmdbuf.rendec_write(self.slice1_params)?;
        {
            let surface = surfaces
                .get(target)
                .ok_or(VdxError::SurfaceNotFound(target.0))?;
            match self.colocated.lookup(&surface.annotation) {
                Some(buf) => cmdbuf.rendec_write_address(BufferLocation::base(buf))?,
                None => {
                    warn!("H264: 目标表面没有同位缓冲, 基址写 0");
                    cmdbuf.rendec_write(0)?;
                }
            }
        }
        let mut ref0 = 0;
        regs::ref0::LONG_TERM_FRAME_FLAGS.set(&mut ref0, self.long_term_frame_flags);
        cmdbuf.rendec_write(ref0)?;
        cmdbuf.rendec_end()?;

        // 段 3: 量化矩阵 (仅 High 档次)
        if self.config.profile == Profile::High {
            self.build_scaling_lists(cmdbuf)?;
        }

        // 段 4/5: B 切片才携带显示序号与同位图信息
        if slice.slice_type == SliceType::B {
            self.build_picture_order_chunk(cmdbuf, params)?;
            self.build_b_slice_chunk(cmdbuf, surfaces, slice)?;
        }

        // 段 6: P/B 切片的 list0 硬件索引
        if slice.slice_type.uses_list0() {
            cmdbuf.rendec_start(regs::VEC_BE_LIST0)?;
            let l0_active =
                refmap::clamp_active_minus1(slice.num_ref_idx_l0_active_minus1, "list0");
            for word in refmap::pack_index_words(surfaces, &slice.ref_pic_list0, l0_active) {
                cmdbuf.rendec_write(word)?;
            }
            cmdbuf.rendec_end()?;
        }

        // 段 7: DPB 参考基址
        if params.num_ref_frames > 0 {
            self.build_dpb_chunk(cmdbuf, surfaces, params, slice)?;
        }

        // 段 8: 加权预测因子
        let weighted = (params.weighted_pred_flag && slice.slice_type == SliceType::P)
            || (params.weighted_bipred_idc != 0 && slice.slice_type == SliceType::B);
        if weighted {
            self.build_weighted_chunks(cmdbuf, slice)?;
        }

        // 段 9: 序列命令 (尺寸, 工作模式, 重建基址, 缓存配置)
        let slice_params_word =
            self.build_seq_commands(cmdbuf, surfaces, params, geometry, slice)?;

        // 段 10: SLICE_PARAMS 回显, 同时拍进头部保留槽位
        cmdbuf.rendec_start(regs::CMDS_SLICE_PARAMS)?;
        cmdbuf.rendec_write(slice_params_word)?;
        cmdbuf.rendec_end()?;
        if let Some(slots) = &self.header_slots {
            cmdbuf.patch(slots.slice_params, slice_params_word);
        }

        // 段 11: 旋转输出. 两遍模式下旋转由第二遍去块完成, 这里跳过.
        if !geometry.two_pass && self.config.rotation != vdx_core::Rotation::None {
            self.build_alternative_frame(cmdbuf, surfaces)?;
        }

        Ok(())
    }

    /// 量化矩阵段: 顺序按硬件片上表内存布局, 先 8x8 帧间再 8x8 帧内,
    /// 4x4 按 帧内Y/帧间Y/帧间Cb/帧内Cb/帧间Cr/帧内Cr
    fn build_scaling_lists(&self, cmdbuf: &mut CmdBuf) -> VdxResult<()> {
        let default_matrix;
        let matrix = match &self.iq_matrix {
            Some(m) => m.as_ref(),
            None => {
                warn!("H264: High 档次缺少量化矩阵记录, 发送全零矩阵");
                default_matrix = IqMatrix::default();
                &default_matrix
            }
        };

        cmdbuf.rendec_start(regs::IQRAM_BASE)?;
        cmdbuf.rendec_write_block(&matrix.scaling_list_8x8[1])?;
        cmdbuf.rendec_write_block(&matrix.scaling_list_8x8[0])?;
        cmdbuf.rendec_write_block(&matrix.scaling_list_4x4[0])?;
        cmdbuf.rendec_write_block(&matrix.scaling_list_4x4[3])?;
        cmdbuf.rendec_write_block(&matrix.scaling_list_4x4[4])?;
        cmdbuf.rendec_write_block(&matrix.scaling_list_4x4[1])?;
        cmdbuf.rendec_write_block(&matrix.scaling_list_4x4[5])?;
        cmdbuf.rendec_write_block(&matrix.scaling_list_4x4[2])?;
        cmdbuf.rendec_end()
    }

    /// 显示序号段: 当前图两场 + 每个参考帧两场, 17 位带符号截断
    fn build_picture_order_chunk(
        &self,
        cmdbuf: &mut CmdBuf,
        params: &crate::params::PictureParams,
    ) -> VdxResult<()> {
        cmdbuf.rendec_start(regs::VEC_BE_FOC0)?;

        let mut foc0 = 0;
        regs::foc::ORDER_CNT.set(&mut foc0, sign_trunc(params.curr_pic.top_poc));
        cmdbuf.rendec_write(foc0)?;

        let mut foc1 = 0;
        regs::foc::ORDER_CNT.set(&mut foc1, sign_trunc(params.curr_pic.bottom_poc));
        cmdbuf.rendec_write(foc1)?;

        let num_refs = (params.num_ref_frames as usize).min(16);
        if params.num_ref_frames > 16 {
            warn!("H264: 参考帧数 {} 超出 16, 截断", params.num_ref_frames);
        }
        for entry in params.reference_frames.iter().take(num_refs) {
            let mut top = 0;
            regs::foc::ORDER_CNT.set(&mut top, sign_trunc(entry.top_poc));
            cmdbuf.rendec_write(top)?;

            let mut bottom = 0;
            regs::foc::ORDER_CNT.set(&mut bottom, sign_trunc(entry.bottom_poc));
            cmdbuf.rendec_write(bottom)?;
        }
        cmdbuf.rendec_end()
    }

    /// B 切片同位图段: 同位图参数 + 同位缓冲基址 + list0 逆映射 + list1 索引
    fn build_b_slice_chunk(
        &self,
        cmdbuf: &mut CmdBuf,
        surfaces: &SurfacePool,
        slice: &SliceParams,
    ) -> VdxResult<()> {
        let params = self
            .pic_params
            .as_ref()
            .ok_or(VdxError::MissingPictureParams)?;

        cmdbuf.rendec_start(regs::VEC_BE_COL_PIC0)?;

        // 同位图是 list1 的 0 号
        let colocated = slice.ref_pic_list1.first();
        let colocated_surface = colocated.and_then(|pic| surfaces.get(pic.surface));
        match (colocated, colocated_surface) {
            (Some(pic), Some(surface)) => {
                let bottom_field_flag = if params.field_pic_flag {
                    pic.flags.contains(crate::params::PicFlags::BOTTOM_FIELD) as u32
                } else {
                    // 帧图取 POC 距离更近的那个场
                    let cur = params.curr_pic.top_poc.min(params.curr_pic.bottom_poc);
                    let top_diff = (cur - pic.top_poc).abs();
                    let bot_diff = (cur - pic.bottom_poc).abs();
                    (top_diff >= bot_diff) as u32
                };

                let mut col_pic0 = surface.annotation.col_pic_params;
                regs::col_pic0::BOTTOM_FIELD_FLAG.set(&mut col_pic0, bottom_field_flag);
                cmdbuf.rendec_write(col_pic0)?;

                match self.colocated.lookup(&surface.annotation) {
                    Some(buf) => cmdbuf.rendec_write_address(BufferLocation::base(buf))?,
                    None => {
                        warn!("H264: 同位表面没有同位缓冲, 基址写 0");
                        cmdbuf.rendec_write(0)?;
                    }
                }
            }
            _ => {
                warn!("H264: B 切片的同位表面缺席, 写哨兵值");
                cmdbuf.rendec_write(0)?;
                cmdbuf.rendec_write(regs::UNUSED_SENTINEL)?;
            }
        }

        let inverse = refmap::inverse_list0(
            surfaces,
            &slice.ref_pic_list0,
            slice.num_ref_idx_l0_active_minus1,
        );
        cmdbuf.rendec_write_block(&inverse)?;

        let l1_active = refmap::clamp_active_minus1(slice.num_ref_idx_l1_active_minus1, "list1");
        for word in refmap::pack_index_words(surfaces, &slice.ref_pic_list1, l1_active) {
            cmdbuf.rendec_write(word)?;
        }

        cmdbuf.rendec_end()
    }

    /// DPB 基址段: 16 槽位使用位图, 未使用或缺席的槽位写哨兵值
    fn build_dpb_chunk(
        &self,
        cmdbuf: &mut CmdBuf,
        surfaces: &SurfacePool,
        params: &crate::params::PictureParams,
        slice: &SliceParams,
    ) -> VdxResult<()> {
        cmdbuf.rendec_start(regs::CMDS_REFERENCE_PICTURE_BASE_ADDRESSES)?;

        let mut is_used = [false; 16];
        for list in [&slice.ref_pic_list0, &slice.ref_pic_list1] {
            for pic in list.iter().take(32) {
                if pic.flags.contains(crate::params::PicFlags::INVALID) {
                    continue;
                }
                if let Some(surface) = surfaces.get(pic.surface) {
                    if let Some(idx) = surface.annotation.dpb_idx {
                        if (idx as usize) < 16 {
                            is_used[idx as usize] = true;
                        }
                    }
                }
            }
        }

        let num_refs = (params.num_ref_frames as usize).min(16);
        for (i, entry) in params.reference_frames.iter().take(num_refs).enumerate() {
            let surface = surfaces.get(entry.surface);
            match surface {
                Some(surface) if is_used[i] => {
                    let buf = surface.ref_buf;
                    cmdbuf.rendec_write_address(BufferLocation::base(buf))?;
                    cmdbuf.rendec_write_address(BufferLocation::new(
                        buf,
                        surface.chroma_offset,
                    ))?;
                }
                Some(_) => {
                    cmdbuf.rendec_write(regs::UNUSED_SENTINEL)?;
                    cmdbuf.rendec_write(regs::UNUSED_SENTINEL)?;
                }
                None => {
                    warn!("H264: DPB 槽位 {} 的参考表面缺席, 写哨兵值", i);
                    cmdbuf.rendec_write(regs::UNUSED_SENTINEL)?;
                    cmdbuf.rendec_write(regs::UNUSED_SENTINEL)?;
                }
            }
        }
        cmdbuf.rendec_end()
    }

    /// 加权预测段: list0 因子与偏移各补齐 32 条, B 切片再发 list1 一套
    fn build_weighted_chunks(&self, cmdbuf: &mut CmdBuf, slice: &SliceParams) -> VdxResult<()> {
        let l0 = refmap::clamp_active_minus1(slice.num_ref_idx_l0_active_minus1, "list0") as usize;

        cmdbuf.rendec_start(regs::CMDS_WEIGHTED_FACTORS_A)?;
        for i in 0..32 {
            if i <= l0 {
                let mut word = 0;
                regs::weighted_factor::CR.set_signed(&mut word, slice.chroma_weight_l0[i][1] as i32);
                regs::weighted_factor::CB.set_signed(&mut word, slice.chroma_weight_l0[i][0] as i32);
                regs::weighted_factor::Y.set_signed(&mut word, slice.luma_weight_l0[i] as i32);
                cmdbuf.rendec_write(word)?;
            } else {
                cmdbuf.rendec_write(0)?;
            }
        }
        for i in 0..32 {
            if i <= l0 {
                let mut word = 0;
                regs::weighted_factor::CR.set_signed(&mut word, slice.chroma_offset_l0[i][1] as i32);
                regs::weighted_factor::CB.set_signed(&mut word, slice.chroma_offset_l0[i][0] as i32);
                regs::weighted_factor::Y.set_signed(&mut word, slice.luma_offset_l0[i] as i32);
                cmdbuf.rendec_write(word)?;
            } else {
                cmdbuf.rendec_write(0)?;
            }
        }
        cmdbuf.rendec_end()?;

        if slice.slice_type == SliceType::B {
            let l1 =
                refmap::clamp_active_minus1(slice.num_ref_idx_l1_active_minus1, "list1") as usize;

            cmdbuf.rendec_start(regs::CMDS_WEIGHTED_FACTORS_B)?;
            for i in 0..32 {
                if i <= l1 {
                    let mut word = 0;
                    regs::weighted_factor::CR
                        .set_signed(&mut word, slice.chroma_weight_l1[i][1] as i32);
                    regs::weighted_factor::CB
                        .set_signed(&mut word, slice.chroma_weight_l1[i][0] as i32);
                    regs::weighted_factor::Y.set_signed(&mut word, slice.luma_weight_l1[i] as i32);
                    cmdbuf.rendec_write(word)?;
                } else {
                    cmdbuf.rendec_write(0)?;
                }
            }
            for i in 0..32 {
                if i <= l1 {
                    let mut word = 0;
                    regs::weighted_factor::CR
                        .set_signed(&mut word, slice.chroma_offset_l1[i][1] as i32);
                    regs::weighted_factor::CB
                        .set_signed(&mut word, slice.chroma_offset_l1[i][0] as i32);
                    regs::weighted_factor::Y.set_signed(&mut word, slice.luma_offset_l1[i] as i32);
                    cmdbuf.rendec_write(word)?;
                } else {
                    cmdbuf.rendec_write(0)?;
                }
            }
            cmdbuf.rendec_end()?;
        }
        Ok(())
    }

    /// 序列命令段, 返回 SLICE_PARAMS 回显字
    fn build_seq_commands(
        &self,
        cmdbuf: &mut CmdBuf,
        surfaces: &mut SurfacePool,
        params: &crate::params::PictureParams,
        geometry: &crate::geometry::PictureGeometry,
        slice: &SliceParams,
    ) -> VdxResult<u32> {
        let target = self
            .target
            .ok_or_else(|| VdxError::Protocol("发射序列命令时没有渲染目标".into()))?;

        cmdbuf.rendec_start(regs::CMDS_DISPLAY_PICTURE_SIZE)?;

        let mut display = 0;
        regs::picture_size::HEIGHT.set(&mut display, geometry.height_mb * 16 - 1);
        regs::picture_size::WIDTH.set(&mut display, geometry.width_mb * 16 - 1);
        cmdbuf.rendec_write(display)?;

        let mut coded = 0;
        regs::picture_size::HEIGHT.set(&mut coded, geometry.height_mb * 16 - 1);
        regs::picture_size::WIDTH.set(&mut coded, geometry.width_mb * 16 - 1);
        cmdbuf.rendec_write(coded)?;

        let surface = surfaces
            .get_mut(target)
            .ok_or(VdxError::SurfaceNotFound(target.0))?;

        let mut mode = 0;
        regs::operating_mode::CHROMA_INTERLEAVED.set(&mut mode, 0);
        regs::operating_mode::ROW_STRIDE.set(&mut mode, surface.stride_mode);
        regs::operating_mode::CODEC_PROFILE.set(&mut mode, self.config.profile.hw_profile());
        regs::operating_mode::CODEC_MODE.set(&mut mode, 1);
        regs::operating_mode::ASYNC_MODE.set(
            &mut mode,
            (geometry.two_pass && !params.mb_adaptive_frame_field_flag) as u32,
        );
        regs::operating_mode::CHROMA_FORMAT.set(&mut mode, params.chroma_format_idc);
        cmdbuf.rendec_write(mode)?;

        // 重建基址: 环外去块路径写进环内缓冲, 该缓冲随之成为参考源
        if self.deblock_mode == DeblockMode::IntraOold && geometry.two_pass {
            let in_loop = surface.in_loop_buf.ok_or_else(|| {
                VdxError::Internal("环外去块路径要求目标表面携带环内缓冲".into())
            })?;
            cmdbuf.rendec_write_address(BufferLocation::base(in_loop))?;
            cmdbuf.rendec_write_address(BufferLocation::new(in_loop, surface.chroma_offset))?;
            surface.ref_buf = in_loop;
        } else {
            cmdbuf.rendec_write_address(BufferLocation::base(surface.buf))?;
            cmdbuf.rendec_write_address(BufferLocation::new(
                surface.buf,
                surface.chroma_offset,
            ))?;
            surface.ref_buf = surface.buf;
        }

        // 辅助 MSB 基址: H.264 不使用
        cmdbuf.rendec_write(0)?;

        cmdbuf.rendec_write_address(BufferLocation::base(self.reference_cache))?;

        let mut cache = 0;
        regs::mc_cache::CONFIG_REF_OFFSET.set(&mut cache, regs::CACHE_REF_OFFSET);
        regs::mc_cache::CONFIG_ROW_OFFSET.set(&mut cache, regs::CACHE_ROW_OFFSET);
        cmdbuf.rendec_write(cache)?;

        // 亮度补偿: H.264 不使用
        cmdbuf.rendec_write(0)?;

        let mut denom = 0;
        regs::weight_denom::C_LOG2.set(&mut denom, slice.chroma_log2_weight_denom);
        regs::weight_denom::Y_LOG2.set(&mut denom, slice.luma_log2_weight_denom);
        cmdbuf.rendec_write(denom)?;

        cmdbuf.rendec_end()?;

        let mode_config = params.weighted_pred_flag as u32 | (params.weighted_bipred_idc << 1);
        let mut slice_params_word = 0;
        regs::slice_params_cmd::CONSTRAINED_INTRA_PRED
            .set(&mut slice_params_word, params.constrained_intra_pred_flag as u32);
        regs::slice_params_cmd::MODE_CONFIG.set(&mut slice_params_word, mode_config);
        regs::slice_params_cmd::DISABLE_DEBLOCK_FILTER_IDC
            .set(&mut slice_params_word, slice.disable_deblocking_filter_idc);
        regs::slice_params_cmd::ALPHA_C0_OFFSET_DIV2
            .set_signed(&mut slice_params_word, slice.slice_alpha_c0_offset_div2);
        regs::slice_params_cmd::BETA_OFFSET_DIV2
            .set_signed(&mut slice_params_word, slice.slice_beta_offset_div2);
        regs::slice_params_cmd::FIELD_TYPE.set(&mut slice_params_word, geometry.field_type);
        regs::slice_params_cmd::CODE_TYPE.set(&mut slice_params_word, slice.slice_type.hw_code());

        Ok(slice_params_word)
    }

    /// 旋转输出段: 亮度映射基址段 + 旋转模式段, 并回填头部槽位
    fn build_alternative_frame(
        &self,
        cmdbuf: &mut CmdBuf,
        surfaces: &SurfacePool,
    ) -> VdxResult<()> {
        let target = self
            .target
            .ok_or_else(|| VdxError::Protocol("发射旋转段时没有渲染目标".into()))?;
        let surface = surfaces
            .get(target)
            .ok_or(VdxError::SurfaceNotFound(target.0))?;
        let Some(rotate) = surface.rotate.as_ref() else {
            warn!("H264: 请求了旋转输出但目标表面没有旋转面, 跳过旋转段");
            return Ok(());
        };

        cmdbuf.rendec_start(regs::CMDS_LUMA_RANGE_MAPPING_BASE_ADDRESS)?;
        cmdbuf.rendec_write_address(BufferLocation::base(rotate.buf))?;
        cmdbuf.rendec_write_address(BufferLocation::new(rotate.buf, rotate.chroma_offset))?;
        cmdbuf.rendec_end()?;

        let mut rotation = 0;
        regs::alt_output::ALT_PICTURE_ENABLE.set(&mut rotation, 1);
        regs::alt_output::ROTATION_ROW_STRIDE.set(&mut rotation, rotate.stride_mode);
        regs::alt_output::RECON_WRITE_DISABLE.set(&mut rotation, 0);
        regs::alt_output::ROTATION_MODE.set(&mut rotation, rotate.rotation.hw_mode());

        let mut ext_stride = 0;
        regs::ext_stride::EXT_ROW_STRIDE.set(&mut ext_stride, surface.stride / 64);

        cmdbuf.rendec_start(regs::CMDS_ALTERNATIVE_OUTPUT_PICTURE_ROTATION)?;
        cmdbuf.rendec_write(rotation)?;
        cmdbuf.rendec_write(ext_stride)?;
        cmdbuf.rendec_end()?;

        if let Some(slots) = &self.header_slots {
            cmdbuf.patch(slots.alt_output_flags, rotation);
            cmdbuf.patch_address(slots.range_base0, BufferLocation::base(rotate.buf));
            cmdbuf.patch_address(
                slots.range_base1,
                BufferLocation::new(rotate.buf, rotate.chroma_offset),
            );
        }
        Ok(())
    }
}
