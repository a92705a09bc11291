//! 解码上下文与图生命周期.
//!
//! begin_picture / render / end_picture 三段式: begin 复位逐图状态,
//! render 按记录类型分发, end 负责两遍去块提交与冲刷.
//! 拆分码流 (BEGIN/MID/END) 的命令缓冲跨 render 调用保持挂起,
//! 直到 END 分片收口并提交.

use log::{debug, warn};
use vdx_cmdbuf::{CmdBuf, Slot};
use vdx_core::{
    BufferHandle, BufferLocation, BufferUsage, Rotation, SurfaceId, SurfacePool, VdxError,
    VdxResult,
};

use crate::colocated::ColocatedTable;
use crate::geometry::PictureGeometry;
use crate::host::{DeblockRequest, DecodeHost, SubmitFlags, SubmitRequest};
use crate::params::{
    IqMatrix, PictureParams, Profile, RenderRecord, SliceDataFlag, SliceParams,
};
use crate::refmap;
use crate::regs;
use crate::slice_queue::SliceQueue;

/// 单色图色度平面的中性填充值
pub const CHROMA_NEUTRAL: u8 = 128;

/// 上下文创建配置
#[derive(Clone, Copy, Debug)]
pub struct ContextConfig {
    pub profile: Profile,
    /// 图像宽, 像素
    pub width: u32,
    /// 图像高, 像素
    pub height: u32,
    /// 会话内渲染目标表面数, 决定同位缓冲表容量
    pub num_render_targets: u32,
    /// 硬件是否支持环外去块
    pub out_of_loop_deblock: bool,
    pub rotation: Rotation,
}

/// 去块滤波路径
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeblockMode {
    None,
    /// 标准路径, 硬件在环内去块
    Std,
    /// 环外帧内去块, 经由中间缓冲两遍完成
    IntraOold,
}

/// 缓冲头部的前向保留槽位
pub(crate) struct HeaderSlots {
    pub slice_params: Slot,
    pub first_pic_last: Slot,
    pub range_base0: Slot,
    pub range_base1: Slot,
    pub alt_output_flags: Slot,
}

/// H.264 解码上下文
pub struct DecodeContext {
    pub(crate) config: ContextConfig,

    // 逐图状态
    pub(crate) pic_params: Option<Box<PictureParams>>,
    pub(crate) iq_matrix: Option<Box<IqMatrix>>,
    pub(crate) geometry: Option<PictureGeometry>,
    pub(crate) slice_group_map: Option<BufferHandle>,
    pub(crate) target: Option<SurfaceId>,
    pub(crate) slice_count: u32,
    pub(crate) deblock_mode: DeblockMode,
    pub(crate) long_term_frame_flags: u32,

    // 逐切片状态
    slice_queue: SliceQueue,
    pub(crate) slice0_params: u32,
    pub(crate) slice1_params: u32,
    pub(crate) first_mb_x: u32,
    pub(crate) first_mb_y: u32,

    // 拆分码流状态: 挂起的命令缓冲跨 render 调用存活
    split_pending: bool,
    pending_cmdbuf: Option<CmdBuf>,
    pub(crate) header_slots: Option<HeaderSlots>,

    // 会话级内存块
    pub(crate) vlc_table_buf: BufferHandle,
    pub(crate) preload_buf: BufferHandle,
    pub(crate) reference_cache: BufferHandle,
    pub(crate) colocated: ColocatedTable,
}

impl DecodeContext {
    /// 创建上下文: 校验档次与分辨率, 分配会话内存块并上载熵表
    pub fn new(config: ContextConfig, host: &mut dyn DecodeHost) -> VdxResult<Self> {
        let (max_w, max_h) = config.profile.max_size();
        if config.width > max_w || config.height > max_h {
            return Err(VdxError::Unsupported(format!(
                "{}x{} 超出 {:?} 档次允许的 {}x{}",
                config.width, config.height, config.profile, max_w, max_h
            )));
        }

        let preload_buf = host.create_buffer(regs::PRELOAD_BUFFER_SIZE, BufferUsage::VpuOnly)?;
        let reference_cache =
            host.create_buffer(regs::REFERENCE_CACHE_SIZE, BufferUsage::VpuOnly)?;

        let table = regs::vlc_table_bytes();
        let vlc_table_buf = host.create_buffer(table.len() as u32, BufferUsage::CpuVpu)?;
        host.upload(vlc_table_buf, &table)?;

        debug!(
            "H264: 创建解码上下文, 档次 {:?}, {}x{}, {} 个渲染目标",
            config.profile, config.width, config.height, config.num_render_targets
        );

        Ok(Self {
            colocated: ColocatedTable::new(config.num_render_targets),
            config,
            pic_params: None,
            iq_matrix: None,
            geometry: None,
            slice_group_map: None,
            target: None,
            slice_count: 0,
            deblock_mode: DeblockMode::None,
            long_term_frame_flags: 0,
            slice_queue: SliceQueue::new(),
            slice0_params: 0,
            slice1_params: 0,
            first_mb_x: 0,
            first_mb_y: 0,
            split_pending: false,
            pending_cmdbuf: None,
            header_slots: None,
            vlc_table_buf,
            preload_buf,
            reference_cache,
        })
    }

    /// 开始一张图: 丢弃上一张图的残余记录与挂起的拆分缓冲, 复位切片计数
    pub fn begin_picture(&mut self, target: SurfaceId) {
        if self.split_pending {
            warn!("H264: 上一张图的拆分切片未收口, 丢弃挂起的命令缓冲");
        }
        self.split_pending = false;
        self.pending_cmdbuf = None;
        self.header_slots = None;

        self.pic_params = None;
        self.iq_matrix = None;
        self.geometry = None;
        self.slice_group_map = None;
        self.slice_count = 0;
        self.deblock_mode = DeblockMode::None;
        self.target = Some(target);
    }

    /// 按记录类型分发处理, 首个失败中止本次调用剩余的记录
    pub fn render(
        &mut self,
        host: &mut dyn DecodeHost,
        surfaces: &mut SurfacePool,
        records: Vec<RenderRecord>,
    ) -> VdxResult<()> {
        for record in records {
            match record {
                RenderRecord::PictureParams(params) => {
                    self.process_picture_params(host, surfaces, params)?;
                }
                RenderRecord::IqMatrix(matrix) => {
                    self.iq_matrix = Some(matrix);
                }
                RenderRecord::SliceGroupMap(buffer) => {
                    self.slice_group_map = Some(buffer);
                }
                RenderRecord::SliceParams(elements) => {
                    self.slice_queue.push_record(elements);
                }
                RenderRecord::SliceData { buffer, size } => {
                    self.process_slice_data(host, surfaces, buffer, size)?;
                }
            }
        }
        Ok(())
    }

    /// 结束一张图: 两遍模式先提交硬件去块, 然后冲刷并释放逐图记录
    pub fn end_picture(
        &mut self,
        host: &mut dyn DecodeHost,
        surfaces: &mut SurfacePool,
    ) -> VdxResult<()> {
        let two_pass = self.geometry.as_ref().is_some_and(|g| g.two_pass);
        if two_pass {
            self.submit_two_pass_deblock(host, surfaces)?;
        }

        host.flush()?;

        self.pic_params = None;
        self.iq_matrix = None;
        self.geometry = None;
        Ok(())
    }

    fn process_picture_params(
        &mut self,
        host: &mut dyn DecodeHost,
        surfaces: &mut SurfacePool,
        params: Box<PictureParams>,
    ) -> VdxResult<()> {
        let target = self
            .target
            .ok_or_else(|| VdxError::Protocol("begin_picture 之前收到图参数记录".into()))?;

        let geometry = PictureGeometry::derive(&params, self.config.profile);

        self.long_term_frame_flags = refmap::assign_dpb_indices(surfaces, &params);

        {
            let surface = surfaces
                .get_mut(target)
                .ok_or(VdxError::SurfaceNotFound(target.0))?;
            self.colocated
                .allocate(host, &mut surface.annotation, geometry.colocated_size)?;
            surface.annotation.col_pic_params = geometry.col_pic_params;
            surface.annotation.in_use = true;
        }

        // 单色图: 硬件仍然访问色度平面, 预填中性灰
        if params.chroma_format_idc == 0 {
            host.fill_chroma_neutral(target, CHROMA_NEUTRAL)?;
        }

        debug!(
            "H264: 图参数就绪, {}x{} 宏块, 参考帧 {}, 两遍 {}",
            geometry.width_mb, geometry.height_mb, params.num_ref_frames, geometry.two_pass
        );

        self.geometry = Some(geometry);
        self.pic_params = Some(params);
        Ok(())
    }

    fn process_slice_data(
        &mut self,
        host: &mut dyn DecodeHost,
        surfaces: &mut SurfacePool,
        buffer: BufferHandle,
        size: u32,
    ) -> VdxResult<()> {
        if self.pic_params.is_none() {
            self.slice_queue.take_all();
            return Err(VdxError::MissingPictureParams);
        }
        if size == 0 {
            self.slice_queue.take_all();
            return Err(VdxError::InvalidRecord("切片数据记录长度为 0".into()));
        }

        let queued = self.slice_queue.take_all();
        if queued.is_empty() {
            return Err(VdxError::InvalidRecord(
                "切片数据到达时没有排队的切片参数".into(),
            ));
        }

        for slice in &queued {
            self.process_slice(host, surfaces, slice, buffer)?;
        }
        Ok(())
    }

    fn process_slice(
        &mut self,
        host: &mut dyn DecodeHost,
        surfaces: &mut SurfacePool,
        slice: &SliceParams,
        data_buffer: BufferHandle,
    ) -> VdxResult<()> {
        debug!(
            "H264: 处理切片 {}, 类型 {:?}, 交付 {:?}, {} 字节",
            self.slice_count, slice.slice_type, slice.slice_data_flag, slice.slice_data_size
        );

        let mut cmdbuf = match slice.slice_data_flag {
            SliceDataFlag::Begin | SliceDataFlag::All => {
                if slice.slice_data_size == 0 {
                    return Err(VdxError::InvalidRecord("首段切片数据长度为 0".into()));
                }
                if self.split_pending {
                    return Err(VdxError::Protocol(
                        "上一个拆分切片尚未收口, 不能开始新切片".into(),
                    ));
                }

                self.preprocess_slice(slice)?;

                let mut cmdbuf = CmdBuf::new();
                self.write_fe_state(&mut cmdbuf);
                self.write_vlc_tables(&mut cmdbuf)?;
                cmdbuf.begin_bitstream(
                    BufferLocation::new(data_buffer, slice.slice_data_offset),
                    slice.slice_data_size,
                    slice.slice_data_bit_offset,
                    vdx_cmdbuf::words::DMA_ENABLE_RBDU_EXTRACTION,
                )?;

                if slice.slice_data_flag == SliceDataFlag::Begin {
                    self.split_pending = true;
                }
                cmdbuf
            }
            SliceDataFlag::Mid | SliceDataFlag::End => {
                if !self.split_pending {
                    return Err(VdxError::Protocol(
                        "收到拆分续段, 但没有挂起的拆分切片".into(),
                    ));
                }
                if slice.slice_data_offset != 0 {
                    return Err(VdxError::InvalidRecord("拆分续段的数据偏移必须为 0".into()));
                }
                let mut cmdbuf = self.pending_cmdbuf.take().ok_or_else(|| {
                    VdxError::Internal("拆分状态挂起但命令缓冲缺失".into())
                })?;
                if slice.slice_data_size > 0 {
                    cmdbuf.chain_bitstream(data_buffer, slice.slice_data_size)?;
                }
                cmdbuf
            }
        };

        match slice.slice_data_flag {
            SliceDataFlag::All | SliceDataFlag::End => {
                self.finish_slice(host, surfaces, slice, &mut cmdbuf)?;
                self.split_pending = false;
                self.slice_count += 1;
            }
            SliceDataFlag::Begin | SliceDataFlag::Mid => {
                self.pending_cmdbuf = Some(cmdbuf);
            }
        }
        Ok(())
    }

    fn finish_slice(
        &mut self,
        host: &mut dyn DecodeHost,
        surfaces: &mut SurfacePool,
        slice: &SliceParams,
        cmdbuf: &mut CmdBuf,
    ) -> VdxResult<()> {
        self.build_register(cmdbuf, slice)?;
        self.build_rendec_params(cmdbuf, surfaces, slice)?;
        cmdbuf.write_completion()?;

        let geometry = self
            .geometry
            .as_ref()
            .ok_or(VdxError::MissingPictureParams)?;
        let params = self
            .pic_params
            .as_ref()
            .ok_or(VdxError::MissingPictureParams)?;

        let first_mb = (self.first_mb_y << 8) | self.first_mb_x;
        let last_mb = geometry.last_mb(params.field_pic_flag);
        if let Some(slots) = &self.header_slots {
            cmdbuf.patch(slots.first_pic_last, (first_mb << 16) | last_mb);
        }

        let mut flags = SubmitFlags::empty();
        if self.slice_count == 0 {
            flags |= SubmitFlags::FIRST_SLICE;
        }
        if params.mb_adaptive_frame_field_flag {
            flags |= SubmitFlags::MBAFF;
        }
        if geometry.two_pass {
            flags |= SubmitFlags::TWO_PASS_DEBLOCK;
        }

        let finished = std::mem::take(cmdbuf);
        host.submit(SubmitRequest {
            cmdbuf: finished,
            flags,
            first_mb,
            last_mb,
        })
    }

    fn submit_two_pass_deblock(
        &mut self,
        host: &mut dyn DecodeHost,
        surfaces: &mut SurfacePool,
    ) -> VdxResult<()> {
        let target = self
            .target
            .ok_or_else(|| VdxError::Protocol("end_picture 时没有渲染目标".into()))?;
        let geometry = self
            .geometry
            .as_ref()
            .ok_or(VdxError::MissingPictureParams)?;
        let surface = surfaces
            .get(target)
            .ok_or(VdxError::SurfaceNotFound(target.0))?;
        let colocated_buf = self.colocated.lookup(&surface.annotation);

        let mut rotation_flags = 0;
        let rotate = surface.rotate.as_ref();
        if self.config.rotation != Rotation::None {
            if let Some(rot) = rotate {
                regs::alt_output::ALT_PICTURE_ENABLE.set(&mut rotation_flags, 1);
                regs::alt_output::ROTATION_ROW_STRIDE.set(&mut rotation_flags, rot.stride_mode);
                regs::alt_output::RECON_WRITE_DISABLE.set(&mut rotation_flags, 0);
                regs::alt_output::ROTATION_MODE
                    .set(&mut rotation_flags, rot.rotation.hw_mode());
            } else {
                warn!("H264: 请求了旋转输出但目标表面没有旋转面");
            }
        }

        let mut ext_stride = 0;
        regs::ext_stride::EXT_ROW_STRIDE.set(&mut ext_stride, surface.stride / 64);

        let request = match self.deblock_mode {
            DeblockMode::IntraOold => {
                let source = surface.in_loop_buf.ok_or_else(|| {
                    VdxError::Internal("环外去块路径要求目标表面携带环内缓冲".into())
                })?;
                // 旋转时去块直接写进旋转面
                let (dest, chroma_dst) = match rotate {
                    Some(rot) if self.config.rotation != Rotation::None => {
                        (rot.buf, rot.chroma_offset)
                    }
                    _ => (surface.buf, surface.chroma_offset),
                };
                DeblockRequest {
                    source_buf: source,
                    dest_buf: Some(dest),
                    colocated_buf,
                    picture_width_mb: geometry.width_mb,
                    picture_height_mb: geometry.height_mb,
                    rotation_flags,
                    field_type: geometry.field_type,
                    ext_stride,
                    chroma_offset_src: surface.chroma_offset,
                    chroma_offset_dst: chroma_dst,
                    is_oold: true,
                }
            }
            _ => DeblockRequest {
                source_buf: surface.buf,
                dest_buf: rotate.map(|rot| rot.buf),
                colocated_buf,
                picture_width_mb: geometry.width_mb,
                picture_height_mb: geometry.height_mb,
                rotation_flags,
                field_type: geometry.field_type,
                ext_stride,
                chroma_offset_src: surface.chroma_offset,
                chroma_offset_dst: rotate.map_or(0, |rot| rot.chroma_offset),
                is_oold: false,
            },
        };

        host.submit_deblock(request)
    }

    /// 当前挂起的拆分码流总字节数, 诊断用
    pub fn pending_bitstream_size(&self) -> Option<u32> {
        self.pending_cmdbuf
            .as_ref()
            .and_then(|buf| buf.bitstream())
            .map(|dma| dma.total_size())
    }

    pub fn slice_count(&self) -> u32 {
        self.slice_count
    }
}
