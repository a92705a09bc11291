//! vdx-trace - 命令流装配追踪工具
//!
//! 用进程内的记录宿主跑一遍 begin/render/end 流程, 把装配出来的
//! 命令缓冲按字转储, 方便离线核对寄存器块与 rendec 段的形状.

use anyhow::{bail, Context};
use clap::Parser;
use std::process;

use vdx_core::{
    BufferHandle, BufferUsage, Surface, SurfaceId, SurfacePool, Rotation, VdxResult,
};
use vdx_h264::{
    ContextConfig, DecodeContext, DecodeHost, DeblockRequest, PicFlags, PictureParams,
    PictureRef, Profile, RenderRecord, SliceDataFlag, SliceParams, SliceType, SubmitRequest,
};

/// vdx 命令流追踪工具
#[derive(Parser, Debug)]
#[command(name = "vdx-trace", version, about = "H.264 命令流装配追踪")]
struct Cli {
    /// 图像宽, 像素
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// 图像高, 像素
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// 档次: baseline / main / high
    #[arg(long, default_value = "high")]
    profile: String,

    /// 装配一个 B 切片而非 P 切片
    #[arg(long)]
    b_slice: bool,

    /// 演示 BEGIN/MID/END 拆分码流
    #[arg(long)]
    split: bool,

    /// 每行转储的字数
    #[arg(long, default_value_t = 8)]
    words_per_line: usize,
}

// ============================================================
// 记录宿主: 把提交的命令缓冲留在内存里
// ============================================================

#[derive(Default)]
struct RecordingHost {
    next_buffer: u32,
    submissions: Vec<SubmitRequest>,
    deblocks: Vec<DeblockRequest>,
}

impl DecodeHost for RecordingHost {
    fn create_buffer(&mut self, size: u32, _usage: BufferUsage) -> VdxResult<BufferHandle> {
        self.next_buffer += 1;
        log::debug!("trace: 分配内存块 #{} ({} 字节)", self.next_buffer, size);
        Ok(BufferHandle(self.next_buffer))
    }

    fn upload(&mut self, _buffer: BufferHandle, data: &[u8]) -> VdxResult<()> {
        log::debug!("trace: 上载 {} 字节", data.len());
        Ok(())
    }

    fn fill_chroma_neutral(&mut self, _surface: SurfaceId, _value: u8) -> VdxResult<()> {
        Ok(())
    }

    fn submit(&mut self, request: SubmitRequest) -> VdxResult<()> {
        self.submissions.push(request);
        Ok(())
    }

    fn submit_deblock(&mut self, request: DeblockRequest) -> VdxResult<()> {
        self.deblocks.push(request);
        Ok(())
    }

    fn flush(&mut self) -> VdxResult<()> {
        Ok(())
    }
}

fn parse_profile(name: &str) -> anyhow::Result<Profile> {
    match name {
        "baseline" => Ok(Profile::Baseline),
        "main" => Ok(Profile::Main),
        "high" => Ok(Profile::High),
        other => bail!("未知档次: {other}"),
    }
}

fn synth_picture_params(cli: &Cli, target: SurfaceId, reference: SurfaceId) -> PictureParams {
    let width_mb = cli.width.div_ceil(16);
    let height_mb = cli.height.div_ceil(16);
    PictureParams {
        curr_pic: PictureRef {
            surface: target,
            flags: PicFlags::SHORT_TERM_REFERENCE,
            frame_idx: 1,
            top_poc: 4,
            bottom_poc: 5,
        },
        reference_frames: vec![PictureRef {
            surface: reference,
            flags: PicFlags::SHORT_TERM_REFERENCE,
            frame_idx: 0,
            top_poc: 0,
            bottom_poc: 1,
        }],
        num_ref_frames: 1,
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

fn synth_slice(cli: &Cli, reference: SurfaceId, flag: SliceDataFlag, size: u32) -> SliceParams {
    let reference = PictureRef {
        surface: reference,
        flags: PicFlags::SHORT_TERM_REFERENCE,
        frame_idx: 0,
        top_poc: 0,
        bottom_poc: 1,
    };
    SliceParams {
        slice_data_size: size,
        slice_data_bit_offset: 8,
        slice_data_flag: flag,
        slice_type: if cli.b_slice { SliceType::B } else { SliceType::P },
        ref_pic_list0: vec![reference],
        ref_pic_list1: if cli.b_slice { vec![reference] } else { Vec::new() },
        ..SliceParams::default()
    }
}

fn dump(request: &SubmitRequest, words_per_line: usize) {
    println!(
        "== 提交: {} 字, {} 个重定位, 标志 {:?}, 首宏块 {:#06x}, 末宏块 {:#06x}",
        request.cmdbuf.words().len(),
        request.cmdbuf.relocs().len(),
        request.flags,
        request.first_mb,
        request.last_mb,
    );
    for (row, chunk) in request.cmdbuf.words().chunks(words_per_line).enumerate() {
        print!("{:08x}:", row * words_per_line * 4);
        for word in chunk {
            print!(" {word:08x}");
        }
        println!();
    }
    if let Some(dma) = request.cmdbuf.bitstream() {
        println!(
            "-- 码流链: {} 个分片, 共 {} 字节, 位偏移 {}",
            dma.descriptors.len(),
            dma.total_size(),
            dma.bit_offset,
        );
    }
    for reloc in request.cmdbuf.relocs() {
        println!(
            "-- 重定位: 字 {} -> 内存块 #{} + {:#x}",
            reloc.word_index, reloc.location.buffer.0, reloc.location.offset
        );
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let profile = parse_profile(&cli.profile)?;
    let mut host = RecordingHost::default();

    let config = ContextConfig {
        profile,
        width: cli.width,
        height: cli.height,
        num_render_targets: 4,
        out_of_loop_deblock: false,
        rotation: Rotation::None,
    };
    let mut ctx = DecodeContext::new(config, &mut host).context("创建解码上下文失败")?;

    let mut surfaces = SurfacePool::new();
    let target = SurfaceId(1);
    let reference = SurfaceId(2);
    let chroma_offset = cli.width * cli.height;
    surfaces.insert(target, Surface::new(BufferHandle(100), chroma_offset, cli.width));
    surfaces.insert(reference, Surface::new(BufferHandle(101), chroma_offset, cli.width));

    let data_buf = BufferHandle(200);
    ctx.begin_picture(target);

    let params = synth_picture_params(cli, target, reference);
    let mut records = vec![RenderRecord::PictureParams(Box::new(params))];

    if cli.split {
        records.push(RenderRecord::SliceParams(vec![synth_slice(
            cli,
            reference,
            SliceDataFlag::Begin,
            100,
        )]));
        records.push(RenderRecord::SliceData { buffer: data_buf, size: 100 });
        records.push(RenderRecord::SliceParams(vec![synth_slice(
            cli,
            reference,
            SliceDataFlag::Mid,
            50,
        )]));
        records.push(RenderRecord::SliceData { buffer: data_buf, size: 50 });
        records.push(RenderRecord::SliceParams(vec![synth_slice(
            cli,
            reference,
            SliceDataFlag::End,
            0,
        )]));
        records.push(RenderRecord::SliceData { buffer: data_buf, size: 1 });
    } else {
        records.push(RenderRecord::SliceParams(vec![synth_slice(
            cli,
            reference,
            SliceDataFlag::All,
            4096,
        )]));
        records.push(RenderRecord::SliceData { buffer: data_buf, size: 4096 });
    }

    ctx.render(&mut host, &mut surfaces, records)
        .context("装配命令流失败")?;
    ctx.end_picture(&mut host, &mut surfaces)
        .context("结束图失败")?;

    for request in &host.submissions {
        dump(request, cli.words_per_line);
    }
    println!(
        "共 {} 次提交, {} 次去块提交",
        host.submissions.len(),
        host.deblocks.len()
    );
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("vdx-trace: {err:#}");
        process::exit(1);
    }
}
