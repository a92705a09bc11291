//! H.264 命令流装配全流程测试.
//!
//! 用记录宿主跑 begin/render/end, 校验提交的命令缓冲形状:
//! 头部槽位回填, rendec 段哨兵值, 拆分码流链与两遍去块提交.

use vdx::core::{
    BufferHandle, BufferUsage, Rotation, Surface, SurfaceId, SurfacePool, VdxError, VdxResult,
};
use vdx::h264::{
    ContextConfig, DeblockRequest, DecodeContext, DecodeHost, PicFlags, PictureParams,
    PictureRef, Profile, RenderRecord, SliceDataFlag, SliceParams, SliceType, SubmitFlags,
    SubmitRequest,
};

// ============================================================
// 记录宿主
// ============================================================

#[derive(Default)]
struct MockHost {
    next_buffer: u32,
    uploads: Vec<(BufferHandle, usize)>,
    submissions: Vec<SubmitRequest>,
    deblocks: Vec<DeblockRequest>,
    flushes: u32,
}

impl DecodeHost for MockHost {
    fn create_buffer(&mut self, _size: u32, _usage: BufferUsage) -> VdxResult<BufferHandle> {
        self.next_buffer += 1;
        Ok(BufferHandle(self.next_buffer))
    }
    fn upload(&mut self, buffer: BufferHandle, data: &[u8]) -> VdxResult<()> {
        self.uploads.push((buffer, data.len()));
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
        self.flushes += 1;
        Ok(())
    }
}

const CMD_HEADER: u32 = 0x7000_0000;
const CMD_COMPLETION: u32 = 0x6000_0000;
const SENTINEL: u32 = 0xdead_beef;

const TARGET: SurfaceId = SurfaceId(1);
const REF_A: SurfaceId = SurfaceId(2);
const REF_B: SurfaceId = SurfaceId(3);
const DATA_BUF: BufferHandle = BufferHandle(900);

fn setup(profile: Profile) -> (DecodeContext, MockHost, SurfacePool) {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut host = MockHost::default();
    let config = ContextConfig {
        profile,
        width: 1280,
        height: 720,
        num_render_targets: 4,
        out_of_loop_deblock: false,
        rotation: Rotation::None,
    };
    let ctx = DecodeContext::new(config, &mut host).expect("创建上下文");

    let mut surfaces = SurfacePool::new();
    for (id, buf) in [(TARGET, 100), (REF_A, 101), (REF_B, 102)] {
        surfaces.insert(id, Surface::new(BufferHandle(buf), 1280 * 720, 1280));
    }
    (ctx, host, surfaces)
}

fn reference(id: SurfaceId, top_poc: i32, bottom_poc: i32) -> PictureRef {
    PictureRef {
        surface: id,
        flags: PicFlags::SHORT_TERM_REFERENCE,
        frame_idx: 0,
        top_poc,
        bottom_poc,
    }
}

fn picture_params(refs: Vec<PictureRef>) -> PictureParams {
    PictureParams {
        curr_pic: PictureRef {
            surface: TARGET,
            flags: PicFlags::SHORT_TERM_REFERENCE,
            frame_idx: 9,
            top_poc: 8,
            bottom_poc: 9,
        },
        num_ref_frames: refs.len() as u32,
        reference_frames: refs,
        picture_width_in_mbs_minus1: 79,
        picture_height_in_mbs_minus1: 44,
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

fn slice(slice_type: SliceType, flag: SliceDataFlag, size: u32) -> SliceParams {
    SliceParams {
        slice_data_size: size,
        slice_data_bit_offset: 8,
        slice_data_flag: flag,
        slice_type,
        ref_pic_list0: vec![reference(REF_A, 0, 1)],
        ref_pic_list1: if slice_type == SliceType::B {
            vec![reference(REF_A, 0, 1)]
        } else {
            Vec::new()
        },
        ..SliceParams::default()
    }
}

#[test]
fn test_p_frame_single_submission() {
    let (mut ctx, mut host, mut surfaces) = setup(Profile::High);

    ctx.begin_picture(TARGET);
    ctx.render(
        &mut host,
        &mut surfaces,
        vec![
            RenderRecord::PictureParams(Box::new(picture_params(vec![reference(REF_A, 0, 1)]))),
            RenderRecord::SliceParams(vec![slice(SliceType::P, SliceDataFlag::All, 4096)]),
            RenderRecord::SliceData { buffer: DATA_BUF, size: 4096 },
        ],
    )
    .expect("渲染");
    ctx.end_picture(&mut host, &mut surfaces).expect("结束图");

    assert_eq!(host.submissions.len(), 1, "一个 ALL 切片恰好一次提交");
    assert_eq!(host.flushes, 1);

    let request = &host.submissions[0];
    let request_words = request.cmdbuf.words();
    assert_eq!(request_words[0], CMD_HEADER, "缓冲以命令头开始");
    assert_eq!(*request_words.last().unwrap(), CMD_COMPLETION, "缓冲以完成标记收尾");
    assert!(request.flags.contains(SubmitFlags::FIRST_SLICE), "首切片标志");
    assert!(!request.flags.contains(SubmitFlags::TWO_PASS_DEBLOCK));

    // 首宏块 (0,0), 末宏块 (44,79)
    assert_eq!(request.first_mb, 0);
    assert_eq!(request.last_mb, (44 << 8) | 79);
    // 头部槽位已回填首末宏块字
    assert!(
        request_words.contains(&((request.first_mb << 16) | request.last_mb)),
        "首末宏块字拍进头部槽位"
    );

    let dma = request.cmdbuf.bitstream().expect("码流 DMA");
    assert_eq!(dma.total_size(), 4096);
    assert_eq!(dma.bit_offset, 8);
}

#[test]
fn test_unused_dpb_slot_gets_sentinel() {
    let (mut ctx, mut host, mut surfaces) = setup(Profile::High);

    // 两个参考帧, list0 只引用第一个, 第二个槽位应得哨兵值
    ctx.begin_picture(TARGET);
    ctx.render(
        &mut host,
        &mut surfaces,
        vec![
            RenderRecord::PictureParams(Box::new(picture_params(vec![
                reference(REF_A, 0, 1),
                reference(REF_B, 2, 3),
            ]))),
            RenderRecord::SliceParams(vec![slice(SliceType::P, SliceDataFlag::All, 1024)]),
            RenderRecord::SliceData { buffer: DATA_BUF, size: 1024 },
        ],
    )
    .expect("渲染");

    let request_words = host.submissions[0].cmdbuf.words();
    let sentinels = request_words.iter().filter(|w| **w == SENTINEL).count();
    assert!(sentinels >= 2, "未使用槽位的亮度与色度基址都写哨兵值");
}

#[test]
fn test_b_slice_missing_colocated_surface() {
    let (mut ctx, mut host, mut surfaces) = setup(Profile::High);

    let mut b_slice = slice(SliceType::B, SliceDataFlag::All, 1024);
    // 同位表面不在表面池里
    b_slice.ref_pic_list1 = vec![reference(SurfaceId(77), 0, 1)];

    ctx.begin_picture(TARGET);
    ctx.render(
        &mut host,
        &mut surfaces,
        vec![
            RenderRecord::PictureParams(Box::new(picture_params(vec![reference(REF_A, 0, 1)]))),
            RenderRecord::SliceParams(vec![b_slice]),
            RenderRecord::SliceData { buffer: DATA_BUF, size: 1024 },
        ],
    )
    .expect("同位表面缺席不是致命错误");

    let request_words = host.submissions[0].cmdbuf.words();
    assert!(
        request_words.contains(&SENTINEL),
        "缺席的同位表面写 0 加哨兵值"
    );
}

#[test]
fn test_split_buffer_chain() {
    let (mut ctx, mut host, mut surfaces) = setup(Profile::High);

    ctx.begin_picture(TARGET);
    ctx.render(
        &mut host,
        &mut surfaces,
        vec![
            RenderRecord::PictureParams(Box::new(picture_params(vec![reference(REF_A, 0, 1)]))),
            RenderRecord::SliceParams(vec![slice(SliceType::P, SliceDataFlag::Begin, 100)]),
            RenderRecord::SliceData { buffer: DATA_BUF, size: 100 },
        ],
    )
    .expect("BEGIN 分片");
    assert!(host.submissions.is_empty(), "BEGIN 之后缓冲保持挂起");
    assert_eq!(ctx.pending_bitstream_size(), Some(100));

    ctx.render(
        &mut host,
        &mut surfaces,
        vec![
            RenderRecord::SliceParams(vec![slice(SliceType::P, SliceDataFlag::Mid, 50)]),
            RenderRecord::SliceData { buffer: DATA_BUF, size: 50 },
        ],
    )
    .expect("MID 分片");
    assert!(host.submissions.is_empty(), "MID 之后仍然挂起");
    assert_eq!(ctx.pending_bitstream_size(), Some(150), "链上累计 150 字节");

    ctx.render(
        &mut host,
        &mut surfaces,
        vec![
            RenderRecord::SliceParams(vec![slice(SliceType::P, SliceDataFlag::End, 0)]),
            RenderRecord::SliceData { buffer: DATA_BUF, size: 4 },
        ],
    )
    .expect("END 分片");
    ctx.end_picture(&mut host, &mut surfaces).expect("结束图");

    assert_eq!(host.submissions.len(), 1, "三段拆分只产生一次提交");
    let dma = host.submissions[0].cmdbuf.bitstream().expect("码流 DMA");
    assert_eq!(dma.descriptors.len(), 2, "END 零长分片不追加描述符");
    assert_eq!(dma.total_size(), 150, "逻辑传输共 150 字节");
    assert_eq!(ctx.slice_count(), 1);
}

#[test]
fn test_abandoned_split_slice_does_not_wedge_next_picture() {
    let (mut ctx, mut host, mut surfaces) = setup(Profile::High);

    // 第一张图在 BEGIN 分片之后被放弃, END 永不到达
    ctx.begin_picture(TARGET);
    ctx.render(
        &mut host,
        &mut surfaces,
        vec![
            RenderRecord::PictureParams(Box::new(picture_params(vec![reference(REF_A, 0, 1)]))),
            RenderRecord::SliceParams(vec![slice(SliceType::P, SliceDataFlag::Begin, 100)]),
            RenderRecord::SliceData { buffer: DATA_BUF, size: 100 },
        ],
    )
    .expect("BEGIN 分片");
    assert_eq!(ctx.pending_bitstream_size(), Some(100));

    // 新图开始时挂起的拆分缓冲被丢弃, 上下文保持可用
    ctx.begin_picture(TARGET);
    assert_eq!(ctx.pending_bitstream_size(), None, "挂起的拆分缓冲随旧图丢弃");

    ctx.render(
        &mut host,
        &mut surfaces,
        vec![
            RenderRecord::PictureParams(Box::new(picture_params(vec![reference(REF_A, 0, 1)]))),
            RenderRecord::SliceParams(vec![slice(SliceType::P, SliceDataFlag::All, 512)]),
            RenderRecord::SliceData { buffer: DATA_BUF, size: 512 },
        ],
    )
    .expect("新图的 ALL 切片不受旧图拆分状态影响");
    ctx.end_picture(&mut host, &mut surfaces).expect("结束图");

    assert_eq!(host.submissions.len(), 1, "只有新图的切片被提交");
    let dma = host.submissions[0].cmdbuf.bitstream().expect("码流 DMA");
    assert_eq!(dma.total_size(), 512);
}

#[test]
fn test_mid_without_begin_is_protocol_error() {
    let (mut ctx, mut host, mut surfaces) = setup(Profile::High);

    ctx.begin_picture(TARGET);
    let err = ctx
        .render(
            &mut host,
            &mut surfaces,
            vec![
                RenderRecord::PictureParams(Box::new(picture_params(vec![reference(
                    REF_A, 0, 1,
                )]))),
                RenderRecord::SliceParams(vec![slice(SliceType::P, SliceDataFlag::Mid, 50)]),
                RenderRecord::SliceData { buffer: DATA_BUF, size: 50 },
            ],
        )
        .expect_err("没有 BEGIN 的 MID 必须被拒绝");
    assert!(matches!(err, VdxError::Protocol(_)), "拆分误用报协议违例");
    assert!(host.submissions.is_empty());
}

#[test]
fn test_slice_data_without_params_is_rejected() {
    let (mut ctx, mut host, mut surfaces) = setup(Profile::High);

    ctx.begin_picture(TARGET);
    let err = ctx
        .render(
            &mut host,
            &mut surfaces,
            vec![
                RenderRecord::PictureParams(Box::new(picture_params(vec![]))),
                RenderRecord::SliceData { buffer: DATA_BUF, size: 64 },
            ],
        )
        .expect_err("没有排队切片参数的切片数据必须被拒绝");
    assert!(matches!(err, VdxError::InvalidRecord(_)));
}

#[test]
fn test_missing_picture_params_is_fatal_for_picture() {
    let (mut ctx, mut host, mut surfaces) = setup(Profile::High);

    ctx.begin_picture(TARGET);
    let err = ctx
        .render(
            &mut host,
            &mut surfaces,
            vec![
                RenderRecord::SliceParams(vec![slice(SliceType::P, SliceDataFlag::All, 64)]),
                RenderRecord::SliceData { buffer: DATA_BUF, size: 64 },
            ],
        )
        .expect_err("缺图参数");
    assert!(matches!(err, VdxError::MissingPictureParams));
}

#[test]
fn test_two_pass_picture_submits_deblock() {
    let (mut ctx, mut host, mut surfaces) = setup(Profile::High);

    let mut params = picture_params(vec![reference(REF_A, 0, 1)]);
    // 多切片组且非 MBAFF: 宏块序不连续, 两遍处理
    params.num_slice_groups_minus1 = 1;

    ctx.begin_picture(TARGET);
    ctx.render(
        &mut host,
        &mut surfaces,
        vec![
            RenderRecord::PictureParams(Box::new(params)),
            RenderRecord::SliceGroupMap(BufferHandle(500)),
            RenderRecord::SliceParams(vec![slice(SliceType::P, SliceDataFlag::All, 1024)]),
            RenderRecord::SliceData { buffer: DATA_BUF, size: 1024 },
        ],
    )
    .expect("渲染");
    ctx.end_picture(&mut host, &mut surfaces).expect("结束图");

    assert!(
        host.submissions[0].flags.contains(SubmitFlags::TWO_PASS_DEBLOCK),
        "提交标志携带两遍去块"
    );
    assert_eq!(host.deblocks.len(), 1, "end_picture 补一次硬件去块提交");
    let deblock = &host.deblocks[0];
    assert_eq!(deblock.picture_width_mb, 80);
    assert_eq!(deblock.picture_height_mb, 45);
    assert!(!deblock.is_oold, "无环外能力时走标准去块路径");
}

#[test]
fn test_colocated_allocation_is_stable_across_pictures() {
    let (mut ctx, mut host, mut surfaces) = setup(Profile::High);

    for _ in 0..3 {
        ctx.begin_picture(TARGET);
        ctx.render(
            &mut host,
            &mut surfaces,
            vec![
                RenderRecord::PictureParams(Box::new(picture_params(vec![reference(
                    REF_A, 0, 1,
                )]))),
                RenderRecord::SliceParams(vec![slice(SliceType::P, SliceDataFlag::All, 256)]),
                RenderRecord::SliceData { buffer: DATA_BUF, size: 256 },
            ],
        )
        .expect("渲染");
        ctx.end_picture(&mut host, &mut surfaces).expect("结束图");
    }

    let annotation = &surfaces.get(TARGET).unwrap().annotation;
    assert_eq!(
        annotation.colocated_index,
        Some(1),
        "同一目标表面跨图复用同一个同位缓冲槽位"
    );
    assert_eq!(host.submissions.len(), 3);
}

#[test]
fn test_resolution_limit_per_profile() {
    let mut host = MockHost::default();
    let config = ContextConfig {
        profile: Profile::Baseline,
        width: 1280,
        height: 720,
        num_render_targets: 2,
        out_of_loop_deblock: false,
        rotation: Rotation::None,
    };
    match DecodeContext::new(config, &mut host) {
        Err(err) => {
            assert!(matches!(err, VdxError::Unsupported(_)), "720x576 是基线档次上限")
        }
        Ok(_) => panic!("基线档次超分辨率必须被拒绝"),
    }
}

#[test]
fn test_vlc_table_uploaded_once_at_creation() {
    let (_ctx, host, _surfaces) = setup(Profile::High);
    assert_eq!(host.uploads.len(), 1, "熵表在创建时一次性上载");
    assert_eq!(host.uploads[0].1, 1040, "520 条 16 位表项");
}
