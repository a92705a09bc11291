//! 参考索引映射: DPB 槽位分配, 索引打包与列表求逆.
//!
//! 硬件以 DPB 槽位号寻址参考帧, 而参数记录携带的是表面 id,
//! 这里负责两者之间的换算. 槽位号是逐图易变状态, 挂在表面标注上.

use log::{error, warn};
use vdx_core::SurfacePool;

use crate::params::{PicFlags, PictureParams, PictureRef};

/// 参考列表活动条数的硬件上限 (32 条, minus1 形式)
pub const MAX_REF_IDX_ACTIVE_MINUS1: u32 = 31;

/// 缺席条目的索引编码
pub const ABSENT_INDEX: u8 = 0xff;

/// 把活动条数 minus1 收敛到硬件上限, 超界只告警不报错
pub fn clamp_active_minus1(value: u32, list: &str) -> u32 {
    if value > MAX_REF_IDX_ACTIVE_MINUS1 {
        warn!(
            "H264: {} 活动条数 minus1 = {} 超出硬件上限, 收敛到 {}",
            list, value, MAX_REF_IDX_ACTIVE_MINUS1
        );
        MAX_REF_IDX_ACTIVE_MINUS1
    } else {
        value
    }
}

/// 自高向低遍历参考帧表, 给可解析的表面分配 DPB 槽位.
///
/// 同一表面出现多次时, 低位覆盖高位, 最终落在最低的那个槽位.
/// 返回按槽位号排布的长期参考位图.
pub fn assign_dpb_indices(surfaces: &mut SurfacePool, params: &PictureParams) -> u32 {
    let mut n = (params.num_ref_frames as usize).min(params.reference_frames.len());
    if n > 16 {
        error!("H264: 参考帧数 {} 超出 DPB 的 16 个槽位, 截断", n);
        n = 16;
    }
    let mut long_term_flags = 0u32;
    for i in (0..n).rev() {
        let entry = &params.reference_frames[i];
        if entry.flags.contains(PicFlags::LONG_TERM_REFERENCE) {
            long_term_flags |= 1 << i;
        }
        if let Some(surface) = surfaces.get_mut(entry.surface) {
            surface.annotation.dpb_idx = Some(i as u8);
        }
    }
    long_term_flags
}

/// 把一个参考图描述编码成硬件索引: 低 4 位 DPB 槽位, 第 7 位底场, 缺席 0xff
pub fn picture_to_index(surfaces: &SurfacePool, pic: &PictureRef) -> u8 {
    let mut result = ABSENT_INDEX;
    if !pic.flags.contains(PicFlags::INVALID) {
        if let Some(surface) = surfaces.get(pic.surface) {
            if let Some(idx) = surface.annotation.dpb_idx {
                result = idx & 0x0f;
            }
        }
    }
    if result != ABSENT_INDEX && pic.flags.contains(PicFlags::BOTTOM_FIELD) {
        result |= 0x80;
    }
    result
}

/// 把参考列表按硬件索引打包, 每字 4 条小端排列
pub fn pack_index_words(surfaces: &SurfacePool, list: &[PictureRef], active_minus1: u32) -> Vec<u32> {
    let count = active_minus1 as usize + 1;
    let mut words = Vec::with_capacity(count.div_ceil(4));
    let mut i = 0;
    while i < count {
        let mut word = 0u32;
        for lane in 0..4 {
            let index = match list.get(i + lane) {
                Some(pic) => picture_to_index(surfaces, pic),
                None => ABSENT_INDEX,
            };
            word |= (index as u32) << (8 * lane);
        }
        words.push(word);
        i += 4;
    }
    words
}

/// 求 list0 的逆映射: 以 DPB 槽位 (底场加 0x10) 为键, 值为列表位置.
///
/// 未覆盖的键保持 0xff.
pub fn inverse_list0(surfaces: &SurfacePool, list0: &[PictureRef], active_minus1: u32) -> [u8; 32] {
    let mut inverse = [ABSENT_INDEX; 32];
    let count = (clamp_active_minus1(active_minus1, "list0") as usize + 1).min(list0.len());
    for i in (0..count).rev() {
        let pic = &list0[i];
        if pic.flags.contains(PicFlags::INVALID) {
            continue;
        }
        let Some(surface) = surfaces.get(pic.surface) else {
            continue;
        };
        let Some(dpb_idx) = surface.annotation.dpb_idx else {
            continue;
        };
        if dpb_idx < 16 {
            let mut key = dpb_idx as usize;
            if pic.flags.contains(PicFlags::BOTTOM_FIELD) {
                key |= 0x10;
            }
            inverse[key] = i as u8;
        }
    }
    inverse
}
