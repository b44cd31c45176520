//! 位宽计算与 MSB-first 位流读写
//!
//! 所有打包值按“高位在前”写入一个大端位流：第 `p` 个比特位于
//! 字节 `p / 8` 的第 `7 - p % 8` 位。

use crate::common::{Result, SegmentError};

/// 单个值允许的最大位宽
pub const MAX_BITS: u32 = 32;

/// 寻址 `cardinality` 个字典 ID 所需的最少比特数。
///
/// 基数 0 / 1（常量列）同样占 1 bit，读写两端一致使用该约定。
pub fn bits_needed(cardinality: u32) -> u32 {
    if cardinality <= 1 {
        1
    } else {
        32 - (cardinality - 1).leading_zeros()
    }
}

pub(crate) fn check_bit_width(bits: u32) -> Result<()> {
    if bits == 0 || bits > MAX_BITS {
        return Err(SegmentError::InvalidBitWidth(bits));
    }
    Ok(())
}

/// `num_values` 个 `bits` 宽的值所需的字节数
pub fn packed_len(num_values: usize, bits: u32) -> usize {
    (num_values * bits as usize).div_ceil(8)
}

/// 在 `bit_offset` 处写入 `value` 的低 `bits` 位（先清零再写）
pub(crate) fn write_bits(buf: &mut [u8], bit_offset: usize, bits: u32, value: u32) {
    let mut remaining = bits as usize;
    let mut pos       = bit_offset;
    while remaining > 0 {
        let byte_idx = pos / 8;
        let bit_in   = pos % 8;
        let take     = (8 - bit_in).min(remaining);
        let shift    = 8 - bit_in - take;
        let mask     = (((1u16 << take) - 1) as u8) << shift;
        let chunk    = ((value >> (remaining - take)) as u8) & (((1u16 << take) - 1) as u8);
        buf[byte_idx] = (buf[byte_idx] & !mask) | (chunk << shift);
        remaining -= take;
        pos       += take;
    }
}

// ── 解码上下文 ────────────────────────────────────────────────────────────────

/// 调用方持有的位读取缓存：保存最近加载的 64-bit 窗口，
/// 顺序或局部随机访问时相邻值可直接从窗口取出。
///
/// 不持有底层缓冲区，只缓存位置；不得跨线程共享。
#[derive(Debug, Clone, Default)]
pub struct BitReadContext {
    /// 窗口首字节在缓冲区中的位置
    window_start: usize,
    /// 窗口中有效字节数（0 表示尚未加载）
    window_len:   usize,
    /// 左对齐的大端窗口
    window:       u64,
    reloads:      u64,
}

impl BitReadContext {
    pub fn new() -> Self { Self::default() }

    /// 窗口重新加载次数
    pub fn reloads(&self) -> u64 { self.reloads }

    fn load(&mut self, buf: &[u8], start: usize) {
        let len = (buf.len() - start).min(8);
        let mut word = [0u8; 8];
        word[..len].copy_from_slice(&buf[start..start + len]);
        self.window       = u64::from_be_bytes(word);
        self.window_start = start;
        self.window_len   = len;
        self.reloads     += 1;
    }
}

/// 从 `bit_offset` 读出 `bits` 位宽的值（`bits` 须在 1..=32）
pub(crate) fn read_bits(buf: &[u8], bit_offset: usize, bits: u32, ctx: &mut BitReadContext) -> u32 {
    let start_byte = bit_offset / 8;
    let bit_in     = bit_offset % 8;
    let end_byte   = (bit_offset + bits as usize).div_ceil(8);

    let cached = ctx.window_len > 0
        && start_byte >= ctx.window_start
        && end_byte <= ctx.window_start + ctx.window_len;
    if !cached {
        ctx.load(buf, start_byte);
    }
    let skip = (start_byte - ctx.window_start) * 8 + bit_in;
    ((ctx.window << skip) >> (64 - bits)) as u32
}
