//! 多值定宽位打包正排索引
//!
//! 偏移区记录每个 doc 的累计起始位置，因此写入必须按 doc_id 递增追加。

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::bits::{check_bit_width, packed_len, read_bits, write_bits, BitReadContext};
use crate::common::{verify_file, write_with_crc, DocId, Result, SegmentError, FORMAT_VERSION};
use crate::packed::{check_doc, check_value};

pub const MAGIC: &[u8; 8] = b"OLAPFWMV";
const HEADER_LEN: usize   = 28;

// ── FixedBitMultiValueWriter ──────────────────────────────────────────────────

pub struct FixedBitMultiValueWriter {
    num_docs:           u32,
    bits:               u32,
    /// 声明的总值数，数据区按此预分配
    capacity:           u32,
    /// offsets[d] = doc d 的起始值序号；len - 1 = 已写入 doc 数
    offsets:            Vec<u32>,
    data:               Vec<u8>,
    max_values_per_doc: u32,
}

impl FixedBitMultiValueWriter {
    pub fn new(num_docs: u32, total_values: u32, bits: u32) -> Result<Self> {
        check_bit_width(bits)?;
        let mut offsets = Vec::with_capacity(num_docs as usize + 1);
        offsets.push(0);
        Ok(Self {
            num_docs, bits,
            capacity: total_values,
            offsets,
            data: vec![0u8; packed_len(total_values as usize, bits)],
            max_values_per_doc: 0,
        })
    }

    pub fn bits_per_value(&self) -> u32 { self.bits }

    /// 下一个允许写入的最小 doc_id
    pub fn next_doc_id(&self) -> DocId {
        (self.offsets.len() - 1) as DocId
    }

    fn written_values(&self) -> u32 {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// 追加 doc 的值序列；跳过的 doc 记为空
    pub fn set_values(&mut self, doc_id: DocId, values: &[u32]) -> Result<()> {
        check_doc(doc_id, self.num_docs)?;
        let next_doc_id = self.next_doc_id();
        if doc_id < next_doc_id {
            return Err(SegmentError::OutOfOrderWrite { doc_id, next_doc_id });
        }
        let start = self.written_values();
        let end   = start as usize + values.len();
        if end > self.capacity as usize {
            return Err(SegmentError::CapacityMismatch {
                doc_id,
                found: end,
                max:   self.capacity as usize,
            });
        }
        for &v in values {
            check_value(doc_id, v, self.bits)?;
        }

        while self.next_doc_id() < doc_id {
            self.offsets.push(start);
        }
        for (i, &v) in values.iter().enumerate() {
            write_bits(&mut self.data, (start as usize + i) * self.bits as usize, self.bits, v);
        }
        self.offsets.push(end as u32);
        self.max_values_per_doc = self.max_values_per_doc.max(values.len() as u32);
        Ok(())
    }

    /// 序列化为文件字节；未写入的尾部 doc 记为空，返回总字节数
    pub fn finish<W: Write>(mut self, writer: W) -> Result<u64> {
        let total = self.written_values();
        while self.offsets.len() <= self.num_docs as usize {
            self.offsets.push(total);
        }
        self.data.truncate(packed_len(total as usize, self.bits));

        let mut body = Vec::with_capacity(HEADER_LEN + self.offsets.len() * 4 + self.data.len());
        body.extend_from_slice(MAGIC);
        body.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        body.write_u32::<LittleEndian>(self.num_docs)?;
        body.write_u32::<LittleEndian>(total)?;
        body.write_u32::<LittleEndian>(self.max_values_per_doc)?;
        body.write_u32::<LittleEndian>(self.bits)?;
        for &off in &self.offsets {
            body.write_u32::<LittleEndian>(off)?;
        }
        body.extend_from_slice(&self.data);
        write_with_crc(writer, &body)
    }
}

// ── MultiValueContext ─────────────────────────────────────────────────────────

/// 多值读取上下文：位窗口缓存 + 上一个 doc 的结束偏移，
/// 顺序扫描时每个 doc 只需读一次偏移。
#[derive(Debug, Clone, Default)]
pub struct MultiValueContext {
    bits:       BitReadContext,
    next_doc:   DocId,
    next_start: u32,
}

impl MultiValueContext {
    pub fn bit_context(&self) -> &BitReadContext { &self.bits }
}

// ── FixedBitMultiValueReader ──────────────────────────────────────────────────

pub struct FixedBitMultiValueReader<B> {
    buf:                B,
    num_docs:           u32,
    total_values:       u32,
    max_values_per_doc: u32,
    bits:               u32,
    data_start:         usize,
}

impl<B: AsRef<[u8]>> FixedBitMultiValueReader<B> {
    pub fn open(buf: B) -> Result<Self> {
        let body               = verify_file(buf.as_ref(), MAGIC, HEADER_LEN)?;
        let num_docs           = LittleEndian::read_u32(&body[12..16]);
        let total_values       = LittleEndian::read_u32(&body[16..20]);
        let max_values_per_doc = LittleEndian::read_u32(&body[20..24]);
        let bits               = LittleEndian::read_u32(&body[24..28]);
        check_bit_width(bits)?;

        let data_start = HEADER_LEN + (num_docs as usize + 1) * 4;
        let expected   = data_start + packed_len(total_values as usize, bits);
        if body.len() != expected {
            return Err(SegmentError::InvalidFormat(format!(
                "multi-value index length {} != expected {expected}", body.len()
            )));
        }
        let reader = Self { buf, num_docs, total_values, max_values_per_doc, bits, data_start };
        if reader.offset(num_docs) != total_values {
            return Err(SegmentError::InvalidFormat("offset section does not end at total_values".into()));
        }
        Ok(reader)
    }

    pub fn num_docs(&self) -> u32 { self.num_docs }
    pub fn total_values(&self) -> u32 { self.total_values }
    pub fn max_values_per_doc(&self) -> u32 { self.max_values_per_doc }
    pub fn bits_per_value(&self) -> u32 { self.bits }

    pub fn create_context(&self) -> MultiValueContext {
        MultiValueContext::default()
    }

    fn offset(&self, doc_id: DocId) -> u32 {
        let pos = HEADER_LEN + doc_id as usize * 4;
        LittleEndian::read_u32(&self.buf.as_ref()[pos..pos + 4])
    }

    fn data(&self) -> &[u8] {
        let buf = self.buf.as_ref();
        &buf[self.data_start..buf.len() - 4]
    }

    /// 将 doc 的值写入 `out`，返回值个数；`out` 不足时报 `BufferTooSmall`
    pub fn get_values(&self, doc_id: DocId, out: &mut [u32], ctx: &mut MultiValueContext) -> Result<usize> {
        check_doc(doc_id, self.num_docs)?;
        let start = if doc_id == ctx.next_doc { ctx.next_start } else { self.offset(doc_id) };
        let end   = self.offset(doc_id + 1);
        if end < start || end > self.total_values {
            return Err(SegmentError::InvalidFormat(format!("corrupt offsets at doc_id={doc_id}")));
        }
        let count = (end - start) as usize;
        if out.len() < count {
            return Err(SegmentError::BufferTooSmall { doc_id, needed: count, capacity: out.len() });
        }

        let data = self.data();
        for (i, slot) in out[..count].iter_mut().enumerate() {
            *slot = read_bits(data, (start as usize + i) * self.bits as usize, self.bits, &mut ctx.bits);
        }
        ctx.next_doc   = doc_id + 1;
        ctx.next_start = end;
        Ok(count)
    }

    /// 单个 doc 的值个数
    pub fn num_values(&self, doc_id: DocId) -> Result<usize> {
        check_doc(doc_id, self.num_docs)?;
        let start = self.offset(doc_id);
        let end   = self.offset(doc_id + 1);
        if end < start || end > self.total_values {
            return Err(SegmentError::InvalidFormat(format!("corrupt offsets at doc_id={doc_id}")));
        }
        Ok((end - start) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn build(docs: &[Vec<u32>], bits: u32) -> Vec<u8> {
        let total: usize = docs.iter().map(Vec::len).sum();
        let mut w = FixedBitMultiValueWriter::new(docs.len() as u32, total as u32, bits).unwrap();
        for (doc, vals) in docs.iter().enumerate() {
            w.set_values(doc as DocId, vals).unwrap();
        }
        let mut out = Vec::new();
        w.finish(&mut out).unwrap();
        out
    }

    #[test]
    fn preserves_per_doc_order_and_count() {
        let reader = FixedBitMultiValueReader::open(build(&[vec![1, 0], vec![2]], 2)).unwrap();
        assert_eq!(reader.max_values_per_doc(), 2);
        assert_eq!(reader.total_values(), 3);

        let mut ctx = reader.create_context();
        let mut buf = [0u32; 2];
        assert_eq!(reader.get_values(0, &mut buf, &mut ctx).unwrap(), 2);
        assert_eq!(buf, [1, 0]);
        assert_eq!(reader.get_values(1, &mut buf, &mut ctx).unwrap(), 1);
        assert_eq!(buf[0], 2);
    }

    #[test]
    fn random_docs_every_width() {
        let mut rng = StdRng::seed_from_u64(11);
        for bits in 1..=32u32 {
            let max = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
            let docs: Vec<Vec<u32>> = (0..100)
                .map(|_| {
                    let n = rng.random_range(0..6);
                    (0..n).map(|_| rng.random_range(0..=max)).collect()
                })
                .collect();
            let reader = FixedBitMultiValueReader::open(build(&docs, bits)).unwrap();
            let mut buf = vec![0u32; reader.max_values_per_doc() as usize];

            let mut seq = reader.create_context();
            for (doc, vals) in docs.iter().enumerate() {
                let n = reader.get_values(doc as DocId, &mut buf, &mut seq).unwrap();
                assert_eq!(&buf[..n], vals.as_slice(), "bits={bits} doc={doc}");
            }

            let mut rnd = reader.create_context();
            for _ in 0..200 {
                let doc = rng.random_range(0..docs.len());
                let n = reader.get_values(doc as DocId, &mut buf, &mut rnd).unwrap();
                assert_eq!(&buf[..n], docs[doc].as_slice());
            }
        }
    }

    #[test]
    fn skipped_and_trailing_docs_are_empty() {
        let mut w = FixedBitMultiValueWriter::new(5, 4, 3).unwrap();
        w.set_values(1, &[7, 6]).unwrap();
        w.set_values(3, &[5]).unwrap();
        let mut out = Vec::new();
        w.finish(&mut out).unwrap();

        let reader = FixedBitMultiValueReader::open(out).unwrap();
        assert_eq!(reader.total_values(), 3);
        let counts: Vec<usize> = (0..5).map(|d| reader.num_values(d).unwrap()).collect();
        assert_eq!(counts, vec![0, 2, 0, 1, 0]);
    }

    #[test]
    fn writer_contract_violations() {
        let mut w = FixedBitMultiValueWriter::new(3, 3, 2).unwrap();
        w.set_values(1, &[1]).unwrap();
        assert!(matches!(
            w.set_values(0, &[1]),
            Err(SegmentError::OutOfOrderWrite { doc_id: 0, next_doc_id: 2 })
        ));
        assert!(matches!(w.set_values(1, &[1]), Err(SegmentError::OutOfOrderWrite { .. })));
        assert!(matches!(w.set_values(2, &[4]), Err(SegmentError::ValueOverflow { doc_id: 2, value: 4, bits: 2 })));
        assert!(matches!(
            w.set_values(2, &[0, 1, 2]),
            Err(SegmentError::CapacityMismatch { doc_id: 2, found: 4, max: 3 })
        ));
        // 失败的写入不推进 doc 游标
        assert_eq!(w.next_doc_id(), 2);
        w.set_values(2, &[3, 3]).unwrap();
    }

    #[test]
    fn undersized_buffer_is_rejected() {
        let reader = FixedBitMultiValueReader::open(build(&[vec![1, 2, 3]], 2)).unwrap();
        let mut ctx = reader.create_context();
        let mut buf = [0u32; 2];
        assert!(matches!(
            reader.get_values(0, &mut buf, &mut ctx),
            Err(SegmentError::BufferTooSmall { doc_id: 0, needed: 3, capacity: 2 })
        ));
    }

    #[test]
    fn non_monotonic_offsets_are_reported() {
        let mut bytes = build(&[vec![1, 2], vec![3], vec![0]], 2);
        // doc 1 的起始偏移改成 4，使其 end < start；重算 CRC 让文件仍能打开
        LittleEndian::write_u32(&mut bytes[HEADER_LEN + 4..HEADER_LEN + 8], 4);
        let crc_at = bytes.len() - 4;
        let crc = crc32fast::hash(&bytes[..crc_at]);
        LittleEndian::write_u32(&mut bytes[crc_at..], crc);

        let reader = FixedBitMultiValueReader::open(bytes).unwrap();
        assert_eq!(reader.num_values(0).unwrap(), 4);
        assert!(matches!(reader.num_values(1), Err(SegmentError::InvalidFormat(_))));
        let mut ctx = reader.create_context();
        let mut buf = [0u32; 4];
        assert!(matches!(reader.get_values(1, &mut buf, &mut ctx), Err(SegmentError::InvalidFormat(_))));
        assert_eq!(reader.num_values(2).unwrap(), 1);
    }

    #[test]
    fn concurrent_readers_with_private_contexts() {
        let docs: Vec<Vec<u32>> = (0..500u32).map(|d| (0..d % 4).map(|v| (d + v) % 32).collect()).collect();
        let reader = FixedBitMultiValueReader::open(build(&docs, 5)).unwrap();

        std::thread::scope(|s| {
            for t in 0..4usize {
                let reader = &reader;
                let docs   = &docs;
                s.spawn(move || {
                    let mut ctx = reader.create_context();
                    let mut buf = [0u32; 4];
                    for doc in (t..docs.len()).step_by(4).rev() {
                        let n = reader.get_values(doc as DocId, &mut buf, &mut ctx).unwrap();
                        assert_eq!(&buf[..n], docs[doc].as_slice());
                    }
                });
            }
        });
    }
}
