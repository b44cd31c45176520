//! 排序列正排索引
//!
//! 段按某列物理排序后，同一 sorted dict id 的 doc 构成一段连续区间，
//! 因此只需为每个 dict id 记录 `[start, end)`，无需逐 doc 打包。
//! 未出现的 dict id 记为空区间 `start == end`，区间序列首尾相接覆盖 `0..num_docs`。

use std::io::Write;
use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::common::{verify_file, write_with_crc, DictId, DocId, Result, SegmentError, FORMAT_VERSION};
use crate::forward_index::ForwardIndexWriter;
use crate::packed::check_doc;

pub const MAGIC: &[u8; 8] = b"OLAPFWST";
const HEADER_LEN: usize   = 20;
const RANGE_LEN: usize    = 8;

// ── SortedIndexWriter ─────────────────────────────────────────────────────────

/// 按 doc_id 顺序追加；每个 doc 恰一个值，dict id 非递减
pub struct SortedIndexWriter {
    cardinality: u32,
    num_docs:    u32,
    /// ranges[dict_id] = (start, end)；end == 0 表示尚未出现
    ranges:      Vec<(DocId, DocId)>,
    next_doc_id: DocId,
    last:        Option<DictId>,
}

impl SortedIndexWriter {
    pub fn new(cardinality: u32, num_docs: u32) -> Self {
        Self {
            cardinality, num_docs,
            ranges: vec![(0, 0); cardinality as usize],
            next_doc_id: 0,
            last: None,
        }
    }

    pub fn cardinality(&self) -> u32 { self.cardinality }
    pub fn num_docs(&self) -> u32 { self.num_docs }

    pub fn add(&mut self, doc_id: DocId, dict_id: DictId) -> Result<()> {
        check_doc(doc_id, self.num_docs)?;
        if doc_id != self.next_doc_id {
            return Err(SegmentError::OutOfOrderWrite { doc_id, next_doc_id: self.next_doc_id });
        }
        if dict_id >= self.cardinality {
            return Err(SegmentError::DictIdOutOfRange { dict_id, cardinality: self.cardinality });
        }
        match self.last {
            Some(prev) if dict_id < prev => {
                return Err(SegmentError::UnsortedValue { doc_id, dict_id, prev });
            }
            Some(prev) if dict_id == prev => {}
            _ => self.ranges[dict_id as usize].0 = doc_id,
        }
        self.ranges[dict_id as usize].1 = doc_id + 1;
        self.last        = Some(dict_id);
        self.next_doc_id = doc_id + 1;
        Ok(())
    }

    /// 序列化为文件字节（header + ranges + CRC）；所有 doc 必须已写入
    pub fn finish<W: Write>(self, writer: W) -> Result<u64> {
        if self.next_doc_id != self.num_docs {
            return Err(SegmentError::InvalidFormat(format!(
                "sorted index covers {} of {} docs", self.next_doc_id, self.num_docs
            )));
        }
        let mut body = Vec::with_capacity(HEADER_LEN + self.ranges.len() * RANGE_LEN);
        body.extend_from_slice(MAGIC);
        body.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        body.write_u32::<LittleEndian>(self.cardinality)?;
        body.write_u32::<LittleEndian>(self.num_docs)?;

        let mut cursor = 0;
        for &(start, end) in &self.ranges {
            let (start, end) = if end == 0 { (cursor, cursor) } else { (start, end) };
            body.write_u32::<LittleEndian>(start)?;
            body.write_u32::<LittleEndian>(end)?;
            cursor = end;
        }
        write_with_crc(writer, &body)
    }
}

impl ForwardIndexWriter for SortedIndexWriter {
    fn write_doc(&mut self, doc_id: DocId, dict_ids: &[DictId]) -> Result<()> {
        match dict_ids {
            [id] => self.add(doc_id, *id),
            _ => Err(SegmentError::CapacityMismatch { doc_id, found: dict_ids.len(), max: 1 }),
        }
    }
}

// ── SortedIndexReader ─────────────────────────────────────────────────────────

/// 读取上下文：缓存最近命中的区间
#[derive(Debug, Clone, Default)]
pub struct SortedIndexContext {
    dict_id:  DictId,
    start:    DocId,
    end:      DocId,
    searches: u64,
}

impl SortedIndexContext {
    /// 未命中缓存区间而做二分查找的次数
    pub fn searches(&self) -> u64 { self.searches }
}

pub struct SortedIndexReader<B> {
    buf:         B,
    cardinality: u32,
    num_docs:    u32,
}

impl<B: AsRef<[u8]>> SortedIndexReader<B> {
    pub fn open(buf: B) -> Result<Self> {
        let body        = verify_file(buf.as_ref(), MAGIC, HEADER_LEN)?;
        let cardinality = LittleEndian::read_u32(&body[12..16]);
        let num_docs    = LittleEndian::read_u32(&body[16..20]);
        let expected    = HEADER_LEN + cardinality as usize * RANGE_LEN;
        if body.len() != expected {
            return Err(SegmentError::InvalidFormat(format!(
                "sorted index length {} != expected {expected}", body.len()
            )));
        }

        let reader = Self { buf, cardinality, num_docs };
        let mut cursor = 0;
        for dict_id in 0..cardinality {
            let (start, end) = reader.range(dict_id);
            if start != cursor || end < start {
                return Err(SegmentError::InvalidFormat(format!("broken doc range at dict_id={dict_id}")));
            }
            cursor = end;
        }
        if cursor != num_docs {
            return Err(SegmentError::InvalidFormat(format!("doc ranges end at {cursor}, num_docs={num_docs}")));
        }
        Ok(reader)
    }

    pub fn cardinality(&self) -> u32 { self.cardinality }
    pub fn num_docs(&self) -> u32 { self.num_docs }

    pub fn create_context(&self) -> SortedIndexContext {
        SortedIndexContext::default()
    }

    fn range(&self, dict_id: DictId) -> (DocId, DocId) {
        let pos = HEADER_LEN + dict_id as usize * RANGE_LEN;
        let buf = self.buf.as_ref();
        (LittleEndian::read_u32(&buf[pos..pos + 4]), LittleEndian::read_u32(&buf[pos + 4..pos + 8]))
    }

    /// dict id 对应的 doc 区间（可能为空）
    pub fn doc_range(&self, dict_id: DictId) -> Result<Range<DocId>> {
        if dict_id >= self.cardinality {
            return Err(SegmentError::DictIdOutOfRange { dict_id, cardinality: self.cardinality });
        }
        let (start, end) = self.range(dict_id);
        Ok(start..end)
    }

    pub fn get_value(&self, doc_id: DocId, ctx: &mut SortedIndexContext) -> Result<DictId> {
        check_doc(doc_id, self.num_docs)?;
        if doc_id >= ctx.start && doc_id < ctx.end {
            return Ok(ctx.dict_id);
        }

        // 顺序扫描：紧接上一区间时向后跳过空区间
        let dict_id = if doc_id == ctx.end && ctx.end > 0 {
            let last   = self.cardinality - 1;
            let mut id = (ctx.dict_id + 1).min(last);
            while id < last && self.range(id).1 <= doc_id {
                id += 1;
            }
            id
        } else {
            ctx.searches += 1;
            // 第一个 end > doc_id 的 dict id
            let (mut lo, mut hi) = (0, self.cardinality);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if self.range(mid).1 <= doc_id { lo = mid + 1 } else { hi = mid }
            }
            lo
        };

        let (start, end) = self.range(dict_id);
        ctx.dict_id = dict_id;
        ctx.start   = start;
        ctx.end     = end;
        Ok(dict_id)
    }

    /// 批量读取：`out[i] = value(doc_ids[i])`
    pub fn read_values(&self, doc_ids: &[DocId], out: &mut [DictId], ctx: &mut SortedIndexContext) -> Result<()> {
        if out.len() < doc_ids.len() {
            return Err(SegmentError::BufferTooSmall {
                doc_id:   doc_ids.first().copied().unwrap_or_default(),
                needed:   doc_ids.len(),
                capacity: out.len(),
            });
        }
        for (slot, &doc_id) in out.iter_mut().zip(doc_ids) {
            *slot = self.get_value(doc_id, ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn build(values: &[DictId], cardinality: u32) -> Vec<u8> {
        let mut w = SortedIndexWriter::new(cardinality, values.len() as u32);
        for (doc, &v) in values.iter().enumerate() {
            w.add(doc as DocId, v).unwrap();
        }
        let mut out = Vec::new();
        w.finish(&mut out).unwrap();
        out
    }

    #[test]
    fn ranges_cover_every_doc_including_unused_ids() {
        // dict id 0 / 3 / 5 不出现
        let values = [1, 1, 2, 4, 4, 4];
        let reader = SortedIndexReader::open(build(&values, 6)).unwrap();
        assert_eq!(reader.cardinality(), 6);
        assert_eq!(reader.doc_range(0).unwrap(), 0..0);
        assert_eq!(reader.doc_range(1).unwrap(), 0..2);
        assert_eq!(reader.doc_range(2).unwrap(), 2..3);
        assert_eq!(reader.doc_range(3).unwrap(), 3..3);
        assert_eq!(reader.doc_range(4).unwrap(), 3..6);
        assert_eq!(reader.doc_range(5).unwrap(), 6..6);
        assert!(matches!(reader.doc_range(6), Err(SegmentError::DictIdOutOfRange { dict_id: 6, .. })));
    }

    #[test]
    fn sequential_scan_searches_once() {
        let values: Vec<DictId> = (0..1000).map(|d| d / 7 * 2).collect();
        let cardinality = values.last().unwrap() + 3;
        let reader = SortedIndexReader::open(build(&values, cardinality)).unwrap();

        let mut ctx = reader.create_context();
        for (doc, &v) in values.iter().enumerate() {
            assert_eq!(reader.get_value(doc as DocId, &mut ctx).unwrap(), v, "doc={doc}");
        }
        assert_eq!(ctx.searches(), 1);
    }

    #[test]
    fn random_access_matches_values() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut values: Vec<DictId> = (0..2000).map(|_| rng.random_range(0..300)).collect();
        values.sort_unstable();
        let reader = SortedIndexReader::open(build(&values, 300)).unwrap();

        let mut ctx = reader.create_context();
        for _ in 0..2000 {
            let doc = rng.random_range(0..values.len());
            assert_eq!(reader.get_value(doc as DocId, &mut ctx).unwrap(), values[doc]);
        }

        let doc_ids = [1999, 0, 1000, 1000, 3];
        let mut out = [0; 5];
        reader.read_values(&doc_ids, &mut out, &mut ctx).unwrap();
        assert_eq!(out, doc_ids.map(|d| values[d as usize]));
        assert!(matches!(reader.get_value(2000, &mut ctx), Err(SegmentError::DocIdOutOfRange { .. })));
    }

    #[test]
    fn writer_contract_violations() {
        let mut w = SortedIndexWriter::new(4, 4);
        w.add(0, 2).unwrap();
        assert!(matches!(w.add(2, 2), Err(SegmentError::OutOfOrderWrite { doc_id: 2, next_doc_id: 1 })));
        assert!(matches!(w.add(1, 1), Err(SegmentError::UnsortedValue { doc_id: 1, dict_id: 1, prev: 2 })));
        assert!(matches!(w.add(1, 4), Err(SegmentError::DictIdOutOfRange { dict_id: 4, .. })));
        assert!(matches!(w.write_doc(1, &[2, 3]), Err(SegmentError::CapacityMismatch { max: 1, .. })));
        w.add(1, 3).unwrap();
        assert!(matches!(w.finish(Vec::new()), Err(SegmentError::InvalidFormat(_))));
    }

    #[test]
    fn reader_rejects_broken_ranges() {
        let mut bytes = build(&[0, 0, 1], 2);
        // dict id 1 的 start 改为 1，与前一区间的 end 重叠
        LittleEndian::write_u32(&mut bytes[HEADER_LEN + 8..HEADER_LEN + 12], 1);
        assert!(matches!(SortedIndexReader::open(bytes.clone()), Err(SegmentError::ChecksumMismatch)));

        let crc_at = bytes.len() - 4;
        let crc = crc32fast::hash(&bytes[..crc_at]);
        LittleEndian::write_u32(&mut bytes[crc_at..], crc);
        assert!(matches!(SortedIndexReader::open(bytes), Err(SegmentError::InvalidFormat(_))));
    }
}
