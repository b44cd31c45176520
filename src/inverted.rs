//! 位图倒排索引（sorted dict id → doc_id 集合）
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ MAGIC "OLAPINVX" (8)                     │
//! │ version       (u32 LE)                   │
//! │ cardinality   (u32 LE)                   │
//! │ num_docs      (u32 LE)                   │
//! ├──────────────────────────────────────────┤
//! │ offsets (cardinality + 1) × u64 LE       │  相对位图区起点
//! │ roaring bitmaps, 按 sorted dict id 排列  │
//! ├──────────────────────────────────────────┤
//! │ CRC32         (u32 LE)                   │
//! └──────────────────────────────────────────┘
//! ```

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use roaring::RoaringBitmap;

use crate::common::{verify_file, write_with_crc, DictId, DocId, Result, SegmentError, FORMAT_VERSION};

pub const MAGIC: &[u8; 8] = b"OLAPINVX";
const HEADER_LEN: usize   = 20;

/// 正排构建过程中按新 doc_id 递增顺序接收重映射后的字典 ID
pub trait InvertedIndexSink {
    /// 每个新 doc 调用一次，doc_id 由调用顺序隐含
    fn add(&mut self, dict_ids: &[DictId]) -> Result<()>;
}

// ── BitmapInvertedIndexCreator ────────────────────────────────────────────────

pub struct BitmapInvertedIndexCreator {
    bitmaps:  Vec<RoaringBitmap>,
    num_docs: u32,
    next_doc: DocId,
}

impl BitmapInvertedIndexCreator {
    pub fn new(cardinality: u32, num_docs: u32) -> Self {
        Self {
            bitmaps: vec![RoaringBitmap::new(); cardinality as usize],
            num_docs,
            next_doc: 0,
        }
    }

    /// 显式 doc_id 的写入；必须恰好是下一个 doc
    pub fn add_doc(&mut self, doc_id: DocId, dict_ids: &[DictId]) -> Result<()> {
        if doc_id != self.next_doc {
            return Err(SegmentError::OutOfOrderWrite { doc_id, next_doc_id: self.next_doc });
        }
        if doc_id >= self.num_docs {
            return Err(SegmentError::DocIdOutOfRange { doc_id, num_docs: self.num_docs });
        }
        let cardinality = self.bitmaps.len() as u32;
        if let Some(&bad) = dict_ids.iter().find(|&&id| id >= cardinality) {
            return Err(SegmentError::DictIdOutOfRange { dict_id: bad, cardinality });
        }
        for &id in dict_ids {
            self.bitmaps[id as usize].insert(doc_id);
        }
        self.next_doc += 1;
        Ok(())
    }

    pub fn docs_added(&self) -> u32 { self.next_doc }

    pub fn finish<W: Write>(self, writer: W) -> Result<u64> {
        let cardinality = self.bitmaps.len();
        let mut blob    = Vec::new();
        let mut offsets = Vec::with_capacity(cardinality + 1);
        for bitmap in &self.bitmaps {
            offsets.push(blob.len() as u64);
            bitmap.serialize_into(&mut blob)?;
        }
        offsets.push(blob.len() as u64);

        let mut body = Vec::with_capacity(HEADER_LEN + offsets.len() * 8 + blob.len());
        body.extend_from_slice(MAGIC);
        body.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        body.write_u32::<LittleEndian>(cardinality as u32)?;
        body.write_u32::<LittleEndian>(self.num_docs)?;
        for off in offsets {
            body.write_u64::<LittleEndian>(off)?;
        }
        body.extend_from_slice(&blob);
        write_with_crc(writer, &body)
    }
}

impl InvertedIndexSink for BitmapInvertedIndexCreator {
    fn add(&mut self, dict_ids: &[DictId]) -> Result<()> {
        self.add_doc(self.next_doc, dict_ids)
    }
}

// ── BitmapInvertedIndexReader ─────────────────────────────────────────────────

pub struct BitmapInvertedIndexReader<B> {
    buf:         B,
    cardinality: u32,
    num_docs:    u32,
    blob_start:  usize,
}

impl<B: AsRef<[u8]>> BitmapInvertedIndexReader<B> {
    pub fn open(buf: B) -> Result<Self> {
        let body        = verify_file(buf.as_ref(), MAGIC, HEADER_LEN)?;
        let cardinality = LittleEndian::read_u32(&body[12..16]);
        let num_docs    = LittleEndian::read_u32(&body[16..20]);
        let blob_start  = HEADER_LEN + (cardinality as usize + 1) * 8;
        if body.len() < blob_start {
            return Err(SegmentError::InvalidFormat("inverted index offsets truncated".into()));
        }
        let blob_len = LittleEndian::read_u64(&body[blob_start - 8..blob_start]) as usize;
        if body.len() != blob_start + blob_len {
            return Err(SegmentError::InvalidFormat(format!(
                "inverted index length {} != expected {}", body.len(), blob_start + blob_len
            )));
        }
        Ok(Self { buf, cardinality, num_docs, blob_start })
    }

    pub fn cardinality(&self) -> u32 { self.cardinality }
    pub fn num_docs(&self) -> u32 { self.num_docs }

    fn offset(&self, dict_id: DictId) -> usize {
        let pos = HEADER_LEN + dict_id as usize * 8;
        LittleEndian::read_u64(&self.buf.as_ref()[pos..pos + 8]) as usize
    }

    /// 包含 `dict_id` 的所有 doc_id
    pub fn doc_ids(&self, dict_id: DictId) -> Result<RoaringBitmap> {
        if dict_id >= self.cardinality {
            return Err(SegmentError::DictIdOutOfRange { dict_id, cardinality: self.cardinality });
        }
        let (start, end) = (self.offset(dict_id), self.offset(dict_id + 1));
        if start > end || self.blob_start + end > self.buf.as_ref().len() - 4 {
            return Err(SegmentError::InvalidFormat(format!("corrupt bitmap offsets for dict_id={dict_id}")));
        }
        let bytes = &self.buf.as_ref()[self.blob_start + start..self.blob_start + end];
        Ok(RoaringBitmap::deserialize_from(bytes)?)
    }
}
