//! 单值定宽位打包正排索引

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::bits::{check_bit_width, packed_len, read_bits, write_bits, BitReadContext};
use crate::common::{verify_file, write_with_crc, DocId, Result, SegmentError, FORMAT_VERSION};
use crate::packed::{check_doc, check_value};

pub const MAGIC: &[u8; 8] = b"OLAPFWSV";
const HEADER_LEN: usize   = 20;

// ── FixedBitSingleValueWriter ─────────────────────────────────────────────────

/// 按 doc_id 随机写入的单值打包器；数据在内存中组装，`finish` 时一次写出
pub struct FixedBitSingleValueWriter {
    num_docs: u32,
    bits:     u32,
    data:     Vec<u8>,
}

impl FixedBitSingleValueWriter {
    pub fn new(num_docs: u32, bits: u32) -> Result<Self> {
        check_bit_width(bits)?;
        let data = vec![0u8; packed_len(num_docs as usize, bits)];
        Ok(Self { num_docs, bits, data })
    }

    pub fn num_docs(&self) -> u32 { self.num_docs }
    pub fn bits_per_value(&self) -> u32 { self.bits }

    /// 写入 doc 的值；doc 可按任意顺序写入，重复写入覆盖旧值
    pub fn set_value(&mut self, doc_id: DocId, value: u32) -> Result<()> {
        check_doc(doc_id, self.num_docs)?;
        check_value(doc_id, value, self.bits)?;
        write_bits(&mut self.data, doc_id as usize * self.bits as usize, self.bits, value);
        Ok(())
    }

    /// 序列化为文件字节（header + packed + CRC），返回总字节数
    pub fn finish<W: Write>(self, writer: W) -> Result<u64> {
        let mut body = Vec::with_capacity(HEADER_LEN + self.data.len());
        body.extend_from_slice(MAGIC);
        body.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        body.write_u32::<LittleEndian>(self.num_docs)?;
        body.write_u32::<LittleEndian>(self.bits)?;
        body.extend_from_slice(&self.data);
        write_with_crc(writer, &body)
    }
}

// ── FixedBitSingleValueReader ─────────────────────────────────────────────────

pub struct FixedBitSingleValueReader<B> {
    buf:      B,
    num_docs: u32,
    bits:     u32,
}

impl<B: AsRef<[u8]>> FixedBitSingleValueReader<B> {
    pub fn open(buf: B) -> Result<Self> {
        let body     = verify_file(buf.as_ref(), MAGIC, HEADER_LEN)?;
        let num_docs = LittleEndian::read_u32(&body[12..16]);
        let bits     = LittleEndian::read_u32(&body[16..20]);
        check_bit_width(bits)?;
        let expected = HEADER_LEN + packed_len(num_docs as usize, bits);
        if body.len() != expected {
            return Err(SegmentError::InvalidFormat(format!(
                "single-value index length {} != expected {expected}", body.len()
            )));
        }
        Ok(Self { buf, num_docs, bits })
    }

    pub fn num_docs(&self) -> u32 { self.num_docs }
    pub fn bits_per_value(&self) -> u32 { self.bits }

    pub fn create_context(&self) -> BitReadContext {
        BitReadContext::new()
    }

    fn data(&self) -> &[u8] {
        let buf = self.buf.as_ref();
        &buf[HEADER_LEN..buf.len() - 4]
    }

    pub fn get_value(&self, doc_id: DocId, ctx: &mut BitReadContext) -> Result<u32> {
        check_doc(doc_id, self.num_docs)?;
        Ok(read_bits(self.data(), doc_id as usize * self.bits as usize, self.bits, ctx))
    }

    /// 批量读取：`out[i] = value(doc_ids[i])`
    pub fn read_values(&self, doc_ids: &[DocId], out: &mut [u32], ctx: &mut BitReadContext) -> Result<()> {
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
