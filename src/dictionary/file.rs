//! 字典文件读写
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ MAGIC "OLAPDICT" (8)                │
//! │ version      (u32 LE)               │
//! │ type tag     (u8) + pad (3)         │
//! │ cardinality  (u32 LE)               │
//! │ entry width  (u32 LE)               │
//! ├─────────────────────────────────────┤
//! │ entries: cardinality × width bytes  │  数值 LE 定长；字符串 0x00 右填充
//! ├─────────────────────────────────────┤
//! │ CRC32        (u32 LE)               │
//! └─────────────────────────────────────┘
//! ```
//!
//! 定长条目使读取端可以直接在映射内存上做二分查找。

use std::cmp::Ordering;
use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::common::{verify_file, write_with_crc, DictId, Result, SegmentError, FORMAT_VERSION};
use crate::dictionary::DictValue;
use crate::field_type::{DataType, Value};

pub const MAGIC: &[u8; 8] = b"OLAPDICT";
const HEADER_LEN: usize   = 24;

/// 将已排序的字典值写成字典文件，返回字节数
pub fn write_dictionary<T: DictValue, W: Write>(sorted: &[T], writer: W) -> Result<u64> {
    let width = T::entry_width(sorted);
    let mut body = Vec::with_capacity(HEADER_LEN + sorted.len() * width);
    body.extend_from_slice(MAGIC);
    body.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    body.push(T::DATA_TYPE.tag());
    body.extend_from_slice(&[0u8; 3]);
    body.write_u32::<LittleEndian>(sorted.len() as u32)?;
    body.write_u32::<LittleEndian>(width as u32)?;
    for v in sorted {
        v.encode_entry(width, &mut body);
    }
    write_with_crc(writer, &body)
}

// ── DictionaryReader ──────────────────────────────────────────────────────────

/// 只读字典，可直接建立在 mmap 之上
pub struct DictionaryReader<B> {
    buf:         B,
    data_type:   DataType,
    cardinality: u32,
    width:       usize,
}

impl<B: AsRef<[u8]>> DictionaryReader<B> {
    pub fn open(buf: B) -> Result<Self> {
        let body = verify_file(buf.as_ref(), MAGIC, HEADER_LEN)?;
        let data_type = DataType::from_tag(body[12])
            .ok_or_else(|| SegmentError::InvalidFormat(format!("unknown type tag {}", body[12])))?;
        let cardinality = LittleEndian::read_u32(&body[16..20]);
        let width       = LittleEndian::read_u32(&body[20..24]) as usize;
        if let Some(fixed) = data_type.fixed_size() {
            if fixed != width {
                return Err(SegmentError::InvalidFormat(format!("{data_type:?} entry width {width}")));
            }
        }
        let expected = HEADER_LEN + cardinality as usize * width;
        if body.len() != expected {
            return Err(SegmentError::InvalidFormat(format!(
                "dictionary length {} != expected {expected}", body.len()
            )));
        }
        Ok(Self { buf, data_type, cardinality, width })
    }

    pub fn data_type(&self) -> DataType { self.data_type }
    pub fn cardinality(&self) -> u32 { self.cardinality }
    /// 每个条目的字节宽度（字符串列即最长值的字节数）
    pub fn entry_width(&self) -> usize { self.width }

    fn entry(&self, dict_id: DictId) -> &[u8] {
        let pos = HEADER_LEN + dict_id as usize * self.width;
        &self.buf.as_ref()[pos..pos + self.width]
    }

    fn check_type<T: DictValue>(&self) -> Result<()> {
        if T::DATA_TYPE != self.data_type {
            return Err(SegmentError::TypeMismatch {
                expected: self.data_type,
                found:    format!("{:?}", T::DATA_TYPE),
            });
        }
        Ok(())
    }

    fn check_id(&self, dict_id: DictId) -> Result<()> {
        if dict_id >= self.cardinality {
            return Err(SegmentError::DictIdOutOfRange { dict_id, cardinality: self.cardinality });
        }
        Ok(())
    }

    pub fn value_at<T: DictValue>(&self, dict_id: DictId) -> Result<T> {
        self.check_type::<T>()?;
        self.check_id(dict_id)?;
        T::decode_entry(self.entry(dict_id))
    }

    /// 二分查找值的 sorted id；不存在返回 `None`
    pub fn index_of<T: DictValue>(&self, probe: &T) -> Result<Option<DictId>> {
        self.check_type::<T>()?;
        let (mut lo, mut hi) = (0u32, self.cardinality);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match T::cmp_encoded(self.entry(mid), probe) {
                Ordering::Less    => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal   => return Ok(Some(mid)),
            }
        }
        Ok(None)
    }

    /// 批量读取：按 `dict_ids` 顺序追加到 `out`
    pub fn read_values<T: DictValue>(&self, dict_ids: &[DictId], out: &mut Vec<T>) -> Result<()> {
        self.check_type::<T>()?;
        out.reserve(dict_ids.len());
        for &id in dict_ids {
            self.check_id(id)?;
            out.push(T::decode_entry(self.entry(id))?);
        }
        Ok(())
    }

    /// 动态类型访问
    pub fn value(&self, dict_id: DictId) -> Result<Value> {
        match self.data_type {
            DataType::Int32   => self.value_at::<i32>(dict_id).map(Value::Int32),
            DataType::Int64   => self.value_at::<i64>(dict_id).map(Value::Int64),
            DataType::Float32 => self.value_at::<f32>(dict_id).map(Value::Float32),
            DataType::Float64 => self.value_at::<f64>(dict_id).map(Value::Float64),
            DataType::String  => self.value_at::<String>(dict_id).map(Value::String),
        }
    }

    pub fn index_of_value(&self, value: &Value) -> Result<Option<DictId>> {
        match value {
            Value::Int32(v)   => self.index_of(v),
            Value::Int64(v)   => self.index_of(v),
            Value::Float32(v) => self.index_of(v),
            Value::Float64(v) => self.index_of(v),
            Value::String(v)  => self.index_of(v),
        }
    }
}
