//! 全局基础类型与错误定义

use thiserror::Error;

use crate::field_type::DataType;

// ── ID 类型别名 ───────────────────────────────────────────────────────────────

/// 文档号（段内行号）
pub type DocId  = u32;
/// 字典 ID（old = 首次出现顺序，sorted = 字典排序后位置）
pub type DictId = u32;

/// 所有索引文件共用的格式版本号
pub const FORMAT_VERSION: u32 = 1;

// ── 错误 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SegmentError {
    /// 在错误的阶段调用字典操作（seal 之前查询 / seal 之后写入）
    #[error("dictionary phase violation: {0}")]
    SealedDictionary(&'static str),
    #[error("value {value} does not fit in {bits} bits (doc_id={doc_id})")]
    ValueOverflow { doc_id: DocId, value: u64, bits: u32 },
    #[error("out-of-order write: doc_id={doc_id}, next expected >= {next_doc_id}")]
    OutOfOrderWrite { doc_id: DocId, next_doc_id: DocId },
    /// 排序正排要求 dict id 随 doc_id 非递减
    #[error("unsorted write at doc_id={doc_id}: dict_id {dict_id} after {prev}")]
    UnsortedValue { doc_id: DocId, dict_id: DictId, prev: DictId },
    #[error("buffer too small for doc_id={doc_id}: need {needed}, capacity {capacity}")]
    BufferTooSmall { doc_id: DocId, needed: usize, capacity: usize },
    #[error("capacity mismatch at doc_id={doc_id}: found {found} values, max {max}")]
    CapacityMismatch { doc_id: DocId, found: usize, max: usize },
    #[error("type mismatch: column is {expected:?}, got {found}")]
    TypeMismatch { expected: DataType, found: String },
    #[error("invalid bit width: {0} (expected 1..=32)")]
    InvalidBitWidth(u32),
    #[error("doc_id {doc_id} out of range (num_docs={num_docs})")]
    DocIdOutOfRange { doc_id: DocId, num_docs: u32 },
    #[error("dict_id {dict_id} out of range (cardinality={cardinality})")]
    DictIdOutOfRange { dict_id: DictId, cardinality: u32 },
    #[error("invalid doc id remap: {0}")]
    InvalidDocRemap(String),
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    /// 行 / 单元格与列描述符不符（列数、单多值、空值）
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("invalid index file: {0}")]
    InvalidFormat(String),
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// 附带列名的上下文包装，由列级构建流程添加
    #[error("column `{column}`: {source}")]
    Column {
        column: String,
        #[source]
        source: Box<SegmentError>,
    },
}

impl SegmentError {
    /// 为错误附上列名（已带列名的错误保持不变）
    pub fn in_column(self, column: &str) -> Self {
        match self {
            e @ Self::Column { .. } => e,
            e => Self::Column { column: column.into(), source: Box::new(e) },
        }
    }

    /// 去掉列名包装后的根错误
    pub fn root(&self) -> &SegmentError {
        match self {
            Self::Column { source, .. } => source.root(),
            e => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, SegmentError>;

// ── 文件头 / 校验辅助 ─────────────────────────────────────────────────────────

/// 校验索引文件的 magic、版本与尾部 CRC32，返回去掉 CRC 后的主体
pub(crate) fn verify_file<'a>(data: &'a [u8], magic: &[u8; 8], min_len: usize) -> Result<&'a [u8]> {
    if data.len() < min_len + 4 || &data[..8] != magic {
        return Err(SegmentError::InvalidFormat(format!(
            "bad magic or truncated file (expected {})",
            String::from_utf8_lossy(magic)
        )));
    }
    let body_end   = data.len() - 4;
    let stored_crc = u32::from_le_bytes([data[body_end], data[body_end + 1], data[body_end + 2], data[body_end + 3]]);
    if crc32fast::hash(&data[..body_end]) != stored_crc {
        return Err(SegmentError::ChecksumMismatch);
    }
    let version = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    if version != FORMAT_VERSION {
        return Err(SegmentError::InvalidFormat(format!("unsupported version {version}")));
    }
    Ok(&data[..body_end])
}

/// 将主体写出并追加 CRC32，返回写出的总字节数
pub(crate) fn write_with_crc<W: std::io::Write>(mut writer: W, body: &[u8]) -> Result<u64> {
    let crc = crc32fast::hash(body);
    writer.write_all(body)?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.flush()?;
    Ok(body.len() as u64 + 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_context_wraps_once() {
        let err = SegmentError::CapacityMismatch { doc_id: 3, found: 9, max: 4 }
            .in_column("tags")
            .in_column("other");
        assert_eq!(err.to_string(), "column `tags`: capacity mismatch at doc_id=3: found 9 values, max 4");
        assert!(matches!(err.root(), SegmentError::CapacityMismatch { doc_id: 3, .. }));
    }

    #[test]
    fn crc_roundtrip_and_tamper() {
        let mut body = b"OLAPTEST".to_vec();
        body.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        body.extend_from_slice(&[1, 2, 3]);
        let mut file = Vec::new();
        write_with_crc(&mut file, &body).unwrap();
        assert_eq!(verify_file(&file, b"OLAPTEST", 12).unwrap(), body.as_slice());

        file[13] ^= 0xff;
        assert!(matches!(verify_file(&file, b"OLAPTEST", 12), Err(SegmentError::ChecksumMismatch)));
        assert!(matches!(verify_file(&file, b"OLAPXXXX", 12), Err(SegmentError::InvalidFormat(_))));
    }
}
