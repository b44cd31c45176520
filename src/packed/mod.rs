//! 定宽位打包正排索引读写
//!
//! ```text
//! 单值文件 (<col>.sv.fwd)                多值文件 (<col>.mv.fwd)
//! ┌──────────────────────────┐          ┌──────────────────────────────┐
//! │ MAGIC "OLAPFWSV" (8)     │          │ MAGIC "OLAPFWMV" (8)         │
//! │ version     (u32 LE)     │          │ version          (u32 LE)    │
//! │ num_docs    (u32 LE)     │          │ num_docs         (u32 LE)    │
//! │ bits        (u32 LE)     │          │ total_values     (u32 LE)    │
//! ├──────────────────────────┤          │ max_values/doc   (u32 LE)    │
//! │ packed values (MSB-first)│          │ bits             (u32 LE)    │
//! ├──────────────────────────┤          ├──────────────────────────────┤
//! │ CRC32       (u32 LE)     │          │ offsets (num_docs+1) × u32   │
//! └──────────────────────────┘          │ packed values (MSB-first)    │
//!                                       ├──────────────────────────────┤
//!                                       │ CRC32            (u32 LE)    │
//!                                       └──────────────────────────────┘
//! ```
//!
//! 排序列另有区间形式的正排（`<col>.sorted.fwd`，见 [`sorted`]）：
//! header 为 cardinality 与 num_docs，随后每个 sorted dict id 一对 `(start, end)` u32 LE。
//!
//! 读取端接受任意 `AsRef<[u8]>`（`Vec<u8>` 或 mmap），不复制数据；
//! 解码上下文由调用方持有，reader 本身只读、可跨线程共享。

pub mod multi;
pub mod single;
pub mod sorted;

pub use multi::{FixedBitMultiValueReader, FixedBitMultiValueWriter, MultiValueContext};
pub use single::{FixedBitSingleValueReader, FixedBitSingleValueWriter};
pub use sorted::{SortedIndexContext, SortedIndexReader, SortedIndexWriter};

use crate::common::{DocId, Result, SegmentError};

pub(crate) fn check_value(doc_id: DocId, value: u32, bits: u32) -> Result<()> {
    if (value as u64) >> bits != 0 {
        return Err(SegmentError::ValueOverflow { doc_id, value: value as u64, bits });
    }
    Ok(())
}

pub(crate) fn check_doc(doc_id: DocId, num_docs: u32) -> Result<()> {
    if doc_id >= num_docs {
        return Err(SegmentError::DocIdOutOfRange { doc_id, num_docs });
    }
    Ok(())
}
