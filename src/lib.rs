//! # olap-segment-creator
//!
//! 列存段构建层：字典编码 + 定宽位打包正排 + 位图倒排。
//!
//! ## 整体流程
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       SegmentCreator                         │
//! │   append_row(Vec<Cell>)                                      │
//! │        │                                                     │
//! │        ▼                                                     │
//! │   ColumnIndexCreator × N                                     │
//! │   ├─ ColumnDictionary        Value → old dict id             │
//! │   └─ IntermediateForwardIndex  old doc → old dict ids        │
//! │                                                              │
//! │   build(dir)                                                 │
//! │   ├─ seal          old id → sorted id (SortedDictIdMap)      │
//! │   ├─ DocIdRemap    可选：按排序列重排 doc                    │
//! │   └─ 每列（rayon 并行）                                      │
//! │       ├─ <col>.dict        有序字典                          │
//! │       └─ ForwardIndexBuilder 单次遍历                        │
//! │            ├─ <col>.sv.fwd / .mv.fwd  定宽位打包             │
//! │            ├─ <col>.sorted.fwd        排序列 doc 区间        │
//! │            └─ <col>.inv               roaring 倒排（可选）   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! 读取端（`FixedBitSingleValueReader`、`FixedBitMultiValueReader`、`SortedIndexReader`、
//! `DictionaryReader`、`BitmapInvertedIndexReader`）可直接在 mmap 上解码，
//! 解码上下文由调用方持有。

// ── 基础 ──────────────────────────────────────────────────────────────────────
pub mod common;
pub mod field_type;
pub mod bits;

// ── 索引结构 ──────────────────────────────────────────────────────────────────
pub mod dictionary;
pub mod packed;
pub mod intermediate;
pub mod doc_remap;
pub mod inverted;
pub mod forward_index;

// ── 段构建 ────────────────────────────────────────────────────────────────────
pub mod directory;
pub mod column_creator;
pub mod segment;

pub use bits::{bits_needed, BitReadContext};
pub use column_creator::{ColumnCreatorOptions, ColumnIndexCreator, ColumnMetadata};
pub use common::{DictId, DocId, Result, SegmentError};
pub use dictionary::{file::DictionaryReader, ColumnDictionary, DictionaryEncoder, SortedDictIdMap};
pub use directory::SegmentDirectory;
pub use doc_remap::DocIdRemap;
pub use field_type::{Cell, DataType, FieldSpec, Value};
pub use forward_index::{BuildStats, ForwardIndexBuilder, ForwardIndexWriter};
pub use intermediate::{IntermediateForwardIndex, IntermediateSource};
pub use inverted::{BitmapInvertedIndexCreator, BitmapInvertedIndexReader, InvertedIndexSink};
pub use packed::{
    FixedBitMultiValueReader, FixedBitMultiValueWriter, FixedBitSingleValueReader, FixedBitSingleValueWriter,
    MultiValueContext, SortedIndexContext, SortedIndexReader, SortedIndexWriter,
};
pub use segment::{SegmentCreator, SegmentMetadata};
