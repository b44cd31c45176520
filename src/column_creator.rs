//! 列索引构建器（对应段构建中的单列流程）
//!
//! 摄入阶段：
//!   - Cell → 字典编码（old id）→ 中间正排
//!
//! 构建阶段（字典 seal 之后）：
//!   - `<col>.dict`                 有序字典
//!   - `<col>.sv.fwd` / `.mv.fwd`   定宽位打包正排（单次遍历）
//!   - `<col>.sorted.fwd`           排序列的 doc 区间正排（同一遍，仅当确实有序）
//!   - `<col>.inv`                  位图倒排（可选，与正排同一遍生成）

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::bits::bits_needed;
use crate::common::{DictId, DocId, Result, SegmentError};
use crate::dictionary::ColumnDictionary;
use crate::directory::{
    dictionary_file, inverted_file, mv_forward_file, sorted_forward_file, sv_forward_file, SegmentDirectory,
};
use crate::doc_remap::DocIdRemap;
use crate::field_type::{Cell, DataType, FieldSpec, Value};
use crate::forward_index::{BuildStats, ForwardIndexBuilder, ForwardIndexWriter};
use crate::intermediate::{IntermediateForwardIndex, IntermediateSource};
use crate::inverted::{BitmapInvertedIndexCreator, InvertedIndexSink};
use crate::packed::{FixedBitMultiValueWriter, FixedBitSingleValueWriter, SortedIndexWriter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnCreatorOptions {
    pub create_inverted_index: bool,
    /// 单值列按新 doc 顺序有序时额外写出 `<col>.sorted.fwd`
    pub create_sorted_index:   bool,
}

impl ColumnCreatorOptions {
    pub fn with_inverted_index(mut self, enabled: bool) -> Self {
        self.create_inverted_index = enabled; self
    }

    pub fn with_sorted_index(mut self, enabled: bool) -> Self {
        self.create_sorted_index = enabled; self
    }
}

/// 单列构建结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name:                String,
    pub data_type:           DataType,
    pub single_valued:       bool,
    pub cardinality:         u32,
    pub bits_per_element:    u32,
    pub total_docs:          u32,
    pub total_values:        u64,
    pub max_values_per_doc:  u32,
    pub is_sorted:           bool,
    pub has_inverted_index:  bool,
    // 文件字节数
    pub dictionary_size:     u64,
    pub forward_index_size:  u64,
    pub inverted_index_size: Option<u64>,
    pub sorted_index_size:   Option<u64>,
}

pub struct ColumnIndexCreator {
    spec:       FieldSpec,
    options:    ColumnCreatorOptions,
    dictionary: ColumnDictionary,
    forward:    IntermediateForwardIndex,
    // 单个 doc 的 old id 暂存
    scratch:    Vec<DictId>,
}

impl ColumnIndexCreator {
    pub fn new(spec: FieldSpec, options: ColumnCreatorOptions) -> Self {
        let forward = if spec.single_valued {
            IntermediateForwardIndex::single_value()
        } else {
            IntermediateForwardIndex::multi_value()
        };
        Self {
            dictionary: ColumnDictionary::new(spec.data_type),
            spec, options, forward,
            scratch: Vec::new(),
        }
    }

    pub fn spec(&self) -> &FieldSpec { &self.spec }
    pub fn options(&self) -> ColumnCreatorOptions { self.options }
    pub fn num_docs(&self) -> u32 { self.forward.num_docs() }
    pub fn cardinality(&self) -> u32 { self.dictionary.cardinality() }

    pub(crate) fn set_options(&mut self, options: ColumnCreatorOptions) {
        self.options = options;
    }

    /// 只校验不写入：空值、单/多值形态与值类型
    pub fn check_cell(&self, cell: &Cell) -> Result<()> {
        let check_type = |v: &Value| {
            if v.data_type() == self.spec.data_type {
                Ok(())
            } else {
                Err(SegmentError::TypeMismatch {
                    expected: self.spec.data_type,
                    found:    format!("{:?}", v.data_type()),
                })
            }
        };
        let checked = match cell {
            Cell::Null if self.spec.is_nullable => Ok(()),
            Cell::Null => Err(SegmentError::SchemaMismatch("null in non-nullable column".into())),
            Cell::Single(v) => check_type(v),
            Cell::Multi(_) if self.spec.single_valued => {
                Err(SegmentError::SchemaMismatch("multiple values for single-value column".into()))
            }
            Cell::Multi(vs) => vs.iter().try_for_each(check_type),
        };
        checked.map_err(|e| e.in_column(&self.spec.name))
    }

    /// 摄入下一个 doc，返回其 old doc_id
    ///
    /// 空值写入该类型的默认值；多值列接受单个值。
    pub fn index_value(&mut self, cell: Cell) -> Result<DocId> {
        self.check_cell(&cell)?;
        self.scratch.clear();
        let result = match cell {
            Cell::Null => {
                let default = self.spec.data_type.default_null_value();
                self.dictionary.add_value(default).map(|id| self.scratch.push(id))
            }
            Cell::Single(v) => self.dictionary.add_value(v).map(|id| self.scratch.push(id)),
            Cell::Multi(vs) => vs.into_iter().try_for_each(|v| {
                self.dictionary.add_value(v).map(|id| self.scratch.push(id))
            }),
        };
        result
            .and_then(|()| self.forward.append(&self.scratch))
            .map_err(|e| e.in_column(&self.spec.name))
    }

    pub fn seal_dictionary(&mut self) -> Result<()> {
        self.dictionary.seal().map(|_| ()).map_err(|e| e.in_column(&self.spec.name))
    }

    /// 每个 old doc 的 sorted 字典 ID（仅单值列，用于段内物理排序）
    pub fn sorted_ids_by_doc(&self) -> Result<Vec<DictId>> {
        let collect = || -> Result<Vec<DictId>> {
            if !self.spec.single_valued {
                return Err(SegmentError::SchemaMismatch("sort column must be single-valued".into()));
            }
            let sorted = self.dictionary.sorted_dict_ids()?;
            (0..self.forward.num_docs())
                .map(|doc| sorted.sorted_id(self.forward.values(doc)?[0]))
                .collect()
        };
        collect().map_err(|e| e.in_column(&self.spec.name))
    }

    /// 写出本列全部索引文件；字典必须已 seal
    pub fn build(self, dir: &SegmentDirectory, doc_remap: Option<&DocIdRemap>) -> Result<ColumnMetadata> {
        let name = self.spec.name.clone();
        self.build_files(dir, doc_remap).map_err(|e| e.in_column(&name))
    }

    fn build_files(self, dir: &SegmentDirectory, doc_remap: Option<&DocIdRemap>) -> Result<ColumnMetadata> {
        let name        = self.spec.name.as_str();
        let sorted_ids  = self.dictionary.sorted_dict_ids()?;
        let cardinality = sorted_ids.cardinality();
        let bits        = bits_needed(cardinality);
        let num_docs    = self.forward.num_docs();
        if cardinality == 1 {
            log::warn!("column {name}: constant column, every doc holds the same value");
        }

        // ── 字典 ─────────────────────────────────────────────────────────────
        let dictionary_size = write_file(dir, &dictionary_file(name), |w| self.dictionary.write_to(w))?;

        // ── 正排 + 倒排（单次遍历）──────────────────────────────────────────
        let mut inverted = self
            .options
            .create_inverted_index
            .then(|| BitmapInvertedIndexCreator::new(cardinality, num_docs));
        let sink    = inverted.as_mut().map(|c| c as &mut dyn InvertedIndexSink);
        let builder = ForwardIndexBuilder::new(&self.forward, sorted_ids).with_doc_remap(doc_remap);

        let mut sorted_index_size = None;
        let (stats, forward_index_size): (BuildStats, u64) = if self.spec.single_valued {
            let mut writer = SingleValueOutput {
                packed: FixedBitSingleValueWriter::new(num_docs, bits)?,
                sorted: self
                    .options
                    .create_sorted_index
                    .then(|| SortedIndexWriter::new(cardinality, num_docs)),
            };
            let stats = builder.build(&mut writer, sink)?;
            let size  = write_file(dir, &sv_forward_file(name), |w| writer.packed.finish(w))?;
            match writer.sorted {
                Some(sorted) if stats.is_sorted => {
                    sorted_index_size = Some(write_file(dir, &sorted_forward_file(name), |w| sorted.finish(w))?);
                }
                _ if self.options.create_sorted_index => {
                    log::warn!("column {name}: values are not sorted, skipping sorted forward index");
                }
                _ => {}
            }
            (stats, size)
        } else {
            let mut writer = FixedBitMultiValueWriter::new(num_docs, self.forward.total_values(), bits)?;
            let stats = builder.build(&mut writer, sink)?;
            (stats, write_file(dir, &mv_forward_file(name), |w| writer.finish(w))?)
        };

        let inverted_index_size = match inverted {
            Some(creator) => Some(write_file(dir, &inverted_file(name), |w| creator.finish(w))?),
            None          => None,
        };

        log::info!(
            "column {name}: {num_docs} docs, cardinality {cardinality}, {bits} bits/value, sorted={}",
            stats.is_sorted
        );
        Ok(ColumnMetadata {
            name:                name.to_string(),
            data_type:           self.spec.data_type,
            single_valued:       self.spec.single_valued,
            cardinality,
            bits_per_element:    bits,
            total_docs:          num_docs,
            total_values:        stats.total_values,
            max_values_per_doc:  stats.max_values_per_doc,
            is_sorted:           stats.is_sorted,
            has_inverted_index:  inverted_index_size.is_some(),
            dictionary_size,
            forward_index_size,
            inverted_index_size,
            sorted_index_size,
        })
    }
}

/// 单值正排与排序区间正排共用一遍；出现逆序后只保留单值正排
struct SingleValueOutput {
    packed: FixedBitSingleValueWriter,
    sorted: Option<SortedIndexWriter>,
}

impl ForwardIndexWriter for SingleValueOutput {
    fn write_doc(&mut self, doc_id: DocId, dict_ids: &[DictId]) -> Result<()> {
        self.packed.write_doc(doc_id, dict_ids)?;
        if let Some(sorted) = self.sorted.as_mut() {
            match sorted.write_doc(doc_id, dict_ids) {
                Ok(()) => {}
                Err(SegmentError::UnsortedValue { .. }) => self.sorted = None,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn write_file<F>(dir: &SegmentDirectory, name: &str, write: F) -> Result<u64>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<u64>,
{
    let mut file = dir.create_file(name)?;
    let size = write(&mut file)?;
    file.flush()?;
    log::debug!("wrote {name} ({size} bytes)");
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::file::DictionaryReader;
    use crate::inverted::BitmapInvertedIndexReader;
    use crate::packed::{FixedBitMultiValueReader, FixedBitSingleValueReader, SortedIndexReader};

    #[test]
    fn single_value_column_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SegmentDirectory::new(tmp.path()).unwrap();
        let spec = FieldSpec::new("price", DataType::Int32);
        let mut col = ColumnIndexCreator::new(spec, ColumnCreatorOptions::default().with_inverted_index(true));
        for v in [30i32, 10, 20, 40, 10] {
            col.index_value(v.into()).unwrap();
        }
        col.seal_dictionary().unwrap();
        let meta = col.build(&dir, None).unwrap();
        assert_eq!(meta.cardinality, 4);
        assert_eq!(meta.bits_per_element, 2);
        assert_eq!(meta.total_values, 5);
        assert!(!meta.is_sorted);
        assert!(meta.has_inverted_index);
        assert_eq!(meta.sorted_index_size, None);

        let dict = DictionaryReader::open(dir.open_mmap("price.dict").unwrap()).unwrap();
        assert_eq!(dict.index_of(&40i32).unwrap(), Some(3));

        let fwd = FixedBitSingleValueReader::open(dir.open_mmap("price.sv.fwd").unwrap()).unwrap();
        let mut ctx = fwd.create_context();
        let decoded: Vec<i32> = (0..5)
            .map(|d| dict.value_at::<i32>(fwd.get_value(d, &mut ctx).unwrap()).unwrap())
            .collect();
        assert_eq!(decoded, vec![30, 10, 20, 40, 10]);

        let inv = BitmapInvertedIndexReader::open(dir.open_mmap("price.inv").unwrap()).unwrap();
        assert_eq!(inv.doc_ids(0).unwrap().iter().collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(meta.inverted_index_size, Some(std::fs::metadata(dir.path("price.inv")).unwrap().len()));
    }

    #[test]
    fn multi_value_with_nulls() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SegmentDirectory::new(tmp.path()).unwrap();
        let spec = FieldSpec::new("tags", DataType::String).multi_valued().nullable();
        let mut col = ColumnIndexCreator::new(spec, ColumnCreatorOptions::default());
        col.index_value(Cell::Multi(vec!["b".into(), "a".into()])).unwrap();
        col.index_value(Cell::Null).unwrap();
        col.index_value("c".into()).unwrap();
        col.index_value(Cell::Multi(vec![])).unwrap();
        col.seal_dictionary().unwrap();
        let meta = col.build(&dir, None).unwrap();
        assert_eq!(meta.cardinality, 4);
        assert_eq!(meta.max_values_per_doc, 2);
        assert_eq!(meta.inverted_index_size, None);
        assert!(!dir.exists("tags.inv"));

        let dict = DictionaryReader::open(dir.open_mmap("tags.dict").unwrap()).unwrap();
        let fwd  = FixedBitMultiValueReader::open(dir.open_mmap("tags.mv.fwd").unwrap()).unwrap();
        let mut ctx = fwd.create_context();
        let mut buf = [0u32; 2];
        let mut docs = Vec::new();
        for d in 0..4 {
            let n = fwd.get_values(d, &mut buf, &mut ctx).unwrap();
            let mut vals = Vec::new();
            dict.read_values::<String>(&buf[..n], &mut vals).unwrap();
            docs.push(vals);
        }
        assert_eq!(docs, vec![
            vec!["b".to_string(), "a".to_string()],
            vec!["null".to_string()],
            vec!["c".to_string()],
            vec![],
        ]);
    }

    #[test]
    fn rejects_bad_cells_with_column_name() {
        let mut col = ColumnIndexCreator::new(FieldSpec::new("id", DataType::Int64), ColumnCreatorOptions::default());
        let err = col.index_value(Cell::Null).unwrap_err();
        assert!(matches!(err.root(), SegmentError::SchemaMismatch(_)));
        assert!(err.to_string().starts_with("column `id`"));
        assert!(matches!(col.index_value(1i32.into()).unwrap_err().root(), SegmentError::TypeMismatch { .. }));
        assert!(matches!(
            col.index_value(Cell::Multi(vec![Value::Int64(1)])).unwrap_err().root(),
            SegmentError::SchemaMismatch(_)
        ));
        assert_eq!(col.num_docs(), 0);
    }

    #[test]
    fn build_requires_sealed_dictionary() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SegmentDirectory::new(tmp.path()).unwrap();
        let mut col = ColumnIndexCreator::new(FieldSpec::new("x", DataType::Float64), ColumnCreatorOptions::default());
        col.index_value(1.5f64.into()).unwrap();
        let err = col.build(&dir, None).unwrap_err();
        assert!(matches!(err.root(), SegmentError::SealedDictionary(_)));
    }

    #[test]
    fn sorted_column_gets_range_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SegmentDirectory::new(tmp.path()).unwrap();
        let opts = ColumnCreatorOptions::default().with_sorted_index(true);
        let mut col = ColumnIndexCreator::new(FieldSpec::new("day", DataType::Int32), opts);
        for v in [3i32, 1, 3, 2, 1, 3] {
            col.index_value(v.into()).unwrap();
        }
        col.seal_dictionary().unwrap();
        let remap = DocIdRemap::sort_by_column(&col.sorted_ids_by_doc().unwrap());
        let meta = col.build(&dir, Some(&remap)).unwrap();
        assert!(meta.is_sorted);
        assert_eq!(meta.sorted_index_size, Some(std::fs::metadata(dir.path("day.sorted.fwd")).unwrap().len()));

        let sorted = SortedIndexReader::open(dir.open_mmap("day.sorted.fwd").unwrap()).unwrap();
        let packed = FixedBitSingleValueReader::open(dir.open_mmap("day.sv.fwd").unwrap()).unwrap();
        assert_eq!(sorted.doc_range(0).unwrap(), 0..2);
        assert_eq!(sorted.doc_range(1).unwrap(), 2..3);
        assert_eq!(sorted.doc_range(2).unwrap(), 3..6);
        let (mut sctx, mut pctx) = (sorted.create_context(), packed.create_context());
        for doc in 0..6 {
            assert_eq!(sorted.get_value(doc, &mut sctx).unwrap(), packed.get_value(doc, &mut pctx).unwrap());
        }
    }

    #[test]
    fn unsorted_values_skip_range_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SegmentDirectory::new(tmp.path()).unwrap();
        let opts = ColumnCreatorOptions::default().with_sorted_index(true);
        let mut col = ColumnIndexCreator::new(FieldSpec::new("day", DataType::Int32), opts);
        for v in [3i32, 1, 2] {
            col.index_value(v.into()).unwrap();
        }
        col.seal_dictionary().unwrap();
        let meta = col.build(&dir, None).unwrap();
        assert!(!meta.is_sorted);
        assert_eq!(meta.sorted_index_size, None);
        assert!(!dir.exists("day.sorted.fwd"));
        assert!(dir.exists("day.sv.fwd"));
    }

    #[test]
    fn sorted_ids_for_sort_column() {
        let mut col = ColumnIndexCreator::new(FieldSpec::new("k", DataType::Int32), ColumnCreatorOptions::default());
        for v in [5i32, 1, 3] {
            col.index_value(v.into()).unwrap();
        }
        col.seal_dictionary().unwrap();
        assert_eq!(col.sorted_ids_by_doc().unwrap(), vec![2, 0, 1]);

        let mv = ColumnIndexCreator::new(FieldSpec::new("m", DataType::Int32).multi_valued(), ColumnCreatorOptions::default());
        assert!(mv.sorted_ids_by_doc().is_err());
    }
}
