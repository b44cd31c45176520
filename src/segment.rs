//! 段构建：按行摄入，按列并行构建
//!
//! ```text
//! append_row(cells) ──► ColumnIndexCreator × N   (字典 + 中间正排)
//!                              │
//! build(dir)                   ▼
//!   1. 所有列 seal 字典（并行）
//!   2. 若有排序列：按其 sorted id 稳定排序得到 DocIdRemap
//!   3. 每列一个 worker 写出 .dict / .fwd / .inv（rayon，共享同一份 remap）；
//!      排序列另写 .sorted.fwd
//! ```

use rayon::prelude::*;

use crate::column_creator::{ColumnCreatorOptions, ColumnIndexCreator, ColumnMetadata};
use crate::common::{DocId, Result, SegmentError};
use crate::directory::SegmentDirectory;
use crate::doc_remap::DocIdRemap;
use crate::field_type::{Cell, FieldSpec};

/// 段构建结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMetadata {
    pub num_docs:      u32,
    pub sorted_column: Option<String>,
    pub columns:       Vec<ColumnMetadata>,
}

impl SegmentMetadata {
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }
}

pub struct SegmentCreator {
    columns:       Vec<ColumnIndexCreator>,
    /// 物理排序列在 schema 中的下标
    sorted_column: Option<usize>,
    num_docs:      u32,
}

impl SegmentCreator {
    pub fn new(schema: Vec<FieldSpec>) -> Self {
        let columns = schema
            .into_iter()
            .map(|spec| ColumnIndexCreator::new(spec, ColumnCreatorOptions::default()))
            .collect();
        Self { columns, sorted_column: None, num_docs: 0 }
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.spec().name == name)
            .ok_or_else(|| SegmentError::ColumnNotFound(name.to_string()))
    }

    /// 段按该列物理排序；只能是单值列
    pub fn with_sorted_column(mut self, name: &str) -> Result<Self> {
        let idx = self.column_index(name)?;
        if !self.columns[idx].spec().single_valued {
            return Err(SegmentError::SchemaMismatch(format!("sort column `{name}` must be single-valued")));
        }
        if let Some(prev) = self.sorted_column {
            let opts = self.columns[prev].options().with_sorted_index(false);
            self.columns[prev].set_options(opts);
        }
        let opts = self.columns[idx].options().with_sorted_index(true);
        self.columns[idx].set_options(opts);
        self.sorted_column = Some(idx);
        Ok(self)
    }

    pub fn with_inverted_index(mut self, names: &[&str]) -> Result<Self> {
        for name in names {
            let idx  = self.column_index(name)?;
            let opts = self.columns[idx].options().with_inverted_index(true);
            self.columns[idx].set_options(opts);
        }
        Ok(self)
    }

    pub fn num_docs(&self) -> u32 { self.num_docs }

    /// 追加一行，`row` 与 schema 一一对应；整行先校验再写入
    pub fn append_row(&mut self, row: Vec<Cell>) -> Result<DocId> {
        if row.len() != self.columns.len() {
            return Err(SegmentError::SchemaMismatch(format!(
                "row has {} cells, schema has {} columns", row.len(), self.columns.len()
            )));
        }
        for (col, cell) in self.columns.iter().zip(&row) {
            col.check_cell(cell)?;
        }
        for (col, cell) in self.columns.iter_mut().zip(row) {
            col.index_value(cell)?;
        }
        self.num_docs += 1;
        Ok(self.num_docs - 1)
    }

    /// 写出所有列的索引文件
    pub fn build(mut self, dir: &SegmentDirectory) -> Result<SegmentMetadata> {
        self.columns.par_iter_mut().try_for_each(|col| col.seal_dictionary())?;

        let doc_remap = match self.sorted_column {
            Some(idx) => {
                let remap = DocIdRemap::sort_by_column(&self.columns[idx].sorted_ids_by_doc()?);
                log::debug!(
                    "segment sorted by {} (already in order: {})",
                    self.columns[idx].spec().name, remap.is_identity()
                );
                Some(remap)
            }
            None => None,
        };
        let sorted_column = self.sorted_column.map(|idx| self.columns[idx].spec().name.clone());

        let columns = self
            .columns
            .into_par_iter()
            .map(|col| col.build(dir, doc_remap.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "segment built in {}: {} docs, {} columns",
            dir.root().display(), self.num_docs, columns.len()
        );
        Ok(SegmentMetadata { num_docs: self.num_docs, sorted_column, columns })
    }
}
