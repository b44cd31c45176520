//! 摄入期的中间正排索引
//!
//! 按 old doc_id 追加原始（未重映射）字典 ID；多值列额外记录每个 doc 的累计偏移。
//! 摄入结束后只读，最终正排构建完成即丢弃。

use crate::common::{DictId, DocId, Result, SegmentError};

/// 最终正排构建所消费的中间索引读取接口
pub trait IntermediateSource {
    fn num_docs(&self) -> u32;
    /// 单个 doc 的最大值个数（单值列为 1）
    fn max_values_per_doc(&self) -> u32;
    /// 将 old doc 的原始字典 ID 写入 `out`，返回个数
    fn read_values(&self, old_doc_id: DocId, out: &mut [DictId]) -> Result<usize>;
}

#[derive(Debug, Clone)]
pub struct IntermediateForwardIndex {
    /// 多值列的累计偏移（len = num_docs + 1）；单值列为 None
    offsets:            Option<Vec<u32>>,
    ids:                Vec<DictId>,
    max_values_per_doc: u32,
}

impl IntermediateForwardIndex {
    pub fn single_value() -> Self {
        Self { offsets: None, ids: Vec::new(), max_values_per_doc: 1 }
    }

    pub fn multi_value() -> Self {
        Self { offsets: Some(vec![0]), ids: Vec::new(), max_values_per_doc: 0 }
    }

    pub fn is_single_valued(&self) -> bool { self.offsets.is_none() }

    pub fn total_values(&self) -> u32 { self.ids.len() as u32 }

    /// 追加下一个 doc，返回其 old doc_id
    pub fn append(&mut self, dict_ids: &[DictId]) -> Result<DocId> {
        let doc_id = IntermediateSource::num_docs(self);
        match &mut self.offsets {
            None => {
                if dict_ids.len() != 1 {
                    return Err(SegmentError::CapacityMismatch { doc_id, found: dict_ids.len(), max: 1 });
                }
                self.ids.push(dict_ids[0]);
            }
            Some(offsets) => {
                self.ids.extend_from_slice(dict_ids);
                offsets.push(self.ids.len() as u32);
                self.max_values_per_doc = self.max_values_per_doc.max(dict_ids.len() as u32);
            }
        }
        Ok(doc_id)
    }

    /// old doc 的原始字典 ID
    pub fn values(&self, old_doc_id: DocId) -> Result<&[DictId]> {
        let num_docs = IntermediateSource::num_docs(self);
        if old_doc_id >= num_docs {
            return Err(SegmentError::DocIdOutOfRange { doc_id: old_doc_id, num_docs });
        }
        let d = old_doc_id as usize;
        Ok(match &self.offsets {
            None          => &self.ids[d..d + 1],
            Some(offsets) => &self.ids[offsets[d] as usize..offsets[d + 1] as usize],
        })
    }
}

impl IntermediateSource for IntermediateForwardIndex {
    fn num_docs(&self) -> u32 {
        match &self.offsets {
            None          => self.ids.len() as u32,
            Some(offsets) => (offsets.len() - 1) as u32,
        }
    }

    fn max_values_per_doc(&self) -> u32 { self.max_values_per_doc }

    fn read_values(&self, old_doc_id: DocId, out: &mut [DictId]) -> Result<usize> {
        let ids = self.values(old_doc_id)?;
        if ids.len() > out.len() {
            return Err(SegmentError::BufferTooSmall {
                doc_id:   old_doc_id,
                needed:   ids.len(),
                capacity: out.len(),
            });
        }
        out[..ids.len()].copy_from_slice(ids);
        Ok(ids.len())
    }
}
