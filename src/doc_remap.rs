//! 文档号重映射
//!
//! 段按某列物理排序时，`new_to_old[new_doc_id] = old_doc_id`；
//! 未排序段使用恒等置换（或直接不传）。

use crate::common::{DictId, DocId, Result, SegmentError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocIdRemap {
    new_to_old: Vec<DocId>,
}

impl DocIdRemap {
    pub fn identity(num_docs: u32) -> Self {
        Self { new_to_old: (0..num_docs).collect() }
    }

    /// 校验为 `[0, n)` 上的双射
    pub fn from_new_to_old(new_to_old: Vec<DocId>) -> Result<Self> {
        let mut seen = vec![false; new_to_old.len()];
        for (new_id, &old_id) in new_to_old.iter().enumerate() {
            match seen.get_mut(old_id as usize) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(SegmentError::InvalidDocRemap(format!(
                        "old doc {old_id} mapped twice (new doc {new_id})"
                    )))
                }
                None => {
                    return Err(SegmentError::InvalidDocRemap(format!(
                        "old doc {old_id} out of range for {} docs", new_to_old.len()
                    )))
                }
            }
        }
        Ok(Self { new_to_old })
    }

    /// 按排序列每个 old doc 的 sorted 字典 ID 稳定排序
    pub fn sort_by_column(sorted_ids_by_old_doc: &[DictId]) -> Self {
        let mut new_to_old: Vec<DocId> = (0..sorted_ids_by_old_doc.len() as DocId).collect();
        new_to_old.sort_by_key(|&old| sorted_ids_by_old_doc[old as usize]);
        Self { new_to_old }
    }

    pub fn num_docs(&self) -> u32 { self.new_to_old.len() as u32 }

    pub fn old_doc_id(&self, new_doc_id: DocId) -> Result<DocId> {
        self.new_to_old.get(new_doc_id as usize).copied().ok_or(SegmentError::DocIdOutOfRange {
            doc_id:   new_doc_id,
            num_docs: self.num_docs(),
        })
    }

    pub fn new_to_old(&self) -> &[DocId] { &self.new_to_old }

    pub fn is_identity(&self) -> bool {
        self.new_to_old.iter().enumerate().all(|(i, &old)| i as DocId == old)
    }

    /// 逆置换：`old_to_new[old_doc_id] = new_doc_id`
    pub fn old_to_new(&self) -> Vec<DocId> {
        let mut inverse = vec![0; self.new_to_old.len()];
        for (new_id, &old_id) in self.new_to_old.iter().enumerate() {
            inverse[old_id as usize] = new_id as DocId;
        }
        inverse
    }
}
