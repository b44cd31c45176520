//! 最终正排索引构建（单次遍历）
//!
//! 按新 doc_id 顺序遍历一次中间索引，同时完成：
//!   1. 文档号重映射（new → old，段物理排序时）
//!   2. 字典 ID 重映射（old id → sorted id）
//!   3. 写入定宽位打包正排
//!   4. 将同一批重映射后的 ID 喂给倒排索引
//!
//! 正排写入器与倒排 sink 都要求 doc_id 单调到达，因此遍历严格顺序进行；
//! 中间索引只读一次。

use crate::common::{DictId, DocId, Result, SegmentError};
use crate::dictionary::SortedDictIdMap;
use crate::doc_remap::DocIdRemap;
use crate::intermediate::IntermediateSource;
use crate::inverted::InvertedIndexSink;
use crate::packed::{FixedBitMultiValueWriter, FixedBitSingleValueWriter};

/// 最终正排写入端的统一能力接口
pub trait ForwardIndexWriter {
    fn write_doc(&mut self, doc_id: DocId, dict_ids: &[DictId]) -> Result<()>;
}

impl ForwardIndexWriter for FixedBitSingleValueWriter {
    fn write_doc(&mut self, doc_id: DocId, dict_ids: &[DictId]) -> Result<()> {
        match dict_ids {
            [id] => self.set_value(doc_id, *id),
            _ => Err(SegmentError::CapacityMismatch { doc_id, found: dict_ids.len(), max: 1 }),
        }
    }
}

impl ForwardIndexWriter for FixedBitMultiValueWriter {
    fn write_doc(&mut self, doc_id: DocId, dict_ids: &[DictId]) -> Result<()> {
        self.set_values(doc_id, dict_ids)
    }
}

/// 一次构建的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildStats {
    pub num_docs:           u32,
    pub total_values:       u64,
    pub max_values_per_doc: u32,
    /// 每个 doc 恰有一个值且按新 doc_id 非递减
    pub is_sorted:          bool,
}

pub struct ForwardIndexBuilder<'a, S> {
    source:          &'a S,
    sorted_dict_ids: &'a SortedDictIdMap,
    doc_remap:       Option<&'a DocIdRemap>,
}

impl<'a, S: IntermediateSource> ForwardIndexBuilder<'a, S> {
    pub fn new(source: &'a S, sorted_dict_ids: &'a SortedDictIdMap) -> Self {
        Self { source, sorted_dict_ids, doc_remap: None }
    }

    pub fn with_doc_remap(mut self, doc_remap: Option<&'a DocIdRemap>) -> Self {
        self.doc_remap = doc_remap; self
    }

    /// 执行单次遍历；`inverted` 存在时与正排共用同一份重映射结果
    pub fn build<W: ForwardIndexWriter>(
        &self,
        writer:   &mut W,
        inverted: Option<&mut dyn InvertedIndexSink>,
    ) -> Result<BuildStats> {
        let num_docs = self.source.num_docs();
        if let Some(remap) = self.doc_remap {
            if remap.num_docs() != num_docs {
                return Err(SegmentError::InvalidDocRemap(format!(
                    "remap covers {} docs, intermediate index has {num_docs}", remap.num_docs()
                )));
            }
        }

        let mut inverted = inverted;
        // 复用的暂存区，容量为该列单 doc 最大值个数
        let mut dict_ids = vec![0 as DictId; self.source.max_values_per_doc() as usize];
        let mut stats    = BuildStats { num_docs, is_sorted: true, ..Default::default() };
        let mut prev: Option<DictId> = None;

        for new_doc_id in 0..num_docs {
            let old_doc_id = match self.doc_remap {
                Some(remap) => remap.old_doc_id(new_doc_id)?,
                None => new_doc_id,
            };
            let count = self.source.read_values(old_doc_id, &mut dict_ids).map_err(|e| match e {
                SegmentError::BufferTooSmall { needed, capacity, .. } => SegmentError::CapacityMismatch {
                    doc_id: old_doc_id,
                    found:  needed,
                    max:    capacity,
                },
                e => e,
            })?;

            let ids = &mut dict_ids[..count];
            for id in ids.iter_mut() {
                *id = self.sorted_dict_ids.sorted_id(*id)?;
            }
            writer.write_doc(new_doc_id, ids)?;
            if let Some(sink) = inverted.as_mut() {
                sink.add(ids)?;
            }

            stats.total_values      += count as u64;
            stats.max_values_per_doc = stats.max_values_per_doc.max(count as u32);
            match &*ids {
                [id] if prev.map_or(true, |p| p <= *id) => prev = Some(*id),
                _ => stats.is_sorted = false,
            }
        }

        log::debug!(
            "forward index pass: {} docs, {} values, remapped={}, inverted={}",
            num_docs, stats.total_values, self.doc_remap.is_some(), inverted.is_some()
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::bits_needed;
    use crate::dictionary::DictionaryEncoder;
    use crate::intermediate::IntermediateForwardIndex;
    use crate::inverted::{BitmapInvertedIndexCreator, BitmapInvertedIndexReader};
    use crate::packed::{FixedBitMultiValueReader, FixedBitSingleValueReader};

    /// 记录 sink 收到的每次调用
    #[derive(Default)]
    struct RecordingSink(Vec<Vec<DictId>>);

    impl InvertedIndexSink for RecordingSink {
        fn add(&mut self, dict_ids: &[DictId]) -> Result<()> {
            self.0.push(dict_ids.to_vec());
            Ok(())
        }
    }

    fn single_value_fixture() -> (IntermediateForwardIndex, SortedDictIdMap, u32) {
        let mut dict = DictionaryEncoder::<i32>::new();
        let mut fwd  = IntermediateForwardIndex::single_value();
        for v in [30, 10, 20, 40, 10] {
            let old = dict.add_value(v).unwrap();
            fwd.append(&[old]).unwrap();
        }
        let map = dict.seal().unwrap().clone();
        (fwd, map, bits_needed(dict.cardinality()))
    }

    fn decode_single(bytes: Vec<u8>) -> Vec<u32> {
        let reader = FixedBitSingleValueReader::open(bytes).unwrap();
        let mut ctx = reader.create_context();
        (0..reader.num_docs()).map(|d| reader.get_value(d, &mut ctx).unwrap()).collect()
    }

    #[test]
    fn single_value_remaps_to_sorted_ids() {
        let (fwd, map, bits) = single_value_fixture();
        assert_eq!(map.as_slice(), &[2, 0, 1, 3]);
        assert_eq!(bits, 2);

        let mut writer = FixedBitSingleValueWriter::new(5, bits).unwrap();
        let stats = ForwardIndexBuilder::new(&fwd, &map).build(&mut writer, None).unwrap();
        assert_eq!(stats.total_values, 5);
        assert!(!stats.is_sorted);

        let mut out = Vec::new();
        writer.finish(&mut out).unwrap();
        // old ids [0,1,2,3,1] → sorted ids
        assert_eq!(decode_single(out), vec![2, 0, 1, 3, 0]);
    }

    #[test]
    fn identity_remap_equals_plain_dictionary_remap() {
        let (fwd, map, bits) = single_value_fixture();
        let identity = DocIdRemap::identity(5);

        let mut plain = FixedBitSingleValueWriter::new(5, bits).unwrap();
        ForwardIndexBuilder::new(&fwd, &map).build(&mut plain, None).unwrap();
        let mut remapped = FixedBitSingleValueWriter::new(5, bits).unwrap();
        ForwardIndexBuilder::new(&fwd, &map)
            .with_doc_remap(Some(&identity))
            .build(&mut remapped, None)
            .unwrap();

        let (mut a, mut b) = (Vec::new(), Vec::new());
        plain.finish(&mut a).unwrap();
        remapped.finish(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn doc_remap_sorts_physical_order() {
        let (fwd, map, bits) = single_value_fixture();
        let by_value: Vec<DictId> = (0..5).map(|d| map.sorted_id(fwd.values(d).unwrap()[0]).unwrap()).collect();
        let remap = DocIdRemap::sort_by_column(&by_value);

        let mut writer = FixedBitSingleValueWriter::new(5, bits).unwrap();
        let stats = ForwardIndexBuilder::new(&fwd, &map)
            .with_doc_remap(Some(&remap))
            .build(&mut writer, None)
            .unwrap();
        assert!(stats.is_sorted);

        let mut out = Vec::new();
        writer.finish(&mut out).unwrap();
        assert_eq!(decode_single(out), vec![0, 0, 1, 2, 3]);
    }

    #[test]
    fn multi_value_preserves_order_and_feeds_sink() {
        let mut fwd = IntermediateForwardIndex::multi_value();
        fwd.append(&[1, 0]).unwrap();
        fwd.append(&[2]).unwrap();
        let map = SortedDictIdMap::from_vec(vec![0, 1, 2]).unwrap();

        let mut writer = FixedBitMultiValueWriter::new(2, fwd.total_values(), bits_needed(3)).unwrap();
        let mut sink   = RecordingSink::default();
        ForwardIndexBuilder::new(&fwd, &map).build(&mut writer, Some(&mut sink)).unwrap();
        assert_eq!(sink.0, vec![vec![1, 0], vec![2]]);

        let mut out = Vec::new();
        writer.finish(&mut out).unwrap();
        let reader = FixedBitMultiValueReader::open(out).unwrap();
        let mut ctx = reader.create_context();
        let mut buf = [0u32; 2];
        assert_eq!(reader.get_values(0, &mut buf, &mut ctx).unwrap(), 2);
        assert_eq!(buf, [1, 0]);
        assert_eq!(reader.get_values(1, &mut buf, &mut ctx).unwrap(), 1);
        assert_eq!(buf[0], 2);
    }

    #[test]
    fn fused_inverted_index_matches_second_pass() {
        // 多值列 + 文档重映射
        let raw_docs: Vec<Vec<u32>> = (0..200u32).map(|d| (0..d % 5).map(|v| (d * 7 + v * 3) % 13).collect()).collect();
        let mut fwd = IntermediateForwardIndex::multi_value();
        for ids in &raw_docs {
            fwd.append(ids).unwrap();
        }
        let map = SortedDictIdMap::from_vec((0..13).map(|i| (i * 5) % 13).collect()).unwrap();
        let remap = DocIdRemap::from_new_to_old((0..200).rev().collect()).unwrap();

        let mut writer = FixedBitMultiValueWriter::new(200, fwd.total_values(), bits_needed(13)).unwrap();
        let mut fused  = BitmapInvertedIndexCreator::new(13, 200);
        ForwardIndexBuilder::new(&fwd, &map)
            .with_doc_remap(Some(&remap))
            .build(&mut writer, Some(&mut fused))
            .unwrap();
        let mut fwd_bytes = Vec::new();
        writer.finish(&mut fwd_bytes).unwrap();

        // 独立的第二遍：从最终正排重新构建倒排
        let reader = FixedBitMultiValueReader::open(fwd_bytes).unwrap();
        let mut ctx = reader.create_context();
        let mut buf = vec![0u32; reader.max_values_per_doc() as usize];
        let mut second = BitmapInvertedIndexCreator::new(13, 200);
        for doc in 0..200 {
            let n = reader.get_values(doc, &mut buf, &mut ctx).unwrap();
            second.add_doc(doc, &buf[..n]).unwrap();
        }

        let (mut a, mut b) = (Vec::new(), Vec::new());
        fused.finish(&mut a).unwrap();
        second.finish(&mut b).unwrap();
        assert_eq!(a, b);

        let inv = BitmapInvertedIndexReader::open(a).unwrap();
        for dict_id in 0..13 {
            for doc in inv.doc_ids(dict_id).unwrap() {
                let old = remap.old_doc_id(doc).unwrap() as usize;
                assert!(raw_docs[old].iter().any(|&raw| map.sorted_id(raw).unwrap() == dict_id));
            }
        }
    }

    /// 声明的最大值个数小于实际数据
    struct LyingSource(IntermediateForwardIndex);

    impl IntermediateSource for LyingSource {
        fn num_docs(&self) -> u32 { self.0.num_docs() }
        fn max_values_per_doc(&self) -> u32 { 1 }
        fn read_values(&self, old_doc_id: DocId, out: &mut [DictId]) -> Result<usize> {
            self.0.read_values(old_doc_id, out)
        }
    }

    #[test]
    fn capacity_mismatch_is_fatal() {
        let mut fwd = IntermediateForwardIndex::multi_value();
        fwd.append(&[0]).unwrap();
        fwd.append(&[0, 1]).unwrap();
        let map = SortedDictIdMap::from_vec(vec![0, 1]).unwrap();
        let mut writer = FixedBitMultiValueWriter::new(2, 3, 1).unwrap();
        let err = ForwardIndexBuilder::new(&LyingSource(fwd), &map).build(&mut writer, None).unwrap_err();
        assert!(matches!(err, SegmentError::CapacityMismatch { doc_id: 1, found: 2, max: 1 }));
    }

    #[test]
    fn remap_length_must_match() {
        let (fwd, map, bits) = single_value_fixture();
        let remap = DocIdRemap::identity(4);
        let mut writer = FixedBitSingleValueWriter::new(5, bits).unwrap();
        let err = ForwardIndexBuilder::new(&fwd, &map)
            .with_doc_remap(Some(&remap))
            .build(&mut writer, None)
            .unwrap_err();
        assert!(matches!(err, SegmentError::InvalidDocRemap(_)));
    }
}
