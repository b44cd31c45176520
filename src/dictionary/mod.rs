//! 字典编码
//!
//! 构建期流程：
//! - `add_value` 按首次出现顺序分配 old id（重复值返回已有 id）
//! - `seal` 排序去重后的值，生成 `SortedDictIdMap`（old id → sorted id）
//! - seal 之后只读：`index_of` 二分查找，`value_at` 按位置访问
//!
//! 五种值类型通过 [`DictValue`] 能力接口统一处理，
//! [`ColumnDictionary`] 是面向动态 `Value` 的封闭枚举。

pub mod file;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::io::Write;

use crate::common::{DictId, Result, SegmentError};
use crate::field_type::{DataType, Value};

// ── DictValue ─────────────────────────────────────────────────────────────────

/// 可进入字典的值类型
pub trait DictValue: Clone + fmt::Debug + Send + Sync + 'static {
    /// 去重用的哈希键（浮点按位模式，NaN 统一为一个）
    type Key: Eq + Hash + fmt::Debug + Send + Sync;

    const DATA_TYPE: DataType;

    fn dedup_key(&self) -> Self::Key;
    /// 规范形式：入库值与查找值都先经过它（浮点 NaN 统一为正的 quiet NaN）
    fn canonical(self) -> Self { self }
    /// 全序比较（浮点为 IEEE-754 total order）
    fn total_cmp(&self, other: &Self) -> Ordering;

    fn from_value(value: Value) -> std::result::Result<Self, Value>;
    fn from_value_ref(value: &Value) -> Option<&Self>;
    fn into_value(self) -> Value;

    /// 字典文件中每个条目的字节宽度
    fn entry_width(sorted: &[Self]) -> usize;
    /// 按 `width` 写出一个条目
    fn encode_entry(&self, width: usize, out: &mut Vec<u8>);
    fn decode_entry(bytes: &[u8]) -> Result<Self>;
    /// 直接与编码后的条目比较，二分查找时免去反序列化
    fn cmp_encoded(bytes: &[u8], probe: &Self) -> Ordering;
}

macro_rules! numeric_dict_value {
    ($ty:ty, $variant:ident, $key:ty, $width:expr, $key_fn:expr, $canon:expr, $cmp:expr) => {
        impl DictValue for $ty {
            type Key = $key;

            const DATA_TYPE: DataType = DataType::$variant;

            fn dedup_key(&self) -> $key { $key_fn(*self) }
            fn canonical(self) -> Self { $canon(self) }
            fn total_cmp(&self, other: &Self) -> Ordering { $cmp(self, other) }

            fn from_value(value: Value) -> std::result::Result<Self, Value> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }
            fn from_value_ref(value: &Value) -> Option<&Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
            fn into_value(self) -> Value { Value::$variant(self) }

            fn entry_width(_sorted: &[Self]) -> usize { $width }
            fn encode_entry(&self, _width: usize, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
            fn decode_entry(bytes: &[u8]) -> Result<Self> {
                let raw: [u8; $width] = bytes.try_into().map_err(|_| {
                    SegmentError::InvalidFormat(format!("dictionary entry of {} bytes", bytes.len()))
                })?;
                Ok(<$ty>::from_le_bytes(raw))
            }
            fn cmp_encoded(bytes: &[u8], probe: &Self) -> Ordering {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(&bytes[..$width]);
                $cmp(&<$ty>::from_le_bytes(raw), &(*probe).canonical())
            }
        }
    };
}

numeric_dict_value!(i32, Int32, i32, 4, |v: i32| v, |v: i32| v, |a: &i32, b: &i32| a.cmp(b));
numeric_dict_value!(i64, Int64, i64, 8, |v: i64| v, |v: i64| v, |a: &i64, b: &i64| a.cmp(b));
numeric_dict_value!(
    f32, Float32, u32, 4,
    |v: f32| if v.is_nan() { f32::NAN.to_bits() } else { v.to_bits() },
    |v: f32| if v.is_nan() { f32::NAN } else { v },
    |a: &f32, b: &f32| a.total_cmp(b)
);
numeric_dict_value!(
    f64, Float64, u64, 8,
    |v: f64| if v.is_nan() { f64::NAN.to_bits() } else { v.to_bits() },
    |v: f64| if v.is_nan() { f64::NAN } else { v },
    |a: &f64, b: &f64| a.total_cmp(b)
);

/// 字符串条目右侧以 0x00 填充到最长条目的长度
impl DictValue for String {
    type Key = String;

    const DATA_TYPE: DataType = DataType::String;

    fn dedup_key(&self) -> String { self.clone() }
    fn total_cmp(&self, other: &Self) -> Ordering { self.cmp(other) }

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(other),
        }
    }
    fn from_value_ref(value: &Value) -> Option<&Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
    fn into_value(self) -> Value { Value::String(self) }

    fn entry_width(sorted: &[Self]) -> usize {
        sorted.iter().map(String::len).max().unwrap_or(0)
    }
    fn encode_entry(&self, width: usize, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
        out.resize(out.len() + (width - self.len()), 0);
    }
    fn decode_entry(bytes: &[u8]) -> Result<Self> {
        let s = std::str::from_utf8(trim_padding(bytes))
            .map_err(|e| SegmentError::InvalidFormat(format!("dictionary string: {e}")))?;
        Ok(s.to_owned())
    }
    fn cmp_encoded(bytes: &[u8], probe: &Self) -> Ordering {
        trim_padding(bytes).cmp(probe.as_bytes())
    }
}

fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    &bytes[..end]
}

// ── SortedDictIdMap ───────────────────────────────────────────────────────────

/// seal 后产出的不可变置换：`sorted_ids[old_id] = sorted_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedDictIdMap {
    sorted_ids: Vec<DictId>,
}

impl SortedDictIdMap {
    /// 由现成的置换构造（须为 0..n 的双射）
    pub fn from_vec(sorted_ids: Vec<DictId>) -> Result<Self> {
        let mut seen = vec![false; sorted_ids.len()];
        for &id in &sorted_ids {
            match seen.get_mut(id as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(SegmentError::InvalidFormat(format!(
                        "sorted dict id map is not a permutation (id {id})"
                    )))
                }
            }
        }
        Ok(Self { sorted_ids })
    }

    pub fn cardinality(&self) -> u32 { self.sorted_ids.len() as u32 }
    pub fn as_slice(&self) -> &[DictId] { &self.sorted_ids }

    pub fn sorted_id(&self, old_id: DictId) -> Result<DictId> {
        self.sorted_ids.get(old_id as usize).copied().ok_or(SegmentError::DictIdOutOfRange {
            dict_id:     old_id,
            cardinality: self.cardinality(),
        })
    }
}

// ── DictionaryEncoder ─────────────────────────────────────────────────────────

#[derive(Debug)]
struct Sealed<T> {
    sorted_values: Vec<T>,
    sorted_ids:    SortedDictIdMap,
}

/// 单列字典编码器
#[derive(Debug)]
pub struct DictionaryEncoder<T: DictValue> {
    ids:    HashMap<T::Key, DictId>,
    /// old id 顺序的值
    values: Vec<T>,
    sealed: Option<Sealed<T>>,
}

impl<T: DictValue> Default for DictionaryEncoder<T> {
    fn default() -> Self { Self::new() }
}

impl<T: DictValue> DictionaryEncoder<T> {
    pub fn new() -> Self {
        Self { ids: HashMap::new(), values: Vec::new(), sealed: None }
    }

    pub fn cardinality(&self) -> u32 { self.values.len() as u32 }
    pub fn is_sealed(&self) -> bool { self.sealed.is_some() }

    /// 返回 old id；重复值返回已分配的 id
    pub fn add_value(&mut self, value: T) -> Result<DictId> {
        if self.sealed.is_some() {
            return Err(SegmentError::SealedDictionary("add_value after seal"));
        }
        let value = value.canonical();
        let next = self.values.len() as DictId;
        let id = *self.ids.entry(value.dedup_key()).or_insert(next);
        if id == next {
            self.values.push(value);
        }
        Ok(id)
    }

    /// 排序所有值并生成 old → sorted 置换；只能调用一次
    pub fn seal(&mut self) -> Result<&SortedDictIdMap> {
        if self.sealed.is_some() {
            return Err(SegmentError::SealedDictionary("seal called twice"));
        }
        let mut order: Vec<DictId> = (0..self.cardinality()).collect();
        order.sort_unstable_by(|&a, &b| self.values[a as usize].total_cmp(&self.values[b as usize]));

        let mut sorted_ids = vec![0; order.len()];
        for (sorted_id, &old_id) in order.iter().enumerate() {
            sorted_ids[old_id as usize] = sorted_id as DictId;
        }
        let sorted_values = order.iter().map(|&old| self.values[old as usize].clone()).collect();
        self.ids = HashMap::new();

        let sealed = self.sealed.insert(Sealed {
            sorted_values,
            sorted_ids: SortedDictIdMap { sorted_ids },
        });
        Ok(&sealed.sorted_ids)
    }

    fn sealed(&self) -> Result<&Sealed<T>> {
        self.sealed.as_ref().ok_or(SegmentError::SealedDictionary("dictionary not sealed"))
    }

    pub fn sorted_dict_ids(&self) -> Result<&SortedDictIdMap> {
        Ok(&self.sealed()?.sorted_ids)
    }

    pub fn sorted_values(&self) -> Result<&[T]> {
        Ok(&self.sealed()?.sorted_values)
    }

    /// 二分查找 sorted id；不存在返回 `None`
    pub fn index_of(&self, value: &T) -> Result<Option<DictId>> {
        let sorted = &self.sealed()?.sorted_values;
        let value = value.clone().canonical();
        Ok(sorted.binary_search_by(|entry| entry.total_cmp(&value)).ok().map(|i| i as DictId))
    }

    pub fn value_at(&self, sorted_id: DictId) -> Result<&T> {
        let sorted = &self.sealed()?.sorted_values;
        sorted.get(sorted_id as usize).ok_or(SegmentError::DictIdOutOfRange {
            dict_id:     sorted_id,
            cardinality: sorted.len() as u32,
        })
    }

    /// 将 seal 后的字典写成字典文件，返回字节数
    pub fn write_to<W: Write>(&self, writer: W) -> Result<u64> {
        file::write_dictionary(self.sorted_values()?, writer)
    }
}

// ── ColumnDictionary ──────────────────────────────────────────────────────────

/// 按列类型分派的字典编码器
#[derive(Debug)]
pub enum ColumnDictionary {
    Int32(DictionaryEncoder<i32>),
    Int64(DictionaryEncoder<i64>),
    Float32(DictionaryEncoder<f32>),
    Float64(DictionaryEncoder<f64>),
    String(DictionaryEncoder<String>),
}

macro_rules! with_encoder {
    ($self:expr, $enc:ident => $body:expr) => {
        match $self {
            ColumnDictionary::Int32($enc)   => $body,
            ColumnDictionary::Int64($enc)   => $body,
            ColumnDictionary::Float32($enc) => $body,
            ColumnDictionary::Float64($enc) => $body,
            ColumnDictionary::String($enc)  => $body,
        }
    };
}

fn add_typed<T: DictValue>(enc: &mut DictionaryEncoder<T>, value: Value) -> Result<DictId> {
    let typed = T::from_value(value).map_err(|v| SegmentError::TypeMismatch {
        expected: T::DATA_TYPE,
        found:    format!("{:?}", v.data_type()),
    })?;
    enc.add_value(typed)
}

fn index_of_typed<T: DictValue>(enc: &DictionaryEncoder<T>, value: &Value) -> Result<Option<DictId>> {
    let typed = T::from_value_ref(value).ok_or_else(|| SegmentError::TypeMismatch {
        expected: T::DATA_TYPE,
        found:    format!("{:?}", value.data_type()),
    })?;
    enc.index_of(typed)
}

impl ColumnDictionary {
    pub fn new(data_type: DataType) -> Self {
        match data_type {
            DataType::Int32   => Self::Int32(DictionaryEncoder::new()),
            DataType::Int64   => Self::Int64(DictionaryEncoder::new()),
            DataType::Float32 => Self::Float32(DictionaryEncoder::new()),
            DataType::Float64 => Self::Float64(DictionaryEncoder::new()),
            DataType::String  => Self::String(DictionaryEncoder::new()),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int32(_)   => DataType::Int32,
            Self::Int64(_)   => DataType::Int64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::String(_)  => DataType::String,
        }
    }

    pub fn cardinality(&self) -> u32 {
        with_encoder!(self, e => e.cardinality())
    }

    pub fn add_value(&mut self, value: Value) -> Result<DictId> {
        with_encoder!(self, e => add_typed(e, value))
    }

    pub fn seal(&mut self) -> Result<&SortedDictIdMap> {
        with_encoder!(self, e => e.seal())
    }

    pub fn sorted_dict_ids(&self) -> Result<&SortedDictIdMap> {
        with_encoder!(self, e => e.sorted_dict_ids())
    }

    pub fn index_of(&self, value: &Value) -> Result<Option<DictId>> {
        with_encoder!(self, e => index_of_typed(e, value))
    }

    pub fn value_at(&self, sorted_id: DictId) -> Result<Value> {
        with_encoder!(self, e => e.value_at(sorted_id).map(|v| v.clone().into_value()))
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<u64> {
        with_encoder!(self, e => e.write_to(writer))
    }
}
