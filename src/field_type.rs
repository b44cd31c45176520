//! 列描述符与运行时值类型

/// 列的存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Int64,
    Float32,
    Float64,
    /// UTF-8 字符串
    String,
}

impl DataType {
    /// 字典文件中的类型标记
    pub fn tag(self) -> u8 {
        match self {
            Self::Int32   => 1,
            Self::Int64   => 2,
            Self::Float32 => 3,
            Self::Float64 => 4,
            Self::String  => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Int32),
            2 => Some(Self::Int64),
            3 => Some(Self::Float32),
            4 => Some(Self::Float64),
            5 => Some(Self::String),
            _ => None,
        }
    }

    /// nullable 列遇到空值时写入的默认值
    pub fn default_null_value(self) -> Value {
        match self {
            Self::Int32   => Value::Int32(i32::MIN),
            Self::Int64   => Value::Int64(i64::MIN),
            Self::Float32 => Value::Float32(f32::NEG_INFINITY),
            Self::Float64 => Value::Float64(f64::NEG_INFINITY),
            Self::String  => Value::String("null".into()),
        }
    }

    /// 固定字节宽度；变长类型返回 None
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Int32 | Self::Float32 => Some(4),
            Self::Int64 | Self::Float64 => Some(8),
            Self::String                => None,
        }
    }
}

/// 列描述符（由 schema 层提供，构建开始后不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name:           String,
    pub data_type:      DataType,
    pub single_valued:  bool,
    pub is_nullable:    bool,
}

impl FieldSpec {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self { name: name.into(), data_type, single_valued: true, is_nullable: false }
    }

    pub fn multi_valued(mut self) -> Self {
        self.single_valued = false; self
    }
    pub fn nullable(mut self) -> Self {
        self.is_nullable = true; self
    }
}

/// 列值（运行时表示）
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int32(_)   => DataType::Int32,
            Self::Int64(_)   => DataType::Int64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::String(_)  => DataType::String,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Self::Int32(v) }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self { Self::Int64(v) }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self { Self::Float32(v) }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self { Self::Float64(v) }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self { Self::String(v.into()) }
}
impl From<String> for Value {
    fn from(v: String) -> Self { Self::String(v) }
}

/// 一行中某列的输入
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Single(Value),
    Multi(Vec<Value>),
}

impl From<Value> for Cell {
    fn from(v: Value) -> Self { Self::Single(v) }
}
impl From<i32> for Cell {
    fn from(v: i32) -> Self { Self::Single(v.into()) }
}
impl From<i64> for Cell {
    fn from(v: i64) -> Self { Self::Single(v.into()) }
}
impl From<f32> for Cell {
    fn from(v: f32) -> Self { Self::Single(v.into()) }
}
impl From<f64> for Cell {
    fn from(v: f64) -> Self { Self::Single(v.into()) }
}
impl From<&str> for Cell {
    fn from(v: &str) -> Self { Self::Single(v.into()) }
}
impl From<Vec<Value>> for Cell {
    fn from(v: Vec<Value>) -> Self { Self::Multi(v) }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int32(v)   => write!(f, "{v}"),
            Self::Int64(v)   => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::String(s)  => write!(f, "{s}"),
        }
    }
}
