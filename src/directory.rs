//! 段目录：一个段的所有索引文件放在同一目录下
//!
//! 文件命名：`<column>.dict` / `<column>.sv.fwd` / `<column>.mv.fwd` / `<column>.sorted.fwd` / `<column>.inv`

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::common::Result;

pub fn dictionary_file(column: &str) -> String { format!("{column}.dict") }
pub fn sv_forward_file(column: &str) -> String { format!("{column}.sv.fwd") }
pub fn mv_forward_file(column: &str) -> String { format!("{column}.mv.fwd") }
pub fn sorted_forward_file(column: &str) -> String { format!("{column}.sorted.fwd") }
pub fn inverted_file(column: &str) -> String { format!("{column}.inv") }

#[derive(Debug, Clone)]
pub struct SegmentDirectory {
    root: PathBuf,
}

impl SegmentDirectory {
    /// 打开（必要时创建）段目录
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn path(&self, name: &str) -> PathBuf { self.root.join(name) }

    pub fn exists(&self, name: &str) -> bool { self.path(name).is_file() }

    /// 创建（覆盖）文件，返回带缓冲的写入端
    pub fn create_file(&self, name: &str) -> Result<BufWriter<File>> {
        Ok(BufWriter::new(File::create(self.path(name))?))
    }

    /// 只读映射整个文件；读取器直接在映射上解码
    pub fn open_mmap(&self, name: &str) -> Result<Mmap> {
        let file = File::open(self.path(name))?;
        // 段文件构建完成后不再修改
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(mmap)
    }
}
