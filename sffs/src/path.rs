use vfs::{Error, Result};

use crate::volume::Fst;

/// 路径的最大字节数
pub const MAX_PATH_LEN: usize = 64;
/// 创建目录时路径中`/`的最大个数
pub const MAX_PATH_DEPTH: usize = 8;

pub trait Path {
    /// 以`/`开头、不以`/`结尾，且长度在(1, 64]之间
    fn is_valid_non_root(&self) -> bool;

    /// 以`/`开头且不超过64字节，可以是根目录
    fn is_valid_absolute(&self) -> bool;

    /// 只含可打印ASCII字符
    fn is_printable(&self) -> bool;

    /// 路径中`/`的个数
    fn depth(&self) -> usize;

    /// 返回路径的`(父目录, 文件名)`，`/a`的父目录为`/`
    fn parent_file(&self) -> Option<(&Self, &Self)>;
}

impl Path for str {
    fn is_valid_non_root(&self) -> bool {
        self.len() > 1
            && self.len() <= MAX_PATH_LEN
            && self.starts_with('/')
            && !self.ends_with('/')
    }

    fn is_valid_absolute(&self) -> bool {
        self.starts_with('/') && self.len() <= MAX_PATH_LEN
    }

    fn is_printable(&self) -> bool {
        self.bytes().all(|b| (0x20..=0x7E).contains(&b))
    }

    fn depth(&self) -> usize {
        self.bytes().filter(|&b| b == b'/').count()
    }

    fn parent_file(&self) -> Option<(&Self, &Self)> {
        let (parent, file) = self.rsplit_once('/')?;
        if parent.is_empty() {
            return Some(("/", file));
        }
        Some((parent, file))
    }
}

/// 把绝对路径解析为FST下标
///
/// 空路径与`/`都是根目录。中间项必须是目录。
pub fn resolve(fst: &Fst, path: &str) -> Option<u16> {
    if path.is_empty() || path == "/" {
        return Some(0);
    }

    path.strip_prefix('/')?
        .split('/')
        .try_fold(0, |dir, name| {
            if !fst.get(dir)?.is_directory() {
                return None;
            }
            fst.find_child(dir, name)
        })
}

/// 解析作为父目录的路径，不存在或不是目录都报[`Error::NotFound`]
pub fn resolve_dir(fst: &Fst, path: &str) -> Result<u16> {
    resolve(fst, path)
        .filter(|&index| fst[index].is_directory())
        .ok_or(Error::NotFound)
}
