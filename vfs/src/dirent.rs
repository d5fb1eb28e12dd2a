use crate::{FileAttribute, Gid, Modes, Uid};

/// 目录项的元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub uid: Uid,
    pub gid: Gid,
    pub attribute: FileAttribute,
    pub modes: Modes,
    pub is_file: bool,
    /// 所在文件系统表的下标
    pub fst_index: u16,
    /// 文件大小，目录恒为0
    pub size: u32,
}
