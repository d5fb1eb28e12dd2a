/// 已打开文件的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStatus {
    /// 打开时记录的文件大小，只随本句柄的写入而增长
    pub size: u32,
    pub offset: u32,
}

/// 整个NAND的用量统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NandStats {
    /// 一个簇可容纳的数据字节数
    pub cluster_size: u32,
    pub free_clusters: u32,
    pub used_clusters: u32,
    pub bad_clusters: u32,
    pub reserved_clusters: u32,
    pub free_inodes: u32,
    pub used_inodes: u32,
}

/// 某个目录（含其全部子孙）的用量统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectoryStats {
    pub used_clusters: u32,
    /// 包括目录自身
    pub used_inodes: u32,
}
