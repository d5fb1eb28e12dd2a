//! NAND的布局
//!
//! 引导区(簇0..64) | 数据区 | 超级块区(16代，每代16簇)
//!
//! 每簇8页，每页0x800字节数据加0x40字节备用区。

use nand_dev::{PAGE_DATA_SIZE, PAGE_SIZE};

pub mod fat;
pub mod fst;
pub mod superblock;

pub use self::{
    fat::Fat,
    fst::{EntryKind, Fst, FstEntry},
    superblock::Superblock,
};

pub const PAGES_PER_CLUSTER: usize = 8;
/// 簇的数据区字节数
pub const CLUSTER_DATA_SIZE: usize = PAGES_PER_CLUSTER * PAGE_DATA_SIZE;
/// 簇在设备上占用的字节数
pub const CLUSTER_SIZE: usize = PAGES_PER_CLUSTER * PAGE_SIZE;
pub const CLUSTER_COUNT: usize = 0x8000;
/// 整个NAND镜像的字节数
pub const NAND_SIZE: usize = CLUSTER_COUNT * CLUSTER_SIZE;

/// 开头的引导簇，格式化时保留
pub const BOOT_CLUSTERS: u16 = 64;

pub const SUPERBLOCK_START_CLUSTER: u16 = 0x7F00;
pub const NUMBER_OF_SUPERBLOCKS: u16 = 16;
pub const CLUSTERS_PER_SUPERBLOCK: u16 = 16;
pub const SUPERBLOCK_SIZE: usize = CLUSTERS_PER_SUPERBLOCK as usize * CLUSTER_DATA_SIZE;

pub const FST_ENTRIES: usize = 0x17FF;
pub const FST_ENTRY_SIZE: usize = 0x20;

pub type ClusterData = [u8; CLUSTER_DATA_SIZE];

/// 第`index`代超级块的首簇
pub const fn superblock_cluster(index: u16) -> u16 {
    SUPERBLOCK_START_CLUSTER + index * CLUSTERS_PER_SUPERBLOCK
}

/// 簇内某页在设备上的页号
pub const fn page_id(cluster: u16, page: usize) -> usize {
    cluster as usize * PAGES_PER_CLUSTER + page
}
