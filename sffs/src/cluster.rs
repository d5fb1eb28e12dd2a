use binrw::binrw;

use crate::volume::CLUSTER_COUNT;

/// FAT条目，同时也是簇编号。
///
/// 小于[`CLUSTER_COUNT`]的值指向链表中的下一个簇，
/// 其余的值是哨兵。
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClusterId(u16);

impl From<ClusterId> for usize {
    fn from(id: ClusterId) -> Self {
        id.0 as usize
    }
}

impl ClusterId {
    /// 簇链表的最后一个簇
    pub const LAST_IN_CHAIN: Self = Self(0xFFFB);

    pub const RESERVED: Self = Self(0xFFFC);

    pub const BAD_BLOCK: Self = Self(0xFFFD);

    pub const UNUSED: Self = Self(0xFFFE);

    /// 空白镜像中的FAT条目，等同于[`ClusterId::UNUSED`]
    pub const BLANK: Self = Self(0xFFFF);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// 是否指向一个真实的簇
    pub const fn is_cluster(self) -> bool {
        (self.0 as usize) < CLUSTER_COUNT
    }
}
