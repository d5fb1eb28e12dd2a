use alloc::vec;
use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

use binrw::binrw;

use super::{BOOT_CLUSTERS, CLUSTER_COUNT, SUPERBLOCK_START_CLUSTER};
use crate::ClusterId;

/// 文件分配表，每个簇一个条目
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat {
    #[br(count = CLUSTER_COUNT)]
    entries: Vec<ClusterId>,
}

impl Default for Fat {
    fn default() -> Self {
        Self {
            entries: vec![ClusterId::UNUSED; CLUSTER_COUNT],
        }
    }
}

impl Index<ClusterId> for Fat {
    type Output = ClusterId;

    fn index(&self, id: ClusterId) -> &Self::Output {
        &self.entries[usize::from(id)]
    }
}

impl IndexMut<ClusterId> for Fat {
    fn index_mut(&mut self, id: ClusterId) -> &mut Self::Output {
        &mut self.entries[usize::from(id)]
    }
}

impl Fat {
    /// 格式化后的FAT：引导簇与超级块区保留，其余空闲
    pub fn formatted() -> Self {
        let mut fat = Self::default();
        for (i, entry) in fat.entries.iter_mut().enumerate() {
            if i < BOOT_CLUSTERS as usize || i >= SUPERBLOCK_START_CLUSTER as usize {
                *entry = ClusterId::RESERVED;
            }
        }
        fat
    }

    /// 把从未写过的条目视为空闲
    pub fn normalize(&mut self) {
        self.entries
            .iter_mut()
            .filter(|id| **id == ClusterId::BLANK)
            .for_each(|id| *id = ClusterId::UNUSED);
    }

    pub fn iter(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.entries.iter().copied()
    }

    /// 簇链表上第`index`个簇
    pub fn nth(&self, first: ClusterId, index: u16) -> Option<ClusterId> {
        let mut id = first;
        for _ in 0..index {
            if !id.is_cluster() {
                return None;
            }
            id = self[id];
        }
        id.is_cluster().then_some(id)
    }

    /// 遍历簇链表，遇到哨兵或回环时停止
    pub fn chain(&self, first: ClusterId) -> impl Iterator<Item = ClusterId> + '_ {
        let mut cursor = Some(first);
        let mut steps = 0;
        core::iter::from_fn(move || {
            let id = cursor.filter(|id| id.is_cluster() && steps < CLUSTER_COUNT)?;
            steps += 1;
            cursor = Some(self[id]);
            Some(id)
        })
    }

    /// 寻找编号最小的未分配簇
    pub fn alloc(&self) -> Option<ClusterId> {
        self.entries
            .iter()
            .position(|&id| id == ClusterId::UNUSED)
            .map(|i| ClusterId::new(i as u16))
    }

    /// 释放整个簇链表
    pub fn remove(&mut self, first: ClusterId) {
        let mut id = first;
        for _ in 0..CLUSTER_COUNT {
            if !id.is_cluster() {
                break;
            }
            let next = self[id];
            self[id] = ClusterId::UNUSED;
            id = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::Fat;
    use crate::ClusterId;

    fn link(fat: &mut Fat, ids: &[u16]) {
        for pair in ids.windows(2) {
            fat[ClusterId::new(pair[0])] = ClusterId::new(pair[1]);
        }
        fat[ClusterId::new(*ids.last().unwrap())] = ClusterId::LAST_IN_CHAIN;
    }

    #[test]
    fn formatted_layout() {
        let fat = Fat::formatted();
        assert_eq!(ClusterId::RESERVED, fat[ClusterId::new(63)]);
        assert_eq!(ClusterId::UNUSED, fat[ClusterId::new(64)]);
        assert_eq!(ClusterId::UNUSED, fat[ClusterId::new(0x7EFF)]);
        assert_eq!(ClusterId::RESERVED, fat[ClusterId::new(0x7F00)]);
        assert_eq!(Some(ClusterId::new(64)), fat.alloc());
    }

    #[test]
    fn walk_chain() {
        let mut fat = Fat::formatted();
        link(&mut fat, &[100, 70, 90]);

        let chain: Vec<_> = fat.chain(ClusterId::new(100)).map(ClusterId::raw).collect();
        assert_eq!([100, 70, 90], chain[..]);
        assert_eq!(Some(ClusterId::new(90)), fat.nth(ClusterId::new(100), 2));
        assert_eq!(None, fat.nth(ClusterId::new(100), 3));

        fat.remove(ClusterId::new(100));
        assert_eq!(ClusterId::UNUSED, fat[ClusterId::new(70)]);
        assert_eq!(ClusterId::UNUSED, fat[ClusterId::new(90)]);
    }

    #[test]
    fn looping_chain_terminates() {
        let mut fat = Fat::formatted();
        fat[ClusterId::new(80)] = ClusterId::new(81);
        fat[ClusterId::new(81)] = ClusterId::new(80);
        assert_eq!(super::CLUSTER_COUNT, fat.chain(ClusterId::new(80)).count());
        fat.remove(ClusterId::new(80));
        assert_eq!(ClusterId::UNUSED, fat[ClusterId::new(81)]);
    }

    #[test]
    fn normalize_blank_entries() {
        let mut fat = Fat::formatted();
        fat[ClusterId::new(200)] = ClusterId::BLANK;
        fat.normalize();
        assert_eq!(ClusterId::UNUSED, fat[ClusterId::new(200)]);
    }
}
