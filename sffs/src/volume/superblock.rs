use alloc::vec;
use alloc::vec::Vec;

use binrw::io::Cursor;
use binrw::{BinRead, BinResult, BinWrite, binrw};
use vfs::{DirectoryStats, NandStats};

use super::fst::NO_CHILD;
use super::{CLUSTER_DATA_SIZE, EntryKind, FST_ENTRIES, Fat, Fst, FstEntry, SUPERBLOCK_SIZE};
use crate::ClusterId;

/// 超级块：FAT与FST的一代快照，大端序存储
#[binrw]
#[brw(big, magic = b"SFFS")]
#[derive(Debug, Clone)]
pub struct Superblock {
    pub version: u32,
    pub unknown: u32,
    pub fat: Fat,
    pub fst: Fst,
    pub padding: [u8; 0x14],
}

impl Default for Superblock {
    fn default() -> Self {
        Self {
            version: 0,
            unknown: 0,
            fat: Fat::default(),
            fst: Fst::default(),
            padding: [0; 0x14],
        }
    }
}

/// 只比较版本号与FAT、FST，不比较填充字节
impl PartialEq for Superblock {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.unknown == other.unknown
            && self.fat == other.fat
            && self.fst == other.fst
    }
}

impl Eq for Superblock {}

impl Superblock {
    pub fn from_bytes(bytes: &[u8]) -> BinResult<Self> {
        Self::read_be(&mut Cursor::new(bytes))
    }

    pub fn to_bytes(&self) -> BinResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(SUPERBLOCK_SIZE));
        self.write_be(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// 重置FAT与FST，只留下根目录。版本号保持不变。
    pub fn format(&mut self) {
        self.fat = Fat::formatted();
        self.fst = Fst::default();
        self.fst[0] = FstEntry::new_root();
    }

    /// 释放文件的簇链表并清除其表项
    pub fn delete_file(&mut self, index: u16) {
        let entry = self.fst[index];
        if entry.is_file() {
            self.fat.remove(entry.first_cluster());
        }
        self.fst[index].mode = 0;
    }

    /// 删除表项(目录连同其内容)并从父目录摘下
    pub fn remove_entry(&mut self, parent: u16, index: u16) -> vfs::Result<()> {
        if self.fst[index].is_directory() {
            self.delete_directory_contents(index);
        }
        self.delete_file(index);
        if !self.fst.unlink_child(parent, index) {
            return Err(vfs::Error::NotFound);
        }
        Ok(())
    }

    /// 删除目录下的全部子孙，目录自身保留
    pub fn delete_directory_contents(&mut self, dir: u16) {
        for index in self.descendants(dir) {
            self.delete_file(index);
        }
        self.fst[dir].sub = NO_CHILD;
    }

    /// 目录的全部子孙，先序
    pub fn descendants(&self, dir: u16) -> Vec<u16> {
        let mut found = Vec::new();
        let mut stack = vec![dir];
        while let Some(current) = stack.pop() {
            for child in self.fst.children(current) {
                if found.len() >= FST_ENTRIES {
                    log::error!("Directory {dir} contains a loop");
                    return found;
                }
                found.push(child);
                if self.fst[child].is_directory() {
                    stack.push(child);
                }
            }
        }
        found
    }

    /// 从根目录可达的文件所占用的簇，升序
    pub fn used_clusters(&self) -> Vec<u16> {
        let mut clusters: Vec<u16> = self
            .descendants(0)
            .into_iter()
            .filter(|&i| !self.fst[i].is_directory())
            .flat_map(|i| self.fat.chain(self.fst[i].first_cluster()))
            .map(ClusterId::raw)
            .collect();
        clusters.sort_unstable();
        clusters.dedup();
        clusters
    }

    pub fn nand_stats(&self) -> NandStats {
        let mut stats = NandStats {
            cluster_size: CLUSTER_DATA_SIZE as u32,
            ..NandStats::default()
        };

        for id in self.fat.iter() {
            match id {
                ClusterId::UNUSED | ClusterId::BLANK => stats.free_clusters += 1,
                ClusterId::RESERVED => stats.reserved_clusters += 1,
                ClusterId::BAD_BLOCK => stats.bad_clusters += 1,
                _ => stats.used_clusters += 1,
            }
        }

        for entry in self.fst.iter() {
            match entry.kind() {
                EntryKind::Free => stats.free_inodes += 1,
                _ => stats.used_inodes += 1,
            }
        }

        stats
    }

    /// 统计目录的用量：文件按大小向上取整计簇，inode包括目录自身
    pub fn directory_stats(&self, dir: u16) -> DirectoryStats {
        let mut stats = DirectoryStats {
            used_clusters: 0,
            used_inodes: 1,
        };
        for index in self.descendants(dir) {
            let entry = &self.fst[index];
            if entry.is_file() {
                stats.used_clusters += entry.size.div_ceil(CLUSTER_DATA_SIZE as u32);
            }
            stats.used_inodes += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{BOOT_CLUSTERS, CLUSTER_COUNT, SUPERBLOCK_START_CLUSTER};

    fn formatted() -> Superblock {
        let mut sb = Superblock::default();
        sb.format();
        sb
    }

    /// 在`parent`下添加一个文件，数据放在`clusters`
    fn add_file(sb: &mut Superblock, parent: u16, name: &str, clusters: &[u16], size: u32) -> u16 {
        let index = sb.fst.unused_index().unwrap();
        let entry = &mut sb.fst[index];
        entry.set_name(name);
        entry.mode = 1;
        entry.size = size;
        entry.sub = clusters.first().copied().unwrap_or(ClusterId::LAST_IN_CHAIN.raw());
        for pair in clusters.windows(2) {
            sb.fat[ClusterId::new(pair[0])] = ClusterId::new(pair[1]);
        }
        if let Some(&last) = clusters.last() {
            sb.fat[ClusterId::new(last)] = ClusterId::LAST_IN_CHAIN;
        }
        sb.fst.link_child(parent, index);
        index
    }

    fn add_dir(sb: &mut Superblock, parent: u16, name: &str) -> u16 {
        let index = sb.fst.unused_index().unwrap();
        sb.fst[index].set_name(name);
        sb.fst[index].mode = 2;
        sb.fst[index].sub = 0xFFFF;
        sb.fst.link_child(parent, index);
        index
    }

    #[test]
    fn serialized_size() {
        let mut sb = formatted();
        sb.version = 7;
        sb.padding[3] = 0xAB;
        let bytes = sb.to_bytes().unwrap();
        assert_eq!(SUPERBLOCK_SIZE, bytes.len());
        assert_eq!(b"SFFS", &bytes[..4]);
        assert_eq!([0, 0, 0, 7], bytes[4..8]);
        let parsed = Superblock::from_bytes(&bytes).unwrap();
        assert_eq!(sb, parsed);
        assert_eq!(sb.padding, parsed.padding);
    }

    #[test]
    fn equality_ignores_padding() {
        let sb = formatted();
        let mut padded = sb.clone();
        padded.padding.fill(0x5A);
        assert_eq!(sb, padded);

        padded.unknown = 1;
        assert_ne!(sb, padded);
        let mut bumped = sb.clone();
        bumped.version += 1;
        assert_ne!(sb, bumped);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = formatted().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(Superblock::from_bytes(&bytes).is_err());
    }

    #[test]
    fn fresh_stats() {
        let stats = formatted().nand_stats();
        let reserved = BOOT_CLUSTERS as u32 + (CLUSTER_COUNT as u32 - SUPERBLOCK_START_CLUSTER as u32);
        assert_eq!(reserved, stats.reserved_clusters);
        assert_eq!(CLUSTER_COUNT as u32 - reserved, stats.free_clusters);
        assert_eq!(0, stats.used_clusters);
        assert_eq!(1, stats.used_inodes);
        assert_eq!(FST_ENTRIES as u32 - 1, stats.free_inodes);
    }

    #[test]
    fn recursive_delete_and_count() {
        let mut sb = formatted();
        let dir = add_dir(&mut sb, 0, "title");
        let sub = add_dir(&mut sb, dir, "data");
        add_file(&mut sb, dir, "a.bin", &[100, 101], 0x4001);
        add_file(&mut sb, sub, "b.bin", &[90], 0x10);

        assert_eq!([90, 100, 101], sb.used_clusters()[..]);
        assert_eq!(
            DirectoryStats {
                used_clusters: 3,
                used_inodes: 4
            },
            sb.directory_stats(dir)
        );

        sb.delete_directory_contents(dir);
        assert!(sb.used_clusters().is_empty());
        assert_eq!(ClusterId::UNUSED, sb.fat[ClusterId::new(101)]);
        assert_eq!(EntryKind::Free, sb.fst[sub].kind());
        assert_eq!(2, sb.nand_stats().used_inodes);
    }
}
