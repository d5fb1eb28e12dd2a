//! 文件系统状态的保存与恢复
//!
//! 只保存被文件引用的簇；恢复时若超级块未变，则跳过这些簇。
//! 超级块区总是整体保存。

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite, binrw};
use vfs::{Error, Fd, Result};

use crate::control::NandFileSystem;
use crate::handle::{Handle, HandleTable, MAX_HANDLES};
use crate::inode::FileCache;
use crate::volume::{
    BOOT_CLUSTERS, CLUSTER_DATA_SIZE, CLUSTER_SIZE, CLUSTERS_PER_SUPERBLOCK, NUMBER_OF_SUPERBLOCKS,
    SUPERBLOCK_START_CLUSTER, Superblock,
};

const GENERATION_CLUSTERS: usize = (NUMBER_OF_SUPERBLOCKS * CLUSTERS_PER_SUPERBLOCK) as usize;
const NO_FD: Fd = Fd::MAX;

#[binrw]
#[brw(big, magic = b"SFSS")]
#[derive(Debug)]
struct Snapshot {
    handles: [Handle; MAX_HANDLES],

    #[br(map = |fd: Fd| (fd != NO_FD).then_some(fd))]
    #[bw(map = |fd: &Option<Fd>| fd.unwrap_or(NO_FD))]
    cache_fd: Option<Fd>,
    cache_chain_index: u16,
    #[br(count = CLUSTER_DATA_SIZE)]
    cache_data: Vec<u8>,
    #[br(map = |b: u8| b != 0)]
    #[bw(map = |b: &bool| u8::from(*b))]
    cache_for_write: bool,

    superblock_index: u16,
    #[bw(calc = u8::from(superblock.is_some()))]
    has_superblock: u8,
    #[br(if(has_superblock != 0))]
    superblock: Option<Superblock>,

    #[bw(calc = used_clusters.len() as u32)]
    used_count: u32,
    #[br(count = used_count, assert(is_data_cluster_list(&used_clusters)))]
    used_clusters: Vec<u16>,
    /// 上述各簇的原始字节(含备用区)
    #[br(count = used_clusters.len() * CLUSTER_SIZE)]
    cluster_data: Vec<u8>,
    /// 整个超级块区的原始字节
    #[br(count = GENERATION_CLUSTERS * CLUSTER_SIZE)]
    generations: Vec<u8>,
}

/// 簇列表必须严格递增且全部位于数据区，否则整个快照作废
fn is_data_cluster_list(clusters: &[u16]) -> bool {
    let in_data_area = |&c: &u16| (BOOT_CLUSTERS..SUPERBLOCK_START_CLUSTER).contains(&c);
    clusters.iter().all(in_data_area) && clusters.windows(2).all(|pair| pair[0] < pair[1])
}

impl NandFileSystem {
    /// 保存当前状态，写缓存不会被写回
    pub fn save_state(&self) -> Result<Vec<u8>> {
        let codec = self.store.codec();
        let superblock = self.store.loaded().cloned();

        let used_clusters = superblock
            .as_ref()
            .map(Superblock::used_clusters)
            .unwrap_or_default();

        let mut cluster_data = vec![0; used_clusters.len() * CLUSTER_SIZE];
        for (&cluster, raw) in used_clusters
            .iter()
            .zip(cluster_data.chunks_exact_mut(CLUSTER_SIZE))
        {
            codec.read_raw_cluster(cluster, raw)?;
        }

        let mut generations = vec![0; GENERATION_CLUSTERS * CLUSTER_SIZE];
        for (i, raw) in generations.chunks_exact_mut(CLUSTER_SIZE).enumerate() {
            codec.read_raw_cluster(SUPERBLOCK_START_CLUSTER + i as u16, raw)?;
        }

        let snapshot = Snapshot {
            handles: *self.handles.handles(),
            cache_fd: self.cache.fd,
            cache_chain_index: self.cache.chain_index,
            cache_data: self.cache.data.to_vec(),
            cache_for_write: self.cache.for_write,
            superblock_index: self.store.index(),
            superblock,
            used_clusters,
            cluster_data,
            generations,
        };

        let mut cursor = Cursor::new(Vec::new());
        snapshot.write_be(&mut cursor).map_err(|e| {
            log::error!("Failed to serialize snapshot: {e}");
            Error::Invalid
        })?;
        Ok(cursor.into_inner())
    }

    /// 恢复[`NandFileSystem::save_state`]保存的状态
    ///
    /// 快照无法解析时不改变任何状态。
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        let snapshot = Snapshot::read_be(&mut Cursor::new(bytes)).map_err(|e| {
            log::error!("Rejected snapshot: {e}");
            Error::Invalid
        })?;

        let mut cache_data = Box::new([0; CLUSTER_DATA_SIZE]);
        cache_data.copy_from_slice(&snapshot.cache_data);

        let codec = self.store.codec().clone();
        if self.store.loaded() != snapshot.superblock.as_ref() {
            for (&cluster, raw) in snapshot
                .used_clusters
                .iter()
                .zip(snapshot.cluster_data.chunks_exact(CLUSTER_SIZE))
            {
                codec.write_raw_cluster(cluster, raw)?;
            }
        } else {
            log::debug!("Superblock unchanged, skipping cluster data");
        }

        for (i, raw) in snapshot.generations.chunks_exact(CLUSTER_SIZE).enumerate() {
            codec.write_raw_cluster(SUPERBLOCK_START_CLUSTER + i as u16, raw)?;
        }

        self.handles = HandleTable::from_handles(snapshot.handles);
        self.cache = FileCache {
            fd: snapshot.cache_fd,
            chain_index: snapshot.cache_chain_index,
            data: cache_data,
            for_write: snapshot.cache_for_write,
        };
        self.store
            .replace(snapshot.superblock.map(Box::new), snapshot.superblock_index);
        Ok(())
    }
}
