//! 文件数据：逻辑偏移到簇链表的映射与单槽写回缓存

use alloc::boxed::Box;

use vfs::{Error, Fd, Result};

use crate::control::NandFileSystem;
use crate::store::SuperblockStore;
use crate::volume::{CLUSTER_DATA_SIZE, ClusterData, FST_ENTRIES};
use crate::ClusterId;

/// 全局唯一的簇缓存，属于某个fd
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCache {
    pub fd: Option<Fd>,
    pub chain_index: u16,
    pub data: Box<ClusterData>,
    pub for_write: bool,
}

impl Default for FileCache {
    fn default() -> Self {
        Self {
            fd: None,
            chain_index: 0,
            data: Box::new([0; CLUSTER_DATA_SIZE]),
            for_write: false,
        }
    }
}

impl FileCache {
    /// 缓存中属于`offset`的部分
    pub fn window(&mut self, offset: u32) -> &mut [u8] {
        let start = offset as usize - self.chain_index as usize * CLUSTER_DATA_SIZE;
        &mut self.data[start..]
    }

    /// 是否有尚未写回的簇
    pub fn is_dirty(&self) -> bool {
        self.fd.is_some() && self.for_write
    }
}

fn check_fst_index(fst_index: u16) -> Result<()> {
    if fst_index as usize >= FST_ENTRIES {
        return Err(Error::Invalid);
    }
    Ok(())
}

impl SuperblockStore {
    /// 读出文件的第`chain_index`个簇并校验HMAC
    pub fn read_file_data(
        &mut self,
        fst_index: u16,
        chain_index: u16,
        data: &mut ClusterData,
    ) -> Result<()> {
        check_fst_index(fst_index)?;

        let superblock = self.get()?;
        let entry = superblock.fst[fst_index];
        if !entry.is_file() || entry.size <= u32::from(chain_index) * CLUSTER_DATA_SIZE as u32 {
            return Err(Error::Invalid);
        }

        let Some(cluster) = superblock.fat.nth(entry.first_cluster(), chain_index) else {
            log::warn!(
                "Cannot find cluster {chain_index} in chain {:#06x}",
                entry.first_cluster().raw()
            );
            return Err(Error::Invalid);
        };

        let codec = self.codec();
        let hmacs = codec.read_cluster(cluster.raw(), data)?;
        let hash = codec.data_hmac(&entry, fst_index, chain_index, data);
        if !hmacs.contains(&hash) {
            log::error!(
                "Failed to verify cluster data (fst_index {fst_index:#06x} chain_index {chain_index})"
            );
            return Err(Error::CheckFailed);
        }

        Ok(())
    }

    /// 把`data`写入一个新簇，替换文件链表上的第`chain_index`个簇
    ///
    /// 只修改内存中的超级块，由调用者负责刷新。
    pub fn write_file_data(
        &mut self,
        fst_index: u16,
        data: &ClusterData,
        chain_index: u16,
        new_size: u32,
    ) -> Result<()> {
        check_fst_index(fst_index)?;

        let codec = self.codec().clone();
        let superblock = self.get()?;
        let entry = superblock.fst[fst_index];
        if !entry.is_file() || new_size < entry.size {
            return Err(Error::Invalid);
        }

        // 不做磨损均衡，总是取第一个空闲簇
        let cluster = superblock.fat.alloc().ok_or(Error::NoFreeSpace)?;

        let hash = codec.data_hmac(&entry, fst_index, chain_index, data);
        codec.write_cluster(cluster.raw(), data, &hash)?;

        let first = entry.first_cluster();
        let old = superblock.fat.nth(first, chain_index);

        if chain_index == 0 {
            superblock.fst[fst_index].sub = cluster.raw();
        } else {
            let prev = superblock
                .fat
                .nth(first, chain_index - 1)
                .ok_or(Error::Invalid)?;
            superblock.fat[prev] = cluster;
        }

        superblock.fat[cluster] = match old {
            Some(old) => superblock.fat[old],
            None => ClusterId::LAST_IN_CHAIN,
        };
        if let Some(old) = old {
            superblock.fat[old] = ClusterId::UNUSED;
        }

        superblock.fst[fst_index].size = new_size;
        Ok(())
    }
}

impl NandFileSystem {
    /// 让缓存装入`fd`在`offset`处的簇
    ///
    /// 写入时要求至少有一个空闲簇，以便之后写回。
    /// 在文件末尾追加新簇时以0填充，不读NAND。
    pub(crate) fn populate_file_cache(&mut self, fd: Fd, offset: u32, write: bool) -> Result<()> {
        let chain_index = (offset as usize / CLUSTER_DATA_SIZE) as u16;

        if self.cache.fd == Some(fd) && self.cache.chain_index == chain_index {
            if write && !self.cache.for_write {
                self.ensure_free_cluster()?;
                self.cache.for_write = true;
            }
            return Ok(());
        }

        self.flush_file_cache()?;
        self.cache.fd = None;

        if write {
            self.ensure_free_cluster()?;
        }

        let handle = *self.handles.get(fd).ok_or(Error::Invalid)?;
        if offset as usize % CLUSTER_DATA_SIZE == 0 && offset == handle.file_size {
            self.cache.data.fill(0);
        } else {
            let result = self
                .store
                .read_file_data(handle.fst_index, chain_index, &mut self.cache.data);
            if let Err(e) = result {
                log::error!("Failed to read data into cache: {e}");
                return Err(e);
            }
        }

        self.cache.fd = Some(fd);
        self.cache.chain_index = chain_index;
        self.cache.for_write = write;
        Ok(())
    }

    /// 把写缓存写回NAND，成功后所属句柄在关闭时需要刷新超级块
    pub(crate) fn flush_file_cache(&mut self) -> Result<()> {
        let Some(fd) = self.cache.fd.filter(|_| self.cache.for_write) else {
            return Ok(());
        };
        let handle = *self.handles.get(fd).ok_or(Error::Invalid)?;

        let result = self.store.write_file_data(
            handle.fst_index,
            &self.cache.data,
            self.cache.chain_index,
            handle.file_size,
        );

        match result {
            Ok(()) => {
                self.cache.for_write = false;
                if let Some(handle) = self.handles.get_mut(fd) {
                    handle.superblock_flush_needed = true;
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to flush file cache {fd}: {e}");
                Err(e)
            }
        }
    }

    fn ensure_free_cluster(&mut self) -> Result<()> {
        self.store
            .get()?
            .fat
            .alloc()
            .map(|_| ())
            .ok_or(Error::NoFreeSpace)
    }
}
