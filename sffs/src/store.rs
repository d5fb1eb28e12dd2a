//! 超级块的加载与轮转写入
//!
//! 超级块区有16代槽位，每次刷新写入下一个槽位并把版本号加一，
//! 加载时取通过校验的最高版本。

use alloc::boxed::Box;
use alloc::vec;

use vfs::{Error, Result};

use crate::codec::ClusterCodec;
use crate::crypto::Hash;
use crate::volume::{
    CLUSTER_DATA_SIZE, CLUSTERS_PER_SUPERBLOCK, ClusterData, NUMBER_OF_SUPERBLOCKS,
    SUPERBLOCK_SIZE, Superblock, superblock_cluster,
};

#[derive(Debug)]
pub struct SuperblockStore {
    codec: ClusterCodec,
    superblock: Option<Box<Superblock>>,
    /// 当前超级块所在的槽位
    index: u16,
}

impl SuperblockStore {
    pub fn new(codec: ClusterCodec) -> Self {
        Self {
            codec,
            superblock: None,
            index: 0,
        }
    }

    pub fn codec(&self) -> &ClusterCodec {
        &self.codec
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    /// 已加载的超级块，不触发加载
    pub fn loaded(&self) -> Option<&Superblock> {
        self.superblock.as_deref()
    }

    /// 直接替换内存中的状态，不写盘
    pub fn replace(&mut self, superblock: Option<Box<Superblock>>, index: u16) {
        self.superblock = superblock;
        self.index = index % NUMBER_OF_SUPERBLOCKS;
    }

    /// 获取超级块，首次调用时从NAND加载
    pub fn get(&mut self) -> Result<&mut Superblock> {
        if self.superblock.is_none() {
            let (superblock, index) = self.load().ok_or(Error::SuperblockInitFailed)?;
            log::info!("Using superblock {index} (v{})", superblock.version);
            self.superblock = Some(superblock);
            self.index = index;
        }

        self.superblock
            .as_deref_mut()
            .ok_or(Error::SuperblockInitFailed)
    }

    fn load(&self) -> Option<(Box<Superblock>, u16)> {
        let mut best: Option<(Box<Superblock>, u16)> = None;

        for index in 0..NUMBER_OF_SUPERBLOCKS {
            let Some(superblock) = self.read_generation(index) else {
                continue;
            };
            if best
                .as_ref()
                .is_some_and(|(b, _)| superblock.version < b.version)
            {
                continue;
            }
            best = Some((superblock, index));
        }

        let (mut superblock, index) = best?;
        superblock.fat.normalize();
        Some((superblock, index))
    }

    /// 读出一代超级块并校验，任何一步失败都视为该代不可用
    fn read_generation(&self, index: u16) -> Option<Box<Superblock>> {
        let mut bytes = vec![0u8; SUPERBLOCK_SIZE];
        let mut hmacs: [Hash; 2] = [[0; 20]; 2];

        for (i, chunk) in bytes.chunks_exact_mut(CLUSTER_DATA_SIZE).enumerate() {
            let data: &mut ClusterData = chunk.try_into().ok()?;
            hmacs = self
                .codec
                .read_cluster(superblock_cluster(index) + i as u16, data)
                .ok()?;
        }

        let superblock = Superblock::from_bytes(&bytes).ok()?;

        let hash = self.codec.superblock_hmac(&bytes, index);
        if !hmacs.contains(&hash) {
            log::error!("Failed to verify superblock {index} (v{})", superblock.version);
            return None;
        }

        Some(Box::new(superblock))
    }

    /// 版本号加一并写入下一个槽位，失败则换槽位重试
    pub fn flush(&mut self) -> Result<()> {
        let superblock = self.superblock.as_deref_mut().ok_or(Error::NotFound)?;
        superblock.version = superblock.version.wrapping_add(1);

        for attempt in 0..NUMBER_OF_SUPERBLOCKS {
            match self.write_generation() {
                Ok(()) => return Ok(()),
                Err(e) => log::error!("Failed to write superblock at attempt {attempt}: {e}"),
            }
        }

        log::error!("Failed to flush superblock");
        Err(Error::SuperblockWriteFailed)
    }

    fn write_generation(&mut self) -> Result<()> {
        self.index = (self.index + 1) % NUMBER_OF_SUPERBLOCKS;

        let superblock = self.superblock.as_deref().ok_or(Error::NotFound)?;
        let version = superblock.version;
        let bytes = superblock.to_bytes().map_err(|e| {
            log::error!("Failed to serialize superblock: {e}");
            Error::Invalid
        })?;
        let hmac = self.codec.superblock_hmac(&bytes, self.index);

        for (i, chunk) in bytes.chunks_exact(CLUSTER_DATA_SIZE).enumerate() {
            let data: &ClusterData = chunk.try_into().map_err(|_| Error::Invalid)?;
            let tag = if i as u16 == CLUSTERS_PER_SUPERBLOCK - 1 {
                hmac
            } else {
                [0; 20]
            };
            self.codec
                .write_cluster(superblock_cluster(self.index) + i as u16, data, &tag)?;
        }

        // 版本号回绕后再写15代，保证0号版本之后没有更旧的槽位胜出
        if version == 0 {
            log::warn!("Superblock version overflowed, writing 15 extra versions");
            for _ in 0..NUMBER_OF_SUPERBLOCKS - 1 {
                self.flush()?;
            }
        }

        Ok(())
    }

    /// 用`staged`替换当前超级块并刷新，失败时恢复原状
    pub fn commit(&mut self, staged: Superblock) -> Result<()> {
        let index = self.index;
        let previous = self.superblock.replace(Box::new(staged));
        if let Err(e) = self.flush() {
            self.superblock = previous;
            self.index = index;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use nand_dev::MemNand;
    use vfs::Error;

    use super::SuperblockStore;
    use crate::codec::ClusterCodec;
    use crate::crypto::SoftwareCrypto;
    use crate::volume::{Superblock, page_id, superblock_cluster};
    use crate::ClusterId;

    fn store_on(nand: &Arc<MemNand>) -> SuperblockStore {
        let crypto = Arc::new(SoftwareCrypto::new(&[1; 16], &[2; 20]));
        SuperblockStore::new(ClusterCodec::new(nand.clone(), crypto))
    }

    fn formatted() -> Superblock {
        let mut sb = Superblock::default();
        sb.format();
        sb
    }

    #[test]
    fn blank_nand_has_no_superblock() {
        let nand = Arc::new(MemNand::new());
        let mut store = store_on(&nand);
        assert_eq!(Err(Error::SuperblockInitFailed), store.get().map(|_| ()));
        assert_eq!(Err(Error::NotFound), store.flush());
    }

    #[test]
    fn flush_rotates_and_reloads() {
        let nand = Arc::new(MemNand::new());
        let mut store = store_on(&nand);
        store.commit(formatted()).unwrap();
        assert_eq!(1, store.index());
        store.get().unwrap().fat[ClusterId::new(100)] = ClusterId::LAST_IN_CHAIN;
        store.flush().unwrap();
        assert_eq!(2, store.index());

        let mut reloaded = store_on(&nand);
        let sb = reloaded.get().unwrap();
        assert_eq!(2, sb.version);
        assert_eq!(ClusterId::LAST_IN_CHAIN, sb.fat[ClusterId::new(100)]);
        assert_eq!(2, reloaded.index());
    }

    #[test]
    fn tampered_generation_is_skipped() {
        let nand = Arc::new(MemNand::new());
        let mut store = store_on(&nand);
        store.commit(formatted()).unwrap();
        store.flush().unwrap();

        // 破坏第2代的HMAC，应退回第1代
        let mut page = [0u8; nand_dev::PAGE_SIZE];
        let target = page_id(superblock_cluster(2) + 15, 6);
        nand_dev::NandDevice::read_page(&*nand, target, &mut page).unwrap();
        page[nand_dev::PAGE_DATA_SIZE + 1] ^= 1;
        page[nand_dev::PAGE_DATA_SIZE + 0x15] ^= 1;
        nand_dev::NandDevice::write_page(&*nand, target, &page).unwrap();

        let mut reloaded = store_on(&nand);
        assert_eq!(1, reloaded.get().unwrap().version);
        assert_eq!(1, reloaded.index());
    }

    #[test]
    fn version_wrap_writes_extra_generations() {
        let nand = Arc::new(MemNand::new());
        let mut store = store_on(&nand);
        let mut sb = formatted();
        sb.version = u32::MAX;
        store.commit(sb).unwrap();

        assert_eq!(15, store.get().unwrap().version);
        assert_eq!(0, store.index());

        let mut reloaded = store_on(&nand);
        assert_eq!(15, reloaded.get().unwrap().version);
    }

    #[test]
    fn failed_flush_keeps_previous_state() {
        let nand = Arc::new(MemNand::new());
        let mut store = store_on(&nand);
        store.commit(formatted()).unwrap();

        nand.set_faulty(page_id(superblock_cluster(0), 0)..nand_dev::PAGE_COUNT);
        let mut staged = formatted();
        staged.fat[ClusterId::new(70)] = ClusterId::LAST_IN_CHAIN;
        assert_eq!(Err(Error::SuperblockWriteFailed), store.commit(staged));
        assert_eq!(ClusterId::UNUSED, store.get().unwrap().fat[ClusterId::new(70)]);
        assert_eq!(1, store.index());
    }
}
