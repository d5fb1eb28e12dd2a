use alloc::sync::Arc;

use nand_dev::NandDevice;
use vfs::Result;

use crate::codec::ClusterCodec;
use crate::crypto::NandCrypto;
use crate::handle::HandleTable;
use crate::inode::FileCache;
use crate::store::SuperblockStore;
use crate::volume::Superblock;

/// NAND镜像上的SFFS文件系统
#[derive(Debug)]
pub struct NandFileSystem {
    pub(crate) store: SuperblockStore,
    pub(crate) handles: HandleTable,
    pub(crate) cache: FileCache,
}

impl NandFileSystem {
    pub fn new(dev: Arc<dyn NandDevice>, crypto: Arc<dyn NandCrypto>) -> Self {
        let mut fs = Self {
            store: SuperblockStore::new(ClusterCodec::new(dev, crypto)),
            handles: HandleTable::default(),
            cache: FileCache::default(),
        };

        if let Err(e) = fs.store.get() {
            log::warn!("NAND has no usable superblock yet: {e}");
        }
        fs
    }

    pub fn device(&self) -> &Arc<dyn NandDevice> {
        self.store.codec().device()
    }

    /// 当前超级块，必要时从NAND加载
    pub fn superblock(&mut self) -> Result<&Superblock> {
        self.store.get().map(|sb| &*sb)
    }

    /// 当前超级块所在的槽位
    pub fn superblock_index(&self) -> u16 {
        self.store.index()
    }

    /// 在超级块的副本上执行结构性修改，成功并刷新后才替换当前超级块
    pub(crate) fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut Superblock, &HandleTable) -> Result<T>,
    ) -> Result<T> {
        let mut staged = self.store.get()?.clone();
        let value = op(&mut staged, &self.handles)?;
        self.store.commit(staged)?;
        Ok(value)
    }
}
