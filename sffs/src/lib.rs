//! # SFFS
//!
//! NAND闪存上的FAT/FST混合文件系统。
//! 元数据(FAT与FST)以超级块的形式轮转写入NAND末尾的16个槽位，
//! 文件数据按簇加密存放，每个簇都带HMAC。

#![no_std]

extern crate alloc;

mod cluster;
mod codec;
mod control;
pub mod crypto;
mod ecc;
mod facade;
mod handle;
mod inode;
pub mod path;
mod perm;
mod snapshot;
mod store;
pub mod volume;

pub use self::{
    cluster::ClusterId,
    codec::ClusterCodec,
    control::NandFileSystem,
    crypto::{Hash, MacGenerator, NandCrypto, SoftwareCrypto},
    handle::{Handle, MAX_HANDLES},
    inode::FileCache,
    perm::has_permission,
    store::SuperblockStore,
};
