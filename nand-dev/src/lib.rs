//! # NAND设备接口层
//!
//! NAND闪存以**页**为单位读写，每页由数据区与备用区(spare)组成，
//! 备用区存放ECC与HMAC等带外数据。
//! [`NandDevice`] 是对读写NAND设备的抽象，实现了此特质的类型称为**NAND驱动**。

#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec;
use core::any::Any;
use core::fmt::Debug;
use core::ops::Range;

use spin::Mutex;

/// 一页的数据区字节数
pub const PAGE_DATA_SIZE: usize = 0x800;
/// 一页的备用区字节数
pub const PAGE_SPARE_SIZE: usize = 0x40;
/// 一页在设备上占用的字节数
pub const PAGE_SIZE: usize = PAGE_DATA_SIZE + PAGE_SPARE_SIZE;
/// 设备的总页数
pub const PAGE_COUNT: usize = 0x8000 * 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NandError {
    #[error("page {0:#x} is out of range")]
    OutOfRange(usize),
    #[error("buffer holds {0} bytes, a page needs {n}", n = PAGE_SIZE)]
    BadBuffer(usize),
    #[error("I/O failure on page {0:#x}")]
    Io(usize),
}

/// NAND驱动特质
///
/// `buf`恒为一整页：前[`PAGE_DATA_SIZE`]字节是数据区，其后是备用区。
pub trait NandDevice: Debug + Send + Sync + Any {
    fn read_page(&self, page: usize, buf: &mut [u8]) -> Result<(), NandError>;
    fn write_page(&self, page: usize, buf: &[u8]) -> Result<(), NandError>;
}

pub fn check_page(page: usize, buf_len: usize) -> Result<(), NandError> {
    if page >= PAGE_COUNT {
        return Err(NandError::OutOfRange(page));
    }
    if buf_len != PAGE_SIZE {
        return Err(NandError::BadBuffer(buf_len));
    }
    Ok(())
}

/// 内存中的稀疏NAND
///
/// 只保存写过的页，未写过的页读出全0，与新建的空镜像一致。
#[derive(Debug, Default)]
pub struct MemNand {
    pages: Mutex<BTreeMap<usize, Box<[u8]>>>,
    /// 读写都会失败的坏页
    faulty: Mutex<BTreeSet<usize>>,
}

impl MemNand {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将一段页标记为坏页，此后对它们的读写都返回[`NandError::Io`]
    pub fn set_faulty(&self, pages: Range<usize>) {
        self.faulty.lock().extend(pages);
    }

    pub fn clear_faulty(&self) {
        self.faulty.lock().clear();
    }

    /// 已写入的页数
    pub fn written_pages(&self) -> usize {
        self.pages.lock().len()
    }

    fn check_fault(&self, page: usize) -> Result<(), NandError> {
        if self.faulty.lock().contains(&page) {
            return Err(NandError::Io(page));
        }
        Ok(())
    }
}

impl NandDevice for MemNand {
    fn read_page(&self, page: usize, buf: &mut [u8]) -> Result<(), NandError> {
        check_page(page, buf.len())?;
        self.check_fault(page)?;

        match self.pages.lock().get(&page) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page: usize, buf: &[u8]) -> Result<(), NandError> {
        check_page(page, buf.len())?;
        self.check_fault(page)?;

        self.pages
            .lock()
            .entry(page)
            .or_insert_with(|| vec![0; PAGE_SIZE].into_boxed_slice())
            .copy_from_slice(buf);
        Ok(())
    }
}
