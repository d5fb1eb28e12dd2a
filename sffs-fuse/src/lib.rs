pub mod packer;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use nand_dev::{check_page, NandDevice, NandError, PAGE_SIZE};
use sffs::volume::NAND_SIZE;

/// 以主机文件为后端的NAND镜像
///
/// 每页连同备用区按顺序平铺在文件中。
#[derive(Debug)]
pub struct NandFile(pub Mutex<File>);

impl NandFile {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self(Mutex::new(fd)))
    }

    /// 新建一个全0的完整镜像，已存在的文件会被截断
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len(NAND_SIZE as u64)?;

        Ok(Self(Mutex::new(fd)))
    }

    fn access(
        &self,
        page: usize,
        op: impl FnOnce(&mut File) -> io::Result<()>,
    ) -> Result<(), NandError> {
        let mut file = self.0.lock().map_err(|_| NandError::Io(page))?;
        file.seek(SeekFrom::Start((page * PAGE_SIZE) as u64))
            .and_then(|_| op(&mut file))
            .map_err(|e| {
                log::error!("page {page:#x}: {e}");
                NandError::Io(page)
            })
    }
}

impl NandDevice for NandFile {
    fn read_page(&self, page: usize, buf: &mut [u8]) -> Result<(), NandError> {
        check_page(page, buf.len())?;
        self.access(page, |file| file.read_exact(buf))
    }

    fn write_page(&self, page: usize, buf: &[u8]) -> Result<(), NandError> {
        check_page(page, buf.len())?;
        self.access(page, |file| file.write_all(buf))
    }
}
