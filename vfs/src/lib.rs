//! # 文件系统门面
//!
//! NAND镜像后端与主机目录后端共享的操作集合。
//! 所有操作都以调用者的`uid`/`gid`进行权限检查，路径均为绝对路径。

#![no_std]

extern crate alloc;

mod dirent;
mod error;
mod mode;
mod stat;

use alloc::string::String;
use alloc::vec::Vec;

pub use self::{
    dirent::Metadata,
    error::{Error, Result},
    mode::{Mode, ModeFlag, Modes, SeekMode},
    stat::{DirectoryStats, FileStatus, NandStats},
};

pub type Uid = u32;
pub type Gid = u16;
pub type Fd = u32;
pub type FileAttribute = u8;

pub trait FileSystem {
    /// 清空整个文件系统，仅限root
    fn format(&mut self, uid: Uid) -> Result<()>;

    fn open_file(&mut self, uid: Uid, gid: Gid, path: &str, mode: Mode) -> Result<Fd>;

    fn close(&mut self, fd: Fd) -> Result<()>;

    /// 返回实际读取的字节数，不会越过打开时的文件大小
    fn read_bytes_from_file(&mut self, fd: Fd, buf: &mut [u8]) -> Result<u32>;

    fn write_bytes_to_file(&mut self, fd: Fd, buf: &[u8]) -> Result<u32>;

    /// 与POSIX不同，不允许越过文件末尾
    fn seek_file(&mut self, fd: Fd, offset: u32, mode: SeekMode) -> Result<u32>;

    fn get_file_status(&mut self, fd: Fd) -> Result<FileStatus>;

    fn create_file(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
        attribute: FileAttribute,
        modes: Modes,
    ) -> Result<()>;

    fn create_directory(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
        attribute: FileAttribute,
        modes: Modes,
    ) -> Result<()>;

    fn delete(&mut self, uid: Uid, gid: Gid, path: &str) -> Result<()>;

    fn rename(&mut self, uid: Uid, gid: Gid, old_path: &str, new_path: &str) -> Result<()>;

    fn read_directory(&mut self, uid: Uid, gid: Gid, path: &str) -> Result<Vec<String>>;

    fn get_metadata(&mut self, uid: Uid, gid: Gid, path: &str) -> Result<Metadata>;

    fn set_metadata(
        &mut self,
        caller_uid: Uid,
        path: &str,
        uid: Uid,
        gid: Gid,
        attribute: FileAttribute,
        modes: Modes,
    ) -> Result<()>;

    fn get_nand_stats(&mut self) -> Result<NandStats>;

    fn get_directory_stats(&mut self, path: &str) -> Result<DirectoryStats>;

    /// 以RAII句柄的形式打开文件
    fn open(&mut self, uid: Uid, gid: Gid, path: &str, mode: Mode) -> Result<FileHandle<'_, Self>>
    where
        Self: Sized,
    {
        let fd = self.open_file(uid, gid, path, mode)?;
        Ok(FileHandle::new(self, fd))
    }

    /// 以读写模式打开文件，不存在则先创建
    fn create_and_open_file(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
        modes: Modes,
    ) -> Result<FileHandle<'_, Self>>
    where
        Self: Sized,
    {
        if let Ok(fd) = self.open_file(uid, gid, path, Mode::all()) {
            return Ok(FileHandle::new(self, fd));
        }

        self.create_file(uid, gid, path, 0, modes)?;
        self.open(uid, gid, path, Mode::all())
    }

    /// 创建`path`的每一级父目录（不含最后一项）
    ///
    /// 已存在的目录直接跳过，途中遇到文件则报[`Error::Invalid`]。
    fn create_full_path(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
        attribute: FileAttribute,
        modes: Modes,
    ) -> Result<()> {
        let separators = path
            .char_indices()
            .skip(1)
            .filter_map(|(i, c)| (c == '/').then_some(i));

        for end in separators {
            let subpath = &path[..end];
            match self.get_metadata(uid, gid, subpath) {
                Ok(metadata) if metadata.is_file => return Err(Error::Invalid),
                Ok(_) | Err(Error::NotFound) => (),
                Err(e) => return Err(e),
            }

            match self.create_directory(uid, gid, subpath, attribute, modes) {
                Ok(()) | Err(Error::AlreadyExists) => (),
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

/// 离开作用域时自动关闭的文件句柄
#[derive(Debug)]
pub struct FileHandle<'a, F: FileSystem + ?Sized> {
    fs: &'a mut F,
    fd: Option<Fd>,
}

impl<'a, F: FileSystem + ?Sized> FileHandle<'a, F> {
    pub fn new(fs: &'a mut F, fd: Fd) -> Self {
        Self { fs, fd: Some(fd) }
    }

    pub fn fd(&self) -> Option<Fd> {
        self.fd
    }

    /// 交出描述符，之后不再自动关闭
    pub fn release(mut self) -> Option<Fd> {
        self.fd.take()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<u32> {
        let fd = self.fd.ok_or(Error::Invalid)?;
        self.fs.read_bytes_from_file(fd, buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<u32> {
        let fd = self.fd.ok_or(Error::Invalid)?;
        self.fs.write_bytes_to_file(fd, buf)
    }

    pub fn seek(&mut self, offset: u32, mode: SeekMode) -> Result<u32> {
        let fd = self.fd.ok_or(Error::Invalid)?;
        self.fs.seek_file(fd, offset, mode)
    }

    pub fn status(&mut self) -> Result<FileStatus> {
        let fd = self.fd.ok_or(Error::Invalid)?;
        self.fs.get_file_status(fd)
    }

    /// 显式关闭并取得关闭的结果
    pub fn close(mut self) -> Result<()> {
        match self.fd.take() {
            Some(fd) => self.fs.close(fd),
            None => Ok(()),
        }
    }
}

impl<F: FileSystem + ?Sized> Drop for FileHandle<'_, F> {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            if let Err(e) = self.fs.close(fd) {
                log::error!("Failed to close fd {fd}: {e}");
            }
        }
    }
}
