use alloc::string::String;
use alloc::vec::Vec;

use vfs::{
    DirectoryStats, Error, Fd, FileAttribute, FileStatus, FileSystem, Gid, Metadata, Mode,
    ModeFlag, Modes, NandStats, Result, SeekMode, Uid,
};

use crate::ClusterId;
use crate::control::NandFileSystem;
use crate::handle::Handle;
use crate::inode::FileCache;
use crate::path::{MAX_PATH_DEPTH, Path, resolve, resolve_dir};
use crate::perm::has_permission;
use crate::volume::fst::{NO_CHILD, stored_name};
use crate::volume::{FST_ENTRIES, FstEntry};

impl NandFileSystem {
    fn handle(&self, fd: Fd) -> Result<&Handle> {
        self.handles
            .get(fd)
            .filter(|handle| (handle.fst_index as usize) < FST_ENTRIES)
            .ok_or(Error::Invalid)
    }

    fn handle_mut(&mut self, fd: Fd) -> Result<&mut Handle> {
        self.handles
            .get_mut(fd)
            .filter(|handle| (handle.fst_index as usize) < FST_ENTRIES)
            .ok_or(Error::Invalid)
    }

    fn create_entry(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
        attribute: FileAttribute,
        modes: Modes,
        is_file: bool,
    ) -> Result<()> {
        if !path.is_valid_non_root() || !path.is_printable() {
            return Err(Error::Invalid);
        }
        if !is_file && path.depth() > MAX_PATH_DEPTH {
            return Err(Error::TooManyPathComponents);
        }
        let (parent_path, name) = path.parent_file().ok_or(Error::Invalid)?;

        self.transact(|sb, _| {
            let parent = resolve_dir(&sb.fst, parent_path)?;
            if !has_permission(&sb.fst[parent], uid, gid, ModeFlag::Write.into()) {
                return Err(Error::AccessDenied);
            }

            // 超过12字节的名称会被截断，按截断后的名称查重
            let exists = sb
                .fst
                .children(parent)
                .any(|i| sb.fst[i].name_bytes() == stored_name(name));
            if exists {
                return Err(Error::AlreadyExists);
            }

            let index = sb.fst.unused_index().ok_or(Error::FstFull)?;
            let mut entry = FstEntry {
                mode: if is_file { 1 } else { 2 },
                attr: attribute,
                sub: if is_file {
                    ClusterId::LAST_IN_CHAIN.raw()
                } else {
                    NO_CHILD
                },
                uid,
                gid,
                ..FstEntry::default()
            };
            entry.set_name(name);
            entry.set_modes(modes);
            sb.fst[index] = entry;
            sb.fst.link_child(parent, index);
            Ok(())
        })
    }
}

impl FileSystem for NandFileSystem {
    fn format(&mut self, uid: Uid) -> Result<()> {
        if uid != 0 {
            return Err(Error::AccessDenied);
        }

        let mut superblock = self.store.get().map(|sb| sb.clone()).unwrap_or_default();
        superblock.format();
        self.store.commit(superblock)?;

        self.handles.close_all();
        self.cache = FileCache::default();
        log::info!("Formatted NAND");
        Ok(())
    }

    fn open_file(&mut self, uid: Uid, gid: Gid, path: &str, mode: Mode) -> Result<Fd> {
        if !path.is_valid_non_root() {
            return Err(Error::Invalid);
        }

        let superblock = self.store.get()?;
        let index = resolve(&superblock.fst, path).ok_or(Error::NotFound)?;
        let entry = superblock.fst[index];
        if !entry.is_file() {
            return Err(Error::Invalid);
        }
        if !has_permission(&entry, uid, gid, mode) {
            return Err(Error::AccessDenied);
        }

        let (fd, handle) = self.handles.assign(uid, gid).ok_or(Error::NoFreeHandle)?;
        handle.fst_index = index;
        handle.mode = mode;
        // 同一文件打开两次时，另一个句柄的写入不会改变本句柄可读的范围
        handle.file_size = entry.size;
        Ok(fd)
    }

    fn close(&mut self, fd: Fd) -> Result<()> {
        self.handles.get(fd).ok_or(Error::Invalid)?;

        if self.cache.fd == Some(fd) {
            self.flush_file_cache()?;
            self.cache.fd = None;
        }

        let flush_needed = self
            .handles
            .get(fd)
            .is_some_and(|handle| handle.superblock_flush_needed);
        if flush_needed {
            self.store.flush()?;
        }

        self.handles.release(fd);
        Ok(())
    }

    fn read_bytes_from_file(&mut self, fd: Fd, buf: &mut [u8]) -> Result<u32> {
        let handle = self.handle(fd)?;
        if !handle.mode.contains(ModeFlag::Read) {
            return Err(Error::AccessDenied);
        }

        let remaining = handle.file_size.saturating_sub(handle.file_offset);
        let count = u32::try_from(buf.len()).unwrap_or(u32::MAX).min(remaining);

        let mut processed = 0;
        while processed < count {
            let offset = self.handle(fd)?.file_offset;
            self.populate_file_cache(fd, offset, false)?;

            let window = self.cache.window(offset);
            let len = window.len().min((count - processed) as usize);
            let start = processed as usize;
            buf[start..start + len].copy_from_slice(&window[..len]);

            self.handle_mut(fd)?.file_offset += len as u32;
            processed += len as u32;
        }

        Ok(count)
    }

    fn write_bytes_to_file(&mut self, fd: Fd, buf: &[u8]) -> Result<u32> {
        let handle = self.handle(fd)?;
        if !handle.mode.contains(ModeFlag::Write) {
            return Err(Error::AccessDenied);
        }

        let count = u32::try_from(buf.len()).map_err(|_| Error::Invalid)?;

        let mut processed = 0;
        while processed < count {
            let offset = self.handle(fd)?.file_offset;
            self.populate_file_cache(fd, offset, true)?;

            let window = self.cache.window(offset);
            let len = window.len().min((count - processed) as usize);
            let start = processed as usize;
            window[..len].copy_from_slice(&buf[start..start + len]);

            let handle = self.handle_mut(fd)?;
            handle.file_offset += len as u32;
            handle.file_size = handle.file_size.max(handle.file_offset);
            processed += len as u32;
        }

        Ok(count)
    }

    fn seek_file(&mut self, fd: Fd, offset: u32, mode: SeekMode) -> Result<u32> {
        let handle = self.handle_mut(fd)?;

        let base = match mode {
            SeekMode::Set => 0,
            SeekMode::Current => handle.file_offset,
            SeekMode::End => handle.file_size,
        };
        let position = base.checked_add(offset).ok_or(Error::Invalid)?;

        // 与POSIX不同，不允许越过文件末尾
        if position > handle.file_size {
            return Err(Error::Invalid);
        }

        handle.file_offset = position;
        Ok(position)
    }

    fn get_file_status(&mut self, fd: Fd) -> Result<FileStatus> {
        let handle = self.handle(fd)?;
        Ok(FileStatus {
            size: handle.file_size,
            offset: handle.file_offset,
        })
    }

    fn create_file(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
        attribute: FileAttribute,
        modes: Modes,
    ) -> Result<()> {
        self.create_entry(uid, gid, path, attribute, modes, true)
    }

    fn create_directory(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
        attribute: FileAttribute,
        modes: Modes,
    ) -> Result<()> {
        self.create_entry(uid, gid, path, attribute, modes, false)
    }

    fn delete(&mut self, uid: Uid, gid: Gid, path: &str) -> Result<()> {
        if !path.is_valid_non_root() {
            return Err(Error::Invalid);
        }
        let (parent_path, name) = path.parent_file().ok_or(Error::Invalid)?;

        self.transact(|sb, handles| {
            let parent = resolve_dir(&sb.fst, parent_path)?;
            if !has_permission(&sb.fst[parent], uid, gid, ModeFlag::Write.into()) {
                return Err(Error::AccessDenied);
            }

            let index = sb.fst.find_child(parent, name).ok_or(Error::NotFound)?;
            if handles.is_in_use(sb, index) {
                return Err(Error::InUse);
            }

            sb.remove_entry(parent, index)
        })
    }

    fn rename(&mut self, uid: Uid, gid: Gid, old_path: &str, new_path: &str) -> Result<()> {
        if !old_path.is_valid_non_root() || !new_path.is_valid_non_root() {
            return Err(Error::Invalid);
        }
        let (old_parent_path, old_name) = old_path.parent_file().ok_or(Error::Invalid)?;
        let (new_parent_path, new_name) = new_path.parent_file().ok_or(Error::Invalid)?;

        self.transact(|sb, handles| {
            let old_parent = resolve_dir(&sb.fst, old_parent_path)?;
            let new_parent = resolve_dir(&sb.fst, new_parent_path)?;
            let write = ModeFlag::Write.into();
            if !has_permission(&sb.fst[old_parent], uid, gid, write)
                || !has_permission(&sb.fst[new_parent], uid, gid, write)
            {
                return Err(Error::AccessDenied);
            }

            let index = sb.fst.find_child(old_parent, old_name).ok_or(Error::NotFound)?;
            let entry = sb.fst[index];

            // 文件只能移动，不能改名
            if entry.is_file() && stored_name(old_name) != stored_name(new_name) {
                return Err(Error::Invalid);
            }

            if handles.is_in_use(sb, index) {
                return Err(Error::InUse);
            }

            // 目录不能移进自己的子树
            if entry.is_directory()
                && (new_parent == index || sb.descendants(index).contains(&new_parent))
            {
                return Err(Error::Invalid);
            }

            if let Some(target) = sb.fst.find_child(new_parent, new_name) {
                if sb.fst[target].kind() != entry.kind() || target == index {
                    return Err(Error::Invalid);
                }
                if handles.is_in_use(sb, target) {
                    return Err(Error::InUse);
                }
                sb.remove_entry(new_parent, target)?;
            }

            if !sb.fst.unlink_child(old_parent, index) {
                return Err(Error::NotFound);
            }
            sb.fst[index].set_name(new_name);
            sb.fst.link_child(new_parent, index);
            Ok(())
        })
    }

    fn read_directory(&mut self, uid: Uid, gid: Gid, path: &str) -> Result<Vec<String>> {
        if !path.is_valid_absolute() {
            return Err(Error::Invalid);
        }

        let superblock = self.store.get()?;
        let fst = &superblock.fst;
        let index = resolve(fst, path).ok_or(Error::NotFound)?;
        if !has_permission(&fst[index], uid, gid, ModeFlag::Read.into()) {
            return Err(Error::AccessDenied);
        }
        if !fst[index].is_directory() {
            return Err(Error::Invalid);
        }

        Ok(fst
            .children(index)
            .map(|i| fst[i].name_lossy().into_owned())
            .collect())
    }

    fn get_metadata(&mut self, uid: Uid, gid: Gid, path: &str) -> Result<Metadata> {
        if path.is_empty() {
            return Err(Error::Invalid);
        }

        let superblock = self.store.get()?;
        let fst = &superblock.fst;
        let index = if path == "/" {
            0
        } else if path.is_valid_non_root() {
            let (parent_path, name) = path.parent_file().ok_or(Error::Invalid)?;
            let parent = resolve_dir(fst, parent_path)?;
            if !has_permission(&fst[parent], uid, gid, ModeFlag::Read.into()) {
                return Err(Error::AccessDenied);
            }
            fst.find_child(parent, name).ok_or(Error::NotFound)?
        } else {
            return Err(Error::Invalid);
        };

        let entry = &fst[index];
        Ok(Metadata {
            uid: entry.uid,
            gid: entry.gid,
            attribute: entry.attr,
            modes: entry.modes(),
            is_file: entry.is_file(),
            fst_index: index,
            size: entry.size,
        })
    }

    fn set_metadata(
        &mut self,
        caller_uid: Uid,
        path: &str,
        uid: Uid,
        gid: Gid,
        attribute: FileAttribute,
        modes: Modes,
    ) -> Result<()> {
        if !path.is_valid_absolute() {
            return Err(Error::Invalid);
        }

        self.transact(|sb, _| {
            let index = resolve(&sb.fst, path).ok_or(Error::NotFound)?;
            let entry = &mut sb.fst[index];

            if caller_uid != 0 && caller_uid != entry.uid {
                return Err(Error::AccessDenied);
            }
            if caller_uid != 0 && entry.uid != uid {
                return Err(Error::AccessDenied);
            }
            if entry.uid != uid && entry.is_file() && entry.size != 0 {
                return Err(Error::FileNotEmpty);
            }

            entry.uid = uid;
            entry.gid = gid;
            entry.attr = attribute;
            entry.set_modes(modes);
            Ok(())
        })
    }

    fn get_nand_stats(&mut self) -> Result<NandStats> {
        let mut stats = self.store.get()?.nand_stats();

        // 尚未写回的缓存簇迟早会占用一个簇
        if self.cache.is_dirty() {
            stats.free_clusters = stats.free_clusters.saturating_sub(1);
            stats.used_clusters += 1;
        }

        Ok(stats)
    }

    fn get_directory_stats(&mut self, path: &str) -> Result<DirectoryStats> {
        if !path.is_valid_absolute() {
            return Err(Error::SuperblockInitFailed);
        }

        let superblock = self.store.get()?;
        let index = resolve(&superblock.fst, path).ok_or(Error::NotFound)?;
        if !superblock.fst[index].is_directory() {
            return Err(Error::Invalid);
        }

        Ok(superblock.directory_stats(index))
    }
}
