use binrw::binrw;
use vfs::{Fd, Gid, Mode, Uid};

use crate::volume::Superblock;

pub const MAX_HANDLES: usize = 16;

/// 打开的文件
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    #[br(map = |b: u8| b != 0)]
    #[bw(map = |b: &bool| u8::from(*b))]
    pub opened: bool,
    pub fst_index: u16,
    pub uid: Uid,
    pub gid: Gid,
    #[br(map = |bits: u8| Mode::from_bits_truncate(bits))]
    #[bw(map = |mode: &Mode| mode.bits())]
    pub mode: Mode,
    pub file_offset: u32,
    /// 打开时的文件大小，此后只随本句柄的写入增长
    pub file_size: u32,
    #[br(map = |b: u8| b != 0)]
    #[bw(map = |b: &bool| u8::from(*b))]
    pub superblock_flush_needed: bool,
}

impl Default for Handle {
    fn default() -> Self {
        Self {
            opened: false,
            fst_index: 0xFFFF,
            uid: 0,
            gid: 0,
            mode: Mode::empty(),
            file_offset: 0,
            file_size: 0,
            superblock_flush_needed: false,
        }
    }
}

/// 固定16个槽位的句柄表，fd即槽位下标
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HandleTable {
    handles: [Handle; MAX_HANDLES],
}

impl HandleTable {
    pub fn from_handles(handles: [Handle; MAX_HANDLES]) -> Self {
        Self { handles }
    }

    pub fn handles(&self) -> &[Handle; MAX_HANDLES] {
        &self.handles
    }

    /// 占用下标最小的空闲槽位
    pub fn assign(&mut self, uid: Uid, gid: Gid) -> Option<(Fd, &mut Handle)> {
        let (fd, handle) = self
            .handles
            .iter_mut()
            .enumerate()
            .find(|(_, handle)| !handle.opened)?;

        *handle = Handle {
            opened: true,
            uid,
            gid,
            ..Handle::default()
        };
        Some((fd as Fd, handle))
    }

    pub fn get(&self, fd: Fd) -> Option<&Handle> {
        self.handles
            .get(fd as usize)
            .filter(|handle| handle.opened)
    }

    pub fn get_mut(&mut self, fd: Fd) -> Option<&mut Handle> {
        self.handles
            .get_mut(fd as usize)
            .filter(|handle| handle.opened)
    }

    pub fn release(&mut self, fd: Fd) {
        if let Some(handle) = self.handles.get_mut(fd as usize) {
            *handle = Handle::default();
        }
    }

    pub fn close_all(&mut self) {
        self.handles.fill(Handle::default());
    }

    pub fn is_file_opened(&self, fst_index: u16) -> bool {
        self.handles
            .iter()
            .any(|handle| handle.opened && handle.fst_index == fst_index)
    }

    /// 目录下(递归)是否有打开的文件
    pub fn is_directory_in_use(&self, superblock: &Superblock, dir: u16) -> bool {
        superblock
            .descendants(dir)
            .into_iter()
            .any(|index| superblock.fst[index].is_file() && self.is_file_opened(index))
    }

    /// 删除或覆盖表项前的检查
    pub fn is_in_use(&self, superblock: &Superblock, index: u16) -> bool {
        let entry = &superblock.fst[index];
        if entry.is_directory() {
            self.is_directory_in_use(superblock, index)
        } else if entry.is_file() {
            self.is_file_opened(index)
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use vfs::Mode;

    use super::{HandleTable, MAX_HANDLES};

    #[test]
    fn assign_and_release() {
        let mut table = HandleTable::default();
        for expected in 0..MAX_HANDLES as u32 {
            let (fd, handle) = table.assign(1, 2).unwrap();
            handle.fst_index = 10 + expected as u16;
            handle.mode = Mode::all();
            assert_eq!(expected, fd);
        }
        assert!(table.assign(1, 2).is_none());

        table.release(3);
        assert!(table.get(3).is_none());
        assert!(!table.is_file_opened(13));
        assert_eq!(3, table.assign(4, 5).unwrap().0);
        assert_eq!(4, table.get(3).unwrap().uid);
        assert!(table.get(MAX_HANDLES as u32).is_none());

        table.close_all();
        assert!(table.get(0).is_none());
    }
}
