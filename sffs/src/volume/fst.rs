use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

use binrw::binrw;
use vfs::{Mode, Modes};

use super::FST_ENTRIES;
use crate::ClusterId;

/// 文件名的最大字节数
pub const NAME_LEN: usize = 12;

/// 名称落盘后保留的部分
pub fn stored_name(name: &str) -> &[u8] {
    &name.as_bytes()[..name.len().min(NAME_LEN)]
}

/// 目录没有子项时的`sub`
pub const NO_CHILD: u16 = 0xFFFF;
/// 兄弟链表的末尾
pub const NO_SIBLING: u16 = 0xFFFF;

/// 文件系统表中的一项，大小为0x20字节
///
/// `mode`的低2位为类型，其余依次是其他人、组、属主的权限，各2位。
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FstEntry {
    pub name: [u8; NAME_LEN],
    pub mode: u8,
    pub attr: u8,
    /// 文件：首簇；目录：首个子项
    pub sub: u16,
    pub sib: u16,
    pub size: u32,
    pub uid: u32,
    pub gid: u16,
    pub x3: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Free,
    File,
    Directory,
    Unknown,
}

impl FstEntry {
    pub fn new_root() -> Self {
        let mut root = Self {
            mode: 0x16,
            sub: NO_CHILD,
            sib: NO_SIBLING,
            ..Self::default()
        };
        root.set_name("/");
        root
    }

    /// 名称的有效部分，不含末尾的NUL
    pub fn name_bytes(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        &self.name[..len]
    }

    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name_bytes())
    }

    /// 截断到12字节，不足部分补0
    pub fn set_name(&mut self, name: &str) {
        let bytes = stored_name(name);
        self.name = [0; NAME_LEN];
        self.name[..bytes.len()].copy_from_slice(bytes);
    }

    pub fn kind(&self) -> EntryKind {
        match self.mode & 3 {
            0 => EntryKind::Free,
            1 => EntryKind::File,
            2 => EntryKind::Directory,
            _ => EntryKind::Unknown,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind() == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    pub fn first_cluster(&self) -> ClusterId {
        ClusterId::new(self.sub)
    }

    pub fn modes(&self) -> Modes {
        Modes::new(
            Mode::from_bits_truncate(self.mode >> 6),
            Mode::from_bits_truncate(self.mode >> 4),
            Mode::from_bits_truncate(self.mode >> 2),
        )
    }

    /// 保留类型位，替换权限位
    pub fn set_modes(&mut self, modes: Modes) {
        self.mode = (self.mode & 3)
            | (modes.owner.bits() << 6)
            | (modes.group.bits() << 4)
            | (modes.other.bits() << 2);
    }
}

/// 文件系统表，下标0恒为根目录
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fst {
    #[br(count = FST_ENTRIES)]
    entries: Vec<FstEntry>,
}

impl Default for Fst {
    fn default() -> Self {
        Self {
            entries: vec![FstEntry::default(); FST_ENTRIES],
        }
    }
}

impl Index<u16> for Fst {
    type Output = FstEntry;

    fn index(&self, index: u16) -> &Self::Output {
        &self.entries[index as usize]
    }
}

impl IndexMut<u16> for Fst {
    fn index_mut(&mut self, index: u16) -> &mut Self::Output {
        &mut self.entries[index as usize]
    }
}

impl Fst {
    pub fn get(&self, index: u16) -> Option<&FstEntry> {
        self.entries.get(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FstEntry> {
        self.entries.iter()
    }

    /// 第一个空闲项，跳过根目录
    pub fn unused_index(&self) -> Option<u16> {
        self.entries
            .iter()
            .skip(1)
            .position(|entry| entry.kind() == EntryKind::Free)
            .map(|i| i as u16 + 1)
    }

    /// 目录的子项下标，按兄弟链表顺序
    ///
    /// 链表越界或成环时停止。
    pub fn children(&self, dir: u16) -> impl Iterator<Item = u16> + '_ {
        let mut cursor = self.get(dir).map(|entry| entry.sub);
        let mut steps = 0;
        core::iter::from_fn(move || {
            let index = cursor.filter(|&i| (i as usize) < FST_ENTRIES && steps < FST_ENTRIES)?;
            steps += 1;
            cursor = Some(self[index].sib);
            Some(index)
        })
    }

    pub fn find_child(&self, parent: u16, name: &str) -> Option<u16> {
        if name.len() > NAME_LEN {
            return None;
        }
        self.children(parent)
            .find(|&i| self[i].name_bytes() == name.as_bytes())
    }

    /// 把`child`挂到`parent`子链表的头部
    pub fn link_child(&mut self, parent: u16, child: u16) {
        self[child].sib = self[parent].sub;
        self[parent].sub = child;
    }

    /// 把`child`从`parent`的子链表中摘下，找不到时返回`false`
    pub fn unlink_child(&mut self, parent: u16, child: u16) -> bool {
        if self[parent].sub == child {
            self[parent].sub = self[child].sib;
            return true;
        }

        let Some(prev) = self.children(parent).find(|&i| self[i].sib == child) else {
            return false;
        };
        self[prev].sib = self[child].sib;
        true
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use vfs::{Mode, ModeFlag, Modes};

    use super::*;

    fn fst_with(names: &[&str]) -> Fst {
        let mut fst = Fst::default();
        fst[0] = FstEntry::new_root();
        for (i, name) in names.iter().enumerate() {
            let index = i as u16 + 1;
            fst[index].set_name(name);
            fst[index].mode = 1;
            fst.link_child(0, index);
        }
        fst
    }

    #[test]
    fn mode_bits() {
        let mut entry = FstEntry {
            mode: 2,
            ..FstEntry::default()
        };
        entry.set_modes(Modes::new(Mode::all(), ModeFlag::Read.into(), Mode::empty()));
        assert_eq!(0b1101_0010, entry.mode);
        assert!(entry.is_directory());

        let modes = entry.modes();
        assert_eq!(Mode::all(), modes.owner);
        assert_eq!(Mode::from(ModeFlag::Read), modes.group);
        assert_eq!(Mode::empty(), modes.other);
    }

    #[test]
    fn root_entry() {
        let root = FstEntry::new_root();
        assert_eq!(b"/", root.name_bytes());
        assert!(root.is_directory());
        assert_eq!(Mode::empty(), root.modes().owner);
        assert_eq!(Mode::from(ModeFlag::Read), root.modes().group);
        assert_eq!(Mode::from(ModeFlag::Read), root.modes().other);
        assert_eq!(NO_CHILD, root.sub);
    }

    #[test]
    fn long_names_are_truncated() {
        let mut entry = FstEntry::default();
        entry.set_name("abcdefghijklmnop");
        assert_eq!(b"abcdefghijkl", entry.name_bytes());
        assert_eq!("abcdefghijkl", entry.name_lossy());
    }

    #[test]
    fn child_chain() {
        let mut fst = fst_with(&["a", "b", "c"]);
        let children: Vec<_> = fst.children(0).collect();
        assert_eq!([3, 2, 1], children[..]);
        assert_eq!(Some(2), fst.find_child(0, "b"));
        assert_eq!(None, fst.find_child(0, "abcdefghijklm"));
        assert_eq!(Some(4), fst.unused_index());

        assert!(fst.unlink_child(0, 2));
        let children: Vec<_> = fst.children(0).collect();
        assert_eq!([3, 1], children[..]);
        assert!(!fst.unlink_child(0, 2));

        assert!(fst.unlink_child(0, 3));
        assert_eq!(1, fst[0].sub);
    }
}
