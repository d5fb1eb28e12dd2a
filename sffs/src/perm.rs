use vfs::{Gid, Mode, Uid};

use crate::volume::FstEntry;

/// root总是放行；其余按属主、属组、其他人的顺序选出一组权限，
/// 请求的位必须全部具备
pub fn has_permission(entry: &FstEntry, uid: Uid, gid: Gid, requested: Mode) -> bool {
    if uid == 0 {
        return true;
    }

    let modes = entry.modes();
    let granted = if entry.uid == uid {
        modes.owner
    } else if entry.gid == gid {
        modes.group
    } else {
        modes.other
    };
    granted.contains(requested)
}

#[cfg(test)]
mod tests {
    use vfs::{Mode, ModeFlag, Modes};

    use super::has_permission;
    use crate::volume::FstEntry;

    fn entry() -> FstEntry {
        let mut entry = FstEntry {
            mode: 1,
            uid: 5,
            gid: 3,
            ..FstEntry::default()
        };
        entry.set_modes(Modes::new(Mode::all(), ModeFlag::Read.into(), Mode::empty()));
        entry
    }

    #[test]
    fn owner_group_other() {
        let entry = entry();
        assert!(has_permission(&entry, 5, 0, Mode::all()));
        assert!(has_permission(&entry, 6, 3, ModeFlag::Read.into()));
        assert!(!has_permission(&entry, 6, 3, ModeFlag::Write.into()));
        assert!(!has_permission(&entry, 6, 2, ModeFlag::Read.into()));
        assert!(!has_permission(&entry, 6, 2, ModeFlag::Write.into()));
        assert!(has_permission(&entry, 6, 2, Mode::empty()));
    }

    #[test]
    fn root_bypasses() {
        let mut entry = entry();
        entry.set_modes(Modes::default());
        assert!(has_permission(&entry, 0, 0, Mode::all()));
    }

    #[test]
    fn owner_match_takes_precedence() {
        let mut entry = entry();
        entry.set_modes(Modes::new(Mode::empty(), Mode::all(), Mode::all()));
        assert!(!has_permission(&entry, 5, 3, ModeFlag::Read.into()));
    }
}
