use enumflags2::{BitFlags, bitflags};

/// 访问权限位，没有执行位
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeFlag {
    Read = 0b01,
    Write = 0b10,
}

pub type Mode = BitFlags<ModeFlag>;

/// 属主、属组与其他人各自的权限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modes {
    pub owner: Mode,
    pub group: Mode,
    pub other: Mode,
}

impl Modes {
    pub const fn new(owner: Mode, group: Mode, other: Mode) -> Self {
        Self {
            owner,
            group,
            other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Set,
    Current,
    End,
}
