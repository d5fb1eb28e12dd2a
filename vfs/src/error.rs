/// 文件系统操作的结果码
///
/// 判别值与主机系统的FS错误码一一对应，成功则由[`Ok`]表示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[repr(i32)]
pub enum Error {
    #[error("invalid argument")]
    Invalid = 1,
    #[error("access denied")]
    AccessDenied = 2,
    #[error("failed to write the superblock")]
    SuperblockWriteFailed = 3,
    #[error("no usable superblock")]
    SuperblockInitFailed = 4,
    #[error("already exists")]
    AlreadyExists = 5,
    #[error("not found")]
    NotFound = 6,
    #[error("file system table is full")]
    FstFull = 7,
    #[error("no free cluster left")]
    NoFreeSpace = 8,
    #[error("no free file handle left")]
    NoFreeHandle = 9,
    #[error("too many path components")]
    TooManyPathComponents = 10,
    #[error("in use")]
    InUse = 11,
    #[error("bad block")]
    BadBlock = 12,
    #[error("file is not empty")]
    FileNotEmpty = 15,
    #[error("integrity check failed")]
    CheckFailed = 16,
}

impl Error {
    /// 转换为IPC返回值：FS错误码从-100开始递减
    pub const fn ios_code(self) -> i32 {
        -(self as i32 + 100)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
