//! 主机目录与镜像之间的复制

use std::fs;
use std::path::Path;

use anyhow::{Context, bail};
use sffs::NandFileSystem;
use vfs::{FileSystem, Gid, Mode, ModeFlag, Modes, Uid};

/// 打包进镜像的条目：属主与属组可读写，其他人只读
pub fn pack_modes() -> Modes {
    Modes::new(Mode::all(), Mode::all(), ModeFlag::Read.into())
}

pub fn join(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}

/// 以root身份读出整个文件
pub fn read_file(nfs: &mut NandFileSystem, path: &str) -> anyhow::Result<Vec<u8>> {
    let mut file = nfs.open(0, 0, path, ModeFlag::Read.into())?;
    let mut data = vec![0; file.status()?.size as usize];
    let read = file.read(&mut data)?;
    data.truncate(read as usize);
    file.close()?;
    Ok(data)
}

/// 把`source`下的内容复制到镜像的`target`目录，缺失的目录会被创建
pub fn pack_dir(
    nfs: &mut NandFileSystem,
    source: &Path,
    target: &str,
    uid: Uid,
    gid: Gid,
) -> anyhow::Result<()> {
    let target = target.trim_end_matches('/');
    if !target.is_empty() {
        nfs.create_full_path(uid, gid, &format!("{target}/"), 0, pack_modes())
            .with_context(|| format!("cannot create {target}"))?;
    }
    pack(nfs, source, target, uid, gid)
}

/// `target`不带结尾的`/`，根目录为空串
fn pack(
    nfs: &mut NandFileSystem,
    source: &Path,
    target: &str,
    uid: Uid,
    gid: Gid,
) -> anyhow::Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            bail!("non UTF-8 file name {:?}", entry.file_name());
        };
        let path = format!("{target}/{name}");

        if entry.file_type()?.is_dir() {
            log::info!("dir  {path}");
            nfs.create_directory(uid, gid, &path, 0, pack_modes())
                .with_context(|| format!("cannot create {path}"))?;
            pack(nfs, &entry.path(), &path, uid, gid)?;
        } else {
            log::info!("file {path}");
            let data = fs::read(entry.path())?;
            let mut file = nfs
                .create_and_open_file(uid, gid, &path, pack_modes())
                .with_context(|| format!("cannot create {path}"))?;
            file.write(&data)?;
            file.close()?;
        }
    }
    Ok(())
}

/// 把镜像中的`path`目录递归复制到主机的`out`
pub fn extract_dir(nfs: &mut NandFileSystem, path: &str, out: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(out)?;
    for name in nfs.read_directory(0, 0, path)? {
        let child = join(path, &name);
        let host = out.join(&name);
        if nfs.get_metadata(0, 0, &child)?.is_file {
            fs::write(&host, read_file(nfs, &child)?)?;
        } else {
            extract_dir(nfs, &child, &host)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nand_dev::MemNand;
    use sffs::SoftwareCrypto;

    use super::*;

    fn formatted() -> NandFileSystem {
        let crypto = Arc::new(SoftwareCrypto::new(&[1; 16], &[2; 20]));
        let mut nfs = NandFileSystem::new(Arc::new(MemNand::new()), crypto);
        nfs.format(0).unwrap();
        nfs
    }

    fn host_tree(root: &Path) {
        fs::create_dir_all(root.join("data/empty")).unwrap();
        fs::write(root.join("banner.bin"), vec![0xA5; 0x4100]).unwrap();
        fs::write(root.join("data/save.dat"), b"progress").unwrap();
    }

    #[test]
    fn pack_then_extract() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        host_tree(&source);

        let mut nfs = formatted();
        pack_dir(&mut nfs, &source, "/title/00010000/", 0, 1).unwrap();

        let save = nfs.get_metadata(0, 0, "/title/00010000/data/save.dat").unwrap();
        assert!(save.is_file);
        assert_eq!((0, 1, 8), (save.uid, save.gid, save.size));
        assert_eq!(pack_modes(), save.modes);
        assert!(!nfs.get_metadata(0, 0, "/title/00010000/data/empty").unwrap().is_file);

        let out = dir.path().join("out");
        extract_dir(&mut nfs, "/title/00010000", &out).unwrap();
        assert_eq!(vec![0xA5; 0x4100], fs::read(out.join("banner.bin")).unwrap());
        assert_eq!(b"progress", &fs::read(out.join("data/save.dat")).unwrap()[..]);
        assert!(out.join("data/empty").is_dir());
    }

    #[test]
    fn pack_into_root() {
        let dir = tempfile::tempdir().unwrap();
        host_tree(dir.path());

        let mut nfs = formatted();
        pack_dir(&mut nfs, dir.path(), "/", 0, 0).unwrap();

        let mut names = nfs.read_directory(0, 0, "/").unwrap();
        names.sort();
        assert_eq!(["banner.bin", "data"], names[..]);
        assert_eq!(b"progress", &read_file(&mut nfs, "/data/save.dat").unwrap()[..]);
    }

    #[test]
    fn pack_refuses_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();

        let mut nfs = formatted();
        nfs.create_directory(0, 0, "/data", 0, pack_modes()).unwrap();
        assert!(pack_dir(&mut nfs, dir.path(), "/", 0, 0).is_err());
    }
}
