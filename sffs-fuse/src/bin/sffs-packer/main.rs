mod cli;

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sffs::{NandCrypto, NandFileSystem, SoftwareCrypto};
use sffs_fuse::NandFile;
use sffs_fuse::packer::{extract_dir, join, pack_dir, read_file};
use typed_bytesize::ByteSizeIec;
use vfs::FileSystem;

use self::cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let crypto = load_crypto(cli.keys.as_deref())?;

    let nand = match cli.command {
        Command::Format => NandFile::create(&cli.image),
        _ => NandFile::open(&cli.image),
    }
    .with_context(|| format!("cannot open image {:?}", cli.image))?;
    let mut nfs = NandFileSystem::new(Arc::new(nand), crypto);

    match cli.command {
        Command::Format => {
            nfs.format(0)?;
            log::info!("formatted {:?}", cli.image);
        }
        Command::Pack {
            source,
            target,
            uid,
            gid,
        } => {
            pack_dir(&mut nfs, &source, &target, uid, gid)?;
        }
        Command::Ls { path } => {
            for name in nfs.read_directory(0, 0, &path)? {
                let child = join(&path, &name);
                let metadata = nfs.get_metadata(0, 0, &child)?;
                let kind = if metadata.is_file { '-' } else { 'd' };
                println!(
                    "{kind} {:>8x} {:>4x} {:>8} {name}",
                    metadata.uid, metadata.gid, metadata.size
                );
            }
        }
        Command::Cat { path } => {
            let data = read_file(&mut nfs, &path)?;
            io::stdout().write_all(&data)?;
        }
        Command::Extract { out, path } => extract_dir(&mut nfs, &path, &out)?,
        Command::Stats => {
            let stats = nfs.get_nand_stats()?;
            let bytes = |clusters: u32| ByteSizeIec(clusters as u64 * stats.cluster_size as u64);
            println!("used:     {}", bytes(stats.used_clusters));
            println!("free:     {}", bytes(stats.free_clusters));
            println!("bad:      {} clusters", stats.bad_clusters);
            println!("reserved: {} clusters", stats.reserved_clusters);
            println!("inodes:   {} used, {} free", stats.used_inodes, stats.free_inodes);
        }
    }

    Ok(())
}

fn load_crypto(keys: Option<&Path>) -> anyhow::Result<Arc<dyn NandCrypto>> {
    let crypto = match keys {
        Some(path) => {
            let bytes = fs::read(path).with_context(|| format!("cannot read keys {path:?}"))?;
            SoftwareCrypto::from_keys_bin(&bytes).context("keys file is too short")?
        }
        None => {
            log::warn!("no keys given, using all-zero keys");
            SoftwareCrypto::new(&[0; 16], &[0; 20])
        }
    };
    Ok(Arc::new(crypto))
}
