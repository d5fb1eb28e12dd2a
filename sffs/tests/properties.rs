use std::sync::Arc;

use nand_dev::MemNand;
use proptest::prelude::*;
use sffs::volume::CLUSTER_DATA_SIZE;
use sffs::{ClusterId, NandFileSystem, SoftwareCrypto};
use vfs::{FileSystem, Mode, ModeFlag, Modes, SeekMode};

fn formatted() -> NandFileSystem {
    let nand = Arc::new(MemNand::new());
    let crypto = Arc::new(SoftwareCrypto::new(&[3; 16], &[4; 20]));
    let mut fs = NandFileSystem::new(nand, crypto);
    fs.format(0).unwrap();
    fs
}

fn modes() -> Modes {
    Modes::new(Mode::all(), Mode::all(), Mode::all())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn chunked_writes_read_back(
        data in proptest::collection::vec(any::<u8>(), 0..3 * CLUSTER_DATA_SIZE),
        chunk in 1_usize..0x5000,
    ) {
        let mut fs = formatted();
        let mut file = fs.create_and_open_file(0, 0, "/blob", modes()).unwrap();
        for part in data.chunks(chunk) {
            prop_assert_eq!(part.len() as u32, file.write(part).unwrap());
        }
        file.close().unwrap();

        let mut file = fs.open(0, 0, "/blob", ModeFlag::Read.into()).unwrap();
        prop_assert_eq!(data.len() as u32, file.status().unwrap().size);
        let mut buf = vec![0; data.len()];
        prop_assert_eq!(data.len() as u32, file.read(&mut buf).unwrap());
        prop_assert_eq!(&data, &buf);
        file.close().unwrap();

        let clusters = data.len().div_ceil(CLUSTER_DATA_SIZE) as u32;
        prop_assert_eq!(clusters, fs.get_nand_stats().unwrap().used_clusters);
    }

    #[test]
    fn rewrites_keep_chains_disjoint(
        writes in proptest::collection::vec(
            (0_usize..2, 0_u32..2 * CLUSTER_DATA_SIZE as u32, 1_usize..0x3000, any::<u8>()),
            1..6,
        ),
    ) {
        let mut fs = formatted();
        let names = ["/a", "/b"];
        let mut models = [Vec::new(), Vec::new()];

        for (file, offset, len, byte) in writes {
            let model: &mut Vec<u8> = &mut models[file];
            let offset = (offset as usize).min(model.len());
            let mut handle = fs.create_and_open_file(0, 0, names[file], modes()).unwrap();
            handle.seek(offset as u32, SeekMode::Set).unwrap();
            handle.write(&vec![byte; len]).unwrap();
            handle.close().unwrap();

            if model.len() < offset + len {
                model.resize(offset + len, 0);
            }
            model[offset..offset + len].fill(byte);
        }

        let superblock = fs.superblock().unwrap().clone();
        let mut seen = std::collections::BTreeSet::new();
        for (name, model) in names.iter().zip(&models) {
            let metadata = fs.get_metadata(0, 0, name);
            if model.is_empty() {
                continue;
            }
            let metadata = metadata.unwrap();
            prop_assert_eq!(model.len() as u32, metadata.size);

            let entry = &superblock.fst[metadata.fst_index];
            let chain: Vec<ClusterId> = superblock.fat.chain(entry.first_cluster()).collect();
            prop_assert_eq!(model.len().div_ceil(CLUSTER_DATA_SIZE), chain.len());
            for id in chain {
                prop_assert!(seen.insert(id), "cluster shared between chains");
            }

            let mut file = fs.open(0, 0, name, ModeFlag::Read.into()).unwrap();
            let mut buf = vec![0; model.len()];
            file.read(&mut buf).unwrap();
            prop_assert_eq!(model, &buf);
        }

        prop_assert_eq!(seen.len() as u32, fs.get_nand_stats().unwrap().used_clusters);
    }
}
