use kfs::{
    format_device, FileHandle, FormatOptions, FsError, InodeId, KFileSystem, MemDisk, NodeType,
    FileDisk, FileDiskBuilder, BLOCK_SIZE, GID_USER, PERM_ALL, PERM_OWNER_READ, PERM_OWNER_WRITE,
};

const ROOT: InodeId = InodeId::new(0, 1);

/// Formats a 12 block device: 3 inode blocks (6 inodes), 1 bitmap block,
/// 8 data blocks.
fn small_device(fs_nr: u8) -> MemDisk {
    let mut disk = MemDisk::new(12);
    format_device(&mut disk, &FormatOptions::new(fs_nr, 6)).unwrap();
    disk
}

#[test]
fn create_write_read_remove_scenario() {
    let mut fs = KFileSystem::new();
    fs.register_device(small_device(1)).unwrap();

    // Create "x" in the root and append 600 bytes, spanning two blocks.
    let id = fs
        .create_node(ROOT, "x", NodeType::File, 5, 2, PERM_ALL)
        .unwrap();
    let payload: Vec<u8> = (0..600u32).map(|i| (i * 7 % 256) as u8).collect();
    let mut handle = FileHandle::new(id);
    assert_eq!(fs.write(&mut handle, &payload).unwrap(), 600);

    let node = fs.get_inode(id).unwrap();
    assert_eq!(node.n_bytes, 600);
    assert_eq!(node.n_blocks, 2);

    // Read the content back from offset 0.
    let mut read_back = vec![0u8; 600];
    let mut cursor = FileHandle::new(id);
    assert_eq!(fs.read(&mut cursor, &mut read_back).unwrap(), 600);
    assert_eq!(read_back, payload);

    // Remove it: the root shrinks back to its ".." entry and both data
    // blocks return to the allocator as the next two picks.
    fs.remove_dir_entry(ROOT, "x").unwrap();
    assert_eq!(fs.get_inode(ROOT).unwrap().n_bytes, 1);
    assert!(fs.get_inode(id).unwrap().is_free());

    let first = fs.alloc_block(1).unwrap();
    let second = fs.alloc_block(1).unwrap();
    assert_eq!((first, second), (4, 5));
}

#[test]
fn multi_device_namespace_routes_by_fs_nr() {
    let mut fs = KFileSystem::new();
    fs.register_device(small_device(1)).unwrap();
    fs.register_device(small_device(2)).unwrap();

    let on_one = fs
        .create_node(InodeId::new(1, 1), "a", NodeType::File, 0, 0, PERM_ALL)
        .unwrap();
    let on_two = fs
        .create_node(InodeId::new(2, 1), "a", NodeType::File, 0, 0, PERM_ALL)
        .unwrap();
    assert_eq!(on_one.dev, 1);
    assert_eq!(on_two.dev, 2);

    let mut handle = FileHandle::new(on_two);
    fs.write(&mut handle, b"second device").unwrap();

    // The same name on device 1 stays empty.
    assert_eq!(fs.get_inode(on_one).unwrap().n_bytes, 0);
    assert_eq!(fs.get_inode(on_two).unwrap().n_bytes, 13);
}

#[test]
fn permissions_govern_file_access() {
    let mut fs = KFileSystem::new();
    fs.register_device(small_device(1)).unwrap();

    let id = fs
        .create_node(
            ROOT,
            "secret",
            NodeType::File,
            5,
            2,
            PERM_OWNER_READ | PERM_OWNER_WRITE,
        )
        .unwrap();

    let owner = fs.check_permission(id, 5, GID_USER).unwrap();
    assert!(owner.read && owner.write && owner.meta);

    // Same group, but the node carries no group bits.
    let peer = fs.check_permission(id, 6, 2).unwrap();
    assert!(!peer.read && !peer.write && !peer.meta);

    let root = fs.check_permission(id, 0, 2).unwrap();
    assert!(root.read && root.write && root.meta);
}

#[test]
fn filesystem_survives_device_reopen() {
    let backing = tempfile::NamedTempFile::new().unwrap();
    let mut disk = FileDiskBuilder::from(backing.reopen().unwrap())
        .with_block_count(12)
        .build()
        .unwrap();
    format_device(&mut disk, &FormatOptions::new(1, 6)).unwrap();

    {
        let mut fs = KFileSystem::new();
        fs.register_device(disk).unwrap();
        let id = fs
            .create_node(ROOT, "persist", NodeType::File, 0, 0, PERM_ALL)
            .unwrap();
        let mut handle = FileHandle::new(id);
        fs.write(&mut handle, b"still here after reopen").unwrap();
    }

    let reopened: FileDisk = FileDiskBuilder::from(backing.reopen().unwrap())
        .with_block_count(12)
        .clear_medium(false)
        .build()
        .unwrap();
    let mut fs = KFileSystem::new();
    fs.register_device(reopened).unwrap();

    let id = fs.lookup(ROOT, "persist").unwrap();
    let mut buf = [0u8; 64];
    let n = fs.read_at(id, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"still here after reopen");
}

#[test]
fn directory_listing_walks_every_entry() {
    let mut fs = KFileSystem::new();
    fs.register_device(small_device(1)).unwrap();

    for name in &["alpha", "beta", "gamma"] {
        fs.create_node(ROOT, name, NodeType::File, 0, 0, PERM_ALL)
            .unwrap();
    }

    let count = fs.get_inode(ROOT).unwrap().n_bytes;
    let mut names = Vec::new();
    for i in 0..count {
        names.push(fs.dir_entry_at(ROOT, i).unwrap().name_str());
    }
    assert_eq!(names, vec!["..", "alpha", "beta", "gamma"]);

    match fs.dir_entry_at(ROOT, count) {
        Err(FsError::IndexOutOfBounds { .. }) => (),
        other => panic!("unexpected result: {:?}", other.err()),
    }
}
