use super::*;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fs() -> FileSystem {
    init_logger();
    FileSystem::new(FsConfig::default()).unwrap()
}

fn small(config: impl FnOnce(&mut FsConfig)) -> FileSystem {
    init_logger();
    let mut c = FsConfig::default();
    config(&mut c);
    FileSystem::new(c).unwrap()
}

#[test]
fn root_exists_and_is_empty() {
    let fs = fs();
    assert_eq!(fs.lifecycle(), Ok(Lifecycle::Active));
    assert!(fs.list().unwrap().is_empty());
    assert_eq!(fs.open_files(), Ok(0));
}

#[test]
fn path_must_start_with_separator() {
    let fs = fs();
    for bad in ["", "/", "f1", "f1/"] {
        assert_eq!(fs.lookup(bad), Err(FsError::InvalidPath(bad.to_string())));
        assert!(matches!(
            fs.open(bad, OpenFlags::CREATE),
            Err(FsError::InvalidPath(_))
        ));
    }
}

#[test]
fn open_without_create_fails_on_missing_file() {
    let fs = fs();
    assert_eq!(fs.open("/nope", OpenFlags::empty()), Err(FsError::NotFound));
    assert_eq!(fs.lookup("/nope"), Err(FsError::NotFound));
    assert_eq!(fs.open_files(), Ok(0));
}

#[test]
fn create_makes_file_visible_to_lookup() {
    let fs = fs();
    let h = fs.open("/f1", OpenFlags::CREATE).unwrap();
    let inode = fs.lookup("/f1").unwrap();
    assert_ne!(inode, ROOT_INODE);
    assert_eq!(fs.stat("/f1").unwrap().kind, FileType::File);
    assert_eq!(fs.list().unwrap(), vec!["f1".to_string()]);
    fs.close(h).unwrap();
}

#[test]
fn write_close_reopen_read() {
    let fs = fs();
    let h = fs.open("/f1", OpenFlags::CREATE).unwrap();
    assert_eq!(fs.write(h, b"AAA!"), Ok(4));
    fs.close(h).unwrap();

    let h = fs.open("/f1", OpenFlags::empty()).unwrap();
    let mut buf = [0u8; 39];
    assert_eq!(fs.read(h, &mut buf), Ok(4));
    assert_eq!(&buf[..4], b"AAA!");
    // At end of file.
    assert_eq!(fs.read(h, &mut buf), Ok(0));
    fs.close(h).unwrap();
}

#[test]
fn write_is_clamped_to_block() {
    let fs = fs();
    let h = fs.open("/big", OpenFlags::CREATE).unwrap();
    assert_eq!(fs.write(h, &[7u8; 1030]), Ok(1024));
    assert_eq!(fs.stat("/big").unwrap().size, 1024);
    // Offset already at capacity: zero bytes, not an error.
    assert_eq!(fs.write(h, b"more"), Ok(0));
    fs.close(h).unwrap();
}

#[test]
fn truncate_resets_size_and_frees_block() {
    let fs = fs();
    let h = fs.open("/t", OpenFlags::CREATE).unwrap();
    fs.write(h, b"hello world").unwrap();
    fs.close(h).unwrap();

    let h = fs.open("/t", OpenFlags::TRUNCATE).unwrap();
    assert_eq!(fs.stat("/t").unwrap().size, 0);
    assert_eq!(fs.write(h, b"abc"), Ok(3));
    assert_eq!(fs.stat("/t").unwrap().size, 3);
    fs.close(h).unwrap();

    // Only the root directory block and this file's block are in use.
    let state = fs.lock().unwrap();
    assert_eq!(state.blocks.free_count(), state.blocks.capacity() - 2);
}

#[test]
fn append_starts_at_end() {
    let fs = fs();
    let h = fs.open("/log", OpenFlags::CREATE).unwrap();
    fs.write(h, b"one,").unwrap();
    fs.close(h).unwrap();

    let h = fs.open("/log", OpenFlags::APPEND).unwrap();
    fs.write(h, b"two").unwrap();
    fs.close(h).unwrap();

    let h = fs.open("/log", OpenFlags::empty()).unwrap();
    assert_eq!(fs.read_to_vec(h, 100).unwrap(), b"one,two");
    fs.close(h).unwrap();
}

#[test]
fn offsets_are_per_handle() {
    let fs = fs();
    let w = fs.open("/s", OpenFlags::CREATE).unwrap();
    let r = fs.open("/s", OpenFlags::empty()).unwrap();
    fs.write(w, b"abcdef").unwrap();

    assert_eq!(fs.read_to_vec(r, 2).unwrap(), b"ab");
    assert_eq!(fs.read_to_vec(r, 100).unwrap(), b"cdef");

    // Overwrite in place through a fresh handle; size stays at 6.
    let o = fs.open("/s", OpenFlags::empty()).unwrap();
    fs.write(o, b"XY").unwrap();
    assert_eq!(fs.stat("/s").unwrap().size, 6);

    for h in [w, r, o] {
        fs.close(h).unwrap();
    }
}

#[test]
fn read_after_truncation_by_other_handle() {
    let fs = fs();
    let a = fs.open("/x", OpenFlags::CREATE).unwrap();
    fs.write(a, b"0123456789").unwrap();
    let b = fs.open("/x", OpenFlags::TRUNCATE).unwrap();

    // `a` sits past the new end of file.
    assert_eq!(fs.read_to_vec(a, 10).unwrap(), b"");
    assert_eq!(fs.write(b, b"zz"), Ok(2));
    fs.close(a).unwrap();
    fs.close(b).unwrap();
}

#[test]
fn close_twice_is_an_error() {
    let fs = fs();
    let h = fs.open("/c", OpenFlags::CREATE).unwrap();
    fs.close(h).unwrap();
    assert_eq!(fs.close(h), Err(FsError::BadHandle(h.val())));
    assert_eq!(fs.write(h, b"x"), Err(FsError::BadHandle(h.val())));
}

#[test]
fn inode_exhaustion_leaves_directory_alone() {
    let fs = small(|c| c.inode_table_size = 3);
    for name in ["/a", "/b"] {
        let h = fs.open(name, OpenFlags::CREATE).unwrap();
        fs.close(h).unwrap();
    }
    assert_eq!(
        fs.open("/c", OpenFlags::CREATE),
        Err(FsError::Full(Resource::Inodes))
    );
    assert_eq!(fs.list().unwrap(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(fs.lookup("/c"), Err(FsError::NotFound));
}

#[test]
fn full_directory_rolls_back_the_inode() {
    // Two directory slots, plenty of inodes.
    let fs = small(|c| c.block_size = DIR_ENTRY_SIZE * 2);
    for name in ["/a", "/b"] {
        let h = fs.open(name, OpenFlags::CREATE).unwrap();
        fs.close(h).unwrap();
    }
    assert_eq!(
        fs.open("/c", OpenFlags::CREATE),
        Err(FsError::Full(Resource::Directory))
    );

    let state = fs.lock().unwrap();
    // Root plus the two files.
    assert_eq!(state.inodes.free_count(), state.inodes.capacity() - 3);
}

#[test]
fn full_open_file_table_has_no_side_effect() {
    let fs = small(|c| c.max_open_files = 1);
    let h = fs.open("/keep", OpenFlags::CREATE).unwrap();
    fs.write(h, b"data").unwrap();

    assert_eq!(
        fs.open("/new", OpenFlags::CREATE),
        Err(FsError::Full(Resource::OpenFiles))
    );
    assert_eq!(fs.lookup("/new"), Err(FsError::NotFound));
    assert_eq!(
        fs.open("/keep", OpenFlags::TRUNCATE),
        Err(FsError::Full(Resource::OpenFiles))
    );
    assert_eq!(fs.stat("/keep").unwrap().size, 4);
    fs.close(h).unwrap();
}

#[test]
fn block_exhaustion_fails_the_write() {
    // One block for the root, one for a file.
    let fs = small(|c| c.data_blocks = 2);
    let a = fs.open("/a", OpenFlags::CREATE).unwrap();
    let b = fs.open("/b", OpenFlags::CREATE).unwrap();
    assert_eq!(fs.write(a, b"x"), Ok(1));
    assert_eq!(fs.write(b, b"y"), Err(FsError::Full(Resource::Blocks)));
    assert_eq!(fs.stat("/b").unwrap().size, 0);
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = FsConfig::default();
    config.block_size = DIR_ENTRY_SIZE - 1;
    assert!(matches!(
        FileSystem::new(config),
        Err(FsError::InvalidConfig(_))
    ));
}

#[test]
fn oversized_pool_is_rejected() {
    let config = FsConfig {
        data_blocks: usize::MAX / 2,
        ..FsConfig::default()
    };
    assert_eq!(
        FileSystem::new(config).err(),
        Some(FsError::InvalidConfig("data blocks overflow the address space"))
    );
}

#[test]
fn destroy_invalidates_everything() {
    let fs = fs();
    fs.destroy().unwrap();
    assert_eq!(fs.lifecycle(), Ok(Lifecycle::Destroyed));
    assert_eq!(fs.lookup("/a"), Err(FsError::Destroyed));
    assert_eq!(fs.open("/a", OpenFlags::CREATE), Err(FsError::Destroyed));
    assert_eq!(fs.destroy(), Err(FsError::Destroyed));
    assert_eq!(fs.destroy_after_drain(), Err(FsError::Destroyed));
}

#[test]
fn drain_with_nothing_open_is_immediate() {
    let fs = fs();
    fs.destroy_after_drain().unwrap();
    assert_eq!(fs.lifecycle(), Ok(Lifecycle::Destroyed));
}

#[test]
fn drain_waits_for_every_handle() {
    let fs = Arc::new(fs());
    let a = fs.open("/a", OpenFlags::CREATE).unwrap();
    let b = fs.open("/b", OpenFlags::CREATE).unwrap();

    let drainer = {
        let fs = Arc::clone(&fs);
        thread::spawn(move || fs.destroy_after_drain())
    };

    while fs.lifecycle().unwrap() != Lifecycle::Draining {
        thread::sleep(Duration::from_millis(1));
    }

    // New opens fail straight away; open handles keep working.
    assert_eq!(fs.open("/c", OpenFlags::CREATE), Err(FsError::Draining));
    assert_eq!(fs.open("/a", OpenFlags::empty()), Err(FsError::Draining));
    assert_eq!(fs.write(a, b"still here"), Ok(10));

    fs.close(a).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert!(!drainer.is_finished());
    assert_eq!(fs.lifecycle(), Ok(Lifecycle::Draining));

    fs.close(b).unwrap();
    assert_eq!(drainer.join().unwrap(), Ok(()));
    assert_eq!(fs.lifecycle(), Ok(Lifecycle::Destroyed));
}

#[test]
fn begin_drain_refuses_opens_at_once() {
    let fs = fs();
    let a = fs.open("/a", OpenFlags::CREATE).unwrap();

    fs.begin_drain().unwrap();
    assert_eq!(fs.lifecycle(), Ok(Lifecycle::Draining));
    assert_eq!(fs.open("/b", OpenFlags::CREATE), Err(FsError::Draining));
    assert_eq!(fs.lookup("/b"), Err(FsError::NotFound));
    assert_eq!(fs.write(a, b"ok"), Ok(2));

    // Marking twice is harmless.
    fs.begin_drain().unwrap();
    fs.close(a).unwrap();
    fs.destroy_after_drain().unwrap();
    assert_eq!(fs.lifecycle(), Ok(Lifecycle::Destroyed));
}

#[test]
fn destroy_during_drain_fails_the_drainer() {
    let fs = Arc::new(fs());
    fs.open("/a", OpenFlags::CREATE).unwrap();

    let drainer = {
        let fs = Arc::clone(&fs);
        thread::spawn(move || fs.destroy_after_drain())
    };
    while fs.lifecycle().unwrap() != Lifecycle::Draining {
        thread::sleep(Duration::from_millis(1));
    }

    fs.destroy().unwrap();
    assert_eq!(drainer.join().unwrap(), Err(FsError::Destroyed));
    assert_eq!(fs.lifecycle(), Ok(Lifecycle::Destroyed));
}

#[test]
fn concurrent_writers_to_distinct_files() {
    let fs = Arc::new(fs());
    let workers: Vec<_> = (0..4u8)
        .map(|i| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                let path = format!("/w{}", i);
                let h = fs.open(&path, OpenFlags::CREATE).unwrap();
                for _ in 0..100 {
                    fs.write(h, &[i]).unwrap();
                }
                fs.close(h).unwrap();
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    for i in 0..4u8 {
        let path = format!("/w{}", i);
        let h = fs.open(&path, OpenFlags::empty()).unwrap();
        assert_eq!(fs.read_to_vec(h, 200).unwrap(), vec![i; 100]);
        fs.close(h).unwrap();
    }
}

proptest! {
    #[test]
    fn write_then_read_returns_same_bytes(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let fs = fs();
        let h = fs.open("/p", OpenFlags::CREATE).unwrap();
        let written = fs.write(h, &data).unwrap();
        prop_assert_eq!(written, data.len().min(BLOCK));
        fs.close(h).unwrap();

        let h = fs.open("/p", OpenFlags::empty()).unwrap();
        let read = fs.read_to_vec(h, 4096).unwrap();
        prop_assert_eq!(&read[..], &data[..written]);
        fs.close(h).unwrap();
    }

    #[test]
    fn write_never_crosses_block_end(first in 0usize..=BLOCK, second in 0usize..2048) {
        let fs = fs();
        let h = fs.open("/q", OpenFlags::CREATE).unwrap();
        prop_assert_eq!(fs.write(h, &vec![1u8; first]).unwrap(), first);
        prop_assert_eq!(fs.write(h, &vec![2u8; second]).unwrap(), second.min(BLOCK - first));
        prop_assert!(fs.stat("/q").unwrap().size <= BLOCK);
    }

    #[test]
    fn read_returns_exactly_the_remaining_bytes(len in 0usize..=BLOCK, skip in 0usize..=BLOCK, max in 0usize..4096) {
        let fs = fs();
        let h = fs.open("/r", OpenFlags::CREATE).unwrap();
        fs.write(h, &vec![9u8; len]).unwrap();
        fs.close(h).unwrap();

        let h = fs.open("/r", OpenFlags::empty()).unwrap();
        let skipped = fs.read_to_vec(h, skip).unwrap().len();
        prop_assert_eq!(skipped, skip.min(len));
        let rest = fs.read_to_vec(h, max).unwrap().len();
        prop_assert_eq!(rest, (len - skipped).min(max));
    }
}

const BLOCK: usize = flatfs_fs::BLOCK_SIZE;
