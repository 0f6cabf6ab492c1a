//! End-to-end scenarios exercising `DirectIoCache` through its public
//! surface only (no access to cache internals).

use directio_cache::{CacheConfig, DirectIoCache, Error, Whence};
use tempfile::tempdir_in;

fn open_scratch(capacity: usize, block_size: usize) -> (tempfile::TempDir, DirectIoCache) {
    // `tempdir_in(".")` lands on the working directory's real filesystem;
    // the default system temp dir is often tmpfs, which commonly rejects
    // O_DIRECT.
    let dir = tempdir_in(".").expect("scratch dir on a real filesystem");
    let cache = DirectIoCache::new(CacheConfig::new(capacity, block_size).unwrap());
    (dir, cache)
}

#[test]
fn scenario_1_basic_round_trip_with_sync() {
    let (dir, mut cache) = open_scratch(8, 4096);
    let h = cache.open(&dir.path().join("t1")).unwrap();

    let written = cache.write(h, b"Hello from Lab2!\n").unwrap();
    assert_eq!(written, 17);

    assert_eq!(cache.seek(h, Whence::Start(0)).unwrap(), 0);
    let mut buf = [0u8; 99];
    let read = cache.read(h, &mut buf).unwrap();
    assert_eq!(read, 17);
    assert!(buf.starts_with(b"Hello from Lab2!\n"));

    cache.sync(h).unwrap();
    cache.close(h).unwrap();
}

#[test]
fn scenario_2_gap_between_writes_reads_back_zero_filled() {
    let (dir, mut cache) = open_scratch(4, 4096);
    let h = cache.open(&dir.path().join("t2")).unwrap();
    const GAP: u64 = 65536;

    cache.write(h, b"Data\n").unwrap();
    assert_eq!(cache.seek(h, Whence::Start(GAP)).unwrap(), GAP);
    cache.write(h, b" after the gap\n").unwrap();

    cache.seek(h, Whence::Start(0)).unwrap();
    let mut buf = vec![0u8; (GAP + 15) as usize];
    let n = cache.read(h, &mut buf).unwrap();
    assert_eq!(n, buf.len());
    assert_eq!(&buf[..5], b"Data\n");
    assert!(buf[5..GAP as usize].iter().all(|&b| b == 0));
    assert_eq!(&buf[GAP as usize..], b" after the gap\n");
}

#[test]
fn scenario_3_advice_is_unsupported() {
    let (dir, mut cache) = open_scratch(4, 4096);
    let h = cache.open(&dir.path().join("t3")).unwrap();
    let err = cache.advice(h, 0, 0xBAD_C0FFEE).unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation));
}

#[test]
fn scenario_4_capacity_below_working_set_still_durable_after_sync() {
    let (dir, mut cache) = open_scratch(2, 4096);
    let path = dir.path().join("t4");
    let h = cache.open(&path).unwrap();

    let patterns: [[u8; 4096]; 3] = [[1u8; 4096], [2u8; 4096], [3u8; 4096]];
    for (i, pattern) in patterns.iter().enumerate() {
        cache.seek(h, Whence::Start(i as u64 * 4096)).unwrap();
        cache.write(h, pattern).unwrap();
    }
    cache.sync(h).unwrap();

    for (i, pattern) in patterns.iter().enumerate() {
        cache.seek(h, Whence::Start(i as u64 * 4096)).unwrap();
        let mut buf = [0u8; 4096];
        cache.read(h, &mut buf).unwrap();
        assert_eq!(&buf[..], &pattern[..]);
    }
}

#[test]
fn scenario_5_short_destination_never_over_reads() {
    let (dir, mut cache) = open_scratch(8, 4096);
    let h = cache.open(&dir.path().join("t5")).unwrap();
    let data = [0x42u8; 4096];
    cache.write(h, &data).unwrap();

    cache.seek(h, Whence::Start(0)).unwrap();
    let mut buf = [0u8; 64];
    let n = cache.read(h, &mut buf).unwrap();
    assert_eq!(n, 64);
    assert_eq!(buf, [0x42u8; 64]);
}

#[test]
fn scenario_6_single_slot_cache_reloads_evicted_block() {
    let (dir, mut cache) = open_scratch(1, 4096);
    let h = cache.open(&dir.path().join("t6")).unwrap();
    cache.write(h, &[0xAAu8; 4096]).unwrap();

    // touch block 1, evicting block 0's clean, already-synced copy
    cache.seek(h, Whence::Start(4096)).unwrap();
    cache.write(h, &[0xBBu8; 4096]).unwrap();

    // re-reading block 0 must reload it from disk rather than panic on a
    // stale reference into a slot now owned by block 1
    cache.seek(h, Whence::Start(0)).unwrap();
    let mut buf = [0u8; 4096];
    cache.read(h, &mut buf).unwrap();
    assert_eq!(buf, [0xAAu8; 4096]);
}

#[test]
fn property_p2_sync_durability_across_fresh_cache_instances() {
    let dir = tempdir_in(".").unwrap();
    let path = dir.path().join("durable.bin");

    {
        let mut cache = DirectIoCache::new(CacheConfig::new(4, 4096).unwrap());
        let h = cache.open(&path).unwrap();
        cache.write(h, b"durable payload").unwrap();
        cache.sync(h).unwrap();
        cache.close(h).unwrap();
    }

    let mut fresh = DirectIoCache::new(CacheConfig::new(4, 4096).unwrap());
    let h = fresh.open(&path).unwrap();
    let mut buf = [0u8; 15];
    fresh.read(h, &mut buf).unwrap();
    assert_eq!(&buf, b"durable payload");
}

#[test]
fn property_p7_offset_advances_by_exact_transfer_size() {
    let (dir, mut cache) = open_scratch(4, 4096);
    let h = cache.open(&dir.path().join("p7.bin")).unwrap();
    let n = cache.write(h, b"twelve bytes").unwrap();
    assert_eq!(n, 12);
    assert_eq!(cache.seek(h, Whence::Current(0)).unwrap(), 12);
}

#[test]
fn property_p8_two_handles_with_colliding_block_indexes_do_not_cross_contaminate() {
    let dir = tempdir_in(".").unwrap();
    let mut cache = DirectIoCache::new(CacheConfig::new(4, 4096).unwrap());
    let ha = cache.open(&dir.path().join("a.bin")).unwrap();
    let hb = cache.open(&dir.path().join("b.bin")).unwrap();

    cache.write(ha, &[0x11u8; 4096]).unwrap();
    cache.write(hb, &[0x22u8; 4096]).unwrap();

    cache.seek(ha, Whence::Start(0)).unwrap();
    cache.seek(hb, Whence::Start(0)).unwrap();
    let mut buf_a = [0u8; 4096];
    let mut buf_b = [0u8; 4096];
    cache.read(ha, &mut buf_a).unwrap();
    cache.read(hb, &mut buf_b).unwrap();

    assert_eq!(buf_a, [0x11u8; 4096]);
    assert_eq!(buf_b, [0x22u8; 4096]);
}
