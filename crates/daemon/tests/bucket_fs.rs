mod common;

use std::fs::{File, FileTimes};
use std::time::{Duration, SystemTime};

use bucketfs_daemon::{Config, FsError, OpenContext};
use crate::common::{config, id, mount, setup, setup_with, wait_until};

use ::common::client::MemoryClient;
use ::common::object::EntryKind;

fn read_to_end(fs: &bucketfs_daemon::BucketFs, context: &OpenContext) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 7];
    loop {
        let n = fs.read(context, out.len() as u64, &mut buf).unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[test]
fn test_stat_file_is_cached() {
    let t = setup();
    let record = t.fs.stat(&id("/docs/readme.txt")).unwrap();
    assert_eq!(record.kind(), EntryKind::File);
    assert_eq!(record.size(), 14);

    t.fs.stat(&id("/docs/readme.txt")).unwrap();
    let calls = t.client.calls();
    assert_eq!(calls.head_object, 1);
    assert_eq!(calls.list_buckets, 1);
    assert_eq!(calls.bucket_region, 1);
}

#[test]
fn test_missing_path_is_cached_negative() {
    let t = setup();
    let err = t.fs.stat(&id("/docs/nope.txt")).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.errno(), libc::ENOENT);
    let first = t.client.calls();

    assert!(t.fs.stat(&id("/docs/nope.txt")).unwrap_err().is_not_found());
    assert_eq!(t.client.calls(), first);
}

#[test]
fn test_transient_failure_is_not_cached() {
    let t = setup();
    t.client.set_offline(true);
    let err = t.fs.stat(&id("/docs/readme.txt")).unwrap_err();
    assert!(matches!(err, FsError::Transient(_)));
    assert_eq!(err.errno(), libc::EAGAIN);

    t.client.set_offline(false);
    assert!(t.fs.stat(&id("/docs/readme.txt")).unwrap().is_file());
}

#[test]
fn test_unknown_bucket() {
    let t = setup();
    assert!(t.fs.stat(&id("/music")).unwrap_err().is_not_found());
    assert!(t.fs.stat(&id("/music/song.mp3")).unwrap_err().is_not_found());
    assert_eq!(t.client.calls().head_object, 0);
}

#[test]
fn test_directory_found_through_parent_listing() {
    let t = setup();
    let record = t.fs.stat(&id("/docs/reports")).unwrap();
    assert_eq!(record.kind(), EntryKind::Directory);
    assert_eq!(record.name(), "reports");
    assert_eq!(t.client.calls().list_objects, 1);

    let calls = t.client.calls();
    assert!(t.fs.stat(&id("/docs/reports/")).unwrap().is_directory());
    assert!(t.fs.stat(&id("/docs/reports")).unwrap().is_directory());
    assert_eq!(t.client.calls(), calls);
}

#[test]
fn test_dot_entries_resolve() {
    let t = setup();
    assert_eq!(t.fs.stat(&id("/docs/reports/.")).unwrap().name(), "reports");
    let up = t.fs.stat(&id("/docs/reports/..")).unwrap();
    assert_eq!(up.kind(), EntryKind::Bucket);
    assert_eq!(up.name(), "docs");
    assert!(t.fs.stat(&id("/docs/..")).unwrap().is_directory());
}

#[test]
fn test_root_lists_buckets() {
    let t = setup();
    let names: Vec<_> = t
        .fs
        .list_directory(&id("/"))
        .unwrap()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(names, vec!["docs", "photos"]);

    let t = setup_with(Config {
        max_display_buckets: 1,
        ..config()
    });
    assert_eq!(t.fs.list_directory(&id("/")).unwrap().len(), 1);
}

#[test]
fn test_listing_rules() {
    let client = std::sync::Arc::new(MemoryClient::new());
    client.add_bucket("b", "us-east-1");
    client.put_bytes("b", "dir/", "");
    client.put_bytes("b", "dir/a.txt", "a");
    client.put_bytes("b", "dir/sub/b.txt", "b");
    client.put_bytes("b", "dir/shadow", "file");
    client.put_bytes("b", "dir/shadow/c.txt", "c");
    client.put_bytes("b", "dir/.DS_Store", "junk");
    let t = mount(
        client,
        Config {
            ignore_patterns: vec![r"/\.DS_Store$".to_string()],
            ..config()
        },
    );

    let entries = t.fs.list_directory(&id("/b/dir")).unwrap();
    let summary: Vec<_> = entries
        .iter()
        .map(|r| (r.name().to_string(), r.kind()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("shadow".to_string(), EntryKind::Directory),
            ("sub".to_string(), EntryKind::Directory),
            ("a.txt".to_string(), EntryKind::File),
        ]
    );

    // children were primed by the listing
    let calls = t.client.calls();
    assert!(t.fs.stat(&id("/b/dir/a.txt")).unwrap().is_file());
    assert!(t.fs.stat(&id("/b/dir/sub/")).unwrap().is_directory());
    assert_eq!(t.client.calls(), calls);

    assert!(t.fs.stat(&id("/b/dir/.DS_Store")).unwrap_err().is_not_found());
}

#[test]
fn test_list_file_is_not_a_directory() {
    let t = setup();
    let err = t.fs.list_directory(&id("/docs/readme.txt")).unwrap_err();
    assert!(matches!(err, FsError::NotADirectory(_)));
    assert!(t
        .fs
        .list_directory(&id("/docs/missing/"))
        .unwrap_err()
        .is_not_found());
    assert!(t.fs.list_directory(&id("/docs/empty")).unwrap().is_empty());
}

#[test]
fn test_open_downloads_once_then_reuses_replica() {
    let t = setup();
    let readme = id("/docs/readme.txt");

    let context = t.fs.open_for_read(&readme).unwrap();
    assert_eq!(read_to_end(&t.fs, &context), b"read me first\n");
    t.fs.close(context).unwrap();
    assert_eq!(t.client.calls().get_object_range, 1);
    assert!(t.fs.cache_path(&readme).is_file());

    let context = t.fs.open_for_read(&readme).unwrap();
    assert_eq!(read_to_end(&t.fs, &context), b"read me first\n");
    t.fs.close(context).unwrap();
    assert_eq!(t.client.calls().get_object_range, 1);
}

#[test]
fn test_changed_remote_is_downloaded_again() {
    let t = setup();
    let readme = id("/docs/readme.txt");
    let context = t.fs.open_for_read(&readme).unwrap();
    t.fs.close(context).unwrap();

    t.client.put_bytes("docs", "readme.txt", "second edition\n");
    t.fs.invalidate_cache(&readme);

    let context = t.fs.open_for_read(&readme).unwrap();
    assert_eq!(read_to_end(&t.fs, &context), b"second edition\n");
    assert_eq!(t.client.calls().get_object_range, 2);
}

#[test]
fn test_large_file_is_downloaded_in_parts() {
    let t = setup_with(Config {
        part_size_mib: 5,
        ..config()
    });
    let data: Vec<u8> = (0..11 * 1024 * 1024u32).map(|i| (i % 253) as u8).collect();
    t.client.put_bytes("docs", "big.bin", data.clone());

    let big = id("/docs/big.bin");
    let context = t.fs.open_for_read(&big).unwrap();
    assert_eq!(t.client.calls().get_object_range, 3);

    let mut tail = [0u8; 16];
    let offset = data.len() as u64 - 16;
    assert_eq!(t.fs.read(&context, offset, &mut tail).unwrap(), 16);
    assert_eq!(&tail[..], &data[data.len() - 16..]);
    t.fs.close(context).unwrap();

    assert_eq!(std::fs::read(t.fs.cache_path(&big)).unwrap(), data);
}

#[test]
fn test_failed_part_leaves_no_replica() {
    let t = setup_with(Config {
        part_size_mib: 5,
        ..config()
    });
    let data: Vec<u8> = (0..11 * 1024 * 1024u32).map(|i| (i % 239) as u8).collect();
    t.client.put_bytes("docs", "big.bin", data.clone());
    t.client.fail_ranges_at(Some(5 * 1024 * 1024));

    let big = id("/docs/big.bin");
    let err = t.fs.open_for_read(&big).unwrap_err();
    assert!(matches!(err, FsError::PartialDownload(_)), "{err:?}");
    assert!(!t.fs.cache_path(&big).exists());

    t.client.fail_ranges_at(None);
    let before = t.client.calls().get_object_range;
    let context = t.fs.open_for_read(&big).unwrap();
    assert_eq!(t.client.calls().get_object_range, before + 3);
    t.fs.close(context).unwrap();
    assert_eq!(std::fs::read(t.fs.cache_path(&big)).unwrap(), data);
}

#[test]
fn test_shrunk_remote_leaves_no_replica() {
    let t = setup();
    let readme = id("/docs/readme.txt");
    assert_eq!(t.fs.stat(&readme).unwrap().size(), 14);

    // the cached head still promises 14 bytes
    t.client.put_bytes("docs", "readme.txt", "tiny");
    let err = t.fs.open_for_read(&readme).unwrap_err();
    assert!(matches!(err, FsError::PartialDownload(_)), "{err:?}");
    assert!(!t.fs.cache_path(&readme).exists());

    t.fs.invalidate_cache(&readme);
    let context = t.fs.open_for_read(&readme).unwrap();
    assert_eq!(read_to_end(&t.fs, &context), b"tiny");
}

#[test]
fn test_mount_clamps_config() {
    let t = setup_with(Config {
        part_size_mib: 1,
        delayed_workers: 0,
        ..config()
    });
    assert_eq!(t.fs.config().part_size_mib, 5);
    assert_eq!(t.fs.config().part_size(), 5 * 1024 * 1024);
    assert_eq!(t.fs.config().delayed_workers, 1);
}

#[test]
fn test_empty_remote_file_needs_no_download() {
    let t = setup();
    t.client.put_bytes("docs", "blank.txt", "");
    let context = t.fs.open_for_read(&id("/docs/blank.txt")).unwrap();
    assert_eq!(read_to_end(&t.fs, &context), b"");
    assert_eq!(t.client.calls().get_object_range, 0);
}

#[test]
fn test_create_write_close_uploads() {
    let t = setup();
    let path = id("/docs/reports/q3.csv");

    let created = t.fs.create_empty(&path, false).unwrap();
    assert_eq!(created.size(), 0);
    assert_eq!(t.client.object_bytes("docs", "reports/q3.csv").unwrap().len(), 0);

    let mut context = t.fs.open_for_write(&path).unwrap();
    assert_eq!(t.fs.write(&mut context, 0, b"quarter,total\n").unwrap(), 14);
    t.fs.write(&mut context, 14, b"3,75\n").unwrap();
    t.fs.close(context).unwrap();

    assert_eq!(
        t.client.object_bytes("docs", "reports/q3.csv").unwrap(),
        &b"quarter,total\n3,75\n"[..]
    );
    assert_eq!(t.fs.stat(&path).unwrap().size(), 19);

    // the replica already matches what was uploaded
    let context = t.fs.open_for_read(&path).unwrap();
    assert_eq!(read_to_end(&t.fs, &context), b"quarter,total\n3,75\n");
    assert_eq!(t.client.calls().get_object_range, 0);

    let names: Vec<_> = t
        .fs
        .list_directory(&id("/docs/reports/"))
        .unwrap()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(names, vec!["q1.csv", "q2.csv", "q3.csv"]);
}

#[test]
fn test_reopen_sees_writes_not_yet_uploaded() {
    let t = setup();
    let readme = id("/docs/readme.txt");

    let mut writer = t.fs.open_for_write(&readme).unwrap();
    t.fs.write(&mut writer, 0, b"EDITED").unwrap();

    let reader = t.fs.open_for_read(&readme).unwrap();
    assert_eq!(read_to_end(&t.fs, &reader), b"EDITEDe first\n");
    t.fs.close(reader).unwrap();
    assert_eq!(t.client.calls().get_object_range, 1);
    assert_eq!(t.client.calls().put_object, 0);

    t.fs.close(writer).unwrap();
    assert_eq!(
        t.client.object_bytes("docs", "readme.txt").unwrap(),
        &b"EDITEDe first\n"[..]
    );

    let reader = t.fs.open_for_read(&readme).unwrap();
    assert_eq!(read_to_end(&t.fs, &reader), b"EDITEDe first\n");
    assert_eq!(t.client.calls().get_object_range, 1);
}

#[test]
fn test_delete_after_upload_keeps_replica_open_elsewhere() {
    let t = setup_with(Config {
        delete_after_upload: true,
        ..config()
    });
    let readme = id("/docs/readme.txt");
    let reader = t.fs.open_for_read(&readme).unwrap();
    let mut writer = t.fs.open_for_write(&readme).unwrap();
    t.fs.write(&mut writer, 0, b"R").unwrap();
    t.fs.close(writer).unwrap();

    assert!(t.fs.cache_path(&readme).exists());
    assert_eq!(read_to_end(&t.fs, &reader), b"Read me first\n");
    t.fs.close(reader).unwrap();
}

#[test]
fn test_write_needs_write_handle() {
    let t = setup();
    let mut context = t.fs.open_for_read(&id("/docs/readme.txt")).unwrap();
    let err = t.fs.write(&mut context, 0, b"x").unwrap_err();
    assert!(matches!(err, FsError::BadHandle(_)));
    assert!(matches!(
        t.fs.open_for_write(&id("/docs/reports")).unwrap_err(),
        FsError::IsADirectory(_)
    ));
}

#[test]
fn test_delete_after_upload_drops_replica() {
    let t = setup_with(Config {
        delete_after_upload: true,
        ..config()
    });
    let path = id("/docs/notes.txt");
    t.fs.create_empty(&path, false).unwrap();
    let mut context = t.fs.open_for_write(&path).unwrap();
    t.fs.write(&mut context, 0, b"draft").unwrap();
    t.fs.close(context).unwrap();

    assert!(t.client.contains("docs", "notes.txt"));
    assert!(!t.fs.cache_path(&path).exists());
}

#[test]
fn test_create_existing_fails() {
    let t = setup();
    let err = t.fs.create_empty(&id("/docs/readme.txt"), false).unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists(_)));
    assert_eq!(err.errno(), libc::EEXIST);
    assert!(matches!(
        t.fs.create_empty(&id("/docs/reports"), true).unwrap_err(),
        FsError::AlreadyExists(_)
    ));
    assert!(t
        .fs
        .create_empty(&id("/docs/no/such/parent.txt"), false)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_create_directory_marker() {
    let t = setup();
    let record = t.fs.create_empty(&id("/docs/archive"), true).unwrap();
    assert!(record.is_directory());
    assert!(t.client.contains("docs", "archive/"));
    assert!(t.fs.stat(&id("/docs/archive")).unwrap().is_directory());
    assert!(t.fs.list_directory(&id("/docs/archive")).unwrap().is_empty());
}

#[test]
fn test_remove() {
    let t = setup();
    let err = t.fs.remove(&id("/docs/reports")).unwrap_err();
    assert!(matches!(err, FsError::DirectoryNotEmpty(_)));
    assert_eq!(err.errno(), libc::ENOTEMPTY);

    let q1 = id("/docs/reports/q1.csv");
    let context = t.fs.open_for_read(&q1).unwrap();
    t.fs.close(context).unwrap();
    assert!(t.fs.cache_path(&q1).is_file());

    t.fs.remove(&q1).unwrap();
    assert!(!t.client.contains("docs", "reports/q1.csv"));
    assert!(!t.fs.cache_path(&q1).exists());
    assert!(t.fs.stat(&q1).unwrap_err().is_not_found());

    t.fs.remove(&id("/docs/empty/")).unwrap();
    assert!(!t.client.contains("docs", "empty/"));
}

#[test]
fn test_rename_file() {
    let t = setup();
    let from = id("/docs/readme.txt");
    let to = id("/docs/reports/readme.txt");

    t.fs.rename(&from, &to).unwrap();
    assert!(!t.client.contains("docs", "readme.txt"));
    assert_eq!(
        t.client.object_bytes("docs", "reports/readme.txt").unwrap(),
        &b"read me first\n"[..]
    );
    assert!(!t.fs.cache_path(&from).exists());
    assert!(t.fs.cache_path(&to).is_file());

    assert!(t.fs.stat(&from).unwrap_err().is_not_found());
    let moved = t.fs.stat(&to).unwrap();
    assert_eq!(moved.size(), 14);

    // the moved replica carries the uploaded timestamps
    let downloads = t.client.calls().get_object_range;
    let context = t.fs.open_for_read(&to).unwrap();
    assert_eq!(read_to_end(&t.fs, &context), b"read me first\n");
    assert_eq!(t.client.calls().get_object_range, downloads);
}

#[test]
fn test_rename_directory_not_supported() {
    let t = setup();
    let err = t
        .fs
        .rename(&id("/docs/reports"), &id("/docs/old-reports"))
        .unwrap_err();
    assert!(matches!(err, FsError::NotSupported(_)));
    assert_eq!(err.errno(), libc::ENOTSUP);
}

#[test]
fn test_readonly_mount() {
    let t = setup_with(Config {
        readonly: true,
        ..config()
    });
    let readme = id("/docs/readme.txt");
    assert!(t.fs.stat(&readme).unwrap().attributes().readonly);
    assert!(matches!(t.fs.open_for_write(&readme).unwrap_err(), FsError::ReadOnly));
    assert!(matches!(
        t.fs.create_empty(&id("/docs/new.txt"), false).unwrap_err(),
        FsError::ReadOnly
    ));
    assert!(matches!(t.fs.remove(&readme).unwrap_err(), FsError::ReadOnly));
    assert_eq!(FsError::ReadOnly.errno(), libc::EROFS);

    let context = t.fs.open_for_read(&readme).unwrap();
    assert_eq!(read_to_end(&t.fs, &context), b"read me first\n");
    assert_eq!(t.client.calls().put_object, 0);
}

#[test]
fn test_invalidate_cache() {
    let t = setup();
    t.fs.stat(&id("/docs/readme.txt")).unwrap();
    t.fs.list_directory(&id("/docs/reports")).unwrap();
    assert!(!t.fs.object_cache().is_empty());

    assert!(t.fs.invalidate_cache(&id("/docs")) > 0);
    assert!(t.fs.object_cache().is_empty());
    assert!(t.fs.bucket_cache().is_loaded());

    t.fs.invalidate_cache(&id("/"));
    assert!(!t.fs.bucket_cache().is_loaded());
}

#[test]
fn test_on_tick_keeps_fresh_entries() {
    let t = setup();
    t.fs.stat(&id("/docs/readme.txt")).unwrap();
    let before = t.fs.object_cache().len();

    let stats = t.fs.on_tick();
    assert_eq!(stats.buckets, 0);
    assert_eq!(stats.objects, 0);
    assert_eq!(t.fs.object_cache().len(), before);

    // anything older than the TTL goes
    let later = chrono::Utc::now() + chrono::Duration::minutes(30);
    assert_eq!(t.fs.object_cache().evict_older_than(later), before);
}

#[test]
fn test_on_idle_cleans_stale_files_and_prefetches_buckets() {
    let t = setup();
    let readme = id("/docs/readme.txt");
    let context = t.fs.open_for_read(&readme).unwrap();
    t.fs.close(context).unwrap();
    t.fs.invalidate_cache(&id("/"));

    make_stale(&t.fs.cache_path(&readme));

    let stats = t.fs.on_idle().unwrap();
    assert_eq!(stats.cleanup.removed, 1);
    assert!(stats.prefetch_queued);
    assert!(!t.fs.cache_path(&readme).exists());

    assert!(wait_until(Duration::from_secs(5), || t.fs.bucket_cache().is_loaded()));
}

fn make_stale(path: &std::path::Path) {
    let old = SystemTime::now() - Duration::from_secs(3 * 3600);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_times(FileTimes::new().set_accessed(old).set_modified(old))
        .unwrap();
}

#[test]
fn test_on_idle_keeps_replicas_of_open_handles() {
    let t = setup();
    let readme = id("/docs/readme.txt");
    let local = t.fs.cache_path(&readme);

    let mut writer = t.fs.open_for_write(&readme).unwrap();
    t.fs.write(&mut writer, 0, b"EDITED").unwrap();
    let accessed = std::fs::metadata(&local).unwrap().accessed().unwrap();
    assert!(accessed.elapsed().unwrap_or_default() < Duration::from_secs(60));

    make_stale(&local);
    let stats = t.fs.on_idle().unwrap();
    assert_eq!(stats.cleanup.removed, 0);
    assert_eq!(stats.cleanup.in_use, 1);
    assert!(local.exists());

    t.fs.close(writer).unwrap();
    assert_eq!(
        t.client.object_bytes("docs", "readme.txt").unwrap(),
        &b"EDITEDe first\n"[..]
    );

    make_stale(&local);
    assert_eq!(t.fs.on_idle().unwrap().cleanup.removed, 1);
}

#[test]
fn test_reads_refresh_replica_access_time() {
    let t = setup();
    let readme = id("/docs/readme.txt");
    let context = t.fs.open_for_read(&readme).unwrap();
    make_stale(&t.fs.cache_path(&readme));

    let mut buf = [0u8; 4];
    t.fs.read(&context, 0, &mut buf).unwrap();
    t.fs.close(context).unwrap();

    let stats = t.fs.on_idle().unwrap();
    assert_eq!(stats.cleanup.removed, 0);
    assert!(t.fs.cache_path(&readme).exists());
}

#[test]
fn test_report_is_written() {
    let t = setup();
    t.fs.stat(&id("/docs/readme.txt")).unwrap();
    t.fs.stat(&id("/docs/missing")).unwrap_err();

    let report = t.fs.report();
    assert!(!report.objects.positive.is_empty());
    assert!(!report.objects.negative.is_empty());
    assert_eq!(report.locks.len(), 3);
    assert_eq!(
        report.buckets.regions.get("docs").map(String::as_str),
        Some("us-east-1")
    );

    let path = t.fs.write_report().unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert!(json["objects"]["positive"].is_array());
    assert_eq!(json["locks"][0]["purpose"], "cache-file-create");
}
