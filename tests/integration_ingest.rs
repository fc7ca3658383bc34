//! Integration tests for the ingest workflow against an on-disk store.
//!
//! These tests verify:
//! - Duplicate detection across store reopens
//! - Recording new files and recognizing them on the next run
//! - Write buffering with more files than `batch_size`
//! - Cache maintenance leaving file records alone

use photo_ingest::core::batch::{BatchCoordinator, RecordDetails};
use photo_ingest::core::config::{Capabilities, PerformanceConfig};
use photo_ingest::core::dedup::DuplicateStatus;
use photo_ingest::core::hasher::FileHashes;
use photo_ingest::core::metadata::Metadata;
use photo_ingest::core::scanner::{FileLister, ScanConfig, WalkDirScanner};
use photo_ingest::core::store::{FileRecord, IngestStore, OperationType, SqliteStore};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const HELLO_WORLD: &str = "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e";

fn open_store(dir: &TempDir) -> Arc<dyn IngestStore> {
    Arc::new(SqliteStore::open(&dir.path().join("db").join("hashes.sqlite")).unwrap())
}

fn coordinator(store: Arc<dyn IngestStore>, config: PerformanceConfig) -> BatchCoordinator {
    BatchCoordinator::new(store, config, Capabilities::embedded_only()).unwrap()
}

#[test]
fn same_bytes_on_another_card_are_duplicates() {
    let temp = TempDir::new().unwrap();
    let archived = temp.path().join("archive").join("x.jpg");
    let incoming = temp.path().join("card").join("y.jpg");
    fs::create_dir_all(archived.parent().unwrap()).unwrap();
    fs::create_dir_all(incoming.parent().unwrap()).unwrap();
    fs::write(&archived, b"Hello World").unwrap();
    fs::write(&incoming, b"Hello World").unwrap();

    {
        let store = open_store(&temp);
        let ingest = coordinator(store, PerformanceConfig::default());
        let hashes = ingest.engine().hash(&archived).unwrap();
        assert_eq!(hashes.sha256(), HELLO_WORLD);
        assert!(ingest
            .record_ingested(&archived, &hashes, RecordDetails::default())
            .unwrap());
        ingest.flush().unwrap();
    }

    let store = open_store(&temp);
    let result = coordinator(store, PerformanceConfig::default())
        .resolver()
        .check(&incoming)
        .unwrap();

    assert_eq!(result.status, DuplicateStatus::Duplicate);
    assert_eq!(result.existing_file, Some(archived));
    assert_eq!(result.hashes.sha256(), HELLO_WORLD);
}

#[test]
fn unique_size_is_new_and_ready_to_store() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    for n in 0..3u8 {
        let hashes = FileHashes::new(format!("{:064x}", n), 5000, None).unwrap();
        let record = FileRecord::new(
            format!("/archive/{}.nef", n),
            &hashes,
            0,
            OperationType::RawBackup,
        );
        store.insert_record(&record).unwrap();
    }

    let path = temp.path().join("z.nef");
    fs::write(&path, vec![0x5au8; 1000]).unwrap();

    let ingest = coordinator(Arc::clone(&store), PerformanceConfig::default());
    let result = ingest.resolver().check(&path).unwrap();

    assert_eq!(result.status, DuplicateStatus::New);
    assert_eq!(result.existing_file, None);
    assert_eq!(result.hashes.size(), 1000);
    assert_eq!(result.hashes.sha256().len(), 64);

    ingest
        .record_ingested(&path, &result.hashes, RecordDetails::default())
        .unwrap();
    ingest.flush().unwrap();
    let stored = store.record_by_hash(result.hashes.sha256()).unwrap().unwrap();
    assert_eq!(stored.source_path, path);
    assert_eq!(stored.file_size, 1000);
}

#[test]
fn cleanup_zero_empties_caches_only() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    let photo = temp.path().join("a.jpg");
    fs::write(&photo, b"jpeg-ish").unwrap();
    store
        .cache_metadata(
            &photo,
            &Metadata {
                make: Some("Nikon".into()),
                ..Default::default()
            },
        )
        .unwrap();
    store.update_directory_cache(temp.path(), 1).unwrap();
    let hashes = FileHashes::new(HELLO_WORLD.to_string(), 11, None).unwrap();
    store
        .insert_record(&FileRecord::new("/archive/x.jpg", &hashes, 0, OperationType::Organized))
        .unwrap();

    let removed = store.cleanup_cache(0).unwrap();

    assert_eq!(removed, 2);
    let stats = store.stats().unwrap();
    assert_eq!(stats.metadata_cache_entries, 0);
    assert_eq!(stats.directory_cache_entries, 0);
    assert_eq!(stats.file_records, 1);
    assert!(store.cached_metadata(&photo).unwrap().is_none());
}

#[test]
fn recorded_card_is_all_duplicates_next_time() {
    let temp = TempDir::new().unwrap();
    let card = temp.path().join("DCIM");
    fs::create_dir_all(card.join("100NIKON")).unwrap();
    for n in 0..25 {
        fs::write(
            card.join("100NIKON").join(format!("DSC_{:04}.NEF", n)),
            format!("raw frame {}", n),
        )
        .unwrap();
    }

    let scanner = WalkDirScanner::new(ScanConfig::default());
    let paths = scanner.scan(&[card.clone()]).unwrap().paths();
    assert_eq!(paths.len(), 25);

    let config = PerformanceConfig::default().batch_size(10).parallel_workers(3);
    {
        let ingest = coordinator(open_store(&temp), config.clone());
        let first = ingest.batch_check(&paths);
        assert!(first.errors.is_empty());
        assert!(first.results.values().all(|r| r.status == DuplicateStatus::New));

        for path in &paths {
            ingest
                .record_ingested(path, &first.results[path].hashes, RecordDetails::default())
                .unwrap();
        }
        // Two full batches committed, five still buffered
        assert_eq!(ingest.pending_records(), 5);
        assert_eq!(ingest.flush().unwrap(), 5);
    }

    let store = open_store(&temp);
    assert_eq!(store.stats().unwrap().file_records, 25);

    let ingest = coordinator(store, config);
    let second = ingest.batch_check(&paths);
    assert_eq!(second.results.len(), 25);
    for (path, result) in &second.results {
        assert_eq!(result.status, DuplicateStatus::Duplicate);
        assert_eq!(result.existing_file.as_ref(), Some(path));
    }
    assert_eq!(ingest.resolver().counters().fast_path_hits, 25);
    assert_eq!(ingest.resolver().counters().hashes_computed, 0);
}

#[test]
fn card_stays_listed_until_every_file_is_recorded() {
    let temp = TempDir::new().unwrap();
    let card = temp.path().join("DCIM");
    fs::create_dir_all(&card).unwrap();
    fs::write(card.join("DSC_0001.NEF"), "raw frame one").unwrap();
    fs::write(card.join("DSC_0002.NEF"), "raw frame two").unwrap();

    let store = open_store(&temp);
    let config = ScanConfig {
        incremental: true,
        ..Default::default()
    };
    let scanner = WalkDirScanner::new(config).with_store(Arc::clone(&store));

    // A run that never got to record anything
    let aborted = scanner.scan(&[card.clone()]).unwrap();
    assert_eq!(aborted.files.len(), 2);

    let ingest = coordinator(Arc::clone(&store), PerformanceConfig::default());
    let scan = scanner.scan(&[card.clone()]).unwrap();
    let paths = scan.paths();
    assert_eq!(paths.len(), 2);
    assert_eq!(scan.directories_skipped, 0);

    let checked = ingest.batch_check(&paths);
    let first = &paths[0];
    ingest
        .record_ingested(first, &checked.results[first].hashes, RecordDetails::default())
        .unwrap();
    ingest.flush().unwrap();
    let done = scan.settled_directories(|p| p == first.as_path());
    assert_eq!(scanner.remember_directories(&done), 0);

    let scan = scanner.scan(&[card.clone()]).unwrap();
    assert_eq!(scan.files.len(), 2);

    let second = &paths[1];
    ingest
        .record_ingested(second, &checked.results[second].hashes, RecordDetails::default())
        .unwrap();
    ingest.flush().unwrap();
    let done = scan.settled_directories(|_| true);
    assert_eq!(scanner.remember_directories(&done), 1);

    let scan = scanner.scan(&[card]).unwrap();
    assert!(scan.files.is_empty());
    assert_eq!(scan.directories_skipped, 1);
}

#[test]
fn recording_twice_keeps_one_record() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("IMG_0001.JPG");
    fs::write(&path, b"same bytes").unwrap();
    let store = open_store(&temp);
    let ingest = coordinator(Arc::clone(&store), PerformanceConfig::default());

    let hashes = ingest.engine().hash(&path).unwrap();
    for _ in 0..2 {
        ingest
            .record_ingested(
                &path,
                &hashes,
                RecordDetails::default().with_destination("/archive/2024"),
            )
            .unwrap();
        ingest.flush().unwrap();
    }

    assert_eq!(store.stats().unwrap().file_records, 1);
    let stored = store.record_by_hash(hashes.sha256()).unwrap().unwrap();
    assert_eq!(stored.dest_path, Some(PathBuf::from("/archive/2024")));
    assert_eq!(stored.operation_type, OperationType::Organized);
}

#[test]
fn batch_isolates_missing_files() {
    let temp = TempDir::new().unwrap();
    let good = temp.path().join("good.jpg");
    fs::write(&good, b"fine").unwrap();
    let missing = temp.path().join("gone.jpg");

    let ingest = coordinator(open_store(&temp), PerformanceConfig::default());
    let batch = ingest.batch_check(&[good.clone(), missing.clone()]);

    assert_eq!(batch.results.len(), 1);
    assert!(batch.results.contains_key(&good));
    assert_eq!(batch.errors.len(), 1);
    assert_eq!(batch.errors[0].path, missing);
}

#[test]
fn metadata_cache_follows_file_mtime() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.jpg");
    fs::write(&path, b"not really a jpeg").unwrap();
    let store = open_store(&temp);
    let ingest = coordinator(Arc::clone(&store), PerformanceConfig::default());

    let first = ingest.extractor().extract(&path);
    assert_eq!(first.file_size, Some(17));
    assert_eq!(store.stats().unwrap().metadata_cache_entries, 1);

    fs::write(&path, b"rewritten with more bytes").unwrap();
    let file = fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(120))
        .unwrap();
    drop(file);

    let second = ingest.extractor().extract(&path);
    assert_eq!(second.file_size, Some(25));
}
