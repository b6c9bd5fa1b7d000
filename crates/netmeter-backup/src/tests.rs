//! Snapshot, restore, and archive tests against real files.

use std::fs;
use std::path::Path;

use tokio::sync::RwLock;

use netmeter_store::{CounterStore, check_database};

use crate::archive::{ArchivePaths, create_archive, restore_archive};
use crate::restore::{clear_restore_marker, ensure_healthy, read_restore_marker, restore_latest};
use crate::snapshot::{
    decompress_to, list_snapshots, prune_snapshots, sha256_file, snapshot_database,
    verify_checksum,
};

async fn make_db(path: &Path) {
    let store = CounterStore::open(path).await.unwrap();
    store
        .record_sample("AA:BB:CC:DD:EE:FF", 1_700_000_000, 1000, 200)
        .await
        .unwrap();
    store.close().await;
}

fn corrupt_db(path: &Path) {
    fs::write(path, vec![0x5a; 512]).unwrap();
}

#[tokio::test]
async fn snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("counters.db");
    let backups = dir.path().join("backups");
    make_db(&db).await;

    let snapshot = snapshot_database(&db, &backups).unwrap();
    verify_checksum(&snapshot).unwrap();
    assert_eq!(list_snapshots(&backups).unwrap(), vec![snapshot]);
}

#[tokio::test]
async fn snapshot_of_a_live_store_is_usable_after_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("counters.db");
    let backups = dir.path().join("backups");

    // The pool stays open for the whole test; without the checkpoint the
    // fresh rows (and on a new file, the schema) exist only in `-wal`
    // and the snapshot would fail validation.
    let store = CounterStore::open(&db).await.unwrap();
    store
        .record_sample("AA:BB:CC:DD:EE:FF", 1_700_000_000, 1000, 200)
        .await
        .unwrap();
    store.checkpoint().await.unwrap();

    let snapshot = snapshot_database(&db, &backups).unwrap();
    let unpacked = dir.path().join("unpacked.db");
    decompress_to(&snapshot, &unpacked).unwrap();
    check_database(&unpacked).await.unwrap();

    store.close().await;
}

#[tokio::test]
async fn tampered_snapshot_fails_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("counters.db");
    let backups = dir.path().join("backups");
    make_db(&db).await;

    let snapshot = snapshot_database(&db, &backups).unwrap();
    let mut bytes = fs::read(&snapshot).unwrap();
    bytes.push(0xff);
    fs::write(&snapshot, bytes).unwrap();

    assert!(verify_checksum(&snapshot).is_err());
}

#[test]
fn prune_keeps_the_newest() {
    let dir = tempfile::tempdir().unwrap();
    for day in ["2025-07-01", "2025-07-02", "2025-07-03", "2025-07-04"] {
        let path = dir.path().join(format!("counters_{day}.db.gz"));
        fs::write(&path, b"snapshot").unwrap();
        fs::write(format!("{}.sha256", path.display()), b"digest\n").unwrap();
    }

    let pruned = prune_snapshots(dir.path(), 2).unwrap();
    assert_eq!(pruned, 2);

    let kept = list_snapshots(dir.path()).unwrap();
    let names: Vec<_> = kept
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["counters_2025-07-04.db.gz", "counters_2025-07-03.db.gz"]
    );
    // Sidecars of pruned snapshots go with them.
    assert!(!dir.path().join("counters_2025-07-01.db.gz.sha256").exists());
}

#[tokio::test]
async fn restore_replaces_a_corrupt_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("counters.db");
    let backups = dir.path().join("backups");
    make_db(&db).await;
    snapshot_database(&db, &backups).unwrap();

    corrupt_db(&db);
    assert!(check_database(&db).await.is_err());

    let status = restore_latest(&db, &backups, dir.path()).await.unwrap();
    check_database(&db).await.unwrap();
    assert!(status.source.starts_with("counters_"));

    // The damaged file was set aside, not deleted.
    let aside = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().contains(".corrupted."));
    assert!(aside);

    // And the marker round-trips.
    let marker = read_restore_marker(dir.path()).unwrap();
    assert_eq!(marker, status);
    assert!(clear_restore_marker(dir.path()).unwrap());
    assert!(read_restore_marker(dir.path()).is_none());
}

#[tokio::test]
async fn restore_skips_unusable_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("counters.db");
    let backups = dir.path().join("backups");
    make_db(&db).await;
    let good = snapshot_database(&db, &backups).unwrap();

    // A newer snapshot that is not actually gzip data, with a checksum
    // that matches so only decompression can reject it.
    let decoy = backups.join("counters_9999-12-31.db.gz");
    fs::write(&decoy, b"not a gzip stream").unwrap();
    let digest = sha256_file(&decoy).unwrap();
    fs::write(format!("{}.sha256", decoy.display()), format!("{digest}\n")).unwrap();

    corrupt_db(&db);
    let status = restore_latest(&db, &backups, dir.path()).await.unwrap();
    assert_eq!(
        status.source,
        good.file_name().unwrap().to_str().unwrap().to_string()
    );
    check_database(&db).await.unwrap();
}

#[tokio::test]
async fn restore_with_no_usable_snapshot_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("counters.db");
    corrupt_db(&db);

    let result = restore_latest(&db, &dir.path().join("backups"), dir.path()).await;
    assert!(result.is_err());
    // The damaged file is untouched when there is nothing to restore.
    assert!(db.exists());
}

#[tokio::test]
async fn ensure_healthy_passes_a_good_database_through() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("counters.db");
    let backups = dir.path().join("backups");
    make_db(&db).await;

    let gate = RwLock::new(());
    let outcome = ensure_healthy(&db, &backups, dir.path(), true, &gate)
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn ensure_healthy_self_heals() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("counters.db");
    let backups = dir.path().join("backups");
    make_db(&db).await;
    snapshot_database(&db, &backups).unwrap();
    corrupt_db(&db);

    let gate = RwLock::new(());
    let outcome = ensure_healthy(&db, &backups, dir.path(), true, &gate)
        .await
        .unwrap();
    assert!(outcome.is_some());
    check_database(&db).await.unwrap();
}

#[tokio::test]
async fn ensure_healthy_surfaces_corruption_when_healing_is_off() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("counters.db");
    let backups = dir.path().join("backups");
    make_db(&db).await;
    snapshot_database(&db, &backups).unwrap();
    corrupt_db(&db);

    let gate = RwLock::new(());
    let result = ensure_healthy(&db, &backups, dir.path(), false, &gate).await;
    assert!(result.is_err());
    // Nothing was restored behind the operator's back.
    assert!(check_database(&db).await.is_err());
}

#[tokio::test]
async fn archive_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("counters.db");
    let reports = dir.path().join("reports");
    let config = dir.path().join("netmeter.toml");
    let archives = dir.path().join("archives");
    make_db(&db).await;
    fs::create_dir_all(&reports).unwrap();
    fs::write(reports.join("today.json"), b"{}").unwrap();
    fs::write(&config, b"[paths]\ndata_dir = \"/tmp\"\n").unwrap();

    let archive = create_archive(
        &ArchivePaths {
            db: &db,
            report_dir: &reports,
            config_file: Some(&config),
        },
        &archives,
    )
    .unwrap();

    // Wipe the live data, then bring it all back.
    fs::remove_file(&db).unwrap();
    fs::remove_dir_all(&reports).unwrap();

    let status = restore_archive(&archive, &db, &reports, dir.path())
        .await
        .unwrap();
    assert_eq!(
        status.source,
        archive.file_name().unwrap().to_str().unwrap().to_string()
    );
    check_database(&db).await.unwrap();
    assert!(reports.join("today.json").exists());
}

#[tokio::test]
async fn archive_without_a_database_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("counters.db");
    let reports = dir.path().join("reports");
    make_db(&db).await;

    // A tar.gz that holds only an unrelated file.
    let bogus = dir.path().join("bogus.tar.gz");
    {
        let encoder = flate2::write::GzEncoder::new(
            fs::File::create(&bogus).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(encoder);
        let readme = dir.path().join("README");
        fs::write(&readme, b"hello").unwrap();
        builder.append_path_with_name(&readme, "README").unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    let result = restore_archive(&bogus, &db, &reports, dir.path()).await;
    assert!(result.is_err());
    // The live database is untouched.
    check_database(&db).await.unwrap();
}
