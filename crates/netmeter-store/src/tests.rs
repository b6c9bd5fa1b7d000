//! Tests for the counter store.

use crate::{CounterStore, ExternalSample, check_database};

const MAC_A: &str = "AA:BB:CC:DD:EE:FF";
const MAC_B: &str = "11:22:33:44:55:66";

async fn setup_store() -> CounterStore {
    CounterStore::open_in_memory()
        .await
        .expect("failed to open in-memory store")
}

#[tokio::test]
async fn record_and_fetch_latest() {
    let store = setup_store().await;
    store.record_sample(MAC_A, 100, 1000, 200).await.unwrap();
    store.record_sample(MAC_A, 400, 1500, 250).await.unwrap();

    let latest = store.latest_sample(MAC_A).await.unwrap().unwrap();
    assert_eq!(latest.ts, 400);
    assert_eq!(latest.dl_cum, 1500);
    assert_eq!(latest.ul_cum, 250);
}

#[tokio::test]
async fn monotonic_sample_is_not_a_reset() {
    let store = setup_store().await;
    store.record_sample(MAC_A, 0, 1000, 200).await.unwrap();
    let event = store.record_sample(MAC_A, 300, 1500, 250).await.unwrap();
    assert!(event.is_none());
    assert!(store.recent_resets(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn decreasing_sample_records_reset_marker() {
    let store = setup_store().await;
    store.record_sample(MAC_A, 600, 1500, 250).await.unwrap();
    let event = store
        .record_sample(MAC_A, 900, 200, 40)
        .await
        .unwrap()
        .expect("reset should be detected");
    assert_eq!(event.prev_dl, 1500);
    assert_eq!(event.next_dl, 200);

    let resets = store.recent_resets(10).await.unwrap();
    assert_eq!(resets.len(), 1);
    assert_eq!(resets[0].mac, MAC_A);
    assert_eq!(resets[0].ts, 900);
}

#[tokio::test]
async fn deltas_sum_simple_subtraction() {
    let store = setup_store().await;
    store.record_sample(MAC_A, 0, 1000, 200).await.unwrap();
    store.record_sample(MAC_A, 300, 1500, 250).await.unwrap();
    store.record_sample(MAC_A, 600, 1900, 300).await.unwrap();

    let deltas = store.deltas_in_range(1, 1000).await.unwrap();
    assert_eq!(deltas.len(), 2);
    assert_eq!(deltas[0].delta.dl, 500);
    assert_eq!(deltas[0].delta.ul, 50);
    assert!(!deltas[0].delta.reset);
    assert_eq!(deltas[1].delta.dl, 400);
}

#[tokio::test]
async fn reset_delta_uses_absolute_value() {
    let store = setup_store().await;
    store.record_sample(MAC_A, 600, 1500, 250).await.unwrap();
    store.record_sample(MAC_A, 900, 200, 40).await.unwrap();

    let deltas = store.deltas_in_range(700, 1000).await.unwrap();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].delta.dl, 200);
    assert_eq!(deltas[0].delta.ul, 40);
    assert!(deltas[0].delta.reset);
}

#[tokio::test]
async fn baseline_before_range_is_used() {
    let store = setup_store().await;
    store.record_sample(MAC_A, 100, 1000, 100).await.unwrap();
    store.record_sample(MAC_A, 500, 4000, 400).await.unwrap();

    // Range starts after the first sample; the delta must subtract the
    // baseline, not count the second sample at face value.
    let deltas = store.deltas_in_range(200, 1000).await.unwrap();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].delta.dl, 3000);
    assert_eq!(deltas[0].delta.ul, 300);
}

#[tokio::test]
async fn out_of_order_timestamp_reconciles_by_recorded_order() {
    let store = setup_store().await;
    store.record_sample(MAC_A, 1000, 500, 50).await.unwrap();
    // Backfilled sample with an earlier wall-clock timestamp but a later
    // counter value: pairing is by append order.
    store.record_sample(MAC_A, 800, 700, 70).await.unwrap();

    let deltas = store.deltas_in_range(0, 2000).await.unwrap();
    assert_eq!(deltas.len(), 2);
    assert_eq!(deltas[1].delta.dl, 200);
    assert!(!deltas[1].delta.reset);
}

#[tokio::test]
async fn deltas_are_attributed_per_device() {
    let store = setup_store().await;
    store.record_sample(MAC_A, 0, 100, 10).await.unwrap();
    store.record_sample(MAC_B, 0, 900, 90).await.unwrap();
    store.record_sample(MAC_A, 300, 200, 20).await.unwrap();
    store.record_sample(MAC_B, 300, 950, 95).await.unwrap();

    let deltas = store.deltas_in_range(1, 1000).await.unwrap();
    let a_total: u64 = deltas
        .iter()
        .filter(|d| d.mac == MAC_A)
        .map(|d| d.delta.dl)
        .sum();
    let b_total: u64 = deltas
        .iter()
        .filter(|d| d.mac == MAC_B)
        .map(|d| d.delta.dl)
        .sum();
    assert_eq!(a_total, 100);
    assert_eq!(b_total, 50);
}

#[tokio::test]
async fn app_deltas_reconcile_per_stream() {
    let store = setup_store().await;
    store
        .record_app_sample(MAC_A, "Netflix", 0, 1000)
        .await
        .unwrap();
    store
        .record_app_sample(MAC_A, "Netflix", 300, 1800)
        .await
        .unwrap();
    store
        .record_app_sample(MAC_A, "YouTube", 300, 500)
        .await
        .unwrap();

    let deltas = store.app_deltas_in_range(1, 1000).await.unwrap();
    let netflix: u64 = deltas
        .iter()
        .filter(|d| d.app == "Netflix")
        .map(|d| d.bytes)
        .sum();
    assert_eq!(netflix, 800);
}

#[tokio::test]
async fn device_name_hint_and_fallback() {
    let store = setup_store().await;
    store
        .remember_device(MAC_A, Some("Living Room TV"), 100)
        .await
        .unwrap();
    store.remember_device(MAC_B, None, 100).await.unwrap();

    let names = store.device_names().await.unwrap();
    assert_eq!(names.get(MAC_A).unwrap(), "Living Room TV");
    assert_eq!(names.get(MAC_B).unwrap(), "Device-5566");
}

#[tokio::test]
async fn custom_name_survives_dhcp_hint() {
    let store = setup_store().await;
    store
        .remember_device(MAC_A, Some("android-1234"), 100)
        .await
        .unwrap();
    store.set_device_name(MAC_A, "Kid's Phone").await.unwrap();
    store
        .remember_device(MAC_A, Some("android-1234"), 200)
        .await
        .unwrap();

    let names = store.device_names().await.unwrap();
    assert_eq!(names.get(MAC_A).unwrap(), "Kid's Phone");

    let devices = store.devices().await.unwrap();
    let dev = devices.iter().find(|d| d.mac == MAC_A).unwrap();
    assert!(dev.custom);
    assert_eq!(dev.last_seen, 200);
}

#[tokio::test]
async fn coverage_reports_sample_bounds() {
    let store = setup_store().await;
    assert!(store.coverage().await.unwrap().is_none());

    store.record_sample(MAC_A, 500, 10, 1).await.unwrap();
    store.record_sample(MAC_A, 900, 20, 2).await.unwrap();
    assert_eq!(store.coverage().await.unwrap(), Some((500, 900)));
}

#[tokio::test]
async fn import_into_empty_store() {
    let store = setup_store().await;
    let batch = vec![
        ExternalSample {
            mac: MAC_A.into(),
            ts: 100,
            dl_cum: 50,
            ul_cum: 5,
        },
        ExternalSample {
            mac: MAC_A.into(),
            ts: 400,
            dl_cum: 150,
            ul_cum: 15,
        },
    ];
    assert_eq!(store.import_history(&batch).await.unwrap(), 2);

    let deltas = store.deltas_in_range(200, 1000).await.unwrap();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].delta.dl, 100);
}

#[tokio::test]
async fn import_skips_covered_range() {
    let store = setup_store().await;
    store.record_sample(MAC_A, 100, 10, 1).await.unwrap();
    store.record_sample(MAC_A, 1000, 20, 2).await.unwrap();

    let batch = vec![ExternalSample {
        mac: MAC_A.into(),
        ts: 500,
        dl_cum: 999,
        ul_cum: 99,
    }];
    assert_eq!(store.import_history(&batch).await.unwrap(), 0);
}

#[tokio::test]
async fn import_of_older_history_keeps_live_reconciliation_clean() {
    let store = setup_store().await;
    store.record_sample(MAC_A, 10_000, 5000, 500).await.unwrap();
    store.record_sample(MAC_A, 10_300, 5100, 510).await.unwrap();

    // Older foreign history lands below the live rows in recorded order.
    let batch = vec![
        ExternalSample {
            mac: MAC_A.into(),
            ts: 1000,
            dl_cum: 100,
            ul_cum: 10,
        },
        ExternalSample {
            mac: MAC_A.into(),
            ts: 1300,
            dl_cum: 300,
            ul_cum: 30,
        },
    ];
    assert_eq!(store.import_history(&batch).await.unwrap(), 2);

    // The live window still reconciles by subtraction, no spurious resets.
    let live = store.deltas_in_range(10_100, 20_000).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].delta.dl, 100);
    assert!(!live[0].delta.reset);

    // And the imported window aggregates on its own terms.
    let old = store.deltas_in_range(1100, 2000).await.unwrap();
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].delta.dl, 200);
}

#[tokio::test]
async fn live_integrity_check_passes() {
    let store = setup_store().await;
    store.record_sample(MAC_A, 0, 1, 1).await.unwrap();
    store.integrity_check().await.unwrap();
}

#[tokio::test]
async fn check_database_flags_missing_and_garbage() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("nope.db");
    assert!(check_database(&missing).await.is_err());

    let garbage = dir.path().join("garbage.db");
    std::fs::write(&garbage, b"this is not a sqlite database at all").unwrap();
    assert!(check_database(&garbage).await.is_err());
}

#[tokio::test]
async fn check_database_accepts_real_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counters.db");
    {
        let store = CounterStore::open(&path).await.unwrap();
        store.record_sample(MAC_A, 0, 1, 1).await.unwrap();
        store.close().await;
    }
    check_database(&path).await.unwrap();
}
