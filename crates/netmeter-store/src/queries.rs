//! SQL statements for the counter ledger.

/// Counter store schema. Samples are append-only; `seq` captures recorded
/// order, which reconciliation relies on for out-of-order timestamps.
pub const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS counter_samples (
    seq     INTEGER PRIMARY KEY AUTOINCREMENT,
    mac     TEXT NOT NULL,
    ts      INTEGER NOT NULL,
    dl_cum  INTEGER NOT NULL,
    ul_cum  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_counter_samples_mac_seq ON counter_samples(mac, seq);
CREATE INDEX IF NOT EXISTS idx_counter_samples_ts ON counter_samples(ts);

CREATE TABLE IF NOT EXISTS app_samples (
    seq       INTEGER PRIMARY KEY AUTOINCREMENT,
    mac       TEXT NOT NULL,
    app       TEXT NOT NULL,
    ts        INTEGER NOT NULL,
    total_cum INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_app_samples_stream ON app_samples(mac, app, seq);
CREATE INDEX IF NOT EXISTS idx_app_samples_ts ON app_samples(ts);

CREATE TABLE IF NOT EXISTS devices (
    mac        TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    custom     INTEGER NOT NULL DEFAULT 0,
    first_seen INTEGER NOT NULL,
    last_seen  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS reset_events (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    mac     TEXT NOT NULL,
    ts      INTEGER NOT NULL,
    prev_dl INTEGER NOT NULL,
    prev_ul INTEGER NOT NULL,
    next_dl INTEGER NOT NULL,
    next_ul INTEGER NOT NULL
);
"#;

pub const INSERT_SAMPLE: &str = r#"
INSERT INTO counter_samples (mac, ts, dl_cum, ul_cum) VALUES (?, ?, ?, ?)
"#;

pub const LATEST_SAMPLE_FOR_MAC: &str = r#"
SELECT seq, mac, ts, dl_cum, ul_cum FROM counter_samples
WHERE mac = ? ORDER BY seq DESC LIMIT 1
"#;

pub const SAMPLES_BEFORE: &str = r#"
SELECT seq, mac, ts, dl_cum, ul_cum FROM counter_samples
WHERE ts < ? ORDER BY mac, seq
"#;

pub const INSERT_APP_SAMPLE: &str = r#"
INSERT INTO app_samples (mac, app, ts, total_cum) VALUES (?, ?, ?, ?)
"#;

pub const APP_SAMPLES_BEFORE: &str = r#"
SELECT mac, app, ts, total_cum FROM app_samples
WHERE ts < ? ORDER BY mac, app, seq
"#;

pub const UPSERT_DEVICE: &str = r#"
INSERT INTO devices (mac, name, custom, first_seen, last_seen)
VALUES (?, ?, 0, ?, ?)
ON CONFLICT(mac) DO UPDATE SET
    name = CASE WHEN devices.custom = 0 THEN excluded.name ELSE devices.name END,
    last_seen = excluded.last_seen
"#;

pub const SET_DEVICE_NAME: &str = r#"
UPDATE devices SET name = ?, custom = 1 WHERE mac = ?
"#;

pub const SELECT_DEVICES: &str = r#"
SELECT mac, name, custom, first_seen, last_seen FROM devices
"#;

pub const INSERT_RESET_EVENT: &str = r#"
INSERT INTO reset_events (mac, ts, prev_dl, prev_ul, next_dl, next_ul)
VALUES (?, ?, ?, ?, ?, ?)
"#;

pub const RECENT_RESETS: &str = r#"
SELECT mac, ts, prev_dl, prev_ul, next_dl, next_ul FROM reset_events
ORDER BY id DESC LIMIT ?
"#;

pub const COVERAGE: &str = r#"
SELECT MIN(ts), MAX(ts) FROM counter_samples
"#;
