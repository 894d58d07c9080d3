use crate::models::{Candle, OpenOrder};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ORDER_LOG_FILE: &str = "order_log.json";
pub const CHART_FILE: &str = "kline_plot.svg";
pub const GATE_FILE: &str = "notification_gate.json";
pub const LATEST_KLINES_FILE: &str = "klines_latest.json";

const SNAPSHOT_PREFIX: &str = "klines_";
const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";
const RUN_DIR_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Believed-open orders after a reconciliation, as read by the dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderLog {
    pub open_orders: Vec<OpenOrder>,
}

/// Filesystem layout shared by the trading loop and the dashboard
///
/// ```text
/// <data_dir>/
///   notification_gate.json
///   klines/klines_<timestamp>.json, klines_latest.json
///   dynamic/<run>/order_log.json, kline_plot.svg
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    data_dir: PathBuf,
    run_dir: PathBuf,
}

impl ArtifactPaths {
    /// Layout for a process started at `started_at`
    pub fn for_run(data_dir: impl Into<PathBuf>, started_at: DateTime<Utc>) -> Self {
        let data_dir = data_dir.into();
        let run_dir = data_dir
            .join("dynamic")
            .join(started_at.format(RUN_DIR_FORMAT).to_string());
        Self { data_dir, run_dir }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn order_log(&self) -> PathBuf {
        self.run_dir.join(ORDER_LOG_FILE)
    }

    pub fn chart(&self) -> PathBuf {
        self.run_dir.join(CHART_FILE)
    }

    pub fn gate_file(&self) -> PathBuf {
        gate_file(&self.data_dir)
    }

    pub fn klines_dir(&self) -> PathBuf {
        self.data_dir.join("klines")
    }

    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.run_dir)?;
        fs::create_dir_all(self.klines_dir())?;
        Ok(())
    }
}

pub fn gate_file(data_dir: &Path) -> PathBuf {
    data_dir.join(GATE_FILE)
}

/// Most recent run directory (by name) that contains `file_name`
pub fn latest_run_artifact(data_dir: &Path, file_name: &str) -> Option<PathBuf> {
    let mut runs: Vec<PathBuf> = fs::read_dir(data_dir.join("dynamic"))
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    runs.sort();

    runs.into_iter()
        .rev()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

/// Write JSON to a sibling temp file, then rename over `path`
///
/// Readers either see the previous complete file or the new one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn write_order_log(path: &Path, open_orders: &[OpenOrder]) -> Result<()> {
    write_json_atomic(
        path,
        &OrderLog {
            open_orders: open_orders.to_vec(),
        },
    )?;
    tracing::info!("Order log saved: {}", path.display());
    Ok(())
}

pub fn read_order_log(path: &Path) -> Result<OrderLog> {
    read_json(path)
}

/// Persist this cycle's candles; returns the timestamped snapshot path
///
/// `klines_latest.json` is refreshed alongside for the chart.
pub fn write_candle_snapshot(klines_dir: &Path, candles: &[Candle], at: DateTime<Utc>) -> Result<PathBuf> {
    let path = klines_dir.join(format!("{}{}.json", SNAPSHOT_PREFIX, at.format(TIMESTAMP_FORMAT)));

    write_json_atomic(&path, &candles)?;
    write_json_atomic(&klines_dir.join(LATEST_KLINES_FILE), &candles)?;

    tracing::debug!("Saved {} candles to {}", candles.len(), path.display());
    Ok(path)
}

pub fn read_candle_snapshot(path: &Path) -> Result<Vec<Candle>> {
    read_json(path)
}

/// Delete all but the newest `keep` timestamped snapshots
pub fn prune_candle_snapshots(klines_dir: &Path, keep: usize) -> Result<usize> {
    let mut snapshots: Vec<PathBuf> = fs::read_dir(klines_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(SNAPSHOT_PREFIX) && n.ends_with(".json") && n != LATEST_KLINES_FILE)
                .unwrap_or(false)
        })
        .collect();

    if snapshots.len() <= keep {
        return Ok(0);
    }

    // Timestamped names sort chronologically
    snapshots.sort();
    let excess = snapshots.len() - keep;
    for path in &snapshots[..excess] {
        fs::remove_file(path)?;
    }

    tracing::debug!("Pruned {} old candle snapshots", excess);
    Ok(excess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(open_time: i64) -> Candle {
        Candle {
            open_time,
            open: dec!(1.0),
            high: dec!(1.01),
            low: dec!(0.99),
            close: dec!(1.0),
            volume: dec!(10),
            close_time: open_time + 59_999,
            symbol: "USDCUSDT".to_string(),
        }
    }

    #[test]
    fn test_order_log_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dynamic").join("run").join(ORDER_LOG_FILE);
        let orders = vec![
            OpenOrder {
                order_id: "C02__1".to_string(),
                side: Side::Buy,
                quantity: dec!(75.125),
                price: dec!(1.0),
            },
            OpenOrder {
                order_id: "2".to_string(),
                side: Side::Buy,
                quantity: dec!(150),
                price: dec!(0.9999),
            },
        ];

        write_order_log(&path, &orders).unwrap();
        let log = read_order_log(&path).unwrap();

        assert_eq!(log.open_orders, orders);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_order_log_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ORDER_LOG_FILE);
        write_order_log(
            &path,
            &[OpenOrder {
                order_id: "9".to_string(),
                side: Side::Buy,
                quantity: dec!(5),
                price: dec!(1),
            }],
        )
        .unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let first = &raw["open_orders"][0];
        assert_eq!(first["order_id"], "9");
        assert_eq!(first["side"], "buy");
        assert!(first.get("quantity").is_some());
        assert!(first.get("price").is_some());
    }

    #[test]
    fn test_candle_snapshot_and_latest() {
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let candles = vec![candle(0), candle(60_000)];

        let path = write_candle_snapshot(dir.path(), &candles, at).unwrap();

        assert_eq!(path.file_name().unwrap(), "klines_2025_01_02_03_04_05.json");
        assert_eq!(read_candle_snapshot(&path).unwrap(), candles);
        assert_eq!(
            read_candle_snapshot(&dir.path().join(LATEST_KLINES_FILE)).unwrap(),
            candles
        );
    }

    #[test]
    fn test_prune_keeps_newest_and_latest() {
        let dir = tempfile::tempdir().unwrap();
        for second in 0..5 {
            let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, second).unwrap();
            write_candle_snapshot(dir.path(), &[candle(0)], at).unwrap();
        }

        let removed = prune_candle_snapshots(dir.path(), 2).unwrap();

        assert_eq!(removed, 3);
        assert!(dir.path().join("klines_2025_01_01_00_00_04.json").exists());
        assert!(dir.path().join("klines_2025_01_01_00_00_03.json").exists());
        assert!(!dir.path().join("klines_2025_01_01_00_00_02.json").exists());
        assert!(dir.path().join(LATEST_KLINES_FILE).exists());
    }

    #[test]
    fn test_latest_run_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let older = ArtifactPaths::for_run(dir.path(), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let newer = ArtifactPaths::for_run(dir.path(), Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap());
        older.create_dirs().unwrap();
        newer.create_dirs().unwrap();

        write_atomic(&older.chart(), b"<svg/>").unwrap();
        assert_eq!(latest_run_artifact(dir.path(), CHART_FILE), Some(older.chart()));

        write_atomic(&newer.chart(), b"<svg/>").unwrap();
        assert_eq!(latest_run_artifact(dir.path(), CHART_FILE), Some(newer.chart()));
        assert_eq!(latest_run_artifact(dir.path(), ORDER_LOG_FILE), None);
    }

    #[test]
    fn test_latest_run_artifact_without_runs() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_run_artifact(dir.path(), CHART_FILE), None);
    }
}
