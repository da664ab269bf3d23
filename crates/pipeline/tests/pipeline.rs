use chrono::NaiveDate;
use liquidation_core::{ArchiveNaming, Config, FailureReason};
use liquidation_ingestion::store::MemoryObjectStore;
use liquidation_ingestion::LocalInventory;
use liquidation_pipeline::LiquidationPipeline;
use rust_decimal_macros::dec;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const HEADER: &str = "side,order_type,time_in_force,original_quantity,price,average_price,order_status,last_fill_quantity,accumulated_fill_quantity,time";

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn archive(date: NaiveDate, rows: &[&str]) -> Vec<u8> {
    let mut body = String::from(HEADER);
    for row in rows {
        body.push('\n');
        body.push_str(row);
    }
    body.push('\n');

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let name = format!("BTCUSDT-liquidationSnapshot-{}.csv", date.format("%Y-%m-%d"));
    writer.start_file(name, SimpleFileOptions::default()).unwrap();
    writer.write_all(body.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

fn publish(store: &MemoryObjectStore, date: NaiveDate, payload: Vec<u8>) {
    let key = ArchiveNaming::default().archive_key("BTCUSDT", "um", date);
    store.insert(key.clone(), payload);
    store.insert(format!("{}.CHECKSUM", key), b"checksum".to_vec());
}

fn config(root: &Path) -> Config {
    let mut config = Config::default();
    config.storage.root = root.to_path_buf();
    config.sync.max_parallel = 2;
    config
}

fn simple_day(date: NaiveDate) -> Vec<u8> {
    let ts = date.and_hms_opt(12, 0, 0).unwrap().and_utc().timestamp_millis();
    archive(date, &[&format!("BUY,LIMIT,IOC,1,100,100,FILLED,1,1,{}", ts)])
}

#[tokio::test]
async fn test_second_sync_fetches_nothing() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::new(2));
    for d in 1..=3 {
        publish(&store, day(d), simple_day(day(d)));
    }

    let pipeline = LiquidationPipeline::new(config(root.path()), store.clone()).unwrap();
    let first = pipeline.sync().await.unwrap();
    assert_eq!(first.remote, 3);
    assert_eq!(first.fetched(), vec![day(1), day(2), day(3)]);
    assert_eq!(store.get_calls(), 3);

    let second = pipeline.sync().await.unwrap();
    assert_eq!(second.remote, 3);
    assert_eq!(second.skipped, 3);
    assert!(second.outcomes.is_empty());
    assert_eq!(store.get_calls(), 3);
}

#[tokio::test]
async fn test_undated_archive_entry_is_not_refetched() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::default());

    let ts = day(1).and_hms_opt(12, 0, 0).unwrap().and_utc().timestamp_millis();
    let body = format!("{}\nBUY,LIMIT,IOC,1,100,100,FILLED,1,1,{}\n", HEADER, ts);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("liquidations.csv", SimpleFileOptions::default()).unwrap();
    writer.write_all(body.as_bytes()).unwrap();
    publish(&store, day(1), writer.finish().unwrap().into_inner());

    let pipeline = LiquidationPipeline::new(config(root.path()), store.clone()).unwrap();
    let first = pipeline.sync().await.unwrap();
    assert_eq!(first.fetched(), vec![day(1)]);

    let second = pipeline.sync().await.unwrap();
    assert!(second.outcomes.is_empty());
    assert_eq!(store.get_calls(), 1);
}

#[tokio::test]
async fn test_failed_date_does_not_stop_siblings() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::default());
    for d in 1..=3 {
        publish(&store, day(d), simple_day(day(d)));
    }
    store.make_unavailable(ArchiveNaming::default().archive_key("BTCUSDT", "um", day(2)));

    let pipeline = LiquidationPipeline::new(config(root.path()), store.clone()).unwrap();
    let report = pipeline.sync().await.unwrap();

    assert_eq!(report.fetched(), vec![day(1), day(3)]);
    assert_eq!(report.failed()[&day(2)].reason(), Some(FailureReason::Download));

    let inventory = LocalInventory::new(ArchiveNaming::default(), "csv");
    let local = inventory.scan(root.path(), "BTCUSDT", "um").unwrap();
    assert_eq!(local.into_iter().collect::<Vec<_>>(), vec![day(1), day(3)]);
}

#[tokio::test]
async fn test_corrupt_archive_is_retried_on_next_sync() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::default());
    publish(&store, day(1), simple_day(day(1)));
    publish(&store, day(2), b"truncated download".to_vec());

    let pipeline = LiquidationPipeline::new(config(root.path()), store.clone()).unwrap();
    let report = pipeline.sync().await.unwrap();
    assert_eq!(report.failed()[&day(2)].reason(), Some(FailureReason::Extract));

    publish(&store, day(2), simple_day(day(2)));
    let retry = pipeline.sync().await.unwrap();
    assert_eq!(retry.skipped, 1);
    assert_eq!(retry.fetched(), vec![day(2)]);
}

#[tokio::test]
async fn test_unavailable_catalog_is_fatal() {
    struct DownStore;

    #[async_trait::async_trait]
    impl liquidation_ingestion::ObjectStore for DownStore {
        async fn list_objects(
            &self,
            _prefix: &str,
            _marker: Option<&str>,
        ) -> liquidation_core::Result<liquidation_ingestion::ListPage> {
            Err(liquidation_core::Error::catalog("HTTP 503"))
        }

        async fn get_object(&self, key: &str) -> liquidation_core::Result<bytes::Bytes> {
            Err(liquidation_core::Error::download(key.to_string()))
        }
    }

    let root = tempfile::tempdir().unwrap();
    let pipeline = LiquidationPipeline::new(config(root.path()), Arc::new(DownStore)).unwrap();
    let err = pipeline.sync().await.unwrap_err();
    assert!(matches!(err, liquidation_core::Error::CatalogUnavailable(_)));
}

#[tokio::test]
async fn test_sync_and_summarize_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryObjectStore::default());

    let t = day(1).and_hms_opt(8, 0, 0).unwrap().and_utc().timestamp_millis();
    let buy = format!("BUY,LIMIT,IOC,2,100,100,FILLED,2,2,{}", t);
    let sell = format!("SELL,LIMIT,IOC,1,200,200,FILLED,1,1,{}", t + 1_000);
    publish(&store, day(1), archive(day(1), &[&buy, &sell, &buy]));

    let t2 = day(2).and_hms_opt(8, 0, 0).unwrap().and_utc().timestamp_millis();
    publish(
        &store,
        day(2),
        archive(day(2), &[&format!("SELL,LIMIT,IOC,0,300,300,FILLED,0,0,{}", t2)]),
    );

    let pipeline = LiquidationPipeline::new(config(root.path()), store).unwrap();
    let (sync, summary) = pipeline.sync_and_summarize().await.unwrap();
    assert!(sync.is_complete());
    assert_eq!(summary.duplicates, 1);

    let rows = summary.rows;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].date, day(1));
    assert_eq!(rows[0].shorts_volume_usd, dec!(200));
    assert_eq!(rows[0].longs_volume_usd, dec!(200));
    assert_eq!(rows[0].price, Some(dec!(150)));
    assert_eq!(rows[1].date, day(2));
    assert!(rows[1].has_undefined_price());

    let persisted = pipeline.load_summary().unwrap();
    assert_eq!(persisted, rows);
}
