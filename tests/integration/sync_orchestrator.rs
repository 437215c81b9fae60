//! Integration tests for resource syncs through the orchestrator

use serde_json::json;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use portfolio_sync::output::{
    CsvRowSink, HeaderStore, MemoryHeaderStore, OutputError, OutputResult, ProgressSink,
};
use portfolio_sync::schema::{ArrayMode, CellValue, HeaderMapping};
use portfolio_sync::sync::{ClientConfig, SyncError, SyncOrchestrator};
use portfolio_sync::{EndpointDescriptor, EndpointRegistry};

use crate::support::{client, FakeTransport, Reply};

fn descriptor(key: &str) -> EndpointDescriptor {
    EndpointRegistry::load_embedded()
        .unwrap()
        .require(key)
        .unwrap()
        .clone()
}

fn orders_page() -> Reply {
    Reply::json(json!({
        "items": [
            {
                "id": 101,
                "ticker": "AAPL_US_EQ",
                "filledQuantity": 2,
                "fillPrice": 189.5,
                "dateExecuted": "2024-04-02T14:31:07.000Z",
                "taxes": [{"name": "STAMP", "quantity": 0.5}, {"name": "FX", "quantity": 0.1}]
            },
            {
                "id": 102,
                "ticker": "VUSA_EQ",
                "filledQuantity": 10,
                "fillPrice": 71.02,
                "dateExecuted": "2024-04-03T09:00:00.000Z",
                "taxes": []
            }
        ],
        "nextPagePath": null
    }))
}

#[derive(Default)]
struct RecordingProgress {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingProgress {
    fn report(&self, resource_key: &str, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push(format!("{resource_key}: {message}"));
    }
}

struct BrokenStore;

impl HeaderStore for BrokenStore {
    fn load(&self, _resource_key: &str) -> OutputResult<Option<Vec<HeaderMapping>>> {
        Err(OutputError::IoError("disk unavailable".to_string()))
    }

    fn store(&self, _resource_key: &str, _mapping: &[HeaderMapping]) -> OutputResult<()> {
        Err(OutputError::IoError("disk unavailable".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_derives_columns_from_first_item() {
    let transport = FakeTransport::new().reply(orders_page()).shared();
    let store = Arc::new(MemoryHeaderStore::new());
    let orchestrator = SyncOrchestrator::new(Arc::new(client(transport)))
        .with_header_store(store.clone());
    let orders = descriptor("ORDERS");

    let report = orchestrator
        .sync_resource(&orders, &orders.default_query)
        .await
        .unwrap();

    assert_eq!(
        report.headers(),
        vec!["id", "ticker", "filledQuantity", "fillPrice", "dateExecuted", "taxes.name", "taxes.quantity"]
    );
    assert_eq!(report.display_names()[2], "Filled Quantity");
    assert_eq!(report.item_count, 2);
    assert_eq!(report.rows[0][5], CellValue::Text("STAMP, FX".to_string()));
    assert_eq!(report.rows[1][5], CellValue::Empty);
    assert!(report.header_diff.is_empty());

    let stored = store.load("ORDERS").unwrap().unwrap();
    assert_eq!(stored, report.columns);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_sync_is_byte_identical() {
    let transport = FakeTransport::new()
        .reply(orders_page())
        .reply(orders_page())
        .shared();
    let orchestrator = SyncOrchestrator::new(Arc::new(client(transport)))
        .with_header_store(Arc::new(MemoryHeaderStore::new()));
    let orders = descriptor("ORDERS");
    let dir = TempDir::new().unwrap();
    let sink = CsvRowSink::new(dir.path());

    let first = orchestrator
        .sync_to_sink(&orders, &orders.default_query, &sink)
        .await
        .unwrap();
    let first_csv = std::fs::read(sink.path_for("ORDERS")).unwrap();

    let second = orchestrator
        .sync_to_sink(&orders, &orders.default_query, &sink)
        .await
        .unwrap();
    let second_csv = std::fs::read(sink.path_for("ORDERS")).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_csv, second_csv);
    let text = String::from_utf8(first_csv).unwrap();
    assert!(text.starts_with("Id,Ticker,Filled Quantity,Fill Price,Date Executed,Taxes Name,Taxes Quantity\n"));
    assert!(text.contains(",2024-04-02T14:31:07.000Z,"));
}

#[tokio::test(start_paused = true)]
async fn test_stored_mapping_is_reused_and_drift_reported() {
    let transport = FakeTransport::new()
        .reply(Reply::json(json!({
            "items": [{"ticker": "AAPL_US_EQ", "amount": 0.24, "paidOn": "2024-02-15T00:00:00Z"}],
            "nextPagePath": null
        })))
        .shared();
    let store = Arc::new(MemoryHeaderStore::new());
    store
        .store(
            "DIVIDENDS",
            &[
                HeaderMapping::with_display_name("ticker", "Symbol"),
                HeaderMapping::new("amount"),
                HeaderMapping::new("legacyField"),
            ],
        )
        .unwrap();
    let orchestrator = SyncOrchestrator::new(Arc::new(client(transport)))
        .with_header_store(store.clone());
    let dividends = descriptor("DIVIDENDS");

    let report = orchestrator
        .sync_resource(&dividends, &dividends.default_query)
        .await
        .unwrap();

    assert_eq!(report.headers(), vec!["ticker", "amount", "legacyField"]);
    assert_eq!(report.display_names(), vec!["Symbol", "Amount", "Legacy Field"]);
    assert_eq!(report.header_diff.added, vec!["paidOn"]);
    assert_eq!(report.header_diff.removed, vec!["legacyField"]);
    assert_eq!(report.rows[0][2], CellValue::Empty);

    // The stored mapping is left as the user configured it
    assert_eq!(store.load("DIVIDENDS").unwrap().unwrap()[0].display_name, "Symbol");
}

#[tokio::test(start_paused = true)]
async fn test_empty_resource_uses_default_headers_and_stores_nothing() {
    let transport = FakeTransport::new()
        .reply(Reply::json(json!({"items": [], "nextPagePath": null})))
        .shared();
    let store = Arc::new(MemoryHeaderStore::new());
    let orchestrator = SyncOrchestrator::new(Arc::new(client(transport)))
        .with_header_store(store.clone());
    let transactions = descriptor("TRANSACTIONS");

    let report = orchestrator
        .sync_resource(&transactions, &transactions.default_query)
        .await
        .unwrap();

    assert!(report.is_empty());
    assert!(report.rows.is_empty());
    assert_eq!(report.headers(), vec!["type", "amount", "reference", "dateTime"]);
    assert_eq!(store.load("TRANSACTIONS").unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_spread_mode_widens_array_columns() {
    let transport = FakeTransport::new().reply(orders_page()).shared();
    let orchestrator = SyncOrchestrator::new(Arc::new(client(transport)))
        .with_array_mode(ArrayMode::Spread);
    let orders = descriptor("ORDERS");

    let report = orchestrator
        .sync_resource(&orders, &orders.default_query)
        .await
        .unwrap();

    let headers = report.headers();
    assert_eq!(
        &headers[5..],
        &["taxes.name.0", "taxes.name.1", "taxes.quantity.0", "taxes.quantity.1"]
    );
    assert_eq!(report.display_names()[6], "Taxes Name 2");
    for row in &report.rows {
        assert_eq!(row.len(), headers.len());
    }
    assert_eq!(report.rows[0][6], CellValue::Text("FX".to_string()));
    assert_eq!(report.rows[1][5], CellValue::Empty);
}

#[tokio::test(start_paused = true)]
async fn test_header_store_failures_do_not_fail_sync() {
    let transport = FakeTransport::new()
        .reply(Reply::json(json!([{"id": 1, "cash": 12.5}])))
        .shared();
    let orchestrator = SyncOrchestrator::new(Arc::new(client(transport)))
        .with_header_store(Arc::new(BrokenStore));
    let pies = descriptor("PIES");

    let report = orchestrator
        .sync_resource(&pies, &pies.default_query)
        .await
        .unwrap();
    assert_eq!(report.headers(), vec!["id", "cash"]);
}

#[tokio::test(start_paused = true)]
async fn test_api_errors_propagate_unchanged() {
    let transport = FakeTransport::new().reply(Reply::status(401)).shared();
    let orchestrator = SyncOrchestrator::new(Arc::new(client(transport)));
    let pies = descriptor("PIES");

    let err = orchestrator
        .sync_resource(&pies, &pies.default_query)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_reported() {
    let transport = FakeTransport::new()
        .reply(Reply::json(json!({"items": [{"id": 1}], "nextPagePath": "/p2"})))
        .reply(Reply::json(json!({"items": [{"id": 2}], "nextPagePath": null})))
        .shared();
    let progress = Arc::new(RecordingProgress::default());
    let orchestrator =
        SyncOrchestrator::new(Arc::new(client(transport))).with_progress(progress.clone());
    let orders = descriptor("ORDERS");

    orchestrator
        .sync_resource(&orders, &orders.default_query)
        .await
        .unwrap();

    let messages = progress.messages.lock().unwrap().clone();
    assert!(messages.contains(&"ORDERS: Fetched page 2 (2 items so far)".to_string()));
    assert!(messages.last().unwrap().starts_with("ORDERS: Resolved 2 rows"));
}

#[tokio::test(start_paused = true)]
async fn test_sync_many_isolates_failures_and_keeps_order() {
    let transport = FakeTransport::new()
        .route("/equity/pies", Reply::status(404))
        .route("/equity/account/cash", Reply::json(json!({"free": 10, "total": 25})))
        .route("/history/dividends", Reply::json(json!({"items": [], "nextPagePath": null})))
        .shared();
    let client = client(transport).with_config(ClientConfig::default().with_cache(false));
    let orchestrator = SyncOrchestrator::new(Arc::new(client));
    let descriptors = vec![descriptor("PIES"), descriptor("ACCOUNT_CASH"), descriptor("DIVIDENDS")];
    let dir = TempDir::new().unwrap();
    let sink = CsvRowSink::new(dir.path());

    let outcomes = orchestrator.sync_many(&descriptors, 3, Some(&sink)).await;

    let keys: Vec<&str> = outcomes.iter().map(|o| o.resource_key.as_str()).collect();
    assert_eq!(keys, vec!["PIES", "ACCOUNT_CASH", "DIVIDENDS"]);
    assert!(matches!(outcomes[0].result, Err(SyncError::Api(_))));

    let cash = outcomes[1].result.as_ref().unwrap();
    assert_eq!(cash.headers(), vec!["free", "total"]);
    assert_eq!(
        std::fs::read_to_string(sink.path_for("ACCOUNT_CASH")).unwrap(),
        "Free,Total\n10,25\n"
    );

    assert!(outcomes[2].result.as_ref().unwrap().is_empty());
    assert!(!sink.path_for("PIES").exists());
}
