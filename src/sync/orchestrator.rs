//! Per-resource sync: fetch, derive columns, resolve rows

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiResult};
use crate::metrics::SyncMetrics;
use crate::output::{HeaderStore, ProgressSink, RowSink, TracingProgress};
use crate::schema::{
    derive_headers, diff_headers, resolve_row_with, spread_lists, ArrayMode, HeaderDiff,
    HeaderMapping, Row,
};
use crate::{EndpointDescriptor, QueryParams};

use super::SyncError;

/// Result of syncing one resource
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Endpoint key of the resource
    pub resource_key: String,
    /// Columns, in output order
    pub columns: Vec<HeaderMapping>,
    /// One row per fetched item, aligned with `columns`
    pub rows: Vec<Row>,
    /// Number of items fetched
    pub item_count: usize,
    /// Paths added or removed relative to a stored mapping
    pub header_diff: HeaderDiff,
}

impl SyncReport {
    /// Header paths, in output order
    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.original_path.clone()).collect()
    }

    /// Column titles, in output order
    pub fn display_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.display_name.clone()).collect()
    }

    /// Whether the resource returned no items
    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }
}

/// Outcome of one resource in a multi-resource run
#[derive(Debug)]
pub struct ResourceOutcome {
    /// Endpoint key
    pub resource_key: String,
    /// Report or error for this resource alone
    pub result: Result<SyncReport, SyncError>,
}

/// Drives resource syncs through an [`ApiClient`]
pub struct SyncOrchestrator {
    client: Arc<ApiClient>,
    header_store: Option<Arc<dyn HeaderStore>>,
    progress: Arc<dyn ProgressSink>,
    array_mode: ArrayMode,
}

impl SyncOrchestrator {
    /// Orchestrator with no header store, logging progress
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            header_store: None,
            progress: Arc::new(TracingProgress),
            array_mode: ArrayMode::Join,
        }
    }

    /// Persist and reuse column mappings through `store`
    pub fn with_header_store(mut self, store: Arc<dyn HeaderStore>) -> Self {
        self.header_store = Some(store);
        self
    }

    /// Send progress messages to `progress`
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Choose how array values become cells
    pub fn with_array_mode(mut self, mode: ArrayMode) -> Self {
        self.array_mode = mode;
        self
    }

    /// Underlying client
    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    /// Sync one resource into rows
    ///
    /// A resource with no items is a successful, empty report. Client errors
    /// propagate unchanged; header store failures are logged and ignored.
    pub async fn sync_resource(
        &self,
        descriptor: &EndpointDescriptor,
        params: &QueryParams,
    ) -> ApiResult<SyncReport> {
        let metrics = SyncMetrics::start(&descriptor.key);
        let result = self.run(descriptor, params).await;
        match &result {
            Ok(report) => metrics.record_success(report.rows.len()),
            Err(err) => metrics.record_failure(err.kind()),
        }
        result
    }

    /// Sync one resource and write it to `sink`
    pub async fn sync_to_sink(
        &self,
        descriptor: &EndpointDescriptor,
        params: &QueryParams,
        sink: &dyn RowSink,
    ) -> Result<SyncReport, SyncError> {
        let report = self.sync_resource(descriptor, params).await?;
        sink.write_rows(&report.resource_key, &report.columns, &report.rows)?;
        Ok(report)
    }

    /// Sync several resources with at most `concurrency` in flight
    ///
    /// Each resource uses its default query. Failures are isolated per
    /// resource; outcomes are returned in input order.
    pub async fn sync_many(
        &self,
        descriptors: &[EndpointDescriptor],
        concurrency: usize,
        sink: Option<&dyn RowSink>,
    ) -> Vec<ResourceOutcome> {
        info!(
            resources = descriptors.len(),
            concurrency = concurrency.max(1),
            "Starting multi-resource sync"
        );

        stream::iter(descriptors.iter().map(|descriptor| async move {
            let result = match sink {
                Some(sink) => {
                    self.sync_to_sink(descriptor, &descriptor.default_query, sink)
                        .await
                }
                None => self
                    .sync_resource(descriptor, &descriptor.default_query)
                    .await
                    .map_err(SyncError::from),
            };
            ResourceOutcome {
                resource_key: descriptor.key.clone(),
                result,
            }
        }))
        .buffered(concurrency.max(1))
        .collect()
        .await
    }

    async fn run(
        &self,
        descriptor: &EndpointDescriptor,
        params: &QueryParams,
    ) -> ApiResult<SyncReport> {
        let key = descriptor.key.as_str();
        let progress = Arc::clone(&self.progress);
        progress.report(key, "Fetching data");

        let items = self
            .client
            .fetch_all_pages_with(key, &descriptor.path, params, |page, total| {
                progress.report(key, &format!("Fetched page {page} ({total} items so far)"));
            })
            .await?;

        let observed = match items.first() {
            Some(first) => derive_headers(first, &descriptor.default_headers),
            None => descriptor.default_headers.clone(),
        };

        let (columns, header_diff) = match self.load_mapping(key) {
            Some(stored) if !stored.is_empty() => {
                let stored_paths: Vec<String> =
                    stored.iter().map(|c| c.original_path.clone()).collect();
                let diff = if items.is_empty() {
                    HeaderDiff::default()
                } else {
                    diff_headers(&stored_paths, &observed)
                };
                if !diff.is_empty() {
                    warn!(
                        resource = key,
                        added = ?diff.added,
                        removed = ?diff.removed,
                        "Fields changed since the header mapping was stored"
                    );
                }
                (stored, diff)
            }
            _ => {
                let mapping = HeaderMapping::from_paths(&observed);
                if !items.is_empty() {
                    self.save_mapping(key, &mapping);
                }
                (mapping, HeaderDiff::default())
            }
        };

        let paths: Vec<String> = columns.iter().map(|c| c.original_path.clone()).collect();
        let rows: Vec<Row> = items
            .iter()
            .map(|item| resolve_row_with(item, &paths, self.array_mode))
            .collect();

        let (columns, rows) = match self.array_mode {
            ArrayMode::Join => (columns, rows),
            ArrayMode::Spread => spread_lists(&columns, rows),
        };

        progress.report(
            key,
            &format!("Resolved {} rows across {} columns", rows.len(), columns.len()),
        );

        Ok(SyncReport {
            resource_key: descriptor.key.clone(),
            columns,
            rows,
            item_count: items.len(),
            header_diff,
        })
    }

    fn load_mapping(&self, key: &str) -> Option<Vec<HeaderMapping>> {
        let store = self.header_store.as_ref()?;
        match store.load(key) {
            Ok(mapping) => mapping,
            Err(err) => {
                warn!(resource = key, error = %err, "Failed to load header mapping, deriving a new one");
                None
            }
        }
    }

    fn save_mapping(&self, key: &str, mapping: &[HeaderMapping]) {
        let Some(store) = self.header_store.as_ref() else {
            return;
        };
        match store.store(key, mapping) {
            Ok(()) => debug!(resource = key, columns = mapping.len(), "Stored header mapping"),
            Err(err) => warn!(resource = key, error = %err, "Failed to store header mapping"),
        }
    }
}
