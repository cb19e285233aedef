//! Integration tests for warehouse adapters
//!
//! Tests that need real warehouse credentials are marked with `#[ignore]`.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all non-ignored tests (no credentials required)
//! cargo test -p osmosis-catalog --test integration_tests
//!
//! # Run BigQuery integration tests
//! GOOGLE_APPLICATION_CREDENTIALS=/path/to/key.json \
//! OSMOSIS_BIGQUERY_PROJECT=my-project \
//! OSMOSIS_BIGQUERY_DATASET=my_dataset \
//! cargo test -p osmosis-catalog --features bigquery --test integration_tests -- --ignored
//! ```

mod fixtures;

use osmosis_catalog::{FetchError, MockAdapter, MockAdapterBuilder, WarehouseAdapter};

fn has_bigquery_credentials() -> bool {
    std::env::var("GOOGLE_APPLICATION_CREDENTIALS").is_ok()
        || std::env::var("OSMOSIS_BIGQUERY_PROJECT").is_ok()
}

// =============================================================================
// Mock Adapter Tests (No credentials required)
// =============================================================================

#[tokio::test]
async fn test_mock_adapter_basic_workflow() {
    let adapter = MockAdapterBuilder::new()
        .with_table(fixtures::customers_table())
        .with_table(fixtures::orders_table())
        .with_table(fixtures::events_table())
        .build();

    let dataform = adapter.list_tables("example-project", "dataform").await.unwrap();
    assert_eq!(dataform.len(), 2);
    assert_eq!(dataform[0].table, "customers");
    assert_eq!(dataform[1].table, "orders");

    let email = &dataform[0].fields[1];
    assert_eq!(email.description.as_deref(), Some("Primary email address"));
    assert_eq!(email.policy_tags, Some(vec![fixtures::EMAIL_TAG.to_string()]));

    let raw = adapter.list_tables("example-project", "raw").await.unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].column_names(), ["event_id", "payload"]);
}

#[tokio::test]
async fn test_mock_adapter_dataset_not_found_error() {
    let adapter = MockAdapter::new();
    let result = adapter.list_tables("example-project", "nonexistent").await;
    assert!(matches!(result, Err(FetchError::DatasetNotFound(_))));
}

#[tokio::test]
async fn test_mock_adapter_latency_simulation() {
    let adapter = MockAdapterBuilder::new()
        .with_table(fixtures::orders_table())
        .with_latency(100)
        .build();

    let start = std::time::Instant::now();
    let _ = adapter.list_tables("example-project", "dataform").await;
    assert!(start.elapsed().as_millis() >= 100);
}

#[tokio::test]
async fn test_mock_adapter_concurrent_listing() {
    let adapter = MockAdapterBuilder::new()
        .with_table(fixtures::customers_table())
        .with_table(fixtures::events_table())
        .with_latency(50)
        .build();

    let (dataform, raw) = tokio::join!(
        adapter.list_tables("example-project", "dataform"),
        adapter.list_tables("example-project", "raw"),
    );

    assert_eq!(dataform.unwrap().len(), 1);
    assert_eq!(raw.unwrap().len(), 1);
    assert_eq!(adapter.total_list_calls(), 2);
}

#[tokio::test]
async fn test_mock_adapter_runtime_registration() {
    let adapter = MockAdapter::new();
    assert!(adapter.list_tables("p", "dataform").await.is_err());

    adapter.add_table(fixtures::orders_table()).await;
    let tables = adapter.list_tables("p", "dataform").await.unwrap();
    assert_eq!(tables[0].column_names(), ["id", "customer_id", "total_amount"]);
}

#[tokio::test]
async fn test_mock_adapter_timeout_error_passthrough() {
    let adapter = MockAdapterBuilder::new()
        .with_error(
            "slow",
            FetchError::Timeout {
                dataset: "slow".to_string(),
                secs: 5,
            },
        )
        .build();

    let err = adapter.list_tables("p", "slow").await.unwrap_err();
    assert!(err.to_string().contains("slow"));
}

// =============================================================================
// BigQuery Integration Tests (require credentials)
// =============================================================================

#[tokio::test]
#[ignore] // Run with: cargo test --features bigquery -- --ignored
async fn test_bigquery_connection() {
    if !has_bigquery_credentials() {
        eprintln!("Skipping BigQuery test: no credentials available");
        return;
    }

    #[cfg(feature = "bigquery")]
    {
        use osmosis_catalog::BigQueryAdapter;

        let project_id = std::env::var("OSMOSIS_BIGQUERY_PROJECT")
            .expect("OSMOSIS_BIGQUERY_PROJECT must be set");

        let adapter = BigQueryAdapter::with_adc(&project_id)
            .await
            .expect("Failed to create BigQuery adapter");

        let project = adapter.test_connection().await.expect("Connection test failed");
        assert_eq!(project, project_id);
    }

    #[cfg(not(feature = "bigquery"))]
    {
        eprintln!("BigQuery feature not enabled. Rebuild with --features bigquery");
    }
}

#[tokio::test]
#[ignore]
async fn test_bigquery_list_tables() {
    if !has_bigquery_credentials() {
        return;
    }

    #[cfg(feature = "bigquery")]
    {
        use osmosis_catalog::BigQueryAdapter;

        let project_id = std::env::var("OSMOSIS_BIGQUERY_PROJECT")
            .expect("OSMOSIS_BIGQUERY_PROJECT must be set");
        let dataset = std::env::var("OSMOSIS_BIGQUERY_DATASET")
            .expect("OSMOSIS_BIGQUERY_DATASET must be set");

        let adapter = BigQueryAdapter::with_adc(&project_id)
            .await
            .expect("Failed to create adapter");

        let tables = adapter
            .list_tables(&project_id, &dataset)
            .await
            .expect("Failed to list tables");

        for table in &tables {
            println!("{}: {}", table, table.column_names().join(", "));
        }
    }
}
