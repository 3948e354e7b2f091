//! Connector tests against a real MySQL using testcontainers
//!
//! These tests spin up a MySQL instance in Docker.

use ispsync_db::{
    ConnectorState, DatabaseConfig, DatabaseEngine, DbError, RelationalConnector, SqlValue,
    SyncOrchestrator,
};
use rust_decimal::Decimal;
use std::error::Error as _;
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::mysql::Mysql;

/// Helper to start a MySQL container and matching config
async fn create_test_database() -> (ContainerAsync<Mysql>, DatabaseConfig) {
    let container = Mysql::default()
        .start()
        .await
        .expect("Failed to start MySQL container");

    let host_port = container
        .get_host_port_ipv4(3306)
        .await
        .expect("Failed to get container port");

    tokio::time::sleep(Duration::from_secs(2)).await;

    // The image allows root without a password and creates `test`
    let config = DatabaseConfig::new(DatabaseEngine::Mysql, "127.0.0.1", "test")
        .with_port(host_port)
        .with_credentials("root", "");
    (container, config)
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_rows_follow_projection() {
    let (_container, config) = create_test_database().await;
    let mut connector = RelationalConnector::new(config);

    connector
        .execute(
            "CREATE TABLE plans (id INT PRIMARY KEY, name VARCHAR(64) NOT NULL, price DECIMAL(10,2), active BOOLEAN)",
            &[],
        )
        .await
        .unwrap();
    connector
        .execute(
            "INSERT INTO plans VALUES (1, 'Home', 1500.00, TRUE), (2, 'Business', 4999.50, FALSE), (3, 'Lite', NULL, TRUE)",
            &[],
        )
        .await
        .unwrap();

    let rows = connector
        .execute(
            "SELECT price, name, id FROM plans WHERE active = ? ORDER BY id",
            &[SqlValue::Bool(true)],
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["price", "name", "id"]);
    assert_eq!(rows[0].get("price"), Some(&SqlValue::Decimal(Decimal::new(150000, 2))));
    assert_eq!(rows[0].get("name"), Some(&SqlValue::Text("Home".to_string())));
    assert_eq!(rows[1].get("price"), Some(&SqlValue::Null));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_failed_statement_leaves_no_partial_write() {
    let (_container, config) = create_test_database().await;
    let mut connector = RelationalConnector::new(config);

    connector
        .execute("CREATE TABLE ledger (id INT PRIMARY KEY, amount DECIMAL(10,2)) ENGINE=InnoDB", &[])
        .await
        .unwrap();
    connector
        .execute("INSERT INTO ledger VALUES (1, 10)", &[])
        .await
        .unwrap();

    let before = connector.execute("SELECT COUNT(*) AS n FROM ledger", &[]).await.unwrap();

    // Second row collides with the primary key, so the first must not land
    let err = connector
        .execute("INSERT INTO ledger VALUES (2, 20), (1, 30)", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::QueryExecution { .. }));
    assert!(err.source().is_some());

    let after = connector.execute("SELECT COUNT(*) AS n FROM ledger", &[]).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(connector.state(), ConnectorState::Connected);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_null_binds_into_integer_column() {
    let (_container, config) = create_test_database().await;
    let mut connector = RelationalConnector::new(config);

    connector
        .execute("CREATE TABLE stock (id INT PRIMARY KEY, qty INT)", &[])
        .await
        .unwrap();
    connector
        .execute(
            "INSERT INTO stock (id, qty) VALUES (?, ?)",
            &[SqlValue::Int(1), SqlValue::Null],
        )
        .await
        .unwrap();

    let rows = connector.execute("SELECT qty FROM stock", &[]).await.unwrap();
    assert_eq!(rows[0].get("qty"), Some(&SqlValue::Null));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_orchestrator_against_mysql() {
    let (_container, config) = create_test_database().await;
    let mut sync = SyncOrchestrator::new(config);

    let report = sync.test().await.unwrap();
    assert!(report.version.starts_with('8'));
    assert_eq!(report.table_count, 0);

    let setup = [
        "CREATE TABLE customer_accounts (data_balance DECIMAL(10,2), account_status VARCHAR(16))",
        "INSERT INTO customer_accounts VALUES (12.50, 'active'), (7.50, 'active'), (100, 'closed')",
    ];
    for statement in setup {
        sync.executor_mut().execute(statement, &[]).await.unwrap();
    }

    assert_eq!(sync.get_balance().await, Decimal::new(2000, 2));

    let export = sync
        .export(
            "SELECT account_status FROM customer_accounts WHERE account_status = 'gone'",
            "none.csv",
        )
        .await
        .unwrap();
    assert_eq!(export.content, "account_status\n");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_export_transaction_is_read_only() {
    let (_container, config) = create_test_database().await;
    let mut connector = RelationalConnector::new(config);

    connector
        .execute("CREATE TABLE audit (id INT PRIMARY KEY)", &[])
        .await
        .unwrap();

    // Writes are refused inside the read path
    assert!(connector.read_only("INSERT INTO audit VALUES (1)").await.is_err());

    let rows = connector.execute("SELECT COUNT(*) AS n FROM audit", &[]).await.unwrap();
    assert_eq!(rows[0].get("n"), Some(&SqlValue::Int(0)));

    // The session is usable and writable again afterwards
    connector
        .execute("INSERT INTO audit VALUES (2)", &[])
        .await
        .unwrap();
}
