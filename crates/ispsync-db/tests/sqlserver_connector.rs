//! Connector tests against a real SQL Server using testcontainers
//!
//! These tests spin up SQL Server in Docker (x86_64 hosts only).

use ispsync_db::{
    ConnectorState, DatabaseConfig, DatabaseEngine, DbError, RelationalConnector, SqlValue,
    SyncOrchestrator,
};
use std::time::Duration;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::mssql_server::MssqlServer;

const SA_PASSWORD: &str = "yourStrong(!)Password";

/// Helper to start a SQL Server container and matching config
async fn create_test_database() -> (ContainerAsync<MssqlServer>, DatabaseConfig) {
    let container = MssqlServer::default()
        .with_env_var("ACCEPT_EULA", "Y")
        .start()
        .await
        .expect("Failed to start SQL Server container");

    let host_port = container
        .get_host_port_ipv4(1433)
        .await
        .expect("Failed to get container port");

    tokio::time::sleep(Duration::from_secs(2)).await;

    let config = DatabaseConfig::new(DatabaseEngine::Sqlserver, "127.0.0.1", "master")
        .with_port(host_port)
        .with_credentials("sa", SA_PASSWORD)
        .with_trust_cert(true);
    (container, config)
}

async fn count(connector: &mut RelationalConnector, table: &str) -> Option<SqlValue> {
    let rows = connector
        .execute(&format!("SELECT COUNT(*) AS n FROM {}", table), &[])
        .await
        .unwrap();
    rows[0].get("n").cloned()
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_failed_statement_leaves_no_partial_write() {
    let (_container, config) = create_test_database().await;
    let mut connector = RelationalConnector::new(config);

    connector
        .execute("CREATE TABLE ledger (id INT PRIMARY KEY, amount DECIMAL(10,2))", &[])
        .await
        .unwrap();
    connector
        .execute("INSERT INTO ledger VALUES (1, 10)", &[])
        .await
        .unwrap();

    let err = connector
        .execute("INSERT INTO ledger VALUES (2, 20), (1, 30)", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::QueryExecution { .. }));

    assert_eq!(count(&mut connector, "ledger").await, Some(SqlValue::Int(1)));
    assert_eq!(connector.state(), ConnectorState::Connected);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_parameters_and_null_round_trip() {
    let (_container, config) = create_test_database().await;
    let mut connector = RelationalConnector::new(config);

    connector
        .execute("CREATE TABLE stock (id INT PRIMARY KEY, qty INT, label NVARCHAR(32))", &[])
        .await
        .unwrap();
    connector
        .execute(
            "INSERT INTO stock (id, qty, label) VALUES (@P1, @P2, @P3)",
            &[SqlValue::Int(1), SqlValue::Null, SqlValue::from("bundle")],
        )
        .await
        .unwrap();

    let rows = connector
        .execute("SELECT label, qty, id FROM stock WHERE id = @P1", &[SqlValue::Int(1)])
        .await
        .unwrap();
    assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["label", "qty", "id"]);
    assert_eq!(rows[0].get("qty"), Some(&SqlValue::Null));
    assert_eq!(rows[0].get("label"), Some(&SqlValue::Text("bundle".to_string())));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_export_writes_are_rolled_back() {
    let (_container, config) = create_test_database().await;
    let mut sync = SyncOrchestrator::new(config);

    let setup = [
        "CREATE TABLE customers (id INT PRIMARY KEY, name NVARCHAR(64) NOT NULL)",
        "INSERT INTO customers VALUES (1, 'Achieng'), (2, 'Baraka')",
    ];
    for statement in setup {
        sync.executor_mut().execute(statement, &[]).await.unwrap();
    }

    // Succeeds, but the new table must not survive
    sync.export("SELECT id INTO backup_customers FROM customers", "b.csv")
        .await
        .unwrap();
    let tables = sync
        .executor_mut()
        .execute(
            "SELECT COUNT(*) AS n FROM sys.tables WHERE name = 'backup_customers'",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(tables[0].get("n"), Some(&SqlValue::Int(0)));

    let export = sync
        .export("SELECT id, name FROM customers WHERE 1 = 0", "none.csv")
        .await
        .unwrap();
    assert_eq!(export.content, "id,name\n");
}
