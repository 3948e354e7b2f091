//! Startup checks of configured providers and the ISP database

use ispsync_db::{ConnectionReport, DatabaseConfig, SyncOrchestrator};
use ispsync_egress::{ProviderConnection, ProviderRegistry};
use tracing::{error, info, warn};

/// Build every configured adapter once, so an unusable endpoint stops the
/// server before it starts listening
pub fn validate_providers(
    registry: &ProviderRegistry,
    providers: &[ProviderConnection],
) -> ispsync_core::Result<()> {
    for conn in providers {
        registry.build(conn.provider_kind, conn.into())?;
    }
    Ok(())
}

/// Test every provider connection and return them with `last_test` set
pub async fn sweep_providers(
    registry: ProviderRegistry,
    mut providers: Vec<ProviderConnection>,
) -> Vec<ProviderConnection> {
    registry.batch_test_and_record(&mut providers).await;

    for conn in &providers {
        match conn.last_test {
            Some(result) if result.ok => {
                info!(provider = %conn.name, tested_at = %result.tested_at, "provider reachable")
            }
            Some(result) => {
                warn!(provider = %conn.name, tested_at = %result.tested_at, "provider unreachable")
            }
            None => warn!(provider = %conn.name, "provider was not tested"),
        }
    }
    providers
}

/// Connect to the configured database and report what is there
pub async fn describe_database(database: DatabaseConfig) -> ispsync_core::Result<ConnectionReport> {
    let mut sync = SyncOrchestrator::new(database);
    let outcome = sync.test().await;
    sync.disconnect().await;
    Ok(outcome?)
}

pub async fn check_database(database: DatabaseConfig) {
    match describe_database(database).await {
        Ok(report) => info!(
            database = %report.database,
            host = %report.host,
            tables = report.table_count,
            "Database reachable: {}",
            report.version
        ),
        Err(e) if e.is_transport() => error!("Database unreachable: {}", e),
        Err(e) => error!("Database check failed: {}", e),
    }
}
