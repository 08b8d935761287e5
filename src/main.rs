use lobby_persistence_sqlite::{DatabaseConfig, LobbyStore, create_db_pool};
use log::{error, info};

mod logs;

fn migrate_requested() -> bool {
    std::env::var("LOBBY_DB_MIGRATE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received. Preparing graceful exit...");
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    logs::init_logger().expect("Failed to initialize logger");

    let config = DatabaseConfig::from_env().expect("Invalid database configuration");
    let pool = create_db_pool(&config)
        .await
        .expect("Failed to open lobby database");
    let store = LobbyStore::new(pool.clone());

    let schema = if migrate_requested() {
        info!("Migrating schema of {}", config.path);
        store.migrator.migrate().await
    } else {
        store.migrator.init().await
    };
    if let Err(e) = schema {
        error!("Refusing to start: {}", e);
        pool.close().await;
        std::process::exit(1);
    }

    info!(
        "Lobby store ready at {} (proxy protocol v{})",
        config.path,
        lobby_rpc::PROTOCOL_VERSION
    );

    shutdown_signal().await;

    drop(store);
    pool.close().await;
    info!("Lobby database closed");
}
