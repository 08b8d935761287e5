use lobby_persistence_sqlite::{DatabaseConfig, LobbyStore, create_db_pool};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 && args.len() != 3 {
        eprintln!("Usage: add_account <login_key> [<created_ip>]");
        std::process::exit(1);
    }
    let login_key = &args[1];
    let ip = args.get(2).map(String::as_str).unwrap_or("");

    let config = DatabaseConfig::from_env().expect("Invalid database configuration");
    let pool = create_db_pool(&config)
        .await
        .expect("Failed to open lobby database");
    let store = LobbyStore::new(pool.clone());
    store
        .migrator
        .init()
        .await
        .expect("Failed to create schema");

    match store
        .accounts
        .register_account_with_login_key(ip, login_key)
        .await
    {
        Ok(account) => println!("Created account [{}]", account.login_key),
        Err(e) => {
            eprintln!("Failed to create account [{}]: {}", login_key, e);
            pool.close().await;
            std::process::exit(1);
        }
    }
    pool.close().await;
}
