use lobby_server_domain::{
    ServiceError, ServiceResult,
    account::{Account, AccountRepository},
    util::{from_unix_millis, generate_unique_token, now_millis_precision, to_unix_millis},
};
use log::debug;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

use crate::{internal, is_unique_violation};

pub struct SqliteAccountRepository {
    pool: Pool<Sqlite>,
}

impl SqliteAccountRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn account_from_row(row: &SqliteRow) -> sqlx::Result<Account> {
        Ok(Account {
            login_key: row.try_get("login_key")?,
            session_id: row.try_get("session_id")?,
            last_user_id: row.try_get("last_user_id")?,
            created_ip: row.try_get("created_ip")?,
            created: from_unix_millis(row.try_get("created")?),
            last_login: from_unix_millis(row.try_get("last_login")?),
            system: row.try_get("system")?,
        })
    }

    async fn insert_account(&self, ip: &str, login_key: String) -> ServiceResult<Account> {
        let now = now_millis_precision();
        let result = sqlx::query(
            "INSERT INTO account (login_key, created_ip, created, last_login, system) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&login_key)
        .bind(ip)
        .bind(to_unix_millis(&now))
        .bind(to_unix_millis(&now))
        .bind(0i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Registered account from {}", ip);
                Ok(Account {
                    login_key,
                    session_id: String::new(),
                    last_user_id: String::new(),
                    created_ip: ip.to_string(),
                    created: now,
                    last_login: now,
                    system: 0,
                })
            }
            Err(e) if is_unique_violation(&e) => {
                ServiceError::conflict(format!("login key {} already registered", login_key))
            }
            Err(e) => Err(internal(e)),
        }
    }
}

#[async_trait::async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn register_account(&self, ip: &str) -> ServiceResult<Account> {
        self.insert_account(ip, generate_unique_token()).await
    }

    async fn register_account_with_login_key(
        &self,
        ip: &str,
        login_key: &str,
    ) -> ServiceResult<Account> {
        self.insert_account(ip, login_key.to_string()).await
    }

    async fn get_account_by_login_key(&self, login_key: &str) -> ServiceResult<Account> {
        let row = sqlx::query("SELECT * FROM account WHERE login_key = ?")
            .bind(login_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        match row {
            Some(row) => Self::account_from_row(&row).map_err(internal),
            None => ServiceError::not_found(format!("account {}", login_key)),
        }
    }

    async fn login_account(&self, account: &Account) -> ServiceResult<Account> {
        let mut account = account.clone();
        account.session_id = generate_unique_token();
        account.last_login = now_millis_precision();

        let result = sqlx::query("UPDATE account SET session_id = ?, last_login = ? WHERE login_key = ?")
            .bind(&account.session_id)
            .bind(to_unix_millis(&account.last_login))
            .bind(&account.login_key)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        if result.rows_affected() == 0 {
            return ServiceError::not_found(format!("account {}", account.login_key));
        }
        debug!("Account {} logged in", account.login_key);
        Ok(account)
    }
}
