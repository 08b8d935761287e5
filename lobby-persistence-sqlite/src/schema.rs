//! Declared schema of the lobby database.
//!
//! Every managed table lists the columns it takes over from the previously
//! deployed version of itself. A renamed column is declared as a mapping from
//! its old name; a column that is deliberately discarded is listed in
//! `dropped`. Any other column found in an old table aborts the migration.
//!
//! Timestamp columns are declared with `timestamp`: earlier deployments
//! wrote them as text such as `2020-01-01 10:00:00.123+09:00`, while the
//! stores read unix milliseconds.

pub struct TableSchema {
    pub name: &'static str,
    pub create: &'static str,
    pub indexes: &'static [IndexSchema],
    pub retained: &'static [ColumnMapping],
    pub dropped: &'static [&'static str],
}

pub struct IndexSchema {
    pub name: &'static str,
    pub create: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conversion {
    Verbatim,
    /// Text timestamps become unix milliseconds; integers pass through.
    /// Text SQLite cannot parse becomes 0.
    TimestampMillis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnMapping {
    pub from: &'static str,
    pub to: &'static str,
    pub conversion: Conversion,
}

impl ColumnMapping {
    /// Expression selecting this column's value out of the old table.
    pub fn source(&self) -> String {
        match self.conversion {
            Conversion::Verbatim => self.from.to_string(),
            Conversion::TimestampMillis => format!(
                "CASE WHEN typeof({c}) = 'text' THEN COALESCE(CAST(strftime('%s', {c}) AS INTEGER) * 1000, 0) ELSE {c} END",
                c = self.from
            ),
        }
    }
}

const fn keep(column: &'static str) -> ColumnMapping {
    ColumnMapping {
        from: column,
        to: column,
        conversion: Conversion::Verbatim,
    }
}

const fn timestamp(column: &'static str) -> ColumnMapping {
    ColumnMapping {
        from: column,
        to: column,
        conversion: Conversion::TimestampMillis,
    }
}

const ACCOUNT: TableSchema = TableSchema {
    name: "account",
    create: "CREATE TABLE IF NOT EXISTS account (
        login_key text,
        session_id text default '',
        last_user_id text default '',
        created_ip text default '',
        created timestamp,
        last_login timestamp,
        system integer default 0,
        PRIMARY KEY (login_key)
    )",
    indexes: &[],
    retained: &[
        keep("login_key"),
        keep("session_id"),
        keep("last_user_id"),
        keep("created_ip"),
        timestamp("created"),
        timestamp("last_login"),
        keep("system"),
    ],
    dropped: &[],
};

const USER: TableSchema = TableSchema {
    name: "user",
    create: "CREATE TABLE IF NOT EXISTS user (
        user_id text,
        login_key text,
        session_id text default '',
        name text default 'default',
        team text default '',
        battle_count integer default 0,
        win_count integer default 0,
        lose_count integer default 0,
        kill_count integer default 0,
        death_count integer default 0,
        aeug_battle_count integer default 0,
        aeug_win_count integer default 0,
        aeug_lose_count integer default 0,
        aeug_kill_count integer default 0,
        aeug_death_count integer default 0,
        titans_battle_count integer default 0,
        titans_win_count integer default 0,
        titans_lose_count integer default 0,
        titans_kill_count integer default 0,
        titans_death_count integer default 0,
        daily_battle_count integer default 0,
        daily_win_count integer default 0,
        daily_lose_count integer default 0,
        created timestamp,
        system integer default 0,
        PRIMARY KEY (user_id, login_key)
    )",
    indexes: &[],
    retained: &[
        keep("user_id"),
        keep("login_key"),
        keep("session_id"),
        keep("name"),
        keep("team"),
        keep("battle_count"),
        keep("win_count"),
        keep("lose_count"),
        keep("kill_count"),
        keep("death_count"),
        keep("aeug_battle_count"),
        keep("aeug_win_count"),
        keep("aeug_lose_count"),
        keep("aeug_kill_count"),
        keep("aeug_death_count"),
        keep("titans_battle_count"),
        keep("titans_win_count"),
        keep("titans_lose_count"),
        keep("titans_kill_count"),
        keep("titans_death_count"),
        keep("daily_battle_count"),
        keep("daily_win_count"),
        keep("daily_lose_count"),
        timestamp("created"),
        keep("system"),
    ],
    dropped: &[],
};

const BATTLE_RECORD: TableSchema = TableSchema {
    name: "battle_record",
    create: "CREATE TABLE IF NOT EXISTS battle_record (
        battle_code text,
        user_id text,
        user_name text,
        pilot_name text,
        players integer default 0,
        aggregate integer default 0,
        pos integer default 0,
        side integer default 0,
        round integer default 0,
        win integer default 0,
        lose integer default 0,
        kill integer default 0,
        death integer default 0,
        frame integer default 0,
        result text default '',
        created timestamp,
        updated timestamp,
        system integer default 0,
        PRIMARY KEY (battle_code, user_id)
    )",
    indexes: &[
        IndexSchema {
            name: "BATTLE_RECORD_USER_ID",
            create: "CREATE INDEX IF NOT EXISTS BATTLE_RECORD_USER_ID ON battle_record(user_id)",
        },
        IndexSchema {
            name: "BATTLE_RECORD_PLAYERS",
            create: "CREATE INDEX IF NOT EXISTS BATTLE_RECORD_PLAYERS ON battle_record(players)",
        },
        IndexSchema {
            name: "BATTLE_RECORD_CREATED",
            create: "CREATE INDEX IF NOT EXISTS BATTLE_RECORD_CREATED ON battle_record(created)",
        },
        IndexSchema {
            name: "BATTLE_RECORD_AGGREGATE",
            create: "CREATE INDEX IF NOT EXISTS BATTLE_RECORD_AGGREGATE ON battle_record(aggregate)",
        },
    ],
    retained: &[
        keep("battle_code"),
        keep("user_id"),
        keep("user_name"),
        keep("pilot_name"),
        keep("players"),
        keep("aggregate"),
        keep("pos"),
        keep("side"),
        keep("round"),
        keep("win"),
        keep("lose"),
        keep("kill"),
        keep("death"),
        keep("frame"),
        keep("result"),
        timestamp("created"),
        timestamp("updated"),
        keep("system"),
    ],
    dropped: &[],
};

/// Tables in creation order.
pub const TABLES: &[TableSchema] = &[ACCOUNT, USER, BATTLE_RECORD];

/// Index names shipped by earlier deployments that the current schema no
/// longer creates.
pub const LEGACY_INDEXES: &[&str] = &["BATTLE_RECORD_AGGRIGATE"];

impl TableSchema {
    pub fn temporary_name(&self) -> String {
        format!("{}_tmp", self.name)
    }

    /// Picks the column pairs to copy out of an old table with the given
    /// columns. Fails naming the offending column when the old table holds a
    /// column this schema does not account for.
    pub fn copy_plan(&self, old_columns: &[String]) -> Result<Vec<ColumnMapping>, String> {
        for column in old_columns {
            let retained = self.retained.iter().any(|m| m.from == column);
            let dropped = self.dropped.iter().any(|d| d == column);
            if !retained && !dropped {
                return Err(format!(
                    "column {}.{} is neither retained nor dropped",
                    self.name, column
                ));
            }
        }

        let mut plan: Vec<ColumnMapping> = Vec::new();
        for mapping in self.retained {
            if !old_columns.iter().any(|c| c == mapping.from) {
                continue;
            }
            if let Some(existing) = plan.iter().find(|m| m.to == mapping.to) {
                return Err(format!(
                    "columns {}.{} and {}.{} both map to {}",
                    self.name, existing.from, self.name, mapping.from, mapping.to
                ));
            }
            plan.push(*mapping);
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    const RENAMED: TableSchema = TableSchema {
        name: "pilot",
        create: "",
        indexes: &[],
        retained: &[
            keep("id"),
            ColumnMapping {
                from: "nick",
                to: "name",
                conversion: Conversion::Verbatim,
            },
            keep("name"),
        ],
        dropped: &["legacy"],
    };

    #[test]
    fn test_copy_plan_identity() {
        let all: Vec<String> = ACCOUNT.retained.iter().map(|m| m.from.to_string()).collect();
        let plan = ACCOUNT.copy_plan(&all).expect("current schema should copy");
        assert_eq!(plan.len(), ACCOUNT.retained.len());
        assert!(plan.iter().all(|m| m.from == m.to));
    }

    #[test]
    fn test_timestamp_columns_are_converted() {
        let converted: Vec<&str> = TABLES
            .iter()
            .flat_map(|t| t.retained.iter())
            .filter(|m| m.conversion == Conversion::TimestampMillis)
            .map(|m| m.to)
            .collect();
        assert_eq!(
            converted,
            vec!["created", "last_login", "created", "created", "updated"]
        );
        assert_eq!(keep("name").source(), "name");
        assert!(timestamp("created").source().contains("strftime('%s', created)"));
    }

    #[test]
    fn test_copy_plan_skips_new_columns() {
        let plan = USER
            .copy_plan(&columns(&["user_id", "login_key", "name"]))
            .expect("older schema should copy");
        assert_eq!(plan, vec![keep("user_id"), keep("login_key"), keep("name")]);
    }

    #[test]
    fn test_copy_plan_rename_and_drop() {
        let plan = RENAMED
            .copy_plan(&columns(&["id", "nick", "legacy"]))
            .expect("declared rename should copy");
        assert_eq!(
            plan,
            vec![
                keep("id"),
                ColumnMapping {
                    from: "nick",
                    to: "name",
                    conversion: Conversion::Verbatim,
                }
            ]
        );
    }

    #[test]
    fn test_copy_plan_rejects_undeclared_column() {
        let err = ACCOUNT
            .copy_plan(&columns(&["login_key", "password"]))
            .expect_err("undeclared column must fail");
        assert!(err.contains("account.password"));
    }

    #[test]
    fn test_copy_plan_rejects_ambiguous_target() {
        assert!(
            RENAMED
                .copy_plan(&columns(&["id", "nick", "name"]))
                .is_err()
        );
    }
}
