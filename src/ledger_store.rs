use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::model::{MoneyPool, PoolTransaction};

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_init.sql",
        include_str!("../db/migrations/0001_init.sql"),
    ),
    (
        "0002_processed_messages.sql",
        include_str!("../db/migrations/0002_processed_messages.sql"),
    ),
];

/// "List all known pool names", with no filtering.
pub trait PoolListing {
    fn list_pool_names(&self) -> Result<Vec<String>, String>;
}

/// Where a resolved payment ends up.
pub trait TransactionStore {
    fn append_transaction_id(&self, pool_name: &str, transaction_id: &str) -> Result<(), String>;

    fn create_transaction(&self, txn: &PoolTransaction) -> Result<(), String>;

    fn is_processed(&self, _fingerprint: &str) -> Result<bool, String> {
        Ok(false)
    }

    /// Appends the id to the pool, then writes the transaction row.
    fn record_transaction(
        &self,
        pool_name: &str,
        txn: &PoolTransaction,
        _receipt: &MessageReceipt,
    ) -> Result<(), String> {
        self.append_transaction_id(pool_name, &txn.id)?;
        self.create_transaction(txn)
    }
}

/// Identifies the delivery a transaction came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReceipt {
    pub message_id: String,
    pub fingerprint: String,
}

#[derive(Debug, Serialize)]
pub struct LedgerStatus {
    pub db_path: String,
    pub migration_files: Vec<String>,
    pub applied_versions: Vec<String>,
    pub pending_versions: Vec<String>,
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct LedgerMigrateResult {
    pub db_path: String,
    pub created: bool,
    pub applied_now: Vec<String>,
    pub skipped: Vec<String>,
    pub applied_total: usize,
    pub pending_total: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct PoolImportSummary {
    pub rows_count: usize,
    pub imported_count: usize,
    pub skipped_count: usize,
}

/// SQLite-backed pools and transactions.
pub struct LedgerStore {
    conn: Connection,
    db_path: PathBuf,
}

impl LedgerStore {
    /// Opens (creating if needed) the ledger and applies pending migrations.
    pub fn open(db_path: &Path) -> Result<(Self, LedgerMigrateResult), String> {
        let created = !db_path.exists();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("create ledger db directory failed: {e}"))?;
        }
        let mut conn =
            Connection::open(db_path).map_err(|e| format!("open ledger db failed: {e}"))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| format!("enable foreign_keys failed: {e}"))?;
        let migrate_result = apply_embedded_migrations(&mut conn, db_path, created)?;
        Ok((
            Self {
                conn,
                db_path: db_path.to_path_buf(),
            },
            migrate_result,
        ))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn status(&self) -> Result<LedgerStatus, String> {
        let applied = load_applied_versions(&self.conn)
            .map_err(|e| format!("read schema_migrations failed: {e}"))?;
        let applied_set = applied.iter().cloned().collect::<HashSet<_>>();
        let pending = MIGRATIONS
            .iter()
            .map(|(version, _)| (*version).to_string())
            .filter(|v| !applied_set.contains(v))
            .collect::<Vec<_>>();
        Ok(LedgerStatus {
            db_path: self.db_path.to_string_lossy().to_string(),
            migration_files: MIGRATIONS.iter().map(|(v, _)| (*v).to_string()).collect(),
            ready: pending.is_empty(),
            applied_versions: applied,
            pending_versions: pending,
        })
    }

    pub fn upsert_pool(&self, name: &str, title: &str, open: bool) -> Result<(), String> {
        let name = name.trim();
        if name.is_empty() {
            return Err("pool name must not be empty".to_string());
        }
        self.conn
            .execute(
                r#"
                INSERT INTO money_pools(name, title, open)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(name) DO UPDATE SET
                    title=excluded.title,
                    open=excluded.open,
                    updated_at=datetime('now')
                "#,
                params![name, title.trim(), open],
            )
            .map_err(|e| format!("write money pool {name} failed: {e}"))?;
        Ok(())
    }

    /// Loads pools from a CSV with `name`, `title` and `open` columns; rows without a name are skipped.
    pub fn import_pools_csv(&self, path: &Path) -> Result<PoolImportSummary, String> {
        let mut rdr = csv::Reader::from_path(path)
            .map_err(|e| format!("open pool csv {} failed: {e}", path.to_string_lossy()))?;
        let mut summary = PoolImportSummary::default();
        for row in rdr.deserialize::<HashMap<String, String>>() {
            summary.rows_count += 1;
            let Ok(row) = row else {
                summary.skipped_count += 1;
                continue;
            };
            let name = row
                .get("name")
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            if name.is_empty() {
                summary.skipped_count += 1;
                continue;
            }
            let title = row
                .get("title")
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            let open = row
                .get("open")
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(parse_open_flag)
                .unwrap_or(true);
            self.upsert_pool(&name, &title, open)?;
            summary.imported_count += 1;
        }
        Ok(summary)
    }

    /// A pool by exact name with its transactions in the order they were appended.
    pub fn get_money_pool(&self, name: &str) -> Result<Option<MoneyPool>, String> {
        let pool = self
            .conn
            .query_row(
                "SELECT name, title, open FROM money_pools WHERE name = ?1",
                [name],
                |row| {
                    Ok(MoneyPool {
                        name: row.get(0)?,
                        title: row.get(1)?,
                        open: row.get(2)?,
                        transactions: Vec::new(),
                    })
                },
            )
            .optional()
            .map_err(|e| format!("read money pool {name} failed: {e}"))?;
        let Some(mut pool) = pool else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT t.id, t.name, t.base, t.fraction, t.date
                FROM pool_transactions pt
                JOIN transactions t ON t.id = pt.transaction_id
                WHERE pt.pool_name = ?1
                ORDER BY pt.position ASC
                "#,
            )
            .map_err(|e| format!("prepare pool transactions query failed: {e}"))?;
        let rows = stmt
            .query_map([name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| format!("query pool transactions failed: {e}"))?;
        for row in rows {
            let (id, payer, base, fraction, date) =
                row.map_err(|e| format!("read pool transaction failed: {e}"))?;
            pool.transactions.push(PoolTransaction {
                id,
                name: payer,
                base: u64::try_from(base).map_err(|_| format!("negative base in {name}"))?,
                fraction: u8::try_from(fraction)
                    .map_err(|_| format!("fraction out of range in {name}"))?,
                date,
            });
        }
        Ok(Some(pool))
    }

    fn insert_transaction_id(
        conn: &Connection,
        pool_name: &str,
        transaction_id: &str,
    ) -> Result<(), String> {
        let exists = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM money_pools WHERE name = ?1)",
                [pool_name],
                |row| row.get::<_, i64>(0),
            )
            .map(|v| v != 0)
            .map_err(|e| format!("check money pool {pool_name} failed: {e}"))?;
        if !exists {
            return Err(format!("money pool not found: {pool_name}"));
        }
        conn.execute(
            r#"
            INSERT INTO pool_transactions(pool_name, position, transaction_id)
            SELECT ?1, COALESCE(MAX(position), -1) + 1, ?2
            FROM pool_transactions
            WHERE pool_name = ?1
            "#,
            params![pool_name, transaction_id],
        )
        .map_err(|e| format!("error updating money pool item: {e}"))?;
        Ok(())
    }

    fn insert_transaction(conn: &Connection, txn: &PoolTransaction) -> Result<(), String> {
        let base = i64::try_from(txn.base).map_err(|_| "transaction base out of range".to_string())?;
        conn.execute(
            r#"
            INSERT INTO transactions(id, name, base, fraction, date)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![txn.id, txn.name, base, txn.fraction, txn.date],
        )
        .map_err(|e| format!("error putting transaction item: {e}"))?;
        Ok(())
    }
}

impl PoolListing for LedgerStore {
    fn list_pool_names(&self) -> Result<Vec<String>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM money_pools ORDER BY name ASC")
            .map_err(|e| format!("could not get all money pools: {e}"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| format!("could not get all money pools: {e}"))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row.map_err(|e| format!("read money pool name failed: {e}"))?);
        }
        Ok(names)
    }
}

impl TransactionStore for LedgerStore {
    fn append_transaction_id(&self, pool_name: &str, transaction_id: &str) -> Result<(), String> {
        Self::insert_transaction_id(&self.conn, pool_name, transaction_id)
    }

    fn create_transaction(&self, txn: &PoolTransaction) -> Result<(), String> {
        Self::insert_transaction(&self.conn, txn)
    }

    fn is_processed(&self, fingerprint: &str) -> Result<bool, String> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM processed_messages WHERE fingerprint = ?1)",
                [fingerprint],
                |row| row.get::<_, i64>(0),
            )
            .map(|v| v != 0)
            .map_err(|e| format!("check processed message failed: {e}"))
    }

    /// Pool append, transaction row and delivery receipt commit together or not at all.
    fn record_transaction(
        &self,
        pool_name: &str,
        txn: &PoolTransaction,
        receipt: &MessageReceipt,
    ) -> Result<(), String> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| format!("begin ledger transaction failed: {e}"))?;
        Self::insert_transaction_id(&tx, pool_name, &txn.id)?;
        Self::insert_transaction(&tx, txn)?;
        tx.execute(
            r#"
            INSERT INTO processed_messages(fingerprint, message_id, pool_name, transaction_id)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![receipt.fingerprint, receipt.message_id, pool_name, txn.id],
        )
        .map_err(|e| format!("write processed message failed: {e}"))?;
        tx.commit()
            .map_err(|e| format!("commit ledger transaction failed: {e}"))?;
        info!(pool = pool_name, transaction_id = %txn.id, "transaction recorded");
        Ok(())
    }
}

impl<T: PoolListing + ?Sized> PoolListing for &T {
    fn list_pool_names(&self) -> Result<Vec<String>, String> {
        (**self).list_pool_names()
    }
}

impl<T: TransactionStore + ?Sized> TransactionStore for &T {
    fn append_transaction_id(&self, pool_name: &str, transaction_id: &str) -> Result<(), String> {
        (**self).append_transaction_id(pool_name, transaction_id)
    }

    fn create_transaction(&self, txn: &PoolTransaction) -> Result<(), String> {
        (**self).create_transaction(txn)
    }

    fn is_processed(&self, fingerprint: &str) -> Result<bool, String> {
        (**self).is_processed(fingerprint)
    }

    fn record_transaction(
        &self,
        pool_name: &str,
        txn: &PoolTransaction,
        receipt: &MessageReceipt,
    ) -> Result<(), String> {
        (**self).record_transaction(pool_name, txn, receipt)
    }
}

fn parse_open_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on" | "open"
    )
}

fn ensure_schema_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
}

fn load_applied_versions(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

fn apply_embedded_migrations(
    conn: &mut Connection,
    db_path: &Path,
    created: bool,
) -> Result<LedgerMigrateResult, String> {
    ensure_schema_migrations_table(conn)
        .map_err(|e| format!("init schema_migrations failed: {e}"))?;

    let already = load_applied_versions(conn)
        .map_err(|e| format!("read applied migrations failed: {e}"))?
        .into_iter()
        .collect::<HashSet<_>>();

    let mut applied_now = Vec::new();
    let mut skipped = Vec::new();

    for (version, sql) in MIGRATIONS {
        if already.contains(*version) {
            skipped.push((*version).to_string());
            continue;
        }
        let tx = conn
            .transaction()
            .map_err(|e| format!("begin migration failed ({version}): {e}"))?;
        tx.execute_batch(sql)
            .map_err(|e| format!("apply migration failed ({version}): {e}"))?;
        tx.execute(
            "INSERT INTO schema_migrations(version) VALUES (?1)",
            [*version],
        )
        .map_err(|e| format!("write schema_migrations failed ({version}): {e}"))?;
        tx.commit()
            .map_err(|e| format!("commit migration failed ({version}): {e}"))?;
        info!(version, "applied ledger migration");
        applied_now.push((*version).to_string());
    }

    let applied_total = load_applied_versions(conn)
        .map_err(|e| format!("read migration result failed: {e}"))?
        .len();

    Ok(LedgerMigrateResult {
        db_path: db_path.to_string_lossy().to_string(),
        created,
        applied_now,
        skipped,
        applied_total,
        pending_total: MIGRATIONS.len().saturating_sub(applied_total),
    })
}
