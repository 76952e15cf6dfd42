//! The factor store: CRUD over factor rows plus the durable flag table.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::factor::Factor;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS factors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    credential_id TEXT,
    subdomain TEXT,
    shard TEXT,
    username TEXT,
    seed TEXT NOT NULL,
    issuer TEXT,
    creation_date INTEGER NOT NULL,
    allow_root INTEGER NOT NULL DEFAULT 1,
    force_lock INTEGER NOT NULL DEFAULT 0,
    require_biometrics INTEGER NOT NULL DEFAULT 0,
    allow_backup INTEGER NOT NULL DEFAULT 1,
    paired INTEGER NOT NULL DEFAULT 1,
    display_name TEXT,
    order_preference INTEGER NOT NULL DEFAULT 0,
    crypto TEXT NOT NULL DEFAULT 'HmacSHA1',
    period INTEGER NOT NULL DEFAULT 30,
    digits INTEGER NOT NULL DEFAULT 6
);
CREATE TABLE IF NOT EXISTS flags (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

const FACTOR_COLUMNS: &str = "id, credential_id, subdomain, shard, username, seed, issuer, \
     creation_date, allow_root, force_lock, require_biometrics, allow_backup, paired, \
     display_name, order_preference, crypto, period, digits";

/// SQLite-backed factor storage.
///
/// All access goes through a single connection behind a mutex; SQLite's own
/// transaction guarantees serialize writes.
pub struct FactorStore {
    conn: Mutex<Connection>,
}

impl FactorStore {
    /// Opens (or creates) a store at `path` and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store. Intended for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a factor and returns the store-assigned id.
    ///
    /// The record's own `id` is ignored; SQLite assigns the row id. A zero
    /// `creation_date` is stamped with the current time so display ordering
    /// follows registration order.
    pub fn add_factor(&self, factor: &Factor) -> StoreResult<i64> {
        let creation_date = if factor.creation_date == 0 {
            now_millis()
        } else {
            factor.creation_date
        };
        let conn = self.lock();
        conn.execute(
            "INSERT INTO factors (credential_id, subdomain, shard, username, seed, issuer, \
             creation_date, allow_root, force_lock, require_biometrics, allow_backup, paired, \
             display_name, order_preference, crypto, period, digits) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                factor.credential_id,
                factor.subdomain,
                factor.shard,
                factor.username,
                factor.seed,
                factor.issuer,
                creation_date,
                factor.allow_root,
                factor.force_lock,
                factor.require_biometrics,
                factor.allow_backup,
                factor.paired,
                factor.display_name,
                factor.order_preference,
                factor.crypto,
                factor.period,
                factor.digits,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, "factor inserted");
        Ok(id)
    }

    /// Fetches a factor by store id.
    pub fn get_factor_by_id(&self, id: i64) -> StoreResult<Option<Factor>> {
        self.query_optional(
            &format!("SELECT {FACTOR_COLUMNS} FROM factors WHERE id = ?1 LIMIT 1"),
            params![id],
        )
    }

    /// Fetches a factor by remote credential id.
    pub fn get_factor_by_credential_id(
        &self,
        credential_id: &str,
    ) -> StoreResult<Option<Factor>> {
        self.query_optional(
            &format!(
                "SELECT {FACTOR_COLUMNS} FROM factors WHERE credential_id = ?1 LIMIT 1"
            ),
            params![credential_id],
        )
    }

    /// Fetches all factors for an issuer, case-insensitively.
    pub fn get_factors_by_issuer(&self, issuer: &str) -> StoreResult<Vec<Factor>> {
        self.query_all(
            &format!(
                "SELECT {FACTOR_COLUMNS} FROM factors WHERE UPPER(issuer) = UPPER(?1)"
            ),
            params![issuer],
        )
    }

    /// Fetches every factor, ordered by display preference then creation time.
    pub fn get_all_factors(&self) -> StoreResult<Vec<Factor>> {
        self.query_all(
            &format!(
                "SELECT {FACTOR_COLUMNS} FROM factors \
                 ORDER BY order_preference ASC, creation_date ASC"
            ),
            params![],
        )
    }

    /// Overwrites the row matching the factor's id. Returns rows affected.
    pub fn update_factor(&self, factor: &Factor) -> StoreResult<usize> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE factors SET credential_id = ?1, subdomain = ?2, shard = ?3, \
             username = ?4, seed = ?5, issuer = ?6, creation_date = ?7, allow_root = ?8, \
             force_lock = ?9, require_biometrics = ?10, allow_backup = ?11, paired = ?12, \
             display_name = ?13, order_preference = ?14, crypto = ?15, period = ?16, \
             digits = ?17 WHERE id = ?18",
            params![
                factor.credential_id,
                factor.subdomain,
                factor.shard,
                factor.username,
                factor.seed,
                factor.issuer,
                factor.creation_date,
                factor.allow_root,
                factor.force_lock,
                factor.require_biometrics,
                factor.allow_backup,
                factor.paired,
                factor.display_name,
                factor.order_preference,
                factor.crypto,
                factor.period,
                factor.digits,
                factor.id,
            ],
        )?;
        Ok(changed)
    }

    /// Deletes the row matching the factor's id. Returns rows affected.
    pub fn delete_factor(&self, factor: &Factor) -> StoreResult<usize> {
        self.delete_factor_by_id(factor.id)
    }

    /// Deletes every factor. Returns rows affected.
    pub fn delete_all_factors(&self) -> StoreResult<usize> {
        Ok(self.lock().execute("DELETE FROM factors", params![])?)
    }

    /// Deletes a factor by store id. Returns rows affected.
    pub fn delete_factor_by_id(&self, id: i64) -> StoreResult<usize> {
        Ok(self
            .lock()
            .execute("DELETE FROM factors WHERE id = ?1", params![id])?)
    }

    /// Deletes factors by remote credential id. Returns rows affected.
    pub fn delete_factor_by_credential_id(&self, credential_id: &str) -> StoreResult<usize> {
        Ok(self.lock().execute(
            "DELETE FROM factors WHERE credential_id = ?1",
            params![credential_id],
        )?)
    }

    /// Reads a durable boolean flag. `None` when the flag was never set.
    pub fn flag_get(&self, name: &str) -> StoreResult<Option<bool>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT value FROM flags WHERE name = ?1")?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get::<_, i64>(0)? != 0)),
            None => Ok(None),
        }
    }

    /// Persists a durable boolean flag, replacing any previous value.
    pub fn flag_set(&self, name: &str, value: bool) -> StoreResult<()> {
        self.lock().execute(
            "INSERT INTO flags (name, value) VALUES (?1, ?2) \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, i64::from(value)],
        )?;
        Ok(())
    }

    /// Removes a durable flag.
    pub fn flag_clear(&self, name: &str) -> StoreResult<()> {
        self.lock()
            .execute("DELETE FROM flags WHERE name = ?1", params![name])?;
        Ok(())
    }

    fn query_optional(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Option<Factor>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        match rows.next()? {
            Some(row) => Ok(Some(map_factor(row)?)),
            None => Ok(None),
        }
    }

    fn query_all(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Vec<Factor>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut factors = Vec::new();
        while let Some(row) = rows.next()? {
            factors.push(map_factor(row)?);
        }
        Ok(factors)
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

fn map_factor(row: &Row<'_>) -> StoreResult<Factor> {
    let period: i64 = row.get(16)?;
    let digits: i64 = row.get(17)?;
    Ok(Factor {
        id: row.get(0)?,
        credential_id: row.get(1)?,
        subdomain: row.get(2)?,
        shard: row.get(3)?,
        username: row.get(4)?,
        seed: row.get(5)?,
        issuer: row.get(6)?,
        creation_date: row.get(7)?,
        allow_root: row.get(8)?,
        force_lock: row.get(9)?,
        require_biometrics: row.get(10)?,
        allow_backup: row.get(11)?,
        paired: row.get(12)?,
        display_name: row.get(13)?,
        order_preference: row.get(14)?,
        crypto: row.get(15)?,
        period: u32::try_from(period)
            .map_err(|_| StoreError::InvalidRow(format!("bad period {period}")))?,
        digits: u32::try_from(digits)
            .map_err(|_| StoreError::InvalidRow(format!("bad digits {digits}")))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seed: &str) -> Factor {
        Factor {
            seed: seed.to_string(),
            issuer: Some("OneLogin".to_string()),
            credential_id: Some(format!("cred-{seed}")),
            ..Factor::default()
        }
    }

    #[test]
    fn insert_assigns_ids_and_roundtrips() {
        let store = FactorStore::open_in_memory().unwrap();
        let id = store.add_factor(&sample("seed-a")).unwrap();
        assert_eq!(id, 1);

        let fetched = store.get_factor_by_id(id).unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.seed, "seed-a");
        assert_eq!(fetched.crypto, "HmacSHA1");
        assert_eq!(fetched.period, 30);
        assert!(fetched.allow_root);
        assert!(fetched.paired);
    }

    #[test]
    fn get_all_orders_by_preference_then_creation() {
        let store = FactorStore::open_in_memory().unwrap();
        let mut a = sample("a");
        a.order_preference = 2;
        a.creation_date = 10;
        let mut b = sample("b");
        b.order_preference = 1;
        b.creation_date = 30;
        let mut c = sample("c");
        c.order_preference = 1;
        c.creation_date = 20;
        for f in [&a, &b, &c] {
            store.add_factor(f).unwrap();
        }

        let all = store.get_all_factors().unwrap();
        let seeds: Vec<_> = all.iter().map(|f| f.seed.as_str()).collect();
        assert_eq!(seeds, vec!["c", "b", "a"]);
    }

    #[test]
    fn issuer_lookup_is_case_insensitive() {
        let store = FactorStore::open_in_memory().unwrap();
        store.add_factor(&sample("x")).unwrap();
        let mut other = sample("y");
        other.issuer = Some("Corp".to_string());
        store.add_factor(&other).unwrap();

        let hits = store.get_factors_by_issuer("onelogin").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].seed, "x");
    }

    #[test]
    fn update_overwrites_matching_row() {
        let store = FactorStore::open_in_memory().unwrap();
        let id = store.add_factor(&sample("s")).unwrap();
        let mut factor = store.get_factor_by_id(id).unwrap().unwrap();
        factor.force_lock = true;
        factor.allow_root = false;
        assert_eq!(store.update_factor(&factor).unwrap(), 1);

        let fetched = store.get_factor_by_id(id).unwrap().unwrap();
        assert!(fetched.force_lock);
        assert!(!fetched.allow_root);

        let mut missing = factor.clone();
        missing.id = 999;
        assert_eq!(store.update_factor(&missing).unwrap(), 0);
    }

    #[test]
    fn delete_variants_report_affected_rows() {
        let store = FactorStore::open_in_memory().unwrap();
        let id = store.add_factor(&sample("one")).unwrap();
        store.add_factor(&sample("two")).unwrap();
        store.add_factor(&sample("three")).unwrap();

        assert_eq!(store.delete_factor_by_id(id).unwrap(), 1);
        assert_eq!(store.delete_factor_by_id(id).unwrap(), 0);
        assert_eq!(
            store.delete_factor_by_credential_id("cred-two").unwrap(),
            1
        );
        assert_eq!(store.delete_all_factors().unwrap(), 1);
        assert!(store.get_all_factors().unwrap().is_empty());
    }

    #[test]
    fn flags_persist_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factors.sqlite");
        {
            let store = FactorStore::open(&path).unwrap();
            assert_eq!(store.flag_get("vault_supported").unwrap(), None);
            store.flag_set("vault_supported", true).unwrap();
        }
        // Flags survive reopen.
        let store = FactorStore::open(&path).unwrap();
        assert_eq!(store.flag_get("vault_supported").unwrap(), Some(true));
        store.flag_set("vault_supported", false).unwrap();
        assert_eq!(store.flag_get("vault_supported").unwrap(), Some(false));
        store.flag_clear("vault_supported").unwrap();
        assert_eq!(store.flag_get("vault_supported").unwrap(), None);
    }
}
