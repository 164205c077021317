//! Cookie Store (spec §4.A): durable keyed store of cookies scoped by
//! (session, domain, path, expiry), backed by SQLite (bundled), with domain-
//! hierarchy lookup via [`super::domain`].
//!
//! Grounded in `original_source/pycurl_session/cache.py`'s `CacheDB`
//! (sqlite3-backed `get_cookies`/`save_cookies`/`delete_cookies`/
//! `clear_cookies`/`unset_cookies`) and the teacher's
//! `features::session_store` (subdomain-fallback lookup, blocking work kept
//! off the async call site).

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use super::domain::candidate_domains;

/// One row of the `cookie(session_id, name, value, domain, path, expires)`
/// table. Uniqueness: `(session_id, name, domain, path)`. `expires == None`
/// means a session cookie; `Some(secs)` is an absolute Unix timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieRecord {
    pub session_id: String,
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires: Option<i64>,
}

/// Key identifying a cookie for `unset`/`delete`: `(name, domain, path?)`.
/// A missing path unsets the cookie at every stored path for that domain.
#[derive(Debug, Clone)]
pub struct CookieKey {
    pub name: String,
    pub domain: String,
    pub path: Option<String>,
}

/// Sentinel value that marks a cookie for deletion rather than storage,
/// matching Set-Cookie handling in spec §4.D.
pub const DELETE_SENTINEL: &str = "delete";

pub struct CookieStore {
    conn: Arc<Mutex<Connection>>,
}

impl CookieStore {
    /// Open (or create) the cookie table at `db_path`. Pass `:memory:` for
    /// an ephemeral, process-local store.
    pub async fn open(db_path: &str) -> rusqlite::Result<Self> {
        let path = db_path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(&path)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS cookie (
                    session_id TEXT NOT NULL,
                    name       TEXT NOT NULL,
                    value      TEXT NOT NULL,
                    domain     TEXT NOT NULL,
                    path       TEXT NOT NULL,
                    expires    INTEGER,
                    PRIMARY KEY (session_id, name, domain, path)
                );",
            )?;
            Ok(conn)
        })
        .await
        .expect("cookie store init task panicked")?;

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Effective cookie mapping for `url` under `session_id` (spec §4.A
    /// `get`). `seed` cookies are overlaid on top of stored rows and
    /// persisted as session cookies for the request host at path `/`.
    pub async fn get(
        &self,
        session_id: &str,
        url: &url::Url,
        seed: Option<&HashMap<String, String>>,
    ) -> rusqlite::Result<HashMap<String, String>> {
        let host = url.host_str().unwrap_or_default().to_string();
        let path = if url.path().is_empty() { "/".to_string() } else { url.path().to_string() };
        let candidates = candidate_domains(&host);
        let session_id = session_id.to_string();
        let now = now_unix();

        let conn = Arc::clone(&self.conn);
        let rows = tokio::task::spawn_blocking(move || -> rusqlite::Result<Vec<CookieRecord>> {
            let conn = conn.blocking_lock();
            let placeholders = candidates.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "SELECT session_id, name, value, domain, path, expires FROM cookie
                 WHERE session_id = ? AND domain IN ({placeholders})
                   AND (expires IS NULL OR expires > ?)
                 ORDER BY domain, path"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<&dyn rusqlite::ToSql> = vec![&session_id];
            for c in &candidates {
                params.push(c);
            }
            params.push(&now);
            let rows = stmt.query_map(params.as_slice(), |r| {
                Ok(CookieRecord {
                    session_id: r.get(0)?,
                    name: r.get(1)?,
                    value: r.get(2)?,
                    domain: r.get(3)?,
                    path: r.get(4)?,
                    expires: r.get(5)?,
                })
            })?;
            rows.collect()
        })
        .await
        .expect("cookie store get task panicked")?;

        // Keep only rows whose stored path is a prefix of the request path;
        // later (more specific, thanks to ORDER BY domain, path) rows
        // override earlier ones with the same name.
        let mut effective = HashMap::new();
        for row in rows {
            if path.starts_with(&row.path) {
                effective.insert(row.name, row.value);
            }
        }

        if let Some(seed) = seed {
            for (k, v) in seed {
                effective.insert(k.clone(), v.clone());
            }
            let seed_rows: Vec<CookieRecord> = seed
                .iter()
                .map(|(name, value)| CookieRecord {
                    session_id: session_id.clone(),
                    name: name.clone(),
                    value: value.clone(),
                    domain: host.clone(),
                    path: "/".to_string(),
                    expires: None,
                })
                .collect();
            if !seed_rows.is_empty() {
                if let Err(e) = self.save(seed_rows).await {
                    tracing::warn!("cookie store: failed to persist seed cookies: {e}");
                }
            }
        }

        Ok(effective)
    }

    /// Upsert rows. A row whose `value` equals [`DELETE_SENTINEL`] deletes
    /// that `(session_id, name, domain, path)` instead of storing the
    /// literal string, per spec §3's Cookie record lifecycle.
    pub async fn save(&self, rows: Vec<CookieRecord>) -> rusqlite::Result<()> {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || -> rusqlite::Result<()> {
            let conn = conn.blocking_lock();
            for row in rows {
                if row.value == DELETE_SENTINEL {
                    conn.execute(
                        "DELETE FROM cookie WHERE session_id = ?1 AND name = ?2 AND domain = ?3 AND path = ?4",
                        rusqlite::params![row.session_id, row.name, row.domain, row.path],
                    )?;
                } else {
                    conn.execute(
                        "INSERT INTO cookie (session_id, name, value, domain, path, expires)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT(session_id, name, domain, path)
                         DO UPDATE SET value = excluded.value, expires = excluded.expires",
                        rusqlite::params![row.session_id, row.name, row.value, row.domain, row.path, row.expires],
                    )?;
                }
            }
            Ok(())
        })
        .await
        .expect("cookie store save task panicked");

        if let Err(e) = &result {
            tracing::warn!("cookie store: save failed, swallowing: {e}");
            return Ok(());
        }
        result
    }

    pub async fn delete(&self, session_id: &str, keys: Vec<CookieKey>) -> rusqlite::Result<()> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_string();
        let result = tokio::task::spawn_blocking(move || -> rusqlite::Result<()> {
            let conn = conn.blocking_lock();
            for key in keys {
                match &key.path {
                    Some(path) => conn.execute(
                        "DELETE FROM cookie WHERE session_id = ?1 AND name = ?2 AND domain = ?3 AND path = ?4",
                        rusqlite::params![session_id, key.name, key.domain, path],
                    )?,
                    None => conn.execute(
                        "DELETE FROM cookie WHERE session_id = ?1 AND name = ?2 AND domain = ?3",
                        rusqlite::params![session_id, key.name, key.domain],
                    )?,
                };
            }
            Ok(())
        })
        .await
        .expect("cookie store delete task panicked");

        if let Err(e) = &result {
            tracing::warn!("cookie store: delete failed, swallowing: {e}");
            return Ok(());
        }
        result
    }

    pub async fn clear(&self, session_id: &str) -> rusqlite::Result<()> {
        let conn = Arc::clone(&self.conn);
        let session_id = session_id.to_string();
        let result = tokio::task::spawn_blocking(move || -> rusqlite::Result<()> {
            conn.blocking_lock()
                .execute("DELETE FROM cookie WHERE session_id = ?1", [session_id])?;
            Ok(())
        })
        .await
        .expect("cookie store clear task panicked");

        if let Err(e) = &result {
            tracing::warn!("cookie store: clear failed, swallowing: {e}");
            return Ok(());
        }
        result
    }

    /// Same as `delete` but matches spec's `unset(session_id, [(name, domain, path?)...])` naming.
    pub async fn unset(&self, session_id: &str, keys: Vec<CookieKey>) -> rusqlite::Result<()> {
        self.delete(session_id, keys).await
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> CookieStore {
        CookieStore::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = memory_store().await;
        store
            .save(vec![CookieRecord {
                session_id: "s1".into(),
                name: "sid".into(),
                value: "1".into(),
                domain: ".example.test".into(),
                path: "/".into(),
                expires: None,
            }])
            .await
            .unwrap();

        let url = url::Url::parse("https://b.example.test/path").unwrap();
        let cookies = store.get("s1", &url, None).await.unwrap();
        assert_eq!(cookies.get("sid"), Some(&"1".to_string()));

        let other = url::Url::parse("https://other.test/path").unwrap();
        let cookies = store.get("s1", &other, None).await.unwrap();
        assert!(cookies.get("sid").is_none());
    }

    #[tokio::test]
    async fn delete_sentinel_removes_row() {
        let store = memory_store().await;
        let row = CookieRecord {
            session_id: "s1".into(),
            name: "sid".into(),
            value: "1".into(),
            domain: "a.test".into(),
            path: "/".into(),
            expires: None,
        };
        store.save(vec![row.clone()]).await.unwrap();
        let mut deleted = row;
        deleted.value = DELETE_SENTINEL.to_string();
        store.save(vec![deleted]).await.unwrap();

        let url = url::Url::parse("https://a.test/").unwrap();
        let cookies = store.get("s1", &url, None).await.unwrap();
        assert!(cookies.is_empty());
    }

    #[tokio::test]
    async fn path_prefix_must_match() {
        let store = memory_store().await;
        store
            .save(vec![CookieRecord {
                session_id: "s1".into(),
                name: "admin".into(),
                value: "1".into(),
                domain: "a.test".into(),
                path: "/admin".into(),
                expires: None,
            }])
            .await
            .unwrap();

        let url = url::Url::parse("https://a.test/public").unwrap();
        let cookies = store.get("s1", &url, None).await.unwrap();
        assert!(cookies.is_empty());

        let admin_url = url::Url::parse("https://a.test/admin/panel").unwrap();
        let cookies = store.get("s1", &admin_url, None).await.unwrap();
        assert_eq!(cookies.get("admin"), Some(&"1".to_string()));
    }

    #[tokio::test]
    async fn expired_cookie_not_returned() {
        let store = memory_store().await;
        store
            .save(vec![CookieRecord {
                session_id: "s1".into(),
                name: "old".into(),
                value: "1".into(),
                domain: "a.test".into(),
                path: "/".into(),
                expires: Some(1), // far in the past
            }])
            .await
            .unwrap();

        let url = url::Url::parse("https://a.test/").unwrap();
        let cookies = store.get("s1", &url, None).await.unwrap();
        assert!(cookies.is_empty());
    }

    #[tokio::test]
    async fn clear_removes_all_session_rows() {
        let store = memory_store().await;
        store
            .save(vec![CookieRecord {
                session_id: "s1".into(),
                name: "sid".into(),
                value: "1".into(),
                domain: "a.test".into(),
                path: "/".into(),
                expires: None,
            }])
            .await
            .unwrap();
        store.clear("s1").await.unwrap();
        let url = url::Url::parse("https://a.test/").unwrap();
        let cookies = store.get("s1", &url, None).await.unwrap();
        assert!(cookies.is_empty());
    }
}
