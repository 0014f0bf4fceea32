//! Request, environment and cookie persistence.
//!
//! The dispatch pipeline reads through the [`RequestStore`] and
//! [`CookieJarProvider`] seams; [`SqliteStore`] implements both on one
//! SQLite file.

mod cookies;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

pub use cookies::{Cookie, CookieJar};

use crate::environment::Environment;
use crate::error::{DispatchError, Result};
use crate::http::request::RequestDefinition;

const DATA_DIR: &str = ".getman";
const DATABASE_FILE: &str = "getman.db";

/// Authoritative source of requests and environments.
pub trait RequestStore: Send + Sync {
    /// The stored request and the environment to render it with, merged over
    /// the workspace base environment.
    fn fetch(
        &self,
        request_id: &str,
        environment_id: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<(RequestDefinition, Environment)>> + Send + '_>>;

    /// The merged environment alone, for rendering a request that is not
    /// re-read from storage.
    fn environment(
        &self,
        workspace_id: &str,
        environment_id: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<Environment>> + Send + '_>>;
}

/// Workspace cookie jars, created on first use.
pub trait CookieJarProvider: Send + Sync {
    fn get_or_create(
        &self,
        workspace_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<CookieJar>> + Send + '_>>;
}

pub fn data_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(DATA_DIR)
}

pub fn default_database_path() -> PathBuf {
    data_dir().join(DATABASE_FILE)
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS requests (
               id TEXT PRIMARY KEY,
               workspace_id TEXT NOT NULL,
               doc_json TEXT NOT NULL,
               updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
             );
             CREATE TABLE IF NOT EXISTS environments (
               id TEXT PRIMARY KEY,
               workspace_id TEXT NOT NULL,
               is_base INTEGER NOT NULL DEFAULT 0,
               doc_json TEXT NOT NULL,
               updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
             );
             CREATE TABLE IF NOT EXISTS cookie_jars (
               workspace_id TEXT PRIMARY KEY,
               doc_json TEXT NOT NULL,
               updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn upsert_request(&self, request: &RequestDefinition) -> Result<()> {
        let doc = serde_json::to_string(request)?;
        self.conn().execute(
            "INSERT INTO requests (id, workspace_id, doc_json, updated_at)
             VALUES (?1, ?2, ?3, strftime('%s','now'))
             ON CONFLICT(id)
             DO UPDATE SET
               workspace_id = excluded.workspace_id,
               doc_json = excluded.doc_json,
               updated_at = excluded.updated_at;",
            params![request.id, request.workspace_id, doc],
        )?;
        Ok(())
    }

    pub fn load_request(&self, request_id: &str) -> Result<Option<RequestDefinition>> {
        let doc: Option<String> = self
            .conn()
            .query_row(
                "SELECT doc_json FROM requests WHERE id = ?1 LIMIT 1;",
                params![request_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(doc.map(|doc| serde_json::from_str(&doc)).transpose()?)
    }

    /// Store `environment` as the workspace base environment (`is_base`) or a sub-environment.
    pub fn upsert_environment(&self, environment: &Environment, is_base: bool) -> Result<()> {
        let doc = serde_json::to_string(environment)?;
        let conn = self.conn();
        if is_base {
            conn.execute(
                "DELETE FROM environments WHERE workspace_id = ?1 AND is_base = 1 AND id != ?2;",
                params![environment.workspace_id, environment.id],
            )?;
        }
        conn.execute(
            "INSERT INTO environments (id, workspace_id, is_base, doc_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, strftime('%s','now'))
             ON CONFLICT(id)
             DO UPDATE SET
               workspace_id = excluded.workspace_id,
               is_base = excluded.is_base,
               doc_json = excluded.doc_json,
               updated_at = excluded.updated_at;",
            params![environment.id, environment.workspace_id, is_base, doc],
        )?;
        Ok(())
    }

    fn load_environment(&self, environment_id: &str) -> Result<Option<Environment>> {
        let doc: Option<String> = self
            .conn()
            .query_row(
                "SELECT doc_json FROM environments WHERE id = ?1 LIMIT 1;",
                params![environment_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(doc.map(|doc| serde_json::from_str(&doc)).transpose()?)
    }

    fn base_environment(&self, workspace_id: &str) -> Result<Environment> {
        let doc: Option<String> = self
            .conn()
            .query_row(
                "SELECT doc_json FROM environments WHERE workspace_id = ?1 AND is_base = 1 LIMIT 1;",
                params![workspace_id],
                |row| row.get(0),
            )
            .optional()?;
        match doc {
            Some(doc) => Ok(serde_json::from_str(&doc)?),
            None => Ok(Environment {
                id: format!("env_{workspace_id}"),
                name: "Base Environment".into(),
                workspace_id: workspace_id.to_string(),
                variables: Vec::new(),
            }),
        }
    }

    fn merged_environment(
        &self,
        workspace_id: &str,
        environment_id: Option<&str>,
    ) -> Result<Environment> {
        let base = self.base_environment(workspace_id)?;
        let active = match environment_id {
            Some(id) if id != base.id => Some(
                self.load_environment(id)?
                    .ok_or_else(|| DispatchError::EnvironmentNotFound(id.to_string()))?,
            ),
            _ => None,
        };
        Ok(Environment::merged(&base, active.as_ref()))
    }

    pub fn save_cookie_jar(&self, jar: &CookieJar) -> Result<()> {
        let doc = serde_json::to_string(jar)?;
        self.conn().execute(
            "INSERT INTO cookie_jars (workspace_id, doc_json, updated_at)
             VALUES (?1, ?2, strftime('%s','now'))
             ON CONFLICT(workspace_id)
             DO UPDATE SET
               doc_json = excluded.doc_json,
               updated_at = excluded.updated_at;",
            params![jar.workspace_id, doc],
        )?;
        Ok(())
    }

    fn cookie_jar(&self, workspace_id: &str) -> Result<CookieJar> {
        let doc: Option<String> = self
            .conn()
            .query_row(
                "SELECT doc_json FROM cookie_jars WHERE workspace_id = ?1 LIMIT 1;",
                params![workspace_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(doc) = doc {
            return Ok(serde_json::from_str(&doc)?);
        }

        let jar = CookieJar::empty(workspace_id);
        self.save_cookie_jar(&jar)?;
        Ok(jar)
    }
}

impl RequestStore for SqliteStore {
    fn fetch(
        &self,
        request_id: &str,
        environment_id: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<(RequestDefinition, Environment)>> + Send + '_>> {
        let result = self
            .load_request(request_id)
            .and_then(|request| {
                request.ok_or_else(|| DispatchError::RequestNotFound(request_id.to_string()))
            })
            .and_then(|request| {
                let environment = self.merged_environment(&request.workspace_id, environment_id)?;
                Ok((request, environment))
            });
        Box::pin(async move { result })
    }

    fn environment(
        &self,
        workspace_id: &str,
        environment_id: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<Environment>> + Send + '_>> {
        let result = self.merged_environment(workspace_id, environment_id);
        Box::pin(async move { result })
    }
}

impl CookieJarProvider for SqliteStore {
    fn get_or_create(
        &self,
        workspace_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<CookieJar>> + Send + '_>> {
        let result = self.cookie_jar(workspace_id);
        Box::pin(async move { result })
    }
}
