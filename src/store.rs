//! Local Record Store
//!
//! SQLite persistence for user and server records. The panel owns the actual
//! game servers; these tables are the service's own system-of-record for who
//! owns what.
//!
//! Uniqueness (username, email, per-owner server name) is declared at the
//! schema level, so a constraint violation on insert is the authoritative
//! duplicate signal even when two requests race past the handler-side
//! pre-checks.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A schema-level uniqueness constraint rejected the write
    #[error("record violates a uniqueness constraint")]
    Duplicate,

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Local user record
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_admin: bool,
    /// Panel-side user id, set once at registration and never changed
    pub remote_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Local server record
#[derive(Debug, Clone, Serialize)]
pub struct Server {
    pub id: String,
    pub user_id: String,
    /// Panel-side server id, set once at creation and never changed
    pub remote_id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Set at creation time; not refreshed from the panel afterwards
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields for a new user row
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub remote_id: Option<i64>,
}

/// Fields for a new server row
pub struct NewServer {
    pub user_id: String,
    pub remote_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
}

/// SQLite-backed record store
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        info!("Record store opened: {}", path.display());
        Ok(store)
    }

    /// Open an in-memory database (tests)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_admin INTEGER NOT NULL DEFAULT 0,
                remote_id INTEGER,
                created_at INTEGER NOT NULL DEFAULT (unixepoch()),
                updated_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

            CREATE TABLE IF NOT EXISTS servers (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                remote_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'installing',
                created_at INTEGER NOT NULL DEFAULT (unixepoch()),
                updated_at INTEGER,
                UNIQUE(user_id, name)
            );

            CREATE INDEX IF NOT EXISTS idx_servers_owner ON servers(user_id);
            "#,
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn insert_user(&self, new: NewUser) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            is_active: true,
            is_admin: false,
            remote_id: new.remote_id,
            created_at: Utc::now(),
            updated_at: None,
        };

        self.conn
            .lock()
            .execute(
                r#"
                INSERT INTO users (id, username, email, password_hash, is_active, is_admin, remote_id, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    user.id,
                    user.username,
                    user.email,
                    user.password_hash,
                    user.is_active,
                    user.is_admin,
                    user.remote_id,
                    user.created_at.timestamp(),
                ],
            )
            .map_err(map_constraint)?;

        Ok(user)
    }

    pub fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("{} WHERE id = ?1", USER_SELECT),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("{} WHERE username = ?1", USER_SELECT),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Lookup used by the registration pre-check
    pub fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("{} WHERE username = ?1 OR email = ?2", USER_SELECT),
                params![username, email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// True when another user (different id) already holds `username`
    pub fn username_taken_by_other(&self, username: &str, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 AND id != ?2",
            params![username, id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// True when another user (different id) already holds `email`
    pub fn email_taken_by_other(&self, email: &str, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1 AND id != ?2",
            params![email, id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Persist mutable user fields and stamp `updated_at`. The remote id is
    /// immutable and never rewritten here.
    pub fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let now = Utc::now();
        self.conn
            .lock()
            .execute(
                r#"
                UPDATE users
                SET username = ?1, email = ?2, password_hash = ?3, is_active = ?4, is_admin = ?5, updated_at = ?6
                WHERE id = ?7
                "#,
                params![
                    user.username,
                    user.email,
                    user.password_hash,
                    user.is_active,
                    user.is_admin,
                    now.timestamp(),
                    user.id,
                ],
            )
            .map_err(map_constraint)?;

        let mut updated = user.clone();
        updated.updated_at = Some(now);
        Ok(updated)
    }

    pub fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{} ORDER BY created_at", USER_SELECT))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Delete a user and every server they own. Returns false when the user
    /// does not exist. Neither deletion touches the panel.
    pub fn delete_user_cascading(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM servers WHERE user_id = ?1", params![id])?;
        let rows = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    // ------------------------------------------------------------------
    // Servers
    // ------------------------------------------------------------------

    pub fn insert_server(&self, new: NewServer) -> Result<Server, StoreError> {
        let server = Server {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            remote_id: new.remote_id,
            name: new.name,
            description: new.description,
            status: new.status,
            created_at: Utc::now(),
            updated_at: None,
        };

        self.conn
            .lock()
            .execute(
                r#"
                INSERT INTO servers (id, user_id, remote_id, name, description, status, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    server.id,
                    server.user_id,
                    server.remote_id,
                    server.name,
                    server.description,
                    server.status,
                    server.created_at.timestamp(),
                ],
            )
            .map_err(map_constraint)?;

        Ok(server)
    }

    pub fn count_servers_for_user(&self, user_id: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM servers WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn find_server_by_owner_and_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<Server>, StoreError> {
        let conn = self.conn.lock();
        let server = conn
            .query_row(
                &format!("{} WHERE user_id = ?1 AND name = ?2", SERVER_SELECT),
                params![user_id, name],
                server_from_row,
            )
            .optional()?;
        Ok(server)
    }

    /// Ownership-scoped lookup: absent and not-owned are indistinguishable.
    pub fn find_server_by_id_and_owner(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Server>, StoreError> {
        let conn = self.conn.lock();
        let server = conn
            .query_row(
                &format!("{} WHERE id = ?1 AND user_id = ?2", SERVER_SELECT),
                params![id, user_id],
                server_from_row,
            )
            .optional()?;
        Ok(server)
    }

    pub fn list_servers_for_owner(&self, user_id: &str) -> Result<Vec<Server>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE user_id = ?1 ORDER BY created_at",
            SERVER_SELECT
        ))?;
        let servers = stmt
            .query_map(params![user_id], server_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(servers)
    }

    pub fn delete_server(&self, id: &str) -> Result<bool, StoreError> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM servers WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

const USER_SELECT: &str = "SELECT id, username, email, password_hash, is_active, is_admin, remote_id, created_at, updated_at FROM users";

const SERVER_SELECT: &str = "SELECT id, user_id, remote_id, name, description, status, created_at, updated_at FROM servers";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        is_active: row.get(4)?,
        is_admin: row.get(5)?,
        remote_id: row.get(6)?,
        created_at: ts_to_datetime(row.get(7)?),
        updated_at: row.get::<_, Option<i64>>(8)?.map(ts_to_datetime),
    })
}

fn server_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Server> {
    Ok(Server {
        id: row.get(0)?,
        user_id: row.get(1)?,
        remote_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        created_at: ts_to_datetime(row.get(6)?),
        updated_at: row.get::<_, Option<i64>>(7)?.map(ts_to_datetime),
    })
}

fn ts_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn map_constraint(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Duplicate
        }
        _ => StoreError::Db(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn insert_test_user(store: &Store, username: &str, email: &str) -> User {
        store
            .insert_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash: "hash".to_string(),
                remote_id: Some(42),
            })
            .unwrap()
    }

    #[test]
    fn test_open_reports_uncreatable_parent() {
        // parent chain runs through a regular file, so the directory cannot
        // be created and open must say why
        let file = tempfile::NamedTempFile::new().unwrap();
        let db_path = file.path().join("sub").join("records.db");

        let result = Store::open(&db_path);
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn test_insert_and_find_user() {
        let store = test_store();
        let user = insert_test_user(&store, "alice", "a@x.com");

        let found = store.find_user_by_username("alice").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.remote_id, Some(42));
        assert!(found.is_active);
        assert!(!found.is_admin);
        assert!(found.updated_at.is_none());
    }

    #[test]
    fn test_username_unique_constraint() {
        let store = test_store();
        insert_test_user(&store, "alice", "a@x.com");

        let result = store.insert_user(NewUser {
            username: "alice".to_string(),
            email: "other@x.com".to_string(),
            password_hash: "hash".to_string(),
            remote_id: None,
        });
        assert!(matches!(result, Err(StoreError::Duplicate)));
    }

    #[test]
    fn test_email_unique_constraint() {
        let store = test_store();
        insert_test_user(&store, "alice", "a@x.com");

        let result = store.insert_user(NewUser {
            username: "bob".to_string(),
            email: "a@x.com".to_string(),
            password_hash: "hash".to_string(),
            remote_id: None,
        });
        assert!(matches!(result, Err(StoreError::Duplicate)));
    }

    #[test]
    fn test_find_by_username_or_email() {
        let store = test_store();
        insert_test_user(&store, "alice", "a@x.com");

        assert!(store
            .find_user_by_username_or_email("alice", "nope@x.com")
            .unwrap()
            .is_some());
        assert!(store
            .find_user_by_username_or_email("nobody", "a@x.com")
            .unwrap()
            .is_some());
        assert!(store
            .find_user_by_username_or_email("nobody", "nope@x.com")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_taken_by_other_excludes_self() {
        let store = test_store();
        let alice = insert_test_user(&store, "alice", "a@x.com");
        insert_test_user(&store, "bob", "b@x.com");

        // own identity is not a conflict
        assert!(!store.username_taken_by_other("alice", &alice.id).unwrap());
        assert!(!store.email_taken_by_other("a@x.com", &alice.id).unwrap());

        // someone else's is
        assert!(store.username_taken_by_other("bob", &alice.id).unwrap());
        assert!(store.email_taken_by_other("b@x.com", &alice.id).unwrap());
    }

    #[test]
    fn test_update_user_stamps_updated_at() {
        let store = test_store();
        let mut alice = insert_test_user(&store, "alice", "a@x.com");
        alice.email = "alice@y.com".to_string();

        let updated = store.update_user(&alice).unwrap();
        assert!(updated.updated_at.is_some());

        let found = store.find_user_by_id(&alice.id).unwrap().unwrap();
        assert_eq!(found.email, "alice@y.com");
        assert!(found.updated_at.is_some());
    }

    #[test]
    fn test_server_name_unique_per_owner_only() {
        let store = test_store();
        let alice = insert_test_user(&store, "alice", "a@x.com");
        let bob = insert_test_user(&store, "bob", "b@x.com");

        store
            .insert_server(NewServer {
                user_id: alice.id.clone(),
                remote_id: 100,
                name: "survival".to_string(),
                description: None,
                status: "installing".to_string(),
            })
            .unwrap();

        // same name, same owner: rejected
        let dup = store.insert_server(NewServer {
            user_id: alice.id.clone(),
            remote_id: 101,
            name: "survival".to_string(),
            description: None,
            status: "installing".to_string(),
        });
        assert!(matches!(dup, Err(StoreError::Duplicate)));

        // same name, different owner: fine
        store
            .insert_server(NewServer {
                user_id: bob.id.clone(),
                remote_id: 102,
                name: "survival".to_string(),
                description: None,
                status: "installing".to_string(),
            })
            .unwrap();

        assert_eq!(store.count_servers_for_user(&alice.id).unwrap(), 1);
        assert_eq!(store.count_servers_for_user(&bob.id).unwrap(), 1);
    }

    #[test]
    fn test_owner_scoped_lookup() {
        let store = test_store();
        let alice = insert_test_user(&store, "alice", "a@x.com");
        let bob = insert_test_user(&store, "bob", "b@x.com");

        let server = store
            .insert_server(NewServer {
                user_id: alice.id.clone(),
                remote_id: 100,
                name: "survival".to_string(),
                description: None,
                status: "installing".to_string(),
            })
            .unwrap();

        assert!(store
            .find_server_by_id_and_owner(&server.id, &alice.id)
            .unwrap()
            .is_some());
        // bob cannot see alice's server through the scoped lookup
        assert!(store
            .find_server_by_id_and_owner(&server.id, &bob.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_delete_server_leaves_others() {
        let store = test_store();
        let alice = insert_test_user(&store, "alice", "a@x.com");

        let first = store
            .insert_server(NewServer {
                user_id: alice.id.clone(),
                remote_id: 100,
                name: "survival".to_string(),
                description: None,
                status: "installing".to_string(),
            })
            .unwrap();
        let second = store
            .insert_server(NewServer {
                user_id: alice.id.clone(),
                remote_id: 101,
                name: "creative".to_string(),
                description: None,
                status: "installing".to_string(),
            })
            .unwrap();

        assert!(store.delete_server(&first.id).unwrap());
        assert!(!store.delete_server(&first.id).unwrap());

        let remaining = store.list_servers_for_owner(&alice.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
    }

    #[test]
    fn test_delete_user_cascades_servers() {
        let store = test_store();
        let alice = insert_test_user(&store, "alice", "a@x.com");
        let bob = insert_test_user(&store, "bob", "b@x.com");

        store
            .insert_server(NewServer {
                user_id: alice.id.clone(),
                remote_id: 100,
                name: "survival".to_string(),
                description: None,
                status: "installing".to_string(),
            })
            .unwrap();
        store
            .insert_server(NewServer {
                user_id: bob.id.clone(),
                remote_id: 101,
                name: "survival".to_string(),
                description: None,
                status: "installing".to_string(),
            })
            .unwrap();

        assert!(store.delete_user_cascading(&alice.id).unwrap());
        assert!(store.find_user_by_id(&alice.id).unwrap().is_none());
        assert!(store.list_servers_for_owner(&alice.id).unwrap().is_empty());

        // bob and his server are untouched
        assert!(store.find_user_by_id(&bob.id).unwrap().is_some());
        assert_eq!(store.list_servers_for_owner(&bob.id).unwrap().len(), 1);

        assert!(!store.delete_user_cascading(&alice.id).unwrap());
    }
}
