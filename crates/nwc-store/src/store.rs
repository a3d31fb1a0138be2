//! The event store proper.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::StoreError;
use crate::models::{
    NewRequest, NewResponse, RequestRow, RequestStatus, ResponseRow, ResponseStatus,
};
use crate::unix_timestamp;

/// Durable log of request and response events.
///
/// Cloning is cheap; all clones share one serialized connection.
#[derive(Clone)]
pub struct EventStore {
    db: Arc<Mutex<Connection>>,
}

impl EventStore {
    /// Open (and create if missing) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        init_schema(&conn)?;
        info!(path = %path.as_ref().display(), "opened event store");
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// An in-memory store, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::MutexPoisoned)
    }

    /// Whether a request with this relay event id is already persisted.
    pub fn has_request(&self, event_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM request_events WHERE event_id = ?1",
            params![event_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Insert a request with status `received`.
    ///
    /// Fails with [`StoreError::Duplicate`] if the event id exists.
    pub fn insert_request(&self, new: NewRequest) -> Result<RequestRow, StoreError> {
        let conn = self.conn()?;
        let now = unix_timestamp();

        conn.execute(
            "INSERT INTO request_events \
             (event_id, pubkey, user, raw, status, created_at, updated_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.event_id,
                new.pubkey,
                new.user,
                new.raw,
                RequestStatus::Received,
                now,
                now,
                new.expires_at,
            ],
        )
        .map_err(|err| map_unique_violation(err, &new.event_id))?;

        Ok(RequestRow {
            id: conn.last_insert_rowid(),
            event_id: new.event_id,
            pubkey: new.pubkey,
            user: new.user,
            raw: new.raw,
            status: RequestStatus::Received,
            created_at: now,
            updated_at: now,
            expires_at: new.expires_at,
        })
    }

    pub fn set_request_status(&self, id: i64, status: RequestStatus) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE request_events SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, unix_timestamp(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub fn get_request(&self, event_id: &str) -> Result<Option<RequestRow>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, event_id, pubkey, user, raw, status, created_at, updated_at, expires_at \
                 FROM request_events WHERE event_id = ?1",
                params![event_id],
                map_request,
            )
            .optional()?;
        Ok(row)
    }

    /// Atomically insert the response with status `created` and mark the
    /// matching request `done`. Both writes commit or neither does.
    ///
    /// A response answering an event that was never persisted (e.g. an
    /// unauthorized author) simply updates zero request rows.
    pub fn commit_response(&self, new: NewResponse) -> Result<ResponseRow, StoreError> {
        let mut conn = self.conn()?;
        let now = unix_timestamp();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO response_events \
             (event_id, request_event_id, pubkey, user, raw, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.event_id,
                new.request_event_id,
                new.pubkey,
                new.user,
                new.raw,
                ResponseStatus::Created,
                now,
                now,
            ],
        )
        .map_err(|err| map_unique_violation(err, &new.event_id))?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE request_events SET status = ?1, updated_at = ?2 WHERE event_id = ?3",
            params![RequestStatus::Done, now, new.request_event_id],
        )?;
        tx.commit()?;

        Ok(ResponseRow {
            id,
            event_id: new.event_id,
            request_event_id: new.request_event_id,
            pubkey: new.pubkey,
            user: new.user,
            raw: new.raw,
            status: ResponseStatus::Created,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn set_response_status(&self, id: i64, status: ResponseStatus) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE response_events SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, unix_timestamp(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Requests of `user` that never reached `done`, oldest first.
    pub fn list_open_requests(&self, user: &str) -> Result<Vec<RequestRow>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, event_id, pubkey, user, raw, status, created_at, updated_at, expires_at \
             FROM request_events WHERE user = ?1 AND status != ?2 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![user, RequestStatus::Done], map_request)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Responses of `user` that never reached `done`, oldest first.
    pub fn list_open_responses(&self, user: &str) -> Result<Vec<ResponseRow>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, event_id, request_event_id, pubkey, user, raw, status, created_at, updated_at \
             FROM response_events WHERE user = ?1 AND status != ?2 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![user, ResponseStatus::Done], map_response)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn map_unique_violation(err: rusqlite::Error, event_id: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Duplicate(event_id.to_string())
        }
        _ => StoreError::Sqlite(err),
    }
}

fn map_request(row: &Row<'_>) -> Result<RequestRow, rusqlite::Error> {
    Ok(RequestRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        pubkey: row.get(2)?,
        user: row.get(3)?,
        raw: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        expires_at: row.get(8)?,
    })
}

fn map_response(row: &Row<'_>) -> Result<ResponseRow, rusqlite::Error> {
    Ok(ResponseRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        request_event_id: row.get(2)?,
        pubkey: row.get(3)?,
        user: row.get(4)?,
        raw: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS request_events (\
            id INTEGER PRIMARY KEY AUTOINCREMENT,\
            event_id TEXT NOT NULL UNIQUE,\
            pubkey TEXT NOT NULL,\
            user TEXT NOT NULL,\
            raw TEXT NOT NULL,\
            status TEXT NOT NULL,\
            created_at INTEGER NOT NULL,\
            updated_at INTEGER NOT NULL,\
            expires_at INTEGER\
        );\
        CREATE INDEX IF NOT EXISTS idx_request_events_user_status \
            ON request_events(user, status);\
        CREATE TABLE IF NOT EXISTS response_events (\
            id INTEGER PRIMARY KEY AUTOINCREMENT,\
            event_id TEXT NOT NULL UNIQUE,\
            request_event_id TEXT NOT NULL,\
            pubkey TEXT NOT NULL,\
            user TEXT NOT NULL,\
            raw TEXT NOT NULL,\
            status TEXT NOT NULL,\
            created_at INTEGER NOT NULL,\
            updated_at INTEGER NOT NULL\
        );\
        CREATE INDEX IF NOT EXISTS idx_response_events_user_status \
            ON response_events(user, status);",
    )?;

    Ok(())
}
