//! Row types and status state machines.

use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;

use crate::error::StoreError;

/// Request lifecycle. Transitions go `received → running → done` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Received,
    Running,
    Done,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Received => "received",
            RequestStatus::Running => "running",
            RequestStatus::Done => "done",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "received" => Ok(RequestStatus::Received),
            "running" => Ok(RequestStatus::Running),
            "done" => Ok(RequestStatus::Done),
            other => Err(StoreError::UnknownStatus(other.to_string())),
        }
    }
}

impl FromSql for RequestStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        RequestStatus::from_str(value.as_str()?).map_err(|_| FromSqlError::InvalidType)
    }
}

impl ToSql for RequestStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// Response lifecycle. Transitions go `created → sending → done` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Created,
    Sending,
    Done,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Created => "created",
            ResponseStatus::Sending => "sending",
            ResponseStatus::Done => "done",
        }
    }
}

impl FromStr for ResponseStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "created" => Ok(ResponseStatus::Created),
            "sending" => Ok(ResponseStatus::Sending),
            "done" => Ok(ResponseStatus::Done),
            other => Err(StoreError::UnknownStatus(other.to_string())),
        }
    }
}

impl FromSql for ResponseStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        ResponseStatus::from_str(value.as_str()?).map_err(|_| FromSqlError::InvalidType)
    }
}

impl ToSql for ResponseStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// A persisted kind-23194 request event.
#[derive(Debug, Clone)]
pub struct RequestRow {
    pub id: i64,
    /// Relay event id, unique per row.
    pub event_id: String,
    /// Author public key of the request event.
    pub pubkey: String,
    /// Username this request belongs to.
    pub user: String,
    /// Raw serialized event as delivered by the relay.
    pub raw: String,
    pub status: RequestStatus,
    pub created_at: i64,
    pub updated_at: i64,
    /// From the event's NIP-40 `expiration` tag, when present.
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewRequest {
    pub event_id: String,
    pub pubkey: String,
    pub user: String,
    pub raw: String,
    pub expires_at: Option<i64>,
}

/// A persisted kind-23195 response event.
#[derive(Debug, Clone)]
pub struct ResponseRow {
    pub id: i64,
    /// Relay event id of the response, unique per row.
    pub event_id: String,
    /// Relay event id of the request this answers.
    pub request_event_id: String,
    /// Author public key (the service's).
    pub pubkey: String,
    pub user: String,
    pub raw: String,
    pub status: ResponseStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewResponse {
    pub event_id: String,
    pub request_event_id: String,
    pub pubkey: String,
    pub user: String,
    pub raw: String,
}
