//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Components call store methods; they never execute SQL directly.

use crate::{
    error::WorldResult,
    types::{to_millis, Timestamp},
};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Transaction};

mod district;
mod reputation;

pub struct WorldStore {
    conn: Connection,
}

impl WorldStore {
    pub fn open(path: &str) -> WorldResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> WorldResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> WorldResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_world.sql"))?;
        Ok(())
    }

    /// Start a transaction on this connection. Every store call made before
    /// `commit()` joins it; dropping it uncommitted rolls everything back.
    pub fn begin(&self) -> WorldResult<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    // ── Player / crew directory ────────────────────────────────

    pub fn register_player(&self, player_id: &str, at: Timestamp) -> WorldResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO known_player (player_id, registered_at) VALUES (?1, ?2)",
            params![player_id, to_millis(at)],
        )?;
        Ok(())
    }

    pub fn register_crew(&self, crew_id: &str, at: Timestamp) -> WorldResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO known_crew (crew_id, registered_at) VALUES (?1, ?2)",
            params![crew_id, to_millis(at)],
        )?;
        Ok(())
    }

    pub fn player_exists(&self, player_id: &str) -> WorldResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM known_player WHERE player_id = ?1",
                params![player_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn crew_exists(&self, crew_id: &str) -> WorldResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM known_crew WHERE crew_id = ?1",
                params![crew_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

/// Row-mapping failure for a column whose text does not parse.
fn bad_column(idx: usize, what: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, what.into())
}
