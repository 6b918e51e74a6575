// used for persistence
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{info, warn};

use crate::error::Result;
use crate::memory::Memory;
use crate::parser::parse;
use crate::value::Value;

/// Where snapshots are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceMode {
    /// A private in-memory database, gone with the persistor.
    InMemory,
    /// A SQLite database file, created if missing.
    File(String),
}

impl PersistenceMode {
    pub fn from_config(path: Option<&str>) -> Self {
        match path {
            Some(path) => PersistenceMode::File(path.to_string()),
            None => PersistenceMode::InMemory,
        }
    }
}

/// Metadata of the latest snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotInfo {
    pub taken_at: DateTime<Utc>,
    pub atoms: usize,
}

/// Writes the contents of a [`Memory`] to SQLite and reads them back.
///
/// Atoms are stored in their surface form together with their metadata, so a restored
/// store has the same truth values, importance and access times. Atoms that contain
/// grounded functions cannot be written down and are left out.
pub struct Persistor {
    connection: Connection,
}

impl Persistor {
    pub fn new(mode: &PersistenceMode) -> Result<Self> {
        let connection = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        connection.execute_batch(
            "
            create table if not exists Atom (
                Atom_Identity text not null,
                Atom text not null,
                Value text not null,
                Protected integer not null,
                Position integer not null,
                constraint referenceable_Atom_Identity primary key (
                    Atom_Identity
                )
            );
            create table if not exists Snapshot (
                Snapshot_Identity integer not null,
                TakenAt text not null,
                AtomCount integer not null,
                constraint referenceable_Snapshot_Identity primary key (
                    Snapshot_Identity
                )
            );
            ",
        )?;
        Ok(Self { connection })
    }

    /// Replaces the stored atoms with the current contents of `memory` in one transaction.
    /// Returns the number of atoms written.
    pub fn snapshot(&mut self, memory: &Memory) -> Result<usize> {
        let entries = memory.entries();
        let transaction = self.connection.transaction()?;
        transaction.execute("delete from Atom", [])?;
        let mut written = 0;
        {
            let mut add_atom = transaction.prepare(
                "
                insert into Atom (
                    Atom_Identity,
                    Atom,
                    Value,
                    Protected,
                    Position
                ) values (?, ?, ?, ?, ?)
                ",
            )?;
            for (atom, value) in &entries {
                if atom.has_functions() {
                    continue;
                }
                add_atom.execute(params![
                    atom.id(),
                    atom.to_string(),
                    serde_json::to_string(value)?,
                    memory.is_protected(atom),
                    written as i64,
                ])?;
                written += 1;
            }
        }
        transaction.execute(
            "
            insert into Snapshot (
                TakenAt,
                AtomCount
            ) values (?, ?)
            ",
            params![Utc::now(), written as i64],
        )?;
        transaction.commit()?;
        info!(atoms = written, skipped = entries.len() - written, "snapshot taken");
        Ok(written)
    }

    /// Adds every stored atom to `memory` with its stored metadata. Rows that no longer
    /// parse are skipped with a warning. Returns the number of atoms restored.
    pub fn restore(&self, memory: &Memory) -> Result<usize> {
        let mut all_atoms = self.connection.prepare(
            "
            select Atom, Value, Protected
                from Atom
                order by Position
            ",
        )?;
        let rows = all_atoms.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, bool>(2)?))
        })?;
        let mut restored = 0;
        for row in rows {
            let (text, value, protected) = row?;
            let atom = match parse(&text) {
                Ok(atom) => atom,
                Err(e) => {
                    warn!(atom = %text, error = %e, "stored atom does not parse, skipped");
                    continue;
                }
            };
            let value: Value = serde_json::from_str(&value)?;
            if protected {
                memory.protect(&atom);
            }
            memory.restore_value(&atom, value);
            restored += 1;
        }
        info!(atoms = restored, "snapshot restored");
        Ok(restored)
    }

    pub fn last_snapshot(&self) -> Result<Option<SnapshotInfo>> {
        let mut latest = self.connection.prepare(
            "
            select TakenAt, AtomCount
                from Snapshot
                order by Snapshot_Identity desc
                limit 1
            ",
        )?;
        let mut rows = latest.query_map([], |row| {
            Ok(SnapshotInfo { taken_at: row.get(0)?, atoms: row.get::<_, i64>(1)? as usize })
        })?;
        Ok(rows.next().transpose()?)
    }
}
