use serde::{Deserialize, Serialize};
use tracing::debug;

use meridian_core::Digest;

use crate::entity::Entity;
use crate::error::DbError;
use crate::table::Table;

/// Stable schema version for one entity kind: the table name plus the
/// reflected field list, digested so a snapshot written under a different
/// layout is rejected on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub table: String,
    pub fields: Vec<String>,
    pub digest: Digest,
}

impl SchemaInfo {
    pub fn of<T: Entity>() -> Self {
        let fields: Vec<String> = T::FIELDS.iter().map(|f| f.to_string()).collect();
        let mut data = Vec::new();
        data.extend_from_slice(T::TABLE_NAME.as_bytes());
        for field in T::FIELDS {
            data.push(0);
            data.extend_from_slice(field.as_bytes());
        }
        SchemaInfo {
            table: T::TABLE_NAME.to_string(),
            fields,
            digest: Digest::of(&data),
        }
    }
}

/// The persisted form of one table: its schema version, the id allocator
/// position, and every row in id order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TableSnapshot<T: Entity> {
    pub schema: SchemaInfo,
    pub next_id: u64,
    pub rows: Vec<T>,
}

impl<T: Entity> Table<T> {
    /// Dump the table in id order under its schema version
    pub fn snapshot(&self) -> TableSnapshot<T> {
        TableSnapshot {
            schema: SchemaInfo::of::<T>(),
            next_id: self.next_id(),
            rows: self.rows_in_id_order().cloned().collect(),
        }
    }

    /// Rebuild a table from a snapshot, verifying the schema version
    pub fn restore(snapshot: TableSnapshot<T>) -> Result<Self, DbError> {
        if snapshot.schema != SchemaInfo::of::<T>() {
            return Err(DbError::SchemaMismatch {
                table: snapshot.schema.table,
            });
        }
        let table = Table::load_rows(snapshot.next_id, snapshot.rows)?;
        debug!(
            table = T::TABLE_NAME,
            rows = table.len(),
            "table restored from snapshot"
        );
        Ok(table)
    }
}
