use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{table}: no entity matches the requested id or key")]
    NotFound { table: &'static str },

    #[error("{table}: unique index conflict")]
    UniqueConflict { table: &'static str },

    #[error("{table}: constructed entity does not carry its assigned id")]
    IdMismatch { table: &'static str },

    #[error("{table}: snapshot schema does not match the compiled entity")]
    SchemaMismatch { table: String },

    #[error("{table}: snapshot is internally inconsistent")]
    InvalidSnapshot { table: String },
}
