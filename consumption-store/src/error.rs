use crate::db::schema::TABLE_NAME;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The consumption table has not been created yet.
    #[error("table {} does not exist", TABLE_NAME)]
    TableMissing,
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn is_table_missing(&self) -> bool {
        matches!(self, StoreError::TableMissing)
    }
}

// SQLSTATE undefined_table
const UNDEFINED_TABLE: &str = "42P01";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNDEFINED_TABLE) => {
                StoreError::TableMissing
            }
            _ => StoreError::Database(e),
        }
    }
}
