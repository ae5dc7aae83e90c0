use thiserror::Error;

/// Errors that abort a migration run.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// A content-verification check exhausted its retry budget: the data the
    /// next phase depends on never appeared. Always fatal, unlike plain
    /// infrastructure unreachability.
    #[error("{0} data does not appear to be imported")]
    DataNotPresent(String),

    /// A correction statement failed with an error outside its ignore set.
    #[error("statement failed: {sql}")]
    Statement {
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
