use crate::application::repos::QueryError;

pub fn map_sqlx_error(err: sqlx::Error) -> QueryError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => QueryError::connection(err),
        sqlx::Error::Database(db) => QueryError::sql(db.message()),
        other => QueryError::sql(other),
    }
}
