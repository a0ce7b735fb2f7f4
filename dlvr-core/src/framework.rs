use sqlx::PgPool;

/// Runs query objects against the connection pool.
///
/// Each query is a plain struct with a `Processor<Query> for
/// DatabaseProcessor` implementation next to the entity it touches.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
