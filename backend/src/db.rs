use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Builds the connection pool and runs a trivial query so a bad
/// `DATABASE_URL` fails at startup rather than on the first request.
pub fn establish_pool(database_url: &str, max_size: u32) -> Result<PgPool, PoolError> {
    log::info!("Connecting to database (pool size {})", max_size);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| {
            log::error!("Failed to establish database connection: {}", e);
            e
        })?;

    match pool.get() {
        Ok(mut conn) => {
            let probe = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1"))
                .get_result::<i32>(&mut conn);
            match probe {
                Ok(value) => log::info!("Database test query result: {}", value),
                Err(e) => log::warn!("Database test query failed: {}", e),
            }
        }
        Err(e) => log::warn!("Could not check out a connection for the test query: {}", e),
    }
    Ok(pool)
}
