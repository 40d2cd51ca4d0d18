// API module - HTTP endpoints

pub mod admission;
pub mod events;
pub mod logs;
pub mod middleware;
pub mod rights;

use sqlx::PgPool;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}
