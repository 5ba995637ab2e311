pub mod models;
pub mod sqlx_postgresql;

pub type Repository = sqlx_postgresql::SqlxPostgresqlRepository;
