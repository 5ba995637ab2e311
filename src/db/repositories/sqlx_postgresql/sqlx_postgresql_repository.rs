use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::db::{
    repositories::models::{
        payment_address::PaymentAddress,
        registration::{NewRegistration, Registration},
    },
    RegistrationRepository, Role, SessionRepository,
};

const MAX_CONNECTIONS: u32 = 10;

#[derive(Clone)]
pub struct SqlxPostgresqlRepository {
    pool: PgPool,
}

impl SqlxPostgresqlRepository {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        debug!("[DB] Connecting");
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await?;
        debug!("[DB] Connected");

        Ok(Self { pool })
    }

    /// Builds the pool without opening a connection until one is needed.
    pub fn connect_lazy(url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_lazy(url)?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("[DB] Migrations applied");
        Ok(())
    }
}

impl RegistrationRepository for SqlxPostgresqlRepository {
    async fn has_available_address(&self) -> Result<bool, sqlx::Error> {
        debug!("[DB] Checking for an available address");

        let res = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (SELECT 1 FROM payment_addresses WHERE available = TRUE);"#,
        )
        .fetch_one(&self.pool)
        .await;

        if let Err(e) = &res {
            error!("[DB] Failed to check for an available address: {}", e);
        }

        res
    }

    async fn get_available_addresses(&self) -> Result<Vec<PaymentAddress>, sqlx::Error> {
        debug!("[DB] Getting available addresses");

        let res = sqlx::query_as::<_, PaymentAddress>(
            r#"SELECT btc_address, available, created_at FROM payment_addresses WHERE available = TRUE ORDER BY id;"#,
        )
        .fetch_all(&self.pool)
        .await;

        match res {
            Ok(addresses) => {
                debug!("[DB] Got {} available addresses", addresses.len());
                Ok(addresses)
            }
            Err(e) => {
                error!("[DB] Failed to get available addresses: {}", e);
                Err(e)
            }
        }
    }

    async fn add_addresses(&self, addresses: &[String]) -> Result<u64, sqlx::Error> {
        debug!("[DB] Adding {} addresses to the pool", addresses.len());

        let res = sqlx::query(
            r#"INSERT INTO payment_addresses (btc_address) SELECT * FROM UNNEST($1::text[]) ON CONFLICT (btc_address) DO NOTHING;"#,
        )
        .bind(addresses)
        .execute(&self.pool)
        .await;

        match res {
            Ok(res) => {
                debug!("[DB] Added {} addresses to the pool", res.rows_affected());
                Ok(res.rows_affected())
            }
            Err(e) => {
                error!("[DB] Failed to add addresses to the pool: {}", e);
                Err(e)
            }
        }
    }

    async fn create_registration(
        &self,
        registration: &NewRegistration,
    ) -> Result<Option<Registration>, sqlx::Error> {
        debug!("[DB] Creating registration for {}", registration.full_name);

        let mut tx = self.pool.begin().await?;

        // SKIP LOCKED lets concurrent submissions claim different rows instead of queueing.
        let claimed = sqlx::query_scalar::<_, String>(
            r#"UPDATE payment_addresses SET available = FALSE
               WHERE id = (
                   SELECT id FROM payment_addresses WHERE available = TRUE
                   ORDER BY id LIMIT 1 FOR UPDATE SKIP LOCKED
               )
               RETURNING btc_address;"#,
        )
        .fetch_optional(&mut *tx)
        .await;

        let btc_address = match claimed {
            Ok(Some(btc_address)) => btc_address,
            Ok(None) => {
                debug!("[DB] No address available for {}", registration.full_name);
                return Ok(None);
            }
            Err(e) => {
                error!("[DB] Failed to claim an address: {}", e);
                return Err(e);
            }
        };

        debug!("[DB] Claimed address {}", btc_address);

        let res = sqlx::query_as::<_, Registration>(
            r#"INSERT INTO registrations (full_name, email_address, payment_usd, btc_price, payment_btc, btc_address)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, full_name, email_address, payment_usd, btc_price, payment_btc, btc_address, date_added;"#,
        )
        .bind(&registration.full_name)
        .bind(&registration.email_address)
        .bind(registration.payment_usd)
        .bind(registration.btc_price)
        .bind(registration.payment_btc)
        .bind(&btc_address)
        .fetch_one(&mut *tx)
        .await;

        let created = match res {
            Ok(created) => created,
            Err(e) => {
                error!(
                    "[DB] Failed to create registration on {}, releasing it: {}",
                    btc_address, e
                );
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            error!("[DB] Failed to commit registration on {}: {}", btc_address, e);
            return Err(e);
        }

        debug!("[DB] Created registration {} on {}", created.id, btc_address);

        Ok(Some(created))
    }

    async fn get_registration_by_address(
        &self,
        btc_address: &str,
    ) -> Result<Option<Registration>, sqlx::Error> {
        debug!("[DB] Getting registration by address {}", btc_address);

        let res = sqlx::query_as::<_, Registration>(
            r#"SELECT id, full_name, email_address, payment_usd, btc_price, payment_btc, btc_address, date_added
               FROM registrations WHERE btc_address = $1;"#,
        )
        .bind(btc_address)
        .fetch_optional(&self.pool)
        .await;

        match res {
            Ok(Some(registration)) => {
                debug!("[DB] Got registration by address {}", btc_address);
                Ok(Some(registration))
            }
            Ok(None) => {
                debug!("[DB] Registration by address {} not found", btc_address);
                Ok(None)
            }
            Err(e) => {
                error!("[DB] Failed to get registration by address {}: {}", btc_address, e);
                Err(e)
            }
        }
    }

    async fn get_registrations(&self) -> Result<Vec<Registration>, sqlx::Error> {
        debug!("[DB] Getting registrations");

        let res = sqlx::query_as::<_, Registration>(
            r#"SELECT id, full_name, email_address, payment_usd, btc_price, payment_btc, btc_address, date_added
               FROM registrations ORDER BY date_added;"#,
        )
        .fetch_all(&self.pool)
        .await;

        if let Err(e) = &res {
            error!("[DB] Failed to get registrations: {}", e);
        }

        res
    }
}

impl SessionRepository for SqlxPostgresqlRepository {
    async fn get_session(&self, token: &str) -> Result<Option<Uuid>, sqlx::Error> {
        debug!("[DB] Getting session");

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"SELECT account_id FROM sessions WHERE id = $1 AND expires_at > NOW();"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        match id {
            Some(id) => debug!("[DB] Got session for account {}", id),
            None => debug!("[DB] Session not found or expired"),
        }

        Ok(id)
    }

    async fn has_role(&self, account_id: &Uuid, role: Role) -> Result<bool, sqlx::Error> {
        debug!("[DB] Checking role {} for account {}", role.as_str(), account_id);

        sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (SELECT 1 FROM account_roles WHERE account_id = $1 AND role = $2);"#,
        )
        .bind(account_id)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
    }

    async fn get_role_emails(&self, role: Role) -> Result<Vec<String>, sqlx::Error> {
        debug!("[DB] Getting emails for role {}", role.as_str());

        let res = sqlx::query_scalar::<_, String>(
            r#"SELECT a.email FROM accounts a
               JOIN account_roles r ON r.account_id = a.id
               WHERE r.role = $1 ORDER BY a.email;"#,
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await;

        if let Err(e) = &res {
            error!("[DB] Failed to get emails for role {}: {}", role.as_str(), e);
        }

        res
    }
}
