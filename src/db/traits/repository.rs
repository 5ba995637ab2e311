use crate::db::repositories::models::{
    payment_address::PaymentAddress,
    registration::{NewRegistration, Registration},
};

pub trait RegistrationRepository
where
    Self: Clone,
{
    async fn has_available_address(&self) -> Result<bool, sqlx::Error>;

    async fn get_available_addresses(&self) -> Result<Vec<PaymentAddress>, sqlx::Error>;

    /// Adds addresses to the pool, skipping ones already present. Returns how many were new.
    async fn add_addresses(&self, addresses: &[String]) -> Result<u64, sqlx::Error>;

    /// Claims the next available address and stores the registration against it.
    ///
    /// Both happen atomically: `Ok(None)` means the pool is empty, and on `Err`
    /// the claimed address is still available.
    async fn create_registration(
        &self,
        registration: &NewRegistration,
    ) -> Result<Option<Registration>, sqlx::Error>;

    async fn get_registration_by_address(
        &self,
        btc_address: &str,
    ) -> Result<Option<Registration>, sqlx::Error>;

    /// All registrations, oldest first.
    async fn get_registrations(&self) -> Result<Vec<Registration>, sqlx::Error>;
}
