pub mod payment_address;
pub mod registration;
