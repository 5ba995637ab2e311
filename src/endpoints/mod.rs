pub mod payment;
pub mod qr_code;
pub mod register;
pub mod reports;
