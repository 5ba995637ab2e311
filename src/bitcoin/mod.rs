pub mod amounts;
pub mod chain;
pub mod explorer;
pub mod wallet;
