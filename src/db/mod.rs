pub mod repositories;
pub mod traits;

pub use repositories::Repository;
pub(crate) use traits::{RegistrationRepository, Role, SessionRepository};
