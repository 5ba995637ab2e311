pub mod repository;
pub mod session_repository;

pub(crate) use repository::RegistrationRepository;
pub(crate) use session_repository::{Role, SessionRepository};
