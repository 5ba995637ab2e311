use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Manager,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Manager => "manager",
        }
    }
}

pub trait SessionRepository
where
    Self: Clone,
{
    async fn get_session(&self, token: &str) -> Result<Option<Uuid>, sqlx::Error>;

    async fn has_role(&self, account_id: &Uuid, role: Role) -> Result<bool, sqlx::Error>;

    /// Email addresses of every account holding `role`.
    async fn get_role_emails(&self, role: Role) -> Result<Vec<String>, sqlx::Error>;
}
