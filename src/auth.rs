use tracing::{debug, error};
use uuid::Uuid;

use crate::db::SessionRepository;

/// The account behind a valid session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContext {
    pub account_id: Uuid,
}

pub async fn resolve_session<R: SessionRepository>(pool: &R, token: &str) -> Option<SessionContext> {
    if token.is_empty() {
        return None;
    }

    match pool.get_session(token).await {
        Ok(Some(account_id)) => Some(SessionContext { account_id }),
        Ok(None) => {
            debug!("Rejected unknown session");
            None
        }
        Err(e) => {
            error!("Unable to look up session: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryRepository;

    #[tokio::test]
    async fn test_resolve_session() {
        let pool = MemoryRepository::new();
        let account_id = pool.add_manager("boss@example.com");
        pool.add_session("s3cret", account_id);

        assert_eq!(
            resolve_session(&pool, "s3cret").await,
            Some(SessionContext { account_id })
        );
        assert_eq!(resolve_session(&pool, "guess").await, None);
        assert_eq!(resolve_session(&pool, "").await, None);
    }
}
