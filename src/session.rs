//! Session-scoped accessors.
//!
//! `tower-sessions` owns the store, the cookie, and the load/save cycle. This
//! module names the keys the application uses and wraps the typed reads and
//! writes, so handlers never touch raw session keys.

use time::Duration;
use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore, cookie::SameSite};

use crate::{config::AppConfig, error::AppResult, models::UserId};

pub const AUTHENTICATED_USER_ID: &str = "authenticatedUserID";
pub const FLASH: &str = "flash";
pub const CSRF_TOKEN: &str = "csrfToken";

/// session_layer
///
/// Builds the session manager for a route group. The layer loads the session on
/// first access and persists it after the inner service has produced its response,
/// so writes made by handlers (flash, renewed token) are always saved.
pub fn session_layer<Store>(store: Store, config: &AppConfig) -> SessionManagerLayer<Store>
where
    Store: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_secure(config.cookie_secure)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::minutes(
            config.session_lifetime_minutes,
        )))
}

/// Returns the identity stored in the session. A stored `0` counts as absent.
pub async fn authenticated_user_id(session: &Session) -> AppResult<Option<UserId>> {
    let id = session.get::<UserId>(AUTHENTICATED_USER_ID).await?;
    Ok(id.filter(|id| *id != 0))
}

pub async fn put_flash(session: &Session, message: &str) -> AppResult<()> {
    session.insert(FLASH, message).await?;
    Ok(())
}

/// Read-and-clear: a second call without an intervening `put_flash` yields `None`.
pub async fn pop_flash(session: &Session) -> AppResult<Option<String>> {
    Ok(session.remove::<String>(FLASH).await?)
}

/// login
///
/// Renews the session token before recording the identity, so a token observed
/// before authentication can never be used to ride the authenticated session.
pub async fn login(session: &Session, id: UserId) -> AppResult<()> {
    session.cycle_id().await?;
    session.insert(AUTHENTICATED_USER_ID, id).await?;
    Ok(())
}

pub async fn logout(session: &Session) -> AppResult<()> {
    session.cycle_id().await?;
    session.remove::<UserId>(AUTHENTICATED_USER_ID).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    fn fresh_session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn flash_is_read_once() {
        let session = fresh_session();
        put_flash(&session, "Snippet successfully created!").await.unwrap();

        assert_eq!(
            pop_flash(&session).await.unwrap().as_deref(),
            Some("Snippet successfully created!")
        );
        assert_eq!(pop_flash(&session).await.unwrap(), None);
    }

    #[tokio::test]
    async fn newer_flash_replaces_pending_one() {
        let session = fresh_session();
        put_flash(&session, "first").await.unwrap();
        put_flash(&session, "second").await.unwrap();

        assert_eq!(pop_flash(&session).await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn zero_identity_is_anonymous() {
        let session = fresh_session();
        session.insert(AUTHENTICATED_USER_ID, 0_i64).await.unwrap();

        assert_eq!(authenticated_user_id(&session).await.unwrap(), None);
    }

    #[tokio::test]
    async fn login_then_logout_clears_identity() {
        let session = fresh_session();

        login(&session, 7).await.unwrap();
        assert_eq!(authenticated_user_id(&session).await.unwrap(), Some(7));

        logout(&session).await.unwrap();
        assert_eq!(authenticated_user_id(&session).await.unwrap(), None);
    }
}
