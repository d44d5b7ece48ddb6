//! Identity resolution: verified token claims → application user → [`AuthContext`].
//!
//! Users are provisioned on first sight. A user pre-created by email (e.g. an
//! imported roster) is linked to the identity-provider id the first time they
//! sign in.

use tracing::instrument;

use classroom_auth::{AuthContext, IdentityClaims};
use classroom_core::UserId;
use classroom_domain::users::{NewUser, UserRecord};

use crate::store::{StoreError, StoreResult, UserStore};

#[instrument(skip(store, claims), fields(auth_user_id = %claims.sub), err)]
pub async fn resolve_context<S>(store: &S, claims: &IdentityClaims) -> StoreResult<AuthContext>
where
    S: UserStore + ?Sized,
{
    let email = claims.email.as_deref().unwrap_or_default();

    let user = match store.find_user_for_identity(claims.sub, email).await? {
        Some(user) => adopt_existing(store, user, claims).await?,
        None => provision(store, claims).await?,
    };

    let organization_id = user.organization_id.or_else(|| claims.organization_id());
    Ok(AuthContext::new(
        claims.sub,
        user.id,
        organization_id,
        user.roles,
        user.email,
    ))
}

async fn adopt_existing<S>(store: &S, user: UserRecord, claims: &IdentityClaims) -> StoreResult<UserRecord>
where
    S: UserStore + ?Sized,
{
    if user.auth_user_id.is_none() {
        store.link_auth_user(user.id, claims.sub).await?;
    }
    if user.roles.is_empty() {
        store.grant_role(user.id, claims.default_role()).await?;
    } else {
        return Ok(user);
    }
    reload(store, user.id).await
}

async fn provision<S>(store: &S, claims: &IdentityClaims) -> StoreResult<UserRecord>
where
    S: UserStore + ?Sized,
{
    let new_user = NewUser {
        id: UserId::new(),
        auth_user_id: claims.sub,
        organization_id: claims.organization_id(),
        email: claims.email_or_placeholder(),
        display_name: claims.display_name().to_string(),
    };

    let created = match store.create_user(new_user).await {
        Ok(created) => created,
        // Two first requests of the same user raced; the other one won.
        Err(StoreError::Conflict(_)) => {
            let email = claims.email.as_deref().unwrap_or_default();
            let existing = store
                .find_user_for_identity(claims.sub, email)
                .await?
                .ok_or_else(|| StoreError::Conflict(format!("user for identity {} vanished", claims.sub)))?;
            return adopt_existing(store, existing, claims).await;
        }
        Err(other) => return Err(other),
    };

    let role = claims.default_role();
    store.grant_role(created.id, role.clone()).await?;
    tracing::info!(user_id = %created.id, role = %role, "provisioned user on first sign-in");
    reload(store, created.id).await
}

async fn reload<S>(store: &S, user_id: UserId) -> StoreResult<UserRecord>
where
    S: UserStore + ?Sized,
{
    store
        .get_user(user_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
}
