//! Acting-user extraction for the REST API
//!
//! Authentication happens in front of this service. The authenticated
//! login name arrives in the `x-username` header; requests without it are
//! rejected with 403 Forbidden before any handler runs.

use crate::error::Error;
use crate::types::User;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Header carrying the authenticated user's login name
pub const USER_HEADER: &str = "x-username";

/// The user a request acts as
///
/// # Examples
///
/// ```no_run
/// use study_results::api::auth::ActingUser;
///
/// async fn handler(ActingUser(user): ActingUser) -> String {
///     user.username
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ActingUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Forbidden(format!("missing {USER_HEADER} header")))?;

        Ok(ActingUser(User::new(username, username)))
    }
}
