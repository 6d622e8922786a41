use crate::auth::backend::RollcallAuthBackend;
use axum::{extract::FromRequestParts, http::{StatusCode, request::Parts}};
use axum_login::AuthSession;

pub mod backend;
pub mod postgres_store;

pub type RollcallSession = AuthSession<RollcallAuthBackend>;

/// Id of the logged-in user acting on a request, if there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reviewer(pub Option<i32>);

impl<S: Send + Sync> FromRequestParts<S> for Reviewer {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = RollcallSession::from_request_parts(parts, state).await?;
        Ok(Self(session.user.map(|user| user.id)))
    }
}
