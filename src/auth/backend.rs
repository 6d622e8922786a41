use crate::{
    data::user::User,
    error::{BcryptSnafu, GetDatabaseConnectionSnafu, JoinBlockingSnafu, RollcallError},
};
use async_trait::async_trait;
use axum_login::{AuthnBackend, UserId};
use secrecy::{ExposeSecret, SecretString};
use snafu::ResultExt;
use sqlx::{Pool, Postgres};

#[derive(Clone)]
pub struct RollcallAuthBackend {
    pool: Pool<Postgres>,
}

impl RollcallAuthBackend {
    pub const fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

pub enum RollcallAuthCredentials {
    EmailPassword {
        email: String,
        password: SecretString,
    },
}

#[async_trait]
impl AuthnBackend for RollcallAuthBackend {
    type User = User;
    type Credentials = RollcallAuthCredentials;
    type Error = RollcallError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let mut conn = self.pool.acquire().await.context(GetDatabaseConnectionSnafu)?;

        match creds {
            RollcallAuthCredentials::EmailPassword { email, password } => {
                let Some(user) = User::get_from_db_by_email(&email, &mut conn).await? else {
                    return Ok(None);
                };
                // students are added without a password until they go through verification
                let Some(hash) = user.bcrypt_hashed_password.clone() else {
                    return Ok(None);
                };

                let password_verification_result = tokio::task::spawn_blocking(move || {
                    bcrypt::verify(password.expose_secret(), hash.expose_secret())
                })
                .await
                .context(JoinBlockingSnafu)?
                .context(BcryptSnafu)?;

                Ok(password_verification_result.then_some(user))
            }
        }
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        let mut conn = self.pool.acquire().await.context(GetDatabaseConnectionSnafu)?;
        User::get_from_db_by_id(*user_id, &mut conn).await
    }
}
