use crate::{
    config::ServerConfig,
    data::{AccountMailer, student::VerificationEmail},
    error::{
        ApiSnafu, CommitTransactionSnafu, EmailSnafu, GetDatabaseConnectionSnafu, MakeQuerySnafu,
        RollcallResult,
    },
};
use async_trait::async_trait;
use axum::http::StatusCode;
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use email_address::EmailAddress;
use maud::{DOCTYPE, Markup, html};
use rand::{Rng, rng};
use snafu::ResultExt;
use sqlx::{FromRow, Pool, Postgres};
use std::{str::FromStr, sync::Arc};
use time::OffsetDateTime;

pub const VERIFICATION_SUBJECT: &str = "Verify your account";

/// Issues verification tokens and writes the finished message to the `rollcall::outbound_mail`
/// log target, which whatever relays mail is expected to pick up.
#[derive(Debug, Clone)]
pub struct VerificationMailer {
    pool: Pool<Postgres>,
    config: Arc<ServerConfig>,
}

impl VerificationMailer {
    pub const fn new(pool: Pool<Postgres>, config: Arc<ServerConfig>) -> Self {
        Self { pool, config }
    }
}

pub fn generate_token() -> String {
    let mut bytes = [0_u8; 32];
    rng().fill(&mut bytes);
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

pub fn verification_link(public_url: &str, token: &str) -> String {
    format!("{public_url}/auth/verify/{token}")
}

pub fn render_verification_email(link: &str, expires_at: OffsetDateTime) -> Markup {
    html! {
        (DOCTYPE)
        html {
            body {
                h1 { "Welcome!" }
                p { "An account has been created for you. Confirm your email address to finish setting it up:" }
                p { a href=(link) { (link) } }
                p { "This link stops working on " (expires_at.date()) "." }
            }
        }
    }
}

#[async_trait]
impl AccountMailer for VerificationMailer {
    async fn send_account_verification_email(
        &self,
        email: VerificationEmail,
    ) -> RollcallResult<()> {
        let VerificationEmail {
            user_id,
            user_email,
        } = email;
        let address = EmailAddress::from_str(&user_email).context(EmailSnafu {
            original: user_email.clone(),
        })?;

        let token = generate_token();
        let expires_at = OffsetDateTime::now_utc() + self.config.verification_ttl;

        sqlx::query(
            "INSERT INTO public.verification_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .context(MakeQuerySnafu)?;

        let link = verification_link(&self.config.public_url, &token);
        let body = render_verification_email(&link, expires_at).into_string();

        info!(
            target: "rollcall::outbound_mail",
            to = %address,
            user_id,
            subject = VERIFICATION_SUBJECT,
            %body,
            "Sending account verification email"
        );

        Ok(())
    }
}

#[derive(FromRow)]
struct TokenRow {
    user_id: i32,
    expires_at: OffsetDateTime,
}

/// Spends a verification token. Tokens work once, whether or not they had expired.
pub async fn verify_account(pool: &Pool<Postgres>, token: &str) -> RollcallResult<i32> {
    let mut tx = pool.begin().await.context(GetDatabaseConnectionSnafu)?;

    let Some(TokenRow {
        user_id,
        expires_at,
    }) = sqlx::query_as::<_, TokenRow>(
        "DELETE FROM public.verification_tokens WHERE token = $1 RETURNING user_id, expires_at",
    )
    .bind(token)
    .fetch_optional(&mut *tx)
    .await
    .context(MakeQuerySnafu)?
    else {
        return ApiSnafu {
            status: StatusCode::NOT_FOUND,
            message: "Verification link is invalid",
        }
        .fail();
    };

    if !token_is_live(expires_at, OffsetDateTime::now_utc()) {
        tx.commit().await.context(CommitTransactionSnafu)?;
        return ApiSnafu {
            status: StatusCode::GONE,
            message: "Verification link has expired",
        }
        .fail();
    }

    sqlx::query("UPDATE public.users SET is_email_verified = TRUE WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context(MakeQuerySnafu)?;

    tx.commit().await.context(CommitTransactionSnafu)?;
    Ok(user_id)
}

fn token_is_live(expires_at: OffsetDateTime, now: OffsetDateTime) -> bool {
    expires_at > now
}
