use crate::error::{MakeQuerySnafu, RollcallResult};
use axum_login::AuthUser;
use secrecy::{ExposeSecret, SecretString};
use snafu::ResultExt;
use sqlx::{FromRow, PgConnection};
use std::sync::LazyLock;

/// Anyone who can log in. Students are users too, but the session user is usually staff
/// reviewing them.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub bcrypt_hashed_password: Option<SecretString>,
}

#[derive(FromRow)]
struct UserRow {
    id: i32,
    name: String,
    email: String,
    bcrypt_hashed_password: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            bcrypt_hashed_password: row.bcrypt_hashed_password.map(SecretString::from),
        }
    }
}

impl User {
    pub async fn get_from_db_by_id(id: i32, conn: &mut PgConnection) -> RollcallResult<Option<Self>> {
        Ok(sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, bcrypt_hashed_password FROM public.users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)?
        .map(Self::from))
    }

    pub async fn get_from_db_by_email(
        email: &str,
        conn: &mut PgConnection,
    ) -> RollcallResult<Option<Self>> {
        Ok(sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, bcrypt_hashed_password FROM public.users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)?
        .map(Self::from))
    }
}

impl AuthUser for User {
    type Id = i32;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn session_auth_hash(&self) -> &[u8] {
        static EMPTY_SECRET_STRING: LazyLock<SecretString> =
            LazyLock::new(|| SecretString::from(""));

        self.bcrypt_hashed_password
            .as_ref()
            .unwrap_or(&EMPTY_SECRET_STRING)
            .expose_secret()
            .as_bytes()
    }
}
