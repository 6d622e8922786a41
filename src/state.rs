use crate::{
    config::RuntimeConfiguration,
    data::{AccountMailer, StudentRepository, StudentService, postgres::PgStudents},
    error::{MigrateSnafu, OpenDatabaseSnafu, RollcallResult},
    mail::VerificationMailer,
};
use axum::extract::FromRef;
use snafu::ResultExt;
use sqlx::{Pool, Postgres, postgres::PgPoolOptions};
use std::{ops::Deref, sync::Arc};

/// The collaborators the student handlers delegate to.
#[derive(Clone)]
pub struct StudentCollaborators {
    pub service: Arc<dyn StudentService>,
    pub repository: Arc<dyn StudentRepository>,
    pub mailer: Arc<dyn AccountMailer>,
}

#[derive(Clone)]
pub struct RollcallState {
    pool: Pool<Postgres>,
    config: RuntimeConfiguration,
    students: StudentCollaborators,
}

impl RollcallState {
    pub async fn new(options: PgPoolOptions, config: RuntimeConfiguration) -> RollcallResult<Self> {
        let pool = options
            .connect(&config.db_config().get_db_path())
            .await
            .context(OpenDatabaseSnafu)?;

        sqlx::migrate!().run(&pool).await.context(MigrateSnafu)?;

        let students = Arc::new(PgStudents::new(pool.clone()));
        let mailer = Arc::new(VerificationMailer::new(
            pool.clone(),
            config.server_config(),
        ));

        Ok(Self {
            pool,
            config,
            students: StudentCollaborators {
                service: students.clone(),
                repository: students,
                mailer,
            },
        })
    }

    pub const fn config(&self) -> &RuntimeConfiguration {
        &self.config
    }

    pub async fn sensible_shutdown(&self) {
        self.pool.close().await;
    }
}

impl FromRef<RollcallState> for StudentCollaborators {
    fn from_ref(state: &RollcallState) -> Self {
        state.students.clone()
    }
}

impl Deref for RollcallState {
    type Target = Pool<Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
