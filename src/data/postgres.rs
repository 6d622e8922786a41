use crate::{
    data::{
        StudentRepository, StudentService,
        student::{
            EMAIL_ALREADY_EXISTS, StatusChange, StudentDetail, StudentFilter, StudentPayload,
            StudentRecord, StudentSummary, UpsertOutcome,
        },
    },
    error::{
        CommitTransactionSnafu, GetDatabaseConnectionSnafu, MakeQuerySnafu, MissingStudentSnafu,
        RollcallError, RollcallResult,
    },
};
use async_trait::async_trait;
use serde_json::{Value, json};
use snafu::{OptionExt, ResultExt};
use sqlx::{Pool, Postgres, postgres::PgArguments, query::Query};

const INVALID_STUDENT_DATA: &str = "Invalid student data";
const STUDENT_NOT_FOUND: &str = "Student not found";
const UPSERT_FAILED: &str = "Unable to add or update student";

/// The student collaborators, backed by `public.users` and `public.students`.
#[derive(Debug, Clone)]
pub struct PgStudents {
    pool: Pool<Postgres>,
}

impl PgStudents {
    pub const fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn upsert(&self, record: StudentRecord) -> RollcallResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await.context(GetDatabaseConnectionSnafu)?;

        let email_owner = sqlx::query_scalar::<_, i32>("SELECT id FROM public.users WHERE email = $1")
            .bind(&record.email)
            .fetch_optional(&mut *tx)
            .await
            .context(MakeQuerySnafu)?;
        if email_owner.is_some_and(|owner| Some(owner) != record.user_id) {
            return Ok(UpsertOutcome::failed(EMAIL_ALREADY_EXISTS, None));
        }

        let outcome = if let Some(user_id) = record.user_id {
            let updated = bind_student_columns(
                sqlx::query(
                    "UPDATE public.students SET gender = $2, phone = $3, class_name = $4, section = $5, roll = $6, current_address = $7, permanent_address = $8, father_name = $9, father_phone = $10, mother_name = $11, mother_phone = $12, guardian_name = $13, guardian_phone = $14, relation_of_guardian = $15 WHERE user_id = $1",
                ),
                user_id,
                &record,
            )
            .execute(&mut *tx)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected();

            if updated == 0 {
                return Ok(UpsertOutcome::failed(
                    STUDENT_NOT_FOUND,
                    Some(format!("no student has user id {user_id}")),
                ));
            }

            sqlx::query("UPDATE public.users SET name = $2, email = $3 WHERE id = $1")
                .bind(user_id)
                .bind(&record.name)
                .bind(&record.email)
                .execute(&mut *tx)
                .await
                .context(MakeQuerySnafu)?;

            UpsertOutcome::updated(user_id)
        } else {
            let user_id = sqlx::query_scalar::<_, i32>(
                "INSERT INTO public.users (name, email) VALUES ($1, $2) RETURNING id",
            )
            .bind(&record.name)
            .bind(&record.email)
            .fetch_one(&mut *tx)
            .await
            .context(MakeQuerySnafu)?;

            bind_student_columns(
                sqlx::query(
                    "INSERT INTO public.students (user_id, gender, phone, class_name, section, roll, current_address, permanent_address, father_name, father_phone, mother_name, mother_phone, guardian_name, guardian_phone, relation_of_guardian) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
                ),
                user_id,
                &record,
            )
            .execute(&mut *tx)
            .await
            .context(MakeQuerySnafu)?;

            UpsertOutcome::added(user_id)
        };

        tx.commit().await.context(CommitTransactionSnafu)?;
        Ok(outcome)
    }
}

fn bind_student_columns<'q>(
    query: Query<'q, Postgres, PgArguments>,
    user_id: i32,
    record: &'q StudentRecord,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(user_id)
        .bind(&record.gender)
        .bind(&record.phone)
        .bind(&record.class)
        .bind(&record.section)
        .bind(record.roll)
        .bind(&record.current_address)
        .bind(&record.permanent_address)
        .bind(&record.father_name)
        .bind(&record.father_phone)
        .bind(&record.mother_name)
        .bind(&record.mother_phone)
        .bind(&record.guardian_name)
        .bind(&record.guardian_phone)
        .bind(&record.relation_of_guardian)
}

/// Two requests can race past the email check, in which case the unique index catches it.
fn is_unique_violation(error: &RollcallError) -> bool {
    match error {
        RollcallError::MakeQuery { source } | RollcallError::CommitTransaction { source } => source
            .as_database_error()
            .is_some_and(|db_error| db_error.is_unique_violation()),
        _ => false,
    }
}

#[async_trait]
impl StudentService for PgStudents {
    async fn get_all_students(&self, filter: StudentFilter) -> RollcallResult<Vec<StudentSummary>> {
        let StudentFilter {
            name,
            class_name,
            section,
            roll,
        } = filter;

        sqlx::query_as::<_, StudentSummary>(
            "SELECT u.id, u.name, u.email, s.class_name, s.section, s.roll, s.status
            FROM public.students s
            JOIN public.users u ON u.id = s.user_id
            WHERE ($1::text IS NULL OR u.name ILIKE '%' || $1 || '%')
                AND ($2::text IS NULL OR s.class_name = $2)
                AND ($3::text IS NULL OR s.section = $3)
                AND ($4::float8 IS NULL OR s.roll::float8 = $4)
            ORDER BY s.class_name, s.section, s.roll, u.id",
        )
        .bind(name)
        .bind(class_name)
        .bind(section)
        .bind(roll)
        .fetch_all(&self.pool)
        .await
        .context(MakeQuerySnafu)
    }

    async fn get_student_detail(&self, id: i32) -> RollcallResult<StudentDetail> {
        sqlx::query_as::<_, StudentDetail>(
            "SELECT u.id, u.name, u.email, u.is_email_verified, s.gender, s.phone, s.class_name, s.section, s.roll, s.current_address, s.permanent_address, s.father_name, s.father_phone, s.mother_name, s.mother_phone, s.guardian_name, s.guardian_phone, s.relation_of_guardian, s.status, s.reviewer_id, s.reviewed_at
            FROM public.students s
            JOIN public.users u ON u.id = s.user_id
            WHERE s.user_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context(MakeQuerySnafu)?
        .context(MissingStudentSnafu { id })
    }

    async fn set_student_status(&self, change: StatusChange) -> RollcallResult<Value> {
        let StatusChange {
            user_id,
            reviewer_id,
            status,
        } = change;

        let updated = sqlx::query(
            "UPDATE public.students SET status = $2, reviewer_id = $3, reviewed_at = now() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(status)
        .bind(reviewer_id)
        .execute(&self.pool)
        .await
        .context(MakeQuerySnafu)?
        .rows_affected();

        snafu::ensure!(updated > 0, MissingStudentSnafu { id: user_id });

        Ok(json!({ "message": "Student status changed successfully" }))
    }
}

#[async_trait]
impl StudentRepository for PgStudents {
    async fn add_or_update_student(&self, payload: StudentPayload) -> RollcallResult<UpsertOutcome> {
        let record = match StudentRecord::try_from(payload) {
            Ok(record) => record,
            Err(e) => {
                return Ok(UpsertOutcome::failed(
                    INVALID_STUDENT_DATA,
                    Some(e.to_string()),
                ));
            }
        };

        match self.upsert(record).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if is_unique_violation(&e) => {
                Ok(UpsertOutcome::failed(EMAIL_ALREADY_EXISTS, None))
            }
            Err(e) => Ok(UpsertOutcome::failed(
                UPSERT_FAILED,
                Some(snafu::Report::from_error(e).to_string()),
            )),
        }
    }
}
