use crate::{
    data::student::{
        StatusChange, StudentDetail, StudentFilter, StudentPayload, StudentSummary,
        UpsertOutcome, VerificationEmail,
    },
    error::RollcallResult,
};
use async_trait::async_trait;
use serde_json::Value;

pub mod postgres;
pub mod student;
pub mod user;

/// Read side of the student records, plus review.
#[async_trait]
pub trait StudentService: Send + Sync {
    async fn get_all_students(&self, filter: StudentFilter) -> RollcallResult<Vec<StudentSummary>>;
    async fn get_student_detail(&self, id: i32) -> RollcallResult<StudentDetail>;
    /// The returned value is passed straight back to the client.
    async fn set_student_status(&self, change: StatusChange) -> RollcallResult<Value>;
}

#[async_trait]
pub trait StudentRepository: Send + Sync {
    /// Inserts when the payload has no `userId`, updates otherwise.
    ///
    /// Expected failures (duplicate email, bad data) come back as `status: false` rather than as
    /// an `Err`.
    async fn add_or_update_student(&self, payload: StudentPayload) -> RollcallResult<UpsertOutcome>;
}

#[async_trait]
pub trait AccountMailer: Send + Sync {
    async fn send_account_verification_email(&self, email: VerificationEmail)
    -> RollcallResult<()>;
}
