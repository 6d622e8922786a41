use crate::{
    auth::Reviewer,
    data::student::{
        ListStudentsQuery, StatusChange, StudentDetail, StudentPayload, StudentSummary,
        UpsertOutcome, VerificationEmail,
    },
    error::{RollcallError, RollcallResult},
    state::StudentCollaborators,
};
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ADD_STUDENT_AND_EMAIL_SEND_SUCCESS: &str =
    "Student added and verification email sent successfully.";
pub const ADD_STUDENT_BUT_EMAIL_SEND_FAIL: &str =
    "Student added, but failed to send verification email.";

/// A student body that may be empty, `null`, or a JSON object. The content type isn't checked.
#[derive(Debug, Default)]
pub struct StudentBody(pub Option<StudentPayload>);

impl<S: Send + Sync> FromRequest<S> for StudentBody {
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(None));
        }

        let Json(body) = Json::<Option<StudentPayload>>::from_bytes(&bytes)
            .map_err(IntoResponse::into_response)?;
        Ok(Self(body))
    }
}

#[derive(Debug, Serialize)]
pub struct StudentList {
    pub students: Vec<StudentSummary>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StudentAdded {
    pub message: &'static str,
    pub id: Option<i32>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StudentUpdated {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: bool,
}

/// 409 for a clashing email, 500 for anything else the repository refused.
pub fn upsert_failure_status(outcome: &UpsertOutcome) -> StatusCode {
    if outcome.is_duplicate_email() {
        StatusCode::CONFLICT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn upsert_failure(outcome: UpsertOutcome) -> RollcallError {
    RollcallError::api(upsert_failure_status(&outcome), outcome.message)
}

pub async fn get_students(
    State(collaborators): State<StudentCollaborators>,
    Query(query): Query<ListStudentsQuery>,
) -> RollcallResult<Json<StudentList>> {
    let students = collaborators
        .service
        .get_all_students(query.into_filter())
        .await?;
    Ok(Json(StudentList { students }))
}

pub async fn post_student(
    State(collaborators): State<StudentCollaborators>,
    StudentBody(body): StudentBody,
) -> RollcallResult<Json<StudentAdded>> {
    let payload = body.unwrap_or_default().normalised();
    let user_email = payload.email().unwrap_or_default().to_string();

    let outcome = collaborators
        .repository
        .add_or_update_student(payload.clone())
        .await?;
    if !outcome.status {
        let context = payload.log_context();
        error!(
            reason = %outcome.message,
            description = ?outcome.description,
            user_id = ?context.user_id,
            email = ?context.email,
            class = ?context.class,
            section = ?context.section,
            roll = ?context.roll,
            "STUDENT_ADD_FAILED"
        );
        return Err(upsert_failure(outcome));
    }

    let id = outcome.user_id;
    let message = match id {
        Some(user_id) => match collaborators
            .mailer
            .send_account_verification_email(VerificationEmail {
                user_id,
                user_email,
            })
            .await
        {
            Ok(()) => ADD_STUDENT_AND_EMAIL_SEND_SUCCESS,
            Err(e) => {
                warn!(?e, user_id, "Unable to send verification email");
                ADD_STUDENT_BUT_EMAIL_SEND_FAIL
            }
        },
        None => {
            warn!("Repository added a student without returning an id");
            ADD_STUDENT_BUT_EMAIL_SEND_FAIL
        }
    };

    Ok(Json(StudentAdded { message, id }))
}

pub async fn put_student(
    State(collaborators): State<StudentCollaborators>,
    Path(id): Path<i32>,
    StudentBody(body): StudentBody,
) -> RollcallResult<Json<StudentUpdated>> {
    let payload = StudentPayload::with_user_id(id, body).normalised();

    let outcome = collaborators
        .repository
        .add_or_update_student(payload.clone())
        .await?;
    if !outcome.status {
        let context = payload.log_context();
        error!(
            reason = %outcome.message,
            description = ?outcome.description,
            user_id = id,
            email = ?context.email,
            class = ?context.class,
            section = ?context.section,
            roll = ?context.roll,
            "STUDENT_UPDATE_FAILED"
        );
        return Err(upsert_failure(outcome));
    }

    Ok(Json(StudentUpdated {
        message: outcome.message,
    }))
}

pub async fn get_student(
    State(collaborators): State<StudentCollaborators>,
    Path(id): Path<i32>,
) -> RollcallResult<Json<StudentDetail>> {
    collaborators
        .service
        .get_student_detail(id)
        .await
        .map(Json)
}

pub async fn patch_student_status(
    State(collaborators): State<StudentCollaborators>,
    Reviewer(reviewer_id): Reviewer,
    Path(id): Path<i32>,
    Json(StatusForm { status }): Json<StatusForm>,
) -> RollcallResult<Json<Value>> {
    collaborators
        .service
        .set_student_status(StatusChange {
            user_id: id,
            reviewer_id,
            status,
        })
        .await
        .map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        AccountMailer, StudentRepository, StudentService,
        student::{EMAIL_ALREADY_EXISTS, StudentFilter},
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        filters: Vec<StudentFilter>,
        payloads: Vec<StudentPayload>,
        emails: Vec<VerificationEmail>,
        status_changes: Vec<StatusChange>,
    }

    struct FakeCollaborators {
        recorded: Mutex<Recorded>,
        outcome: UpsertOutcome,
        email_works: bool,
    }

    impl FakeCollaborators {
        fn new(outcome: UpsertOutcome, email_works: bool) -> Arc<Self> {
            Arc::new(Self {
                recorded: Mutex::new(Recorded::default()),
                outcome,
                email_works,
            })
        }
    }

    fn collaborators(fake: &Arc<FakeCollaborators>) -> StudentCollaborators {
        StudentCollaborators {
            service: fake.clone(),
            repository: fake.clone(),
            mailer: fake.clone(),
        }
    }

    fn summary(id: i32, name: &str) -> StudentSummary {
        StudentSummary {
            id,
            name: name.into(),
            email: format!("{name}@example.org"),
            class_name: Some("7".into()),
            section: Some("B".into()),
            roll: Some(id),
            status: true,
        }
    }

    #[async_trait]
    impl StudentService for FakeCollaborators {
        async fn get_all_students(
            &self,
            filter: StudentFilter,
        ) -> RollcallResult<Vec<StudentSummary>> {
            self.recorded.lock().unwrap().filters.push(filter);
            Ok(vec![summary(1, "ada"), summary(2, "grace")])
        }

        async fn get_student_detail(&self, id: i32) -> RollcallResult<StudentDetail> {
            Err(RollcallError::MissingStudent { id })
        }

        async fn set_student_status(&self, change: StatusChange) -> RollcallResult<Value> {
            self.recorded.lock().unwrap().status_changes.push(change);
            Ok(json!({ "message": "changed", "extra": [1, 2] }))
        }
    }

    #[async_trait]
    impl StudentRepository for FakeCollaborators {
        async fn add_or_update_student(
            &self,
            payload: StudentPayload,
        ) -> RollcallResult<UpsertOutcome> {
            self.recorded.lock().unwrap().payloads.push(payload);
            Ok(self.outcome.clone())
        }
    }

    #[async_trait]
    impl AccountMailer for FakeCollaborators {
        async fn send_account_verification_email(
            &self,
            email: VerificationEmail,
        ) -> RollcallResult<()> {
            self.recorded.lock().unwrap().emails.push(email);
            if self.email_works {
                Ok(())
            } else {
                Err(RollcallError::api(StatusCode::BAD_GATEWAY, "smtp down"))
            }
        }
    }

    fn body(value: Value) -> StudentBody {
        StudentBody(Some(serde_json::from_value(value).unwrap()))
    }

    async fn extract_body(raw: &'static str) -> Result<StudentBody, Response> {
        let request = Request::builder()
            .method("POST")
            .uri("/students")
            .body(Body::from(raw))
            .unwrap();
        StudentBody::from_request(request, &()).await
    }

    #[tokio::test]
    async fn listing_passes_the_parsed_filter() {
        let fake = FakeCollaborators::new(UpsertOutcome::added(1), true);

        for (raw_roll, expected) in [("abc", None), ("", None), ("5", Some(5.0))] {
            let Json(list) = get_students(
                State(collaborators(&fake)),
                Query(ListStudentsQuery {
                    name: Some("ada".into()),
                    class: Some("7".into()),
                    section: Some("B".into()),
                    roll: Some(raw_roll.into()),
                }),
            )
            .await
            .unwrap();
            assert_eq!(list.students.len(), 2);

            let filter = fake.recorded.lock().unwrap().filters.pop().unwrap();
            assert_eq!(filter.roll, expected, "roll {raw_roll:?}");
            assert_eq!(filter.class_name.as_deref(), Some("7"));
        }

        let Json(list) = get_students(
            State(collaborators(&fake)),
            Query(ListStudentsQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(
            serde_json::to_value(&list).unwrap()["students"][1]["class"],
            json!("7")
        );
        assert_eq!(
            fake.recorded.lock().unwrap().filters.pop().unwrap(),
            StudentFilter::default()
        );
    }

    #[tokio::test]
    async fn adding_sends_the_verification_email() {
        let fake = FakeCollaborators::new(UpsertOutcome::added(42), true);

        let Json(added) = post_student(
            State(collaborators(&fake)),
            body(json!({ "name": "Ada", "email": "ada@example.org", "roll": 3 })),
        )
        .await
        .unwrap();

        assert_eq!(
            added,
            StudentAdded {
                message: ADD_STUDENT_AND_EMAIL_SEND_SUCCESS,
                id: Some(42),
            }
        );
        let recorded = fake.recorded.lock().unwrap();
        assert_eq!(
            recorded.emails,
            vec![VerificationEmail {
                user_id: 42,
                user_email: "ada@example.org".into(),
            }]
        );
        assert_eq!(recorded.payloads[0].get("roll"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn failed_email_still_adds() {
        let fake = FakeCollaborators::new(UpsertOutcome::added(42), false);

        let Json(added) = post_student(
            State(collaborators(&fake)),
            body(json!({ "name": "Ada", "email": "ada@example.org" })),
        )
        .await
        .unwrap();

        assert_eq!(added.message, ADD_STUDENT_BUT_EMAIL_SEND_FAIL);
        assert_eq!(added.id, Some(42));
        assert_eq!(fake.recorded.lock().unwrap().emails.len(), 1);
    }

    #[tokio::test]
    async fn added_payload_is_truncated_before_the_repository_sees_it() {
        let fake = FakeCollaborators::new(UpsertOutcome::added(1), true);

        let Json(added) = post_student(
            State(collaborators(&fake)),
            body(json!({ "name": "n".repeat(150), "gender": "g".repeat(20) })),
        )
        .await
        .unwrap();
        assert_eq!(added.id, Some(1));

        let recorded = fake.recorded.lock().unwrap();
        let payload = &recorded.payloads[0];
        assert_eq!(payload.get("name"), Some(&json!("n".repeat(100))));
        assert_eq!(payload.get("gender"), Some(&json!("g".repeat(10))));
    }

    #[tokio::test]
    async fn empty_and_null_bodies_are_treated_as_empty() {
        for raw in ["", "  \n", "null"] {
            let fake = FakeCollaborators::new(UpsertOutcome::added(1), true);
            let extracted = extract_body(raw).await.unwrap();

            let Json(added) = post_student(State(collaborators(&fake)), extracted)
                .await
                .unwrap();

            assert_eq!(added.id, Some(1), "body {raw:?}");
            assert_eq!(
                fake.recorded.lock().unwrap().payloads[0],
                StudentPayload::default(),
                "body {raw:?}"
            );
        }
    }

    #[tokio::test]
    async fn empty_update_body_still_carries_the_path_id() {
        let fake = FakeCollaborators::new(UpsertOutcome::updated(8), true);
        let extracted = extract_body("").await.unwrap();

        let Json(updated) = put_student(State(collaborators(&fake)), Path(8), extracted)
            .await
            .unwrap();

        assert_eq!(updated.message, "Student updated successfully.");
        assert_eq!(
            fake.recorded.lock().unwrap().payloads[0].get("userId"),
            Some(&json!(8))
        );
    }

    #[tokio::test]
    async fn json_bodies_are_read_without_a_content_type() {
        let StudentBody(payload) = extract_body(r#"{ "name": "Ada", "roll": 4 }"#)
            .await
            .unwrap();
        let payload = payload.unwrap();

        assert_eq!(payload.get("name"), Some(&json!("Ada")));
        assert_eq!(payload.get("roll"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn malformed_bodies_are_rejected() {
        for raw in ["{ not json", "[1, 2]"] {
            let rejection = extract_body(raw).await.unwrap_err();
            assert!(rejection.status().is_client_error(), "body {raw:?}");
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let fake =
            FakeCollaborators::new(UpsertOutcome::failed(EMAIL_ALREADY_EXISTS, None), true);

        let error = post_student(
            State(collaborators(&fake)),
            body(json!({ "email": "ada@example.org" })),
        )
        .await
        .unwrap_err();

        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        assert_eq!(error.to_string(), EMAIL_ALREADY_EXISTS);
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
        assert!(fake.recorded.lock().unwrap().emails.is_empty());
    }

    #[tokio::test]
    async fn other_repository_failures_are_server_errors() {
        let fake = FakeCollaborators::new(
            UpsertOutcome::failed("Unable to add or update student", Some("boom".into())),
            true,
        );

        let error = post_student(State(collaborators(&fake)), body(json!({})))
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let error = put_student(State(collaborators(&fake)), Path(3), body(json!({})))
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn failure_status_mapping() {
        let duplicate = UpsertOutcome::failed(EMAIL_ALREADY_EXISTS, None);
        let near_miss = UpsertOutcome::failed("email already exists", None);

        assert_eq!(upsert_failure_status(&duplicate), StatusCode::CONFLICT);
        assert_eq!(
            upsert_failure_status(&near_miss),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn update_merges_the_path_id_and_sends_no_email() {
        let fake = FakeCollaborators::new(UpsertOutcome::updated(7), true);

        let Json(updated) = put_student(
            State(collaborators(&fake)),
            Path(7),
            body(json!({ "name": "Grace", "section": "s".repeat(60) })),
        )
        .await
        .unwrap();

        assert_eq!(updated.message, "Student updated successfully.");
        let recorded = fake.recorded.lock().unwrap();
        let payload = &recorded.payloads[0];
        assert_eq!(payload.get("userId"), Some(&json!(7)));
        assert_eq!(payload.get("section"), Some(&json!("s".repeat(50))));
        assert!(recorded.emails.is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_on_update_is_a_conflict() {
        let fake =
            FakeCollaborators::new(UpsertOutcome::failed(EMAIL_ALREADY_EXISTS, None), true);

        let error = put_student(
            State(collaborators(&fake)),
            Path(7),
            body(json!({ "email": "taken@example.org" })),
        )
        .await
        .unwrap_err();

        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn missing_detail_is_not_found() {
        let fake = FakeCollaborators::new(UpsertOutcome::added(1), true);

        let error = get_student(State(collaborators(&fake)), Path(99))
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_change_carries_the_reviewer() {
        let fake = FakeCollaborators::new(UpsertOutcome::added(1), true);

        let Json(result) = patch_student_status(
            State(collaborators(&fake)),
            Reviewer(Some(11)),
            Path(5),
            Json(StatusForm { status: false }),
        )
        .await
        .unwrap();

        assert_eq!(result, json!({ "message": "changed", "extra": [1, 2] }));
        assert_eq!(
            fake.recorded.lock().unwrap().status_changes,
            vec![StatusChange {
                user_id: 5,
                reviewer_id: Some(11),
                status: false,
            }]
        );
    }
}
