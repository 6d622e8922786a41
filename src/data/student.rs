use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Column widths of the student tables, keyed by the JSON field name.
pub const STUDENT_FIELD_LIMITS: [(&str, usize); 15] = [
    ("name", 100),
    ("email", 100),
    ("gender", 10),
    ("phone", 20),
    ("class", 50),
    ("section", 50),
    ("currentAddress", 50),
    ("permanentAddress", 50),
    ("fatherName", 50),
    ("fatherPhone", 20),
    ("motherName", 50),
    ("motherPhone", 20),
    ("guardianName", 50),
    ("guardianPhone", 20),
    ("relationOfGuardian", 30),
];

pub const EMAIL_ALREADY_EXISTS: &str = "Email already exists";

/// Cuts a string value down to `max` characters. Anything that isn't a string is left alone.
pub fn truncate(value: &mut Value, max: usize) {
    if let Value::String(s) = value {
        if let Some((byte_index, _)) = s.char_indices().nth(max) {
            s.truncate(byte_index);
        }
    }
}

/// Student fields as they arrive from the client. Unknown keys are carried through to the
/// repository untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentPayload(Map<String, Value>);

impl StudentPayload {
    /// Seeds the payload with the path id, letting the body override it.
    pub fn with_user_id(user_id: i32, body: Option<Self>) -> Self {
        let mut fields = Map::new();
        fields.insert("userId".into(), Value::from(user_id));
        if let Some(Self(body)) = body {
            fields.extend(body);
        }
        Self(fields)
    }

    #[must_use]
    pub fn normalised(mut self) -> Self {
        for (field, max) in STUDENT_FIELD_LIMITS {
            if let Some(value) = self.0.get_mut(field) {
                truncate(value, max);
            }
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn email(&self) -> Option<&str> {
        self.get("email").and_then(Value::as_str)
    }

    /// The handful of fields that are safe to put in a log line.
    pub fn log_context(&self) -> StudentLogContext<'_> {
        StudentLogContext {
            user_id: self.get("userId"),
            email: self.get("email"),
            class: self.get("class"),
            section: self.get("section"),
            roll: self.get("roll"),
        }
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StudentLogContext<'a> {
    pub user_id: Option<&'a Value>,
    pub email: Option<&'a Value>,
    pub class: Option<&'a Value>,
    pub section: Option<&'a Value>,
    pub roll: Option<&'a Value>,
}

/// Typed view of a [`StudentPayload`], used when writing to the database.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub user_id: Option<i32>,
    pub name: String,
    pub email: String,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub class: Option<String>,
    pub section: Option<String>,
    pub roll: Option<i32>,
    pub current_address: Option<String>,
    pub permanent_address: Option<String>,
    pub father_name: Option<String>,
    pub father_phone: Option<String>,
    pub mother_name: Option<String>,
    pub mother_phone: Option<String>,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    pub relation_of_guardian: Option<String>,
}

impl TryFrom<StudentPayload> for StudentRecord {
    type Error = serde_json::Error;

    fn try_from(payload: StudentPayload) -> Result<Self, Self::Error> {
        serde_json::from_value(Value::Object(payload.into_inner()))
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListStudentsQuery {
    pub name: Option<String>,
    pub class: Option<String>,
    pub section: Option<String>,
    pub roll: Option<String>,
}

impl ListStudentsQuery {
    pub fn into_filter(self) -> StudentFilter {
        StudentFilter {
            name: self.name,
            class_name: self.class,
            section: self.section,
            roll: self.roll.as_deref().and_then(parse_roll),
        }
    }
}

/// Blank or non-numeric rolls mean "don't filter by roll".
pub fn parse_roll(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|roll| roll.is_finite())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFilter {
    pub name: Option<String>,
    pub class_name: Option<String>,
    pub section: Option<String>,
    pub roll: Option<f64>,
}

/// What the repository reports back from an upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub status: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i32>,
}

impl UpsertOutcome {
    pub fn added(user_id: i32) -> Self {
        Self {
            status: true,
            message: "Student added successfully.".into(),
            description: None,
            user_id: Some(user_id),
        }
    }

    pub fn updated(user_id: i32) -> Self {
        Self {
            status: true,
            message: "Student updated successfully.".into(),
            description: None,
            user_id: Some(user_id),
        }
    }

    pub fn failed(message: impl Into<String>, description: Option<String>) -> Self {
        Self {
            status: false,
            message: message.into(),
            description,
            user_id: None,
        }
    }

    pub fn is_duplicate_email(&self) -> bool {
        self.message == EMAIL_ALREADY_EXISTS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub user_id: i32,
    pub reviewer_id: Option<i32>,
    pub status: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationEmail {
    pub user_id: i32,
    pub user_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub id: i32,
    pub name: String,
    pub email: String,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    pub section: Option<String>,
    pub roll: Option<i32>,
    pub status: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetail {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub is_email_verified: bool,
    pub gender: Option<String>,
    pub phone: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    pub section: Option<String>,
    pub roll: Option<i32>,
    pub current_address: Option<String>,
    pub permanent_address: Option<String>,
    pub father_name: Option<String>,
    pub father_phone: Option<String>,
    pub mother_name: Option<String>,
    pub mother_phone: Option<String>,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    pub relation_of_guardian: Option<String>,
    pub status: bool,
    pub reviewer_id: Option<i32>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reviewed_at: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> StudentPayload {
        serde_json::from_value(value).expect("test payload is an object")
    }

    #[test]
    fn long_strings_are_cut_to_their_limit() {
        let long = "x".repeat(500);
        let mut body = Map::new();
        for (field, _) in STUDENT_FIELD_LIMITS {
            body.insert(field.into(), Value::from(long.clone()));
        }

        let normalised = StudentPayload(body).normalised();

        for (field, max) in STUDENT_FIELD_LIMITS {
            let value = normalised.get(field).and_then(Value::as_str).unwrap();
            assert_eq!(value.chars().count(), max, "{field}");
        }
    }

    #[test]
    fn short_strings_and_non_strings_pass_through() {
        let original = json!({
            "name": "Ada",
            "gender": 7,
            "roll": 12,
            "userId": 3,
            "phone": null,
            "hobbies": ["chess"],
            "fatherName": "y".repeat(80),
        });

        let normalised = payload(original).normalised();

        assert_eq!(normalised.get("name"), Some(&json!("Ada")));
        assert_eq!(normalised.get("gender"), Some(&json!(7)));
        assert_eq!(normalised.get("roll"), Some(&json!(12)));
        assert_eq!(normalised.get("userId"), Some(&json!(3)));
        assert_eq!(normalised.get("phone"), Some(&Value::Null));
        assert_eq!(normalised.get("hobbies"), Some(&json!(["chess"])));
        assert_eq!(normalised.get("fatherName"), Some(&json!("y".repeat(50))));
        assert_eq!(normalised.get("email"), None);
    }

    #[test]
    fn truncation_never_splits_a_character() {
        let mut value = json!("é".repeat(15));
        truncate(&mut value, 10);
        assert_eq!(value, json!("é".repeat(10)));
    }

    #[test]
    fn path_id_is_seeded_under_the_body() {
        let merged = StudentPayload::with_user_id(9, Some(payload(json!({ "name": "Ada" }))));
        assert_eq!(merged.get("userId"), Some(&json!(9)));
        assert_eq!(merged.get("name"), Some(&json!("Ada")));

        let empty = StudentPayload::with_user_id(9, None);
        assert_eq!(empty.get("userId"), Some(&json!(9)));
    }

    #[test]
    fn roll_parsing() {
        assert_eq!(parse_roll("5"), Some(5.0));
        assert_eq!(parse_roll(" 12 "), Some(12.0));
        assert_eq!(parse_roll("abc"), None);
        assert_eq!(parse_roll(""), None);
        assert_eq!(parse_roll("   "), None);
        assert_eq!(parse_roll("inf"), None);
        assert_eq!(parse_roll("NaN"), None);
    }

    #[test]
    fn query_becomes_filter() {
        let filter = ListStudentsQuery {
            name: Some("ada".into()),
            class: Some("7".into()),
            section: None,
            roll: Some("abc".into()),
        }
        .into_filter();

        assert_eq!(
            filter,
            StudentFilter {
                name: Some("ada".into()),
                class_name: Some("7".into()),
                section: None,
                roll: None,
            }
        );
    }

    #[test]
    fn records_decode_from_camel_case_payloads() {
        let record = StudentRecord::try_from(payload(json!({
            "userId": 4,
            "name": "Ada",
            "email": "ada@example.org",
            "class": "7",
            "roll": 3,
            "relationOfGuardian": "aunt",
            "somethingElse": true,
        })))
        .unwrap();

        assert_eq!(record.user_id, Some(4));
        assert_eq!(record.class.as_deref(), Some("7"));
        assert_eq!(record.relation_of_guardian.as_deref(), Some("aunt"));

        assert!(StudentRecord::try_from(payload(json!({ "name": "No Email" }))).is_err());
    }
}
