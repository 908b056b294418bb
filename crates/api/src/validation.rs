//! Request payload validation.
//!
//! Payload fields are read as raw JSON values so a wrong type is reported
//! per field instead of rejecting the whole body.

use std::collections::BTreeMap;

use common::{NewPost, PostChanges, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use store::{EntityStore, EntityStoreExt, TITLE_MAX_CHARS};

use crate::error::ApiError;

const PASSWORD_MIN_CHARS: usize = 8;
const NAME_MAX_CHARS: usize = 255;

/// Field name to the messages of every rule it failed.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds errors holding a single message.
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Summary line: the first message, plus a count of the rest.
    pub fn message(&self) -> String {
        let mut messages = self.0.values().flatten();
        let Some(first) = messages.next() else {
            return "The given data was invalid.".to_string();
        };
        match messages.count() {
            0 => first.clone(),
            1 => format!("{first} (and 1 more error)"),
            n => format!("{first} (and {n} more errors)"),
        }
    }

    fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

/// Body of post create and update requests.
///
/// An absent field is `None`; a field sent as `null` is `Some(Value::Null)`.
#[derive(Debug, Default, Deserialize)]
pub struct PostPayload {
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub content: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub user_id: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Body of the user registration request.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterPayload {
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub email: Option<Value>,
    #[serde(default)]
    pub password: Option<Value>,
}

/// Validated registration fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Validates a create request. Every field is required.
pub async fn new_post<S: EntityStore + ?Sized>(
    store: &S,
    payload: &PostPayload,
) -> Result<NewPost, ApiError> {
    let mut errors = ValidationErrors::new();
    let title = title(payload.title.as_ref(), true, &mut errors);
    let content = content(payload.content.as_ref(), true, &mut errors);
    let user_id = owner(store, payload.user_id.as_ref(), true, &mut errors).await?;
    errors.into_result()?;

    match (title, content, user_id) {
        (Some(title), Some(content), Some(user_id)) => Ok(NewPost::new(title, content, user_id)),
        _ => Err(ApiError::Internal(
            "validated post payload is incomplete".to_string(),
        )),
    }
}

/// Validates an update request. Fields may be omitted, but a field that is
/// present must satisfy the same rules as on create.
pub async fn post_changes<S: EntityStore + ?Sized>(
    store: &S,
    payload: &PostPayload,
) -> Result<PostChanges, ApiError> {
    let mut errors = ValidationErrors::new();
    let title = title(payload.title.as_ref(), false, &mut errors);
    let content = content(payload.content.as_ref(), false, &mut errors);
    let user_id = owner(store, payload.user_id.as_ref(), false, &mut errors).await?;
    errors.into_result()?;

    Ok(PostChanges {
        title,
        content,
        user_id,
        ..PostChanges::default()
    })
}

/// Validates a registration request.
pub fn registration(payload: &RegisterPayload) -> Result<Registration, ApiError> {
    let mut errors = ValidationErrors::new();

    let name = required_string("name", payload.name.as_ref(), &mut errors);
    if let Some(ref name) = name
        && name.chars().count() > NAME_MAX_CHARS
    {
        errors.add(
            "name",
            format!("The name field must not be greater than {NAME_MAX_CHARS} characters."),
        );
    }

    let email = required_string("email", payload.email.as_ref(), &mut errors);
    if let Some(ref email) = email
        && !looks_like_email(email)
    {
        errors.add("email", "The email field must be a valid email address.");
    }

    let password = match payload.password.as_ref() {
        None | Some(Value::Null) => {
            errors.add("password", "The password field is required.");
            None
        }
        Some(Value::String(password)) if password.is_empty() => {
            errors.add("password", "The password field is required.");
            None
        }
        Some(Value::String(password)) => {
            if password.chars().count() < PASSWORD_MIN_CHARS {
                errors.add(
                    "password",
                    format!(
                        "The password field must be at least {PASSWORD_MIN_CHARS} characters."
                    ),
                );
            }
            Some(password.clone())
        }
        Some(_) => {
            errors.add("password", "The password field must be a string.");
            None
        }
    };

    errors.into_result()?;
    match (name, email, password) {
        (Some(name), Some(email), Some(password)) => Ok(Registration {
            name,
            email,
            password,
        }),
        _ => Err(ApiError::Internal(
            "validated registration payload is incomplete".to_string(),
        )),
    }
}

fn title(value: Option<&Value>, required: bool, errors: &mut ValidationErrors) -> Option<String> {
    let title = post_string("title", value, required, errors, "The post title is required.")?;
    if title.chars().count() > TITLE_MAX_CHARS {
        errors.add(
            "title",
            format!("The post title may not be greater than {TITLE_MAX_CHARS} characters."),
        );
        return None;
    }
    Some(title)
}

fn content(value: Option<&Value>, required: bool, errors: &mut ValidationErrors) -> Option<String> {
    post_string(
        "content",
        value,
        required,
        errors,
        "The post content is required.",
    )
}

/// Reads a trimmed, non-empty string. An empty string or `null` counts as
/// missing; only an absent field may be skipped when not `required`.
fn post_string(
    field: &'static str,
    value: Option<&Value>,
    required: bool,
    errors: &mut ValidationErrors,
    required_message: &str,
) -> Option<String> {
    match value {
        None => {
            if required {
                errors.add(field, required_message);
            }
            None
        }
        Some(Value::Null) => {
            errors.add(field, required_message);
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.add(field, required_message);
            None
        }
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => {
            errors.add(field, format!("The {field} field must be a string."));
            None
        }
    }
}

fn required_string(
    field: &'static str,
    value: Option<&Value>,
    errors: &mut ValidationErrors,
) -> Option<String> {
    post_string(
        field,
        value,
        true,
        errors,
        &format!("The {field} field is required."),
    )
}

async fn owner<S: EntityStore + ?Sized>(
    store: &S,
    value: Option<&Value>,
    required: bool,
    errors: &mut ValidationErrors,
) -> Result<Option<UserId>, ApiError> {
    let raw = match value {
        None => {
            if required {
                errors.add("user_id", "The user ID is required.");
            }
            return Ok(None);
        }
        Some(Value::Null) => {
            errors.add("user_id", "The user ID is required.");
            return Ok(None);
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.add("user_id", "The user ID is required.");
            return Ok(None);
        }
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    let Some(id) = raw.map(UserId::new) else {
        errors.add("user_id", "The selected user does not exist.");
        return Ok(None);
    };
    if !store.user_exists(id).await? {
        errors.add("user_id", "The selected user does not exist.");
        return Ok(None);
    }
    Ok(Some(id))
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !email.contains(' ')
        }
        None => false,
    }
}
