//! Request bodies and their validation.
//!
//! Every field is optional at the serde level so that a missing field is
//! reported with a field-level message instead of a deserialization error.

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

use crate::credentials::ProfileFields;
use crate::session::{FieldError, RegisterInput};

const PASSWORD_MIN_CHARS: usize = 6;
const PASSWORD_MAX_CHARS: usize = 50;
const EMAIL_MAX_CHARS: usize = 254;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub address: Option<String>,
}

/// Validated login credentials.
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(self) -> Result<RegisterInput, Vec<FieldError>> {
        let mut errors = Vec::new();

        let email = check_email(self.email, &mut errors);
        let password = check_password(
            "password",
            "Password",
            self.password,
            &mut errors,
        );
        let confirm_password = check_password(
            "confirmPassword",
            "Confirm password",
            self.confirm_password,
            &mut errors,
        );
        if let (Some(password), Some(confirm)) = (&password, &confirm_password) {
            if password != confirm {
                errors.push(FieldError::new(
                    "confirmPassword",
                    "Confirm password must match password",
                ));
            }
        }
        let birth_date = check_birth_date(self.birth_date, &mut errors);

        match (email, password, confirm_password) {
            (Some(email), Some(password), Some(confirm_password)) if errors.is_empty() => {
                Ok(RegisterInput {
                    email,
                    password,
                    confirm_password,
                    profile: ProfileFields {
                        name: self.name,
                        birth_date,
                        address: self.address,
                    },
                })
            }
            _ => Err(errors),
        }
    }
}

impl LoginRequest {
    pub fn validate(self) -> Result<LoginInput, Vec<FieldError>> {
        let mut errors = Vec::new();

        let email = check_email(self.email, &mut errors);
        let password = check_password("password", "Password", self.password, &mut errors);

        match (email, password) {
            (Some(email), Some(password)) if errors.is_empty() => {
                Ok(LoginInput { email, password })
            }
            _ => Err(errors),
        }
    }
}

impl UpdateProfileRequest {
    pub fn validate(self) -> Result<ProfileFields, Vec<FieldError>> {
        let mut errors = Vec::new();
        let birth_date = check_birth_date(self.birth_date, &mut errors);

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ProfileFields {
            name: self.name,
            birth_date,
            address: self.address,
        })
    }
}

fn check_email(email: Option<String>, errors: &mut Vec<FieldError>) -> Option<String> {
    let email = match email.map(|e| e.trim().to_string()) {
        Some(email) if !email.is_empty() => email,
        _ => {
            errors.push(FieldError::new("email", "Email is required"));
            return None;
        }
    };

    if !is_valid_email(&email) {
        errors.push(FieldError::new("email", "Invalid email format"));
        return None;
    }

    Some(email)
}

/// `local@domain.tld`, no whitespace, one `@`, dotted domain with
/// non-empty labels.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().count() > EMAIL_MAX_CHARS || email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

fn check_password(
    field: &'static str,
    label: &str,
    password: Option<String>,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let password = match password {
        Some(p) if !p.is_empty() => p,
        _ => {
            errors.push(FieldError::new(field, format!("{} is required", label)));
            return None;
        }
    };

    let len = password.chars().count();
    if !(PASSWORD_MIN_CHARS..=PASSWORD_MAX_CHARS).contains(&len) {
        errors.push(FieldError::new(
            field,
            format!(
                "{} must be between {} and {} characters",
                label, PASSWORD_MIN_CHARS, PASSWORD_MAX_CHARS
            ),
        ));
        return None;
    }

    Some(password)
}

fn check_birth_date(value: Option<String>, errors: &mut Vec<FieldError>) -> Option<String> {
    let value = value?;
    match parse_iso_date(value.trim()) {
        Some(date) => Some(date.format("%Y-%m-%d").to_string()),
        None => {
            errors.push(FieldError::new(
                "birthDate",
                "birthDate must be a valid ISO 8601 date string",
            ));
            None
        }
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}
