//! Login, registration and change-password form rules.
//!
//! Every failing rule is reported, grouped by field, so a form can show all
//! problems at once. Messages are user-facing and stable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Email;

pub const VALID_EMAIL_REQUIRED: &str = "Valid Email required";
pub const PASSWORD_REQUIRED: &str = "Password is required";
pub const MUST_NOT_BE_EMPTY: &str = "Must not be empty";
pub const TOO_SHORT: &str = "Must be at least 5 characters long";
pub const NEEDS_LETTER: &str = "Must contain at least one letter";
pub const NEEDS_NUMBER: &str = "Must have at least one number";
pub const NEEDS_SPECIAL: &str = "Must have at least one special character";
pub const PASSWORDS_DONT_MATCH: &str = "Password fields don't match";
pub const EMAIL_ALREADY_REGISTERED: &str = "Email is already registered. Try logging in instead.";

/// Minimum length of a new password.
pub const MIN_PASSWORD_LENGTH: usize = 5;

/// Validation messages keyed by form field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// No errors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors with a single message on one field.
    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Record a message against a field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages for one field.
    #[must_use]
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Sign-in form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Validated sign-in credentials.
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: Email,
    pub password: String,
}

impl LoginForm {
    /// Check the form.
    ///
    /// # Errors
    ///
    /// Returns the per-field messages when any rule fails.
    pub fn validate(self) -> Result<LoginInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        let email = check_email(&self.email, &mut errors);

        if self.password.is_empty() {
            errors.add("password", PASSWORD_REQUIRED);
        }

        match email {
            Some(email) => errors.into_result(LoginInput {
                email,
                password: self.password,
            }),
            None => Err(errors),
        }
    }
}

/// Registration form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "confirmPassword")]
    pub confirm_password: String,
}

/// Validated registration details.
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: Email,
    pub password: String,
}

impl RegisterForm {
    /// Check the form.
    ///
    /// # Errors
    ///
    /// Returns the per-field messages when any rule fails.
    pub fn validate(self) -> Result<RegisterInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        let email = check_email(&self.email, &mut errors);
        let password = check_new_password(
            &self.password,
            &self.confirm_password,
            "password",
            "confirm_password",
            &mut errors,
        );

        match email {
            Some(email) => errors.into_result(RegisterInput { email, password }),
            None => Err(errors),
        }
    }
}

/// Change-password form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangePasswordForm {
    #[serde(default, alias = "newPassword")]
    pub new_password: String,
    #[serde(default, alias = "confirmNewPassword")]
    pub confirm_new_password: String,
}

impl ChangePasswordForm {
    /// Check the form, returning the new password.
    ///
    /// # Errors
    ///
    /// Returns the per-field messages when any rule fails.
    pub fn validate(self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::new();
        let password = check_new_password(
            &self.new_password,
            &self.confirm_new_password,
            "new_password",
            "confirm_new_password",
            &mut errors,
        );
        errors.into_result(password)
    }
}

fn check_email(raw: &str, errors: &mut FieldErrors) -> Option<Email> {
    let parsed = Email::parse(raw).ok();
    if parsed.is_none() {
        errors.add("email", VALID_EMAIL_REQUIRED);
    }
    parsed
}

/// Password strength plus confirmation. Rules apply to the raw input; the
/// returned password and the comparison use trimmed values.
fn check_new_password(
    password: &str,
    confirm: &str,
    field: &str,
    confirm_field: &str,
    errors: &mut FieldErrors,
) -> String {
    for message in password_problems(password) {
        errors.add(field, message);
    }

    let password = password.trim();
    if password != confirm.trim() {
        errors.add(confirm_field, PASSWORDS_DONT_MATCH);
    }
    password.to_owned()
}

/// Every strength rule `password` breaks, in a fixed order.
#[must_use]
pub fn password_problems(password: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();

    if password.is_empty() {
        problems.push(MUST_NOT_BE_EMPTY);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(TOO_SHORT);
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        problems.push(NEEDS_LETTER);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push(NEEDS_NUMBER);
    }
    if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        problems.push(NEEDS_SPECIAL);
    }

    problems
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_login_ok() {
        let input = LoginForm {
            email: " shopper@example.com ".to_owned(),
            password: "x".to_owned(),
        }
        .validate()
        .unwrap();
        assert_eq!(input.email.as_str(), "shopper@example.com");
    }

    #[test]
    fn test_login_reports_both_fields() {
        let errors = LoginForm::default().validate().unwrap_err();
        assert_eq!(errors.get("email"), [VALID_EMAIL_REQUIRED]);
        assert_eq!(errors.get("password"), [PASSWORD_REQUIRED]);
    }

    #[test]
    fn test_password_rules() {
        assert!(password_problems("abc1!").is_empty());
        assert_eq!(
            password_problems(""),
            [MUST_NOT_BE_EMPTY, TOO_SHORT, NEEDS_LETTER, NEEDS_NUMBER, NEEDS_SPECIAL]
        );
        assert_eq!(password_problems("abcdef"), [NEEDS_NUMBER, NEEDS_SPECIAL]);
        assert_eq!(password_problems("12345!"), [NEEDS_LETTER]);
        assert_eq!(password_problems("a1!"), [TOO_SHORT]);
    }

    #[test]
    fn test_register_mismatch_on_confirm_field() {
        let errors = RegisterForm {
            email: "new@example.com".to_owned(),
            password: "abc12!".to_owned(),
            confirm_password: "abc12?".to_owned(),
        }
        .validate()
        .unwrap_err();
        assert!(errors.get("password").is_empty());
        assert_eq!(errors.get("confirm_password"), [PASSWORDS_DONT_MATCH]);
    }

    #[test]
    fn test_register_trims_password() {
        let input = RegisterForm {
            email: "new@example.com".to_owned(),
            password: " abc12! ".to_owned(),
            confirm_password: "abc12!".to_owned(),
        }
        .validate()
        .unwrap();
        assert_eq!(input.password, "abc12!");
    }

    #[test]
    fn test_change_password_fields() {
        let errors = ChangePasswordForm {
            new_password: "short".to_owned(),
            confirm_new_password: "short".to_owned(),
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.get("new_password"), [NEEDS_NUMBER, NEEDS_SPECIAL]);

        let ok = ChangePasswordForm {
            new_password: "n3w-pass".to_owned(),
            confirm_new_password: "n3w-pass".to_owned(),
        }
        .validate()
        .unwrap();
        assert_eq!(ok, "n3w-pass");
    }

    #[test]
    fn test_form_aliases() {
        let form: ChangePasswordForm =
            serde_json::from_str(r#"{"newPassword":"a1!aa","confirmNewPassword":"a1!aa"}"#).unwrap();
        assert_eq!(form.confirm_new_password, "a1!aa");
    }

    #[test]
    fn test_errors_serialize_as_map() {
        let errors = FieldErrors::single("email", EMAIL_ALREADY_REGISTERED);
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["email"][0], EMAIL_ALREADY_REGISTERED);
        assert_eq!(
            errors.to_string(),
            "email: Email is already registered. Try logging in instead."
        );
    }
}
