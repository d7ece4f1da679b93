use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{require, ValidationError};

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is valid")
});

const USERNAME_FORBIDDEN: &str = " \t\n\r,.<>/?;':\"\\|[]{}-=+~`!@#$%^&*()";
const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 7;

/// Registration payload. Only ever held long enough to hash the password.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewUser {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !username_is_valid(&self.username) {
            return Err(ValidationError::new(
                "username must be at least 3 characters and contain no spaces or punctuation",
            ));
        }
        require(&self.name, "name")?;
        if !EMAIL.is_match(&self.email) {
            return Err(ValidationError::new("email is not a valid address"));
        }
        if !password_is_valid(&self.password) {
            return Err(ValidationError::new(
                "password must be at least 7 characters with upper and lower case letters, a digit and a symbol",
            ));
        }
        Ok(())
    }
}

/// What the API returns for a user. Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UserView {
    pub username: String,
    pub name: String,
    pub email: String,
}

impl From<&NewUser> for UserView {
    fn from(user: &NewUser) -> Self {
        Self {
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

fn username_is_valid(username: &str) -> bool {
    username.chars().count() >= MIN_USERNAME_LEN
        && !username.chars().any(|c| USERNAME_FORBIDDEN.contains(c))
}

fn password_is_valid(password: &str) -> bool {
    let (mut upper, mut lower, mut digit, mut symbol) = (false, false, false, false);
    for c in password.chars() {
        if c.is_uppercase() {
            upper = true;
        } else if c.is_lowercase() {
            lower = true;
        } else if c.is_numeric() {
            digit = true;
        } else if !c.is_whitespace() && !c.is_control() && !c.is_alphanumeric() {
            symbol = true;
        } else {
            return false;
        }
    }
    upper && lower && digit && symbol && password.len() >= MIN_PASSWORD_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: &str, email: &str, password: &str) -> NewUser {
        NewUser {
            username: username.into(),
            name: "Test User".into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn test_valid_user_passes() {
        assert!(user("alice", "alice@example.com", "Secret1!").validate().is_ok());
    }

    #[test]
    fn test_username_rules() {
        assert!(!username_is_valid("al"));
        assert!(!username_is_valid("al ice"));
        assert!(!username_is_valid("al.ice"));
        assert!(!username_is_valid("al-ice"));
        assert!(username_is_valid("alice_99"));
    }

    #[test]
    fn test_password_rules() {
        assert!(password_is_valid("Abcde1!"));
        assert!(!password_is_valid("Abc1!"), "too short");
        assert!(!password_is_valid("abcdef1!"), "no upper");
        assert!(!password_is_valid("ABCDEF1!"), "no lower");
        assert!(!password_is_valid("Abcdefg!"), "no digit");
        assert!(!password_is_valid("Abcdefg1"), "no symbol");
        assert!(!password_is_valid("Abc def1!"), "space");
    }

    #[test]
    fn test_email_rules() {
        assert!(user("alice", "not-an-email", "Secret1!").validate().is_err());
        assert!(user("alice", "a@b", "Secret1!").validate().is_ok());
    }

    #[test]
    fn test_view_serialization_has_no_password() {
        let view = UserView::from(&user("alice", "alice@example.com", "Secret1!"));
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["username"], "alice");
    }
}
