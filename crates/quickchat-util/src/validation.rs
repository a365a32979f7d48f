use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
    #[error("invalid format")]
    InvalidFormat,
}

pub fn validate_full_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().len();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 64 {
        return Err(ValidationError::TooLong { max: 64, got: len });
    }
    Ok(())
}

pub fn validate_bio(bio: &str) -> Result<(), ValidationError> {
    if bio.len() > 500 {
        return Err(ValidationError::TooLong {
            max: 500,
            got: bio.len(),
        });
    }
    Ok(())
}

pub fn validate_message_text(text: &str) -> Result<(), ValidationError> {
    let len = text.len();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 4000 {
        return Err(ValidationError::TooLong { max: 4000, got: len });
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.len() > 255 {
        return Err(ValidationError::TooLong {
            max: 255,
            got: email.len(),
        });
    }
    let parts: Vec<&str> = email.splitn(2, '@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ValidationError::InvalidFormat);
    }
    if !parts[1].contains('.') {
        return Err(ValidationError::InvalidFormat);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.len();
    if len < 8 {
        return Err(ValidationError::TooShort { min: 8, got: len });
    }
    if len > 128 {
        return Err(ValidationError::TooLong { max: 128, got: len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_requires_local_domain_and_dot() {
        assert!(validate_email("a@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@nodot").is_err());
    }

    #[test]
    fn password_length_bounds() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long-enough-pass").is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn message_text_bounds() {
        assert!(validate_message_text("").is_err());
        assert!(validate_message_text("hi").is_ok());
        assert!(validate_message_text(&"x".repeat(4001)).is_err());
    }
}
