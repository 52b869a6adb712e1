//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted team name, in characters, once trimmed.
pub const MAX_TEAM_NAME_CHARS: usize = 12;

/// Validates that a team name is 1 to 12 printable characters once trimmed.
///
/// ```ignore
/// validate_team_name("Ballers")        // Ok
/// validate_team_name("   ")            // Err - blank
/// validate_team_name("Thirteen chars") // Err - too long
/// ```
pub fn validate_team_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    let count = trimmed.chars().count();

    if count == 0 || count > MAX_TEAM_NAME_CHARS {
        let mut err = ValidationError::new("team_name_length");
        err.message = Some(
            format!("Team name must be 1 to {MAX_TEAM_NAME_CHARS} characters (got {count})").into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("team_name_format");
        err.message = Some("Team name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_names_up_to_twelve_characters() {
        assert!(validate_team_name("A").is_ok());
        assert!(validate_team_name("Twelve chars").is_ok());
        assert!(validate_team_name("  padded  ").is_ok());
        assert!(validate_team_name("Équipe").is_ok());
    }

    #[test]
    fn rejects_blank_or_long_names() {
        assert!(validate_team_name("").is_err());
        assert!(validate_team_name("    ").is_err());
        assert!(validate_team_name("Thirteen char").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(validate_team_name("tab\there").is_err());
    }
}
