//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_DEVICE_ID_LEN: usize = 64;

/// Validates that a PIN is exactly six ASCII digits.
///
/// # Examples
///
/// ```ignore
/// validate_pin("482913") // Ok
/// validate_pin("48291")  // Err - too short
/// validate_pin("48291a") // Err - not a digit
/// ```
pub fn validate_pin(pin: &str) -> Result<(), ValidationError> {
    if pin.len() != 6 {
        let mut err = ValidationError::new("pin_length");
        err.message = Some(format!("PIN must be exactly 6 digits (got {})", pin.len()).into());
        return Err(err);
    }

    if !pin.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("pin_format");
        err.message = Some("PIN must contain only digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a caller supplied device identifier: 1 to 64 characters of
/// `[A-Za-z0-9_-]`, so it can be embedded in cache keys as is.
pub fn validate_device_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_DEVICE_ID_LEN {
        let mut err = ValidationError::new("device_id_length");
        err.message = Some(
            format!("Device ID must be 1 to {MAX_DEVICE_ID_LEN} characters (got {})", id.len()).into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("device_id_format");
        err.message = Some("Device ID may only contain letters, digits, '-' and '_'".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a display string is not blank.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pin_valid() {
        assert!(validate_pin("100000").is_ok());
        assert!(validate_pin("999999").is_ok());
        assert!(validate_pin("012345").is_ok());
    }

    #[test]
    fn test_validate_pin_invalid() {
        assert!(validate_pin("12345").is_err()); // too short
        assert!(validate_pin("1234567").is_err()); // too long
        assert!(validate_pin("12 456").is_err()); // space
        assert!(validate_pin("").is_err());
    }

    #[test]
    fn test_validate_device_id() {
        assert!(validate_device_id("3f2a9c0d8e7b4a1f9c2d3e4f5a6b7c8d").is_ok());
        assert!(validate_device_id("kiosk_01-a").is_ok());
        assert!(validate_device_id("").is_err());
        assert!(validate_device_id("device:1").is_err());
        assert!(validate_device_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("Retro").is_ok());
        assert!(validate_not_blank("   ").is_err());
    }
}
