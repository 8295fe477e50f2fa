//! SDP Record
//!
//! The service record is handed to BlueZ as-is. The bundled record describes
//! a gamepad whose input report matches [`crate::domain::report`].

use crate::error::RegistrationError;
use std::fs;
use std::path::Path;

/// Record advertised when no override is configured
pub const DEFAULT_SERVICE_RECORD: &str = include_str!("../../../assets/sdp_record.xml");

/// Load the SDP record from `path`, or fall back to the bundled one.
pub fn load_service_record(path: Option<&Path>) -> Result<String, RegistrationError> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|source| RegistrationError::ServiceRecord {
            path: path.to_path_buf(),
            source,
        }),
        None => Ok(DEFAULT_SERVICE_RECORD.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record_advertises_hid() {
        let record = load_service_record(None).unwrap();
        assert!(record.contains(r#"<uuid value="0x1124" />"#));
        assert!(record.contains(r#"<attribute id="0x0206">"#));
    }

    #[test]
    fn test_override_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.xml");
        fs::write(&path, "<record></record>").unwrap();

        assert_eq!(load_service_record(Some(&path)).unwrap(), "<record></record>");
    }

    #[test]
    fn test_missing_override_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.xml");

        assert!(matches!(
            load_service_record(Some(&path)),
            Err(RegistrationError::ServiceRecord { .. })
        ));
    }
}
