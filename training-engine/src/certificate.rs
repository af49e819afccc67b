//! Certificate number generation

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Build a certificate number: `{PREFIX}-{YYYYMMDD}-{8 hex}`.
///
/// Numbers are random, not derived from the learner, so a collision is
/// possible in principle and the store must reject duplicates.
pub fn generate_certificate_number(prefix: &str, issued_at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("{}-{}-{}", prefix, issued_at.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_number_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        let number = generate_certificate_number("CERT", at);
        let parts: Vec<_> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CERT");
        assert_eq!(parts[1], "20260309");
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_numbers_differ() {
        let at = Utc::now();
        assert_ne!(
            generate_certificate_number("CERT", at),
            generate_certificate_number("CERT", at)
        );
    }
}
