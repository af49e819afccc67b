//! Certificate records

use rusqlite::{params, Connection, OptionalExtension, Row};
use training_engine::Certificate;

use super::{decode_time, encode_time};
use crate::error::StorageError;

struct CertificateRow {
    certificate_number: String,
    user_id: String,
    training_id: String,
    issued_at: String,
}

impl CertificateRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            certificate_number: row.get("certificate_number")?,
            user_id: row.get("user_id")?,
            training_id: row.get("training_id")?,
            issued_at: row.get("issued_at")?,
        })
    }

    fn decode(self) -> Result<Certificate, StorageError> {
        Ok(Certificate {
            issued_at: decode_time(&self.issued_at)?,
            user_id: self.user_id,
            training_id: self.training_id,
            certificate_number: self.certificate_number,
        })
    }
}

/// Insert a certificate. Never overwrites: a taken number or a second
/// certificate for the same (user, training) is `Conflict`.
pub fn insert_certificate(conn: &Connection, certificate: &Certificate) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO certificates (certificate_number, user_id, training_id, issued_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            certificate.certificate_number,
            certificate.user_id,
            certificate.training_id,
            encode_time(&certificate.issued_at),
        ],
    )?;
    Ok(())
}

pub fn find_certificate(
    conn: &Connection,
    user_id: &str,
    training_id: &str,
) -> Result<Option<Certificate>, StorageError> {
    conn.query_row(
        "SELECT certificate_number, user_id, training_id, issued_at
         FROM certificates WHERE user_id = ?1 AND training_id = ?2",
        params![user_id, training_id],
        CertificateRow::from_row,
    )
    .optional()?
    .map(CertificateRow::decode)
    .transpose()
}

pub fn list_certificates(conn: &Connection, user_id: &str) -> Result<Vec<Certificate>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT certificate_number, user_id, training_id, issued_at
         FROM certificates WHERE user_id = ? ORDER BY issued_at",
    )?;
    let rows = stmt
        .query_map([user_id], CertificateRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(CertificateRow::decode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use chrono::Utc;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    fn certificate(user: &str, training: &str, number: &str) -> Certificate {
        Certificate {
            user_id: user.into(),
            training_id: training.into(),
            certificate_number: number.into(),
            issued_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let conn = conn();
        let cert = certificate("u1", "t1", "CERT-20250101-0A1B2C3D");
        insert_certificate(&conn, &cert).unwrap();

        assert_eq!(find_certificate(&conn, "u1", "t1").unwrap(), Some(cert));
        assert!(find_certificate(&conn, "u2", "t1").unwrap().is_none());
    }

    #[test]
    fn test_number_collision_is_conflict() {
        let conn = conn();
        insert_certificate(&conn, &certificate("u1", "t1", "CERT-1")).unwrap();

        let err = insert_certificate(&conn, &certificate("u2", "t1", "CERT-1")).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert!(find_certificate(&conn, "u2", "t1").unwrap().is_none());
    }

    #[test]
    fn test_second_certificate_for_training_is_conflict() {
        let conn = conn();
        insert_certificate(&conn, &certificate("u1", "t1", "CERT-1")).unwrap();

        let err = insert_certificate(&conn, &certificate("u1", "t1", "CERT-2")).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let kept = find_certificate(&conn, "u1", "t1").unwrap().unwrap();
        assert_eq!(kept.certificate_number, "CERT-1");
        assert_eq!(list_certificates(&conn, "u1").unwrap().len(), 1);
    }
}
