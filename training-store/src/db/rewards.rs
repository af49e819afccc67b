//! XP/coin ledger
//!
//! Rows are never updated or deleted. The UNIQUE (user_id, source_type,
//! source_id) key turns a duplicate grant into `StorageError::Conflict`.

use rusqlite::{params, Connection, OptionalExtension, Row};
use training_engine::{RewardGrant, RewardSource};

use super::{decode_time, encode_time};
use crate::error::StorageError;

struct GrantRow {
    id: String,
    user_id: String,
    xp: u32,
    coins: u32,
    source_type: String,
    source_id: String,
    granted_at: String,
}

impl GrantRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            xp: row.get("xp")?,
            coins: row.get("coins")?,
            source_type: row.get("source_type")?,
            source_id: row.get("source_id")?,
            granted_at: row.get("granted_at")?,
        })
    }

    fn decode(self) -> Result<RewardGrant, StorageError> {
        let source: RewardSource = self.source_type.parse().map_err(StorageError::Parse)?;
        Ok(RewardGrant {
            granted_at: decode_time(&self.granted_at)?,
            id: self.id,
            user_id: self.user_id,
            xp: self.xp,
            coins: self.coins,
            source,
            source_id: self.source_id,
        })
    }
}

/// Append a grant
pub fn insert_grant(conn: &Connection, grant: &RewardGrant) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO reward_grants (id, user_id, xp, coins, source_type, source_id, granted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            grant.id,
            grant.user_id,
            grant.xp,
            grant.coins,
            grant.source.as_str(),
            grant.source_id,
            encode_time(&grant.granted_at),
        ],
    )?;
    Ok(())
}

pub fn find_grant(
    conn: &Connection,
    user_id: &str,
    source: RewardSource,
    source_id: &str,
) -> Result<Option<RewardGrant>, StorageError> {
    conn.query_row(
        "SELECT id, user_id, xp, coins, source_type, source_id, granted_at
         FROM reward_grants WHERE user_id = ?1 AND source_type = ?2 AND source_id = ?3",
        params![user_id, source.as_str(), source_id],
        GrantRow::from_row,
    )
    .optional()?
    .map(GrantRow::decode)
    .transpose()
}

/// Every grant of a user, oldest first
pub fn list_grants(conn: &Connection, user_id: &str) -> Result<Vec<RewardGrant>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, xp, coins, source_type, source_id, granted_at
         FROM reward_grants WHERE user_id = ? ORDER BY granted_at, id",
    )?;
    let rows = stmt
        .query_map([user_id], GrantRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(GrantRow::decode).collect()
}

/// XP and coin totals of a user
pub fn totals(conn: &Connection, user_id: &str) -> Result<(u64, u64), StorageError> {
    let (xp, coins): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(xp), 0), COALESCE(SUM(coins), 0) FROM reward_grants WHERE user_id = ?",
        [user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok((xp.max(0) as u64, coins.max(0) as u64))
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

    fn grant(id: &str, source: RewardSource, source_id: &str, xp: u32) -> RewardGrant {
        RewardGrant {
            id: id.into(),
            user_id: "u1".into(),
            xp,
            coins: xp / 10,
            source,
            source_id: source_id.into(),
            granted_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let conn = conn();
        let g = grant("g1", RewardSource::ModuleCompletion, "m1", 100);
        insert_grant(&conn, &g).unwrap();

        let found = find_grant(&conn, "u1", RewardSource::ModuleCompletion, "m1")
            .unwrap()
            .unwrap();
        assert_eq!(found, g);
        assert!(find_grant(&conn, "u1", RewardSource::TrainingCompletion, "m1")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_duplicate_source_is_conflict() {
        let conn = conn();
        insert_grant(&conn, &grant("g1", RewardSource::ModuleCompletion, "m1", 100)).unwrap();

        let err = insert_grant(&conn, &grant("g2", RewardSource::ModuleCompletion, "m1", 100))
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert_eq!(list_grants(&conn, "u1").unwrap().len(), 1);
    }

    #[test]
    fn test_totals() {
        let conn = conn();
        assert_eq!(totals(&conn, "u1").unwrap(), (0, 0));

        insert_grant(&conn, &grant("g1", RewardSource::ModuleCompletion, "m1", 100)).unwrap();
        insert_grant(&conn, &grant("g2", RewardSource::TrainingCompletion, "t1", 500)).unwrap();
        assert_eq!(totals(&conn, "u1").unwrap(), (600, 60));
    }
}
