//! Module and training progress rows

use rusqlite::{params, Connection, OptionalExtension, Row};
use training_engine::{ModuleProgress, StepEvidence, TrainingProgress};

use super::{decode_optional_time, decode_time, encode_time};
use crate::error::StorageError;

struct ModuleProgressRow {
    user_id: String,
    module_id: String,
    training_id: String,
    started_at: String,
    completed_at: Option<String>,
    score: Option<u8>,
    time_spent_seconds: i64,
    attempts: u32,
    evidence_json: Option<String>,
}

impl ModuleProgressRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            module_id: row.get("module_id")?,
            training_id: row.get("training_id")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            score: row.get("score")?,
            time_spent_seconds: row.get("time_spent_seconds")?,
            attempts: row.get("attempts")?,
            evidence_json: row.get("evidence_json")?,
        })
    }

    fn decode(self) -> Result<ModuleProgress, StorageError> {
        let evidence = self
            .evidence_json
            .as_deref()
            .map(serde_json::from_str::<StepEvidence>)
            .transpose()?;

        Ok(ModuleProgress {
            started_at: decode_time(&self.started_at)?,
            completed_at: decode_optional_time(self.completed_at)?,
            user_id: self.user_id,
            training_id: self.training_id,
            module_id: self.module_id,
            score: self.score,
            time_spent_seconds: self.time_spent_seconds.max(0) as u64,
            attempts: self.attempts,
            evidence,
        })
    }
}

const MODULE_PROGRESS_COLUMNS: &str = "user_id, module_id, training_id, started_at, completed_at, \
     score, time_spent_seconds, attempts, evidence_json";

/// Insert or update the progress row of (user, module). A completed row is
/// never turned back into an uncompleted one.
pub fn upsert_module_progress(conn: &Connection, record: &ModuleProgress) -> Result<(), StorageError> {
    let evidence_json = record
        .evidence
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO module_progress (
            user_id, module_id, training_id, started_at, completed_at,
            score, time_spent_seconds, attempts, evidence_json
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(user_id, module_id) DO UPDATE SET
            training_id = excluded.training_id,
            started_at = excluded.started_at,
            completed_at = COALESCE(module_progress.completed_at, excluded.completed_at),
            score = excluded.score,
            time_spent_seconds = excluded.time_spent_seconds,
            attempts = excluded.attempts,
            evidence_json = excluded.evidence_json
         WHERE excluded.completed_at IS NOT NULL OR module_progress.completed_at IS NULL",
        params![
            record.user_id,
            record.module_id,
            record.training_id,
            encode_time(&record.started_at),
            record.completed_at.as_ref().map(encode_time),
            record.score,
            i64::try_from(record.time_spent_seconds).unwrap_or(i64::MAX),
            record.attempts,
            evidence_json,
        ],
    )?;
    Ok(())
}

pub fn get_module_progress(
    conn: &Connection,
    user_id: &str,
    module_id: &str,
) -> Result<Option<ModuleProgress>, StorageError> {
    let sql = format!(
        "SELECT {} FROM module_progress WHERE user_id = ?1 AND module_id = ?2",
        MODULE_PROGRESS_COLUMNS
    );
    conn.query_row(&sql, params![user_id, module_id], ModuleProgressRow::from_row)
        .optional()?
        .map(ModuleProgressRow::decode)
        .transpose()
}

/// All progress rows of a user within one training
pub fn list_module_progress(
    conn: &Connection,
    user_id: &str,
    training_id: &str,
) -> Result<Vec<ModuleProgress>, StorageError> {
    let sql = format!(
        "SELECT {} FROM module_progress WHERE user_id = ?1 AND training_id = ?2",
        MODULE_PROGRESS_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![user_id, training_id], ModuleProgressRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(ModuleProgressRow::decode).collect()
}

struct TrainingProgressRow {
    user_id: String,
    training_id: String,
    percentage: u8,
    completed_at: Option<String>,
    average_score: Option<u8>,
    updated_at: String,
}

impl TrainingProgressRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            training_id: row.get("training_id")?,
            percentage: row.get("percentage")?,
            completed_at: row.get("completed_at")?,
            average_score: row.get("average_score")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn decode(self) -> Result<TrainingProgress, StorageError> {
        Ok(TrainingProgress {
            completed_at: decode_optional_time(self.completed_at)?,
            updated_at: decode_time(&self.updated_at)?,
            user_id: self.user_id,
            training_id: self.training_id,
            percentage: self.percentage,
            average_score: self.average_score,
        })
    }
}

pub fn get_training_progress(
    conn: &Connection,
    user_id: &str,
    training_id: &str,
) -> Result<Option<TrainingProgress>, StorageError> {
    conn.query_row(
        "SELECT user_id, training_id, percentage, completed_at, average_score, updated_at
         FROM training_progress WHERE user_id = ?1 AND training_id = ?2",
        params![user_id, training_id],
        TrainingProgressRow::from_row,
    )
    .optional()?
    .map(TrainingProgressRow::decode)
    .transpose()
}

/// Aggregates of every training the user has touched
pub fn list_training_progress(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<TrainingProgress>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, training_id, percentage, completed_at, average_score, updated_at
         FROM training_progress WHERE user_id = ? ORDER BY training_id",
    )?;
    let rows = stmt
        .query_map([user_id], TrainingProgressRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(TrainingProgressRow::decode).collect()
}

/// Percentage and completion only move forward
pub fn upsert_training_progress(conn: &Connection, record: &TrainingProgress) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO training_progress (
            user_id, training_id, percentage, completed_at, average_score, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id, training_id) DO UPDATE SET
            percentage = MAX(training_progress.percentage, excluded.percentage),
            completed_at = COALESCE(training_progress.completed_at, excluded.completed_at),
            average_score = excluded.average_score,
            updated_at = excluded.updated_at",
        params![
            record.user_id,
            record.training_id,
            record.percentage,
            record.completed_at.as_ref().map(encode_time),
            record.average_score,
            encode_time(&record.updated_at),
        ],
    )?;
    Ok(())
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

    #[test]
    fn test_started_then_completed_row() {
        let conn = conn();
        let now = Utc::now();
        let started = ModuleProgress::started("u1", "t1", "m1", now);
        upsert_module_progress(&conn, &started).unwrap();

        let read = get_module_progress(&conn, "u1", "m1").unwrap().unwrap();
        assert_eq!(read, started);
        assert!(!read.is_completed());

        let completed = ModuleProgress {
            completed_at: Some(now),
            score: Some(92),
            time_spent_seconds: 300,
            attempts: 1,
            evidence: Some(StepEvidence::QuizAnswers { answers: vec![1, 0, 2] }),
            ..started
        };
        upsert_module_progress(&conn, &completed).unwrap();

        let rows = list_module_progress(&conn, "u1", "t1").unwrap();
        assert_eq!(rows, vec![completed]);
    }

    #[test]
    fn test_progress_scoped_by_user_and_training() {
        let conn = conn();
        let now = Utc::now();
        upsert_module_progress(&conn, &ModuleProgress::started("u1", "t1", "m1", now)).unwrap();
        upsert_module_progress(&conn, &ModuleProgress::started("u1", "t2", "x1", now)).unwrap();
        upsert_module_progress(&conn, &ModuleProgress::started("u2", "t1", "m1", now)).unwrap();

        assert_eq!(list_module_progress(&conn, "u1", "t1").unwrap().len(), 1);
        assert_eq!(list_module_progress(&conn, "u2", "t1").unwrap().len(), 1);
        assert!(list_module_progress(&conn, "u3", "t1").unwrap().is_empty());
    }

    #[test]
    fn test_training_progress_upsert() {
        let conn = conn();
        let now = Utc::now();
        let mut aggregate = TrainingProgress::new("u1", "t1", now);
        aggregate.percentage = 50;
        upsert_training_progress(&conn, &aggregate).unwrap();

        aggregate.percentage = 100;
        aggregate.completed_at = Some(now);
        aggregate.average_score = Some(88);
        upsert_training_progress(&conn, &aggregate).unwrap();

        let read = get_training_progress(&conn, "u1", "t1").unwrap().unwrap();
        assert_eq!(read, aggregate);
        assert!(read.is_completed());
        assert_eq!(list_training_progress(&conn, "u1").unwrap().len(), 1);
        assert!(get_training_progress(&conn, "u1", "t9").unwrap().is_none());
    }

    #[test]
    fn test_started_row_does_not_uncomplete() {
        let conn = conn();
        let now = Utc::now();
        let started = ModuleProgress::started("u1", "t1", "m1", now);
        let completed = ModuleProgress {
            completed_at: Some(now),
            score: Some(80),
            attempts: 1,
            ..started.clone()
        };
        upsert_module_progress(&conn, &completed).unwrap();
        upsert_module_progress(&conn, &started).unwrap();

        let read = get_module_progress(&conn, "u1", "m1").unwrap().unwrap();
        assert_eq!(read, completed);
    }

    #[test]
    fn test_training_progress_never_drops() {
        let conn = conn();
        let now = Utc::now();
        let mut higher = TrainingProgress::new("u1", "t1", now);
        higher.percentage = 100;
        higher.completed_at = Some(now);
        upsert_training_progress(&conn, &higher).unwrap();

        let mut lower = TrainingProgress::new("u1", "t1", now);
        lower.percentage = 25;
        upsert_training_progress(&conn, &lower).unwrap();

        let read = get_training_progress(&conn, "u1", "t1").unwrap().unwrap();
        assert_eq!(read.percentage, 100);
        assert_eq!(read.completed_at, higher.completed_at);
    }
}
