//! Training and module persistence

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;
use training_engine::{Module, ModuleCatalog, StepConfig, Training};

use crate::error::StorageError;

fn training_from_row(row: &Row) -> Result<Training, rusqlite::Error> {
    Ok(Training {
        id: row.get("id")?,
        title: row.get("title")?,
        xp_reward: row.get("xp_reward")?,
        coins_reward: row.get("coins_reward")?,
        certificate_enabled: row.get("certificate_enabled")?,
    })
}

/// Module row with the step config still encoded
struct ModuleRow {
    module: Module,
    step_json: String,
}

impl ModuleRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            module: Module {
                id: row.get("id")?,
                training_id: row.get("training_id")?,
                title: row.get("title")?,
                position: row.get("position")?,
                step: StepConfig::Content { body: None },
                duration_minutes: row.get("duration_minutes")?,
                xp_reward: row.get("xp_reward")?,
                coins_reward: row.get("coins_reward")?,
                is_checkpoint: row.get("is_checkpoint")?,
                min_score: row.get("min_score")?,
                is_preview: row.get("is_preview")?,
                is_optional: row.get("is_optional")?,
            },
            step_json: row.get("step_json")?,
        })
    }

    fn decode(self) -> Result<Module, StorageError> {
        let step: StepConfig = serde_json::from_str(&self.step_json).map_err(|e| {
            StorageError::Parse(format!("module {} has invalid step config: {}", self.module.id, e))
        })?;
        Ok(Module { step, ..self.module })
    }
}

/// Get a training by id
pub fn get_training(conn: &Connection, id: &str) -> Result<Option<Training>, StorageError> {
    let training = conn
        .query_row(
            "SELECT id, title, xp_reward, coins_reward, certificate_enabled
             FROM trainings WHERE id = ?",
            [id],
            training_from_row,
        )
        .optional()?;
    Ok(training)
}

/// List all trainings ordered by title
pub fn list_trainings(conn: &Connection) -> Result<Vec<Training>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, xp_reward, coins_reward, certificate_enabled
         FROM trainings ORDER BY title, id",
    )?;
    let trainings = stmt
        .query_map([], training_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(trainings)
}

/// Get the modules of a training in ordinal order
pub fn get_modules(conn: &Connection, training_id: &str) -> Result<Vec<Module>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT id, training_id, title, position, step_json, duration_minutes,
                xp_reward, coins_reward, is_checkpoint, min_score, is_preview, is_optional
         FROM modules WHERE training_id = ? ORDER BY position",
    )?;
    let rows = stmt
        .query_map([training_id], ModuleRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(ModuleRow::decode).collect()
}

/// Write a validated catalog, replacing any previous module list of the
/// training. Progress rows are left untouched.
pub fn save_catalog(conn: &mut Connection, catalog: &ModuleCatalog) -> Result<(), StorageError> {
    let training = catalog.training();
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO trainings (id, title, xp_reward, coins_reward, certificate_enabled, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            xp_reward = excluded.xp_reward,
            coins_reward = excluded.coins_reward,
            certificate_enabled = excluded.certificate_enabled,
            updated_at = excluded.updated_at",
        params![
            training.id,
            training.title,
            training.xp_reward,
            training.coins_reward,
            training.certificate_enabled,
        ],
    )?;

    tx.execute("DELETE FROM modules WHERE training_id = ?", [&training.id])?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO modules (
                id, training_id, title, position, step_type, step_json, duration_minutes,
                xp_reward, coins_reward, is_checkpoint, min_score, is_preview, is_optional
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for module in catalog.modules() {
            let step_json = serde_json::to_string(&module.step)?;
            stmt.execute(params![
                module.id,
                module.training_id,
                module.title,
                module.position,
                module.step_type().as_str(),
                step_json,
                module.duration_minutes,
                module.xp_reward,
                module.coins_reward,
                module.is_checkpoint,
                module.min_score,
                module.is_preview,
                module.is_optional,
            ])?;
        }
    }

    tx.commit()?;
    debug!(training_id = %training.id, modules = catalog.len(), "Catalog saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use training_engine::QuizQuestion;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    fn catalog(title: &str, count: u32) -> ModuleCatalog {
        let training = Training {
            id: "t1".into(),
            title: title.into(),
            xp_reward: 200,
            coins_reward: 20,
            certificate_enabled: true,
        };
        let modules = (0..count)
            .map(|i| Module {
                id: format!("t1-m{}", i),
                training_id: "t1".into(),
                title: format!("Module {}", i),
                position: i,
                step: if i == 1 {
                    StepConfig::Quiz {
                        questions: vec![QuizQuestion {
                            prompt: "2 + 2?".into(),
                            options: vec!["3".into(), "4".into()],
                            correct_option: 1,
                        }],
                        shuffle: false,
                    }
                } else {
                    StepConfig::Text { body: "text".into() }
                },
                duration_minutes: 10,
                xp_reward: 50,
                coins_reward: 5,
                is_checkpoint: i == 1,
                min_score: if i == 1 { Some(80) } else { None },
                is_preview: false,
                is_optional: false,
            })
            .collect();
        ModuleCatalog::new(training, modules).unwrap()
    }

    #[test]
    fn test_save_and_read_catalog() {
        let mut conn = conn();
        let source = catalog("Safety", 3);
        save_catalog(&mut conn, &source).unwrap();

        let training = get_training(&conn, "t1").unwrap().unwrap();
        assert_eq!(&training, source.training());

        let modules = get_modules(&conn, "t1").unwrap();
        assert_eq!(modules, source.modules());
        assert_eq!(modules[1].min_score, Some(80));
        assert!(matches!(modules[1].step, StepConfig::Quiz { .. }));
    }

    #[test]
    fn test_resave_replaces_modules() {
        let mut conn = conn();
        save_catalog(&mut conn, &catalog("Safety", 4)).unwrap();
        save_catalog(&mut conn, &catalog("Safety v2", 2)).unwrap();

        assert_eq!(get_training(&conn, "t1").unwrap().unwrap().title, "Safety v2");
        assert_eq!(get_modules(&conn, "t1").unwrap().len(), 2);
        assert_eq!(list_trainings(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_training() {
        let conn = conn();
        assert!(get_training(&conn, "nope").unwrap().is_none());
        assert!(get_modules(&conn, "nope").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_step_json_is_parse_error() {
        let mut conn = conn();
        save_catalog(&mut conn, &catalog("Safety", 1)).unwrap();
        conn.execute(
            "UPDATE modules SET step_json = '{\"step_type\":\"hologram\"}'",
            [],
        )
        .unwrap();

        let err = get_modules(&conn, "t1").unwrap_err();
        assert!(matches!(err, StorageError::Parse(_)));
    }
}
