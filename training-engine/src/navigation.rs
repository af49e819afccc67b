//! Navigation controller: which module the learner is looking at.
//!
//! Holds only the identity of the current module; its index is derived
//! from the catalog on every call. Transitions never grant rewards.

use crate::catalog::ModuleCatalog;
use crate::error::{EngineError, EngineResult};
use crate::lock;
use crate::model::Module;
use crate::progress::ProgressSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationController {
    current: String,
}

impl NavigationController {
    /// Start at the resume target for the given progress.
    pub fn resume(catalog: &ModuleCatalog, progress: &ProgressSnapshot) -> Self {
        Self {
            current: resume_target(catalog, progress).id.clone(),
        }
    }

    pub fn current_id(&self) -> &str {
        &self.current
    }

    pub fn current<'a>(&self, catalog: &'a ModuleCatalog) -> Option<&'a Module> {
        catalog.get(&self.current)
    }

    pub fn current_index(&self, catalog: &ModuleCatalog) -> Option<usize> {
        catalog.index_of(&self.current)
    }

    pub fn can_go_previous(&self, catalog: &ModuleCatalog) -> bool {
        matches!(self.current_index(catalog), Some(i) if i > 0)
    }

    /// The next module exists and is not locked right now.
    pub fn can_go_next(&self, catalog: &ModuleCatalog, progress: &ProgressSnapshot) -> bool {
        match self.current_index(catalog) {
            Some(i) if i + 1 < catalog.len() => catalog
                .at(i + 1)
                .map(|next| !lock::is_locked(next, catalog, progress))
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn previous_target<'a>(&self, catalog: &'a ModuleCatalog) -> Option<&'a Module> {
        catalog.predecessor(&self.current)
    }

    pub fn next_target<'a>(&self, catalog: &'a ModuleCatalog) -> Option<&'a Module> {
        catalog.successor(&self.current)
    }

    /// Move to `module_id`. Locked or unknown targets leave the pointer
    /// where it is.
    pub fn select<'a>(
        &mut self,
        module_id: &str,
        catalog: &'a ModuleCatalog,
        progress: &ProgressSnapshot,
    ) -> EngineResult<&'a Module> {
        let module = catalog
            .get(module_id)
            .ok_or_else(|| EngineError::ModuleNotFound(module_id.to_string()))?;

        if lock::is_locked(module, catalog, progress) {
            return Err(EngineError::ModuleLocked(module_id.to_string()));
        }

        self.current = module.id.clone();
        Ok(module)
    }

    pub fn go_next<'a>(
        &mut self,
        catalog: &'a ModuleCatalog,
        progress: &ProgressSnapshot,
    ) -> EngineResult<&'a Module> {
        let next = self
            .next_target(catalog)
            .ok_or_else(|| EngineError::ModuleNotFound(format!("after {}", self.current)))?;
        self.select(&next.id, catalog, progress)
    }

    pub fn go_previous<'a>(
        &mut self,
        catalog: &'a ModuleCatalog,
        progress: &ProgressSnapshot,
    ) -> EngineResult<&'a Module> {
        let previous = self
            .previous_target(catalog)
            .ok_or_else(|| EngineError::ModuleNotFound(format!("before {}", self.current)))?;
        self.select(&previous.id, catalog, progress)
    }
}

/// First module that is neither completed nor locked; the last module when
/// everything is completed.
pub fn resume_target<'a>(catalog: &'a ModuleCatalog, progress: &ProgressSnapshot) -> &'a Module {
    catalog
        .modules()
        .iter()
        .find(|m| !progress.is_completed(&m.id) && !lock::is_locked(m, catalog, progress))
        .unwrap_or_else(|| catalog.last())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::*;
    use crate::model::ModuleProgress;
    use chrono::Utc;

    fn done(module_id: &str) -> ModuleProgress {
        let mut p = ModuleProgress::started("u1", "t1", module_id, Utc::now());
        p.completed_at = Some(Utc::now());
        p
    }

    fn catalog() -> ModuleCatalog {
        ModuleCatalog::new(training("t1"), linear("t1", 4)).unwrap()
    }

    #[test]
    fn test_resume_at_first_module() {
        let catalog = catalog();
        let nav = NavigationController::resume(&catalog, &ProgressSnapshot::default());
        assert_eq!(nav.current_id(), "m0");
        assert!(!nav.can_go_previous(&catalog));
        assert!(!nav.can_go_next(&catalog, &ProgressSnapshot::default()));
    }

    #[test]
    fn test_resume_after_completed_prefix() {
        let catalog = catalog();
        let progress = ProgressSnapshot::from_records(vec![done("m0"), done("m1")]);
        let nav = NavigationController::resume(&catalog, &progress);
        assert_eq!(nav.current_id(), "m2");
    }

    #[test]
    fn test_resume_when_all_done() {
        let catalog = catalog();
        let progress =
            ProgressSnapshot::from_records(vec![done("m0"), done("m1"), done("m2"), done("m3")]);
        assert_eq!(resume_target(&catalog, &progress).id, "m3");
    }

    #[test]
    fn test_can_go_next_tracks_lock() {
        let catalog = catalog();
        let mut progress = ProgressSnapshot::default();
        let nav = NavigationController::resume(&catalog, &progress);
        assert!(!nav.can_go_next(&catalog, &progress));

        progress.upsert(done("m0"));
        assert!(nav.can_go_next(&catalog, &progress));
    }

    #[test]
    fn test_cannot_go_next_from_last() {
        let catalog = catalog();
        let progress =
            ProgressSnapshot::from_records(vec![done("m0"), done("m1"), done("m2"), done("m3")]);
        let mut nav = NavigationController::resume(&catalog, &progress);
        nav.select("m3", &catalog, &progress).unwrap();
        assert!(!nav.can_go_next(&catalog, &progress));
        assert!(nav.can_go_previous(&catalog));
        assert!(nav.go_next(&catalog, &progress).is_err());
    }

    #[test]
    fn test_select_locked_is_rejected() {
        let catalog = catalog();
        let progress = ProgressSnapshot::default();
        let mut nav = NavigationController::resume(&catalog, &progress);
        let err = nav.select("m2", &catalog, &progress).unwrap_err();
        assert_eq!(err, EngineError::ModuleLocked("m2".into()));
        assert_eq!(nav.current_id(), "m0");
    }

    #[test]
    fn test_select_unknown_is_rejected() {
        let catalog = catalog();
        let progress = ProgressSnapshot::default();
        let mut nav = NavigationController::resume(&catalog, &progress);
        assert!(matches!(
            nav.select("zz", &catalog, &progress),
            Err(EngineError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn test_go_next_and_previous() {
        let catalog = catalog();
        let progress = ProgressSnapshot::from_records(vec![done("m0")]);
        let mut nav = NavigationController::resume(&catalog, &progress);
        assert_eq!(nav.current_id(), "m1");

        let prev = nav.go_previous(&catalog, &progress).unwrap();
        assert_eq!(prev.id, "m0");
        let next = nav.go_next(&catalog, &progress).unwrap();
        assert_eq!(next.id, "m1");
        assert!(matches!(
            nav.go_next(&catalog, &progress),
            Err(EngineError::ModuleLocked(_))
        ));
    }
}
