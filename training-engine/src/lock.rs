//! Lock evaluator.
//!
//! Pure functions over a catalog and a progress snapshot. Results are never
//! cached; callers re-evaluate after every progress mutation.

use crate::catalog::ModuleCatalog;
use crate::model::Module;
use crate::progress::ProgressSnapshot;

/// Whether `module` is inaccessible given the recorded progress.
///
/// - the first module by ordinal is never locked
/// - preview modules are never locked
/// - otherwise the predecessor must be completed and, when it declares a
///   `min_score`, its recorded score must meet it. A missing score fails
///   the threshold.
///
/// A module that is not part of the catalog is reported as locked.
pub fn is_locked(module: &Module, catalog: &ModuleCatalog, progress: &ProgressSnapshot) -> bool {
    if module.is_preview {
        return false;
    }

    let index = match catalog.index_of(&module.id) {
        Some(i) => i,
        None => return true,
    };
    if index == 0 {
        return false;
    }

    match catalog.predecessor(&module.id) {
        Some(prev) => !unlocks_successor(prev, progress),
        None => false,
    }
}

/// Convenience wrapper looking the module up by id.
pub fn is_locked_id(module_id: &str, catalog: &ModuleCatalog, progress: &ProgressSnapshot) -> bool {
    match catalog.get(module_id) {
        Some(module) => is_locked(module, catalog, progress),
        None => true,
    }
}

/// Whether `prev`'s recorded progress satisfies the unlock predicate for
/// the module after it.
pub fn unlocks_successor(prev: &Module, progress: &ProgressSnapshot) -> bool {
    let Some(record) = progress.get(&prev.id) else {
        return false;
    };
    if !record.is_completed() {
        return false;
    }
    match prev.min_score {
        Some(min) => record.score.map(|s| s >= min).unwrap_or(false),
        None => true,
    }
}

/// Ids of every locked module, in ordinal order.
pub fn locked_module_ids(catalog: &ModuleCatalog, progress: &ProgressSnapshot) -> Vec<String> {
    catalog
        .modules()
        .iter()
        .filter(|m| is_locked(m, catalog, progress))
        .map(|m| m.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::*;
    use crate::model::ModuleProgress;
    use chrono::Utc;

    fn completed(module_id: &str, score: Option<u8>) -> ModuleProgress {
        let mut p = ModuleProgress::started("u1", "t1", module_id, Utc::now());
        p.completed_at = Some(Utc::now());
        p.score = score;
        p.attempts = 1;
        p
    }

    fn catalog_with_threshold(min_score: Option<u8>) -> ModuleCatalog {
        let modules = vec![
            text_module("t1", "m0", 0),
            quiz_module("t1", "m1", 1, min_score),
            text_module("t1", "m2", 2),
        ];
        ModuleCatalog::new(training("t1"), modules).unwrap()
    }

    #[test]
    fn test_first_module_never_locked() {
        let catalog = ModuleCatalog::new(training("t1"), linear("t1", 4)).unwrap();
        let empty = ProgressSnapshot::default();
        assert!(!is_locked(catalog.first(), &catalog, &empty));

        let mut partial = ProgressSnapshot::default();
        partial.upsert(completed("m2", None));
        assert!(!is_locked(catalog.first(), &catalog, &partial));
    }

    #[test]
    fn test_preview_never_locked() {
        let mut modules = linear("t1", 4);
        modules[3].is_preview = true;
        let catalog = ModuleCatalog::new(training("t1"), modules).unwrap();
        let empty = ProgressSnapshot::default();
        assert!(!is_locked_id("m3", &catalog, &empty));
        assert!(is_locked_id("m2", &catalog, &empty));
    }

    #[test]
    fn test_locked_without_predecessor_completion() {
        let catalog = ModuleCatalog::new(training("t1"), linear("t1", 3)).unwrap();
        let mut progress = ProgressSnapshot::default();
        progress.upsert(ModuleProgress::started("u1", "t1", "m0", Utc::now()));
        assert!(is_locked_id("m1", &catalog, &progress));

        progress.upsert(completed("m0", None));
        assert!(!is_locked_id("m1", &catalog, &progress));
        assert!(is_locked_id("m2", &catalog, &progress));
    }

    #[test]
    fn test_threshold_compares_predecessor_score() {
        let catalog = catalog_with_threshold(Some(80));
        for (score, locked) in [(79, true), (80, false), (95, false), (0, true)] {
            let mut progress = ProgressSnapshot::default();
            progress.upsert(completed("m0", None));
            progress.upsert(completed("m1", Some(score)));
            assert_eq!(is_locked_id("m2", &catalog, &progress), locked, "score {}", score);
        }
    }

    #[test]
    fn test_missing_score_fails_threshold() {
        let catalog = catalog_with_threshold(Some(80));
        let mut progress = ProgressSnapshot::default();
        progress.upsert(completed("m0", None));
        progress.upsert(completed("m1", None));
        assert!(is_locked_id("m2", &catalog, &progress));
    }

    #[test]
    fn test_no_threshold_unlocks_on_completion() {
        let catalog = catalog_with_threshold(None);
        let mut progress = ProgressSnapshot::default();
        progress.upsert(completed("m1", Some(10)));
        assert!(!is_locked_id("m2", &catalog, &progress));
    }

    #[test]
    fn test_unknown_module_is_locked() {
        let catalog = catalog_with_threshold(None);
        assert!(is_locked_id("nope", &catalog, &ProgressSnapshot::default()));
    }

    #[test]
    fn test_locked_module_ids() {
        let catalog = ModuleCatalog::new(training("t1"), linear("t1", 4)).unwrap();
        let mut progress = ProgressSnapshot::default();
        progress.upsert(completed("m0", None));
        assert_eq!(locked_module_ids(&catalog, &progress), vec!["m2", "m3"]);
    }
}
