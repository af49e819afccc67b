//! Module catalog: the validated, ordered module list of one training.
//!
//! Built once per training. Ordering and the predecessor of every module are
//! computed here so the lock evaluator never does index arithmetic.

use std::collections::HashMap;

use crate::error::CatalogError;
use crate::model::{Module, Training};

/// Ordered modules of a training plus the predecessor relation.
#[derive(Debug, Clone)]
pub struct ModuleCatalog {
    training: Training,
    modules: Vec<Module>,
    index: HashMap<String, usize>,
}

impl ModuleCatalog {
    /// Validate and order `modules` for `training`.
    ///
    /// Rejects empty lists, modules of another training, duplicate ids,
    /// ordinals that are not a dense sequence starting at 0 or 1, and
    /// score thresholds that can never be met.
    pub fn new(training: Training, mut modules: Vec<Module>) -> Result<Self, CatalogError> {
        if modules.is_empty() {
            return Err(CatalogError::Empty(training.id.clone()));
        }

        modules.sort_by_key(|m| m.position);

        let first = modules[0].position;
        if first > 1 {
            return Err(CatalogError::BadFirstOrdinal(first));
        }

        let mut index = HashMap::with_capacity(modules.len());
        for (i, module) in modules.iter().enumerate() {
            if module.training_id != training.id {
                return Err(CatalogError::ForeignModule {
                    module_id: module.id.clone(),
                    expected: training.id.clone(),
                    actual: module.training_id.clone(),
                });
            }

            let expected = first + i as u32;
            if module.position != expected {
                return Err(CatalogError::OrdinalGap {
                    module_id: module.id.clone(),
                    expected,
                    found: module.position,
                });
            }

            if let Some(min_score) = module.min_score {
                if min_score > 100 {
                    return Err(CatalogError::InvalidThreshold {
                        module_id: module.id.clone(),
                        min_score,
                    });
                }
                if !module.step_type().produces_score() {
                    return Err(CatalogError::UnscoredThreshold {
                        module_id: module.id.clone(),
                        step_type: module.step_type().to_string(),
                    });
                }
            }

            if index.insert(module.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateModule(module.id.clone()));
            }
        }

        Ok(Self {
            training,
            modules,
            index,
        })
    }

    pub fn training(&self) -> &Training {
        &self.training
    }

    /// Modules in ordinal order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, module_id: &str) -> Option<&Module> {
        self.index.get(module_id).map(|&i| &self.modules[i])
    }

    /// Position of the module in ordinal order (0-based).
    pub fn index_of(&self, module_id: &str) -> Option<usize> {
        self.index.get(module_id).copied()
    }

    pub fn at(&self, index: usize) -> Option<&Module> {
        self.modules.get(index)
    }

    pub fn first(&self) -> &Module {
        &self.modules[0]
    }

    pub fn last(&self) -> &Module {
        &self.modules[self.modules.len() - 1]
    }

    /// Immediately preceding module by ordinal, `None` for the first.
    pub fn predecessor(&self, module_id: &str) -> Option<&Module> {
        match self.index_of(module_id)? {
            0 => None,
            i => self.modules.get(i - 1),
        }
    }

    pub fn successor(&self, module_id: &str) -> Option<&Module> {
        let i = self.index_of(module_id)?;
        self.modules.get(i + 1)
    }

    pub fn is_first(&self, module_id: &str) -> bool {
        self.index_of(module_id) == Some(0)
    }
}
