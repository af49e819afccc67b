//! Completion processor.
//!
//! Turns a learner's submission for one module into persisted progress and
//! rewards. Steps run strictly in this order, each awaiting the previous:
//!
//! 1. validate (checkpoint gate; nothing is written on rejection)
//! 2. upsert the module progress record
//! 3. grant the module reward (at most once)
//! 4. recompute and upsert the training aggregate
//! 5. when the training is at 100%: grant the training reward and issue the
//!    certificate (each at most once)
//!
//! Every step is safe to repeat. A call that failed halfway can be retried
//! with the same input; steps that already took effect are detected and
//! skipped, so progress may run ahead of rewards but never the reverse.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::ModuleCatalog;
use crate::certificate::generate_certificate_number;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::events::{EventBus, ProgressEvent};
use crate::lock;
use crate::model::{
    Certificate, CompletionResult, Module, ModuleProgress, RewardGrant, RewardRequest,
    RewardSource, StepEvidence, TrainingProgress,
};
use crate::progress::{self, ProgressSnapshot};
use crate::store::Collaborators;

/// Why a checkpoint submission was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub module_id: String,
    pub min_score: u8,
    pub score: Option<u8>,
}

impl Rejection {
    /// Inline message naming the unmet threshold.
    pub fn message(&self) -> String {
        match self.score {
            Some(score) => format!(
                "You need at least {}% to pass this checkpoint. You scored {}%. Try again.",
                self.min_score, score
            ),
            None => format!(
                "You need at least {}% to pass this checkpoint. Try again.",
                self.min_score
            ),
        }
    }
}

/// Result of ensuring a reward grant exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RewardStatus {
    /// Nothing to grant (zero-value reward, or not yet due)
    NotApplicable,
    Granted { grant: RewardGrant },
    /// An earlier call already wrote this grant
    AlreadyGranted,
}

impl RewardStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, RewardStatus::Granted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CertificateStatus {
    NotApplicable,
    Issued { certificate: Certificate },
    AlreadyIssued { certificate: Certificate },
}

impl CertificateStatus {
    pub fn certificate(&self) -> Option<&Certificate> {
        match self {
            CertificateStatus::Issued { certificate }
            | CertificateStatus::AlreadyIssued { certificate } => Some(certificate),
            CertificateStatus::NotApplicable => None,
        }
    }
}

/// What happened to one completion submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub accepted: bool,
    pub training_now_complete: bool,
    /// Set when `accepted` is false
    pub rejection: Option<Rejection>,
    /// The module had already been completed before this call
    pub already_completed: bool,
    /// Score recorded after this call
    pub score: Option<u8>,
    pub percentage: u8,
    pub module_reward: RewardStatus,
    pub training_reward: RewardStatus,
    pub certificate: CertificateStatus,
}

/// Validates completions and writes progress, rewards and certificates.
pub struct CompletionProcessor {
    deps: Collaborators,
    config: EngineConfig,
    events: Arc<EventBus>,
}

impl CompletionProcessor {
    pub fn new(deps: Collaborators, config: EngineConfig, events: Arc<EventBus>) -> Self {
        Self {
            deps,
            config,
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process a completion submission for `module_id`.
    pub async fn complete_module(
        &self,
        user_id: &str,
        catalog: &ModuleCatalog,
        module_id: &str,
        result: CompletionResult,
    ) -> EngineResult<CompletionOutcome> {
        self.complete_with_snapshot(user_id, catalog, module_id, result)
            .await
            .map(|(outcome, _)| outcome)
    }

    /// Same as [`complete_module`](Self::complete_module), also returning
    /// the progress snapshot read after the write.
    pub(crate) async fn complete_with_snapshot(
        &self,
        user_id: &str,
        catalog: &ModuleCatalog,
        module_id: &str,
        result: CompletionResult,
    ) -> EngineResult<(CompletionOutcome, ProgressSnapshot)> {
        let training = catalog.training();
        let module = catalog
            .get(module_id)
            .ok_or_else(|| EngineError::ModuleNotFound(module_id.to_string()))?;

        let before = self.read_snapshot(user_id, &training.id).await?;
        let existing = before.get(&module.id).cloned();
        let already_completed = existing.as_ref().map(|p| p.is_completed()).unwrap_or(false);

        if !already_completed && lock::is_locked(module, catalog, &before) {
            return Err(EngineError::ModuleLocked(module.id.clone()));
        }

        let result = normalize_result(module, result)?;

        // Step 1: checkpoint gate
        if let Some(rejection) = checkpoint_rejection(module, result.score) {
            debug!(
                user_id = %user_id,
                module_id = %module.id,
                min_score = rejection.min_score,
                score = ?rejection.score,
                "Checkpoint submission rejected"
            );
            self.events.emit(ProgressEvent::CompletionRejected {
                user_id: user_id.to_string(),
                module_id: module.id.clone(),
                min_score: rejection.min_score,
                score: rejection.score,
            });
            let percentage = progress::completion_percentage(catalog, &before);
            let outcome = CompletionOutcome {
                accepted: false,
                training_now_complete: percentage == 100,
                rejection: Some(rejection),
                already_completed,
                score: existing.as_ref().and_then(|p| p.score),
                percentage,
                module_reward: RewardStatus::NotApplicable,
                training_reward: RewardStatus::NotApplicable,
                certificate: CertificateStatus::NotApplicable,
            };
            return Ok((outcome, before));
        }

        // Step 2: module progress
        let now = Utc::now();
        let record = match existing {
            Some(prev) => ModuleProgress {
                completed_at: prev.completed_at.or(Some(now)),
                score: self.config.score_policy.merge(prev.score, result.score),
                time_spent_seconds: prev.time_spent_seconds.max(result.time_spent_seconds),
                attempts: prev.attempts.saturating_add(1),
                evidence: result.evidence.or(prev.evidence),
                ..prev
            },
            None => ModuleProgress {
                completed_at: Some(now),
                score: result.score,
                time_spent_seconds: result.time_spent_seconds,
                attempts: 1,
                evidence: result.evidence,
                ..ModuleProgress::started(user_id, &training.id, &module.id, now)
            },
        };
        self.deps.progress.upsert_module_progress(&record).await?;
        debug!(
            user_id = %user_id,
            module_id = %module.id,
            score = ?record.score,
            already_completed = already_completed,
            "Module progress written"
        );

        // Step 3: module reward
        let module_reward = self
            .ensure_grant(
                user_id,
                RewardSource::ModuleCompletion,
                &module.id,
                module.xp_reward,
                module.coins_reward,
            )
            .await?;

        // Step 4: training aggregate
        let after = self.read_snapshot(user_id, &training.id).await?;
        let previous = self
            .deps
            .progress
            .get_training_progress(user_id, &training.id)
            .await?;
        let computed = progress::completion_percentage(catalog, &after);
        let mut aggregate = previous.unwrap_or_else(|| TrainingProgress::new(user_id, &training.id, now));
        aggregate.percentage = aggregate.percentage.max(computed);
        aggregate.average_score = progress::average_score(catalog, &after);
        aggregate.updated_at = now;

        let newly_complete = aggregate.percentage == 100 && aggregate.completed_at.is_none();
        if newly_complete {
            aggregate.completed_at = Some(now);
        }
        self.deps.progress.upsert_training_progress(&aggregate).await?;

        self.events.emit(ProgressEvent::ModuleCompleted {
            user_id: user_id.to_string(),
            training_id: training.id.clone(),
            module_id: module.id.clone(),
            score: record.score,
            percentage: aggregate.percentage,
        });

        // Step 5: training reward and certificate
        let training_now_complete = aggregate.percentage == 100;
        let (training_reward, certificate) = if training_now_complete {
            if newly_complete {
                info!(user_id = %user_id, training_id = %training.id, "Training completed");
                self.events.emit(ProgressEvent::TrainingCompleted {
                    user_id: user_id.to_string(),
                    training_id: training.id.clone(),
                });
            }
            let reward = self
                .ensure_grant(
                    user_id,
                    RewardSource::TrainingCompletion,
                    &training.id,
                    training.xp_reward,
                    training.coins_reward,
                )
                .await?;
            let certificate = if training.certificate_enabled {
                self.ensure_certificate(user_id, &training.id).await?
            } else {
                CertificateStatus::NotApplicable
            };
            (reward, certificate)
        } else {
            (RewardStatus::NotApplicable, CertificateStatus::NotApplicable)
        };

        let outcome = CompletionOutcome {
            accepted: true,
            training_now_complete,
            rejection: None,
            already_completed,
            score: record.score,
            percentage: aggregate.percentage,
            module_reward,
            training_reward,
            certificate,
        };
        Ok((outcome, after))
    }

    async fn read_snapshot(&self, user_id: &str, training_id: &str) -> EngineResult<ProgressSnapshot> {
        let records = self.deps.progress.read_all(user_id, training_id).await?;
        Ok(ProgressSnapshot::from_records(records))
    }

    /// Write a grant unless one already exists for (user, source, source_id).
    async fn ensure_grant(
        &self,
        user_id: &str,
        source: RewardSource,
        source_id: &str,
        xp: u32,
        coins: u32,
    ) -> EngineResult<RewardStatus> {
        if xp == 0 && coins == 0 && !self.config.grant_zero_rewards {
            return Ok(RewardStatus::NotApplicable);
        }

        if self
            .deps
            .rewards
            .find_grant(user_id, source, source_id)
            .await?
            .is_some()
        {
            debug!(user_id = %user_id, source = %source, source_id = %source_id, "Reward already granted");
            return Ok(RewardStatus::AlreadyGranted);
        }

        let request = RewardRequest {
            user_id: user_id.to_string(),
            xp,
            coins,
            source,
            source_id: source_id.to_string(),
        };
        match self.deps.rewards.grant_xp_and_coins(&request).await {
            Ok(grant) => {
                info!(
                    user_id = %user_id,
                    source = %source,
                    source_id = %source_id,
                    xp = xp,
                    coins = coins,
                    "Reward granted"
                );
                self.events.emit(ProgressEvent::RewardGranted {
                    user_id: user_id.to_string(),
                    source,
                    source_id: source_id.to_string(),
                    xp,
                    coins,
                });
                Ok(RewardStatus::Granted { grant })
            }
            Err(StoreError::Conflict(reason)) => {
                // A concurrent duplicate submission won the race
                debug!(source_id = %source_id, reason = %reason, "Grant conflict treated as already granted");
                Ok(RewardStatus::AlreadyGranted)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Issue the learner's certificate for a training unless one exists.
    ///
    /// A conflict on create means either the learner already has one (a
    /// concurrent call got there first) or the random number collided with
    /// someone else's. The first is success; the second gets one retry with
    /// a fresh number before the conflict is reported.
    async fn ensure_certificate(
        &self,
        user_id: &str,
        training_id: &str,
    ) -> EngineResult<CertificateStatus> {
        if let Some(certificate) = self.deps.certificates.find(user_id, training_id).await? {
            return Ok(CertificateStatus::AlreadyIssued { certificate });
        }

        let mut last_conflict = None;
        for _ in 0..2 {
            let issued_at = Utc::now();
            let certificate = Certificate {
                user_id: user_id.to_string(),
                training_id: training_id.to_string(),
                certificate_number: generate_certificate_number(
                    &self.config.certificate_prefix,
                    issued_at,
                ),
                issued_at,
            };

            match self.deps.certificates.create(&certificate).await {
                Ok(()) => {
                    self.events.emit(ProgressEvent::CertificateIssued {
                        user_id: user_id.to_string(),
                        training_id: training_id.to_string(),
                        certificate_number: certificate.certificate_number.clone(),
                    });
                    return Ok(CertificateStatus::Issued { certificate });
                }
                Err(StoreError::Conflict(reason)) => {
                    if let Some(existing) = self.deps.certificates.find(user_id, training_id).await? {
                        return Ok(CertificateStatus::AlreadyIssued {
                            certificate: existing,
                        });
                    }
                    warn!(
                        number = %certificate.certificate_number,
                        reason = %reason,
                        "Certificate number collision"
                    );
                    last_conflict = Some(reason);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let reason = last_conflict.unwrap_or_else(|| "certificate number".to_string());
        Err(StoreError::Conflict(reason).into())
    }
}

/// Validate the submission against the module and fill in derived fields.
fn normalize_result(module: &Module, mut result: CompletionResult) -> EngineResult<CompletionResult> {
    let step_type = module.step_type();

    if let Some(score) = result.score {
        if score > 100 {
            return Err(EngineError::InvalidInput(format!(
                "score {} is outside 0-100",
                score
            )));
        }
    }

    if let Some(evidence) = &result.evidence {
        if !evidence.fits(step_type) {
            return Err(EngineError::InvalidInput(format!(
                "{} evidence does not match {} step",
                evidence.kind(),
                step_type
            )));
        }
        if let StepEvidence::QuizAnswers { answers } = evidence {
            if let Some(graded) = module.step.grade_quiz(answers) {
                if result.score.is_some_and(|s| s != graded) {
                    debug!(module_id = %module.id, graded, "Submitted score replaced by graded answers");
                }
                result.score = Some(graded);
            }
        }
    }

    if !step_type.produces_score() && result.score.is_some() {
        debug!(module_id = %module.id, step_type = %step_type, "Discarding score for unscored step");
        result.score = None;
    }

    Ok(result)
}

/// Checkpoints with a threshold reject missing or low scores. Nothing else
/// is gated here.
fn checkpoint_rejection(module: &Module, score: Option<u8>) -> Option<Rejection> {
    if !module.is_checkpoint {
        return None;
    }
    let min_score = module.min_score?;
    match score {
        Some(s) if s >= min_score => None,
        _ => Some(Rejection {
            module_id: module.id.clone(),
            min_score,
            score,
        }),
    }
}
