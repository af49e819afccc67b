//! Domain model for trainings, modules, progress and rewards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Catalog types
// ============================================================================

/// A training: an ordered collection of modules completed in sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Training {
    pub id: String,
    pub title: String,
    /// XP granted once when every module is completed
    #[serde(default)]
    pub xp_reward: u32,
    #[serde(default)]
    pub coins_reward: u32,
    /// Issue a certificate on full completion
    #[serde(default)]
    pub certificate_enabled: bool,
}

/// Step type tag of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Content,
    Video,
    Quiz,
    ArenaGame,
    CognitiveTest,
    Reflection,
    PracticalChallenge,
    Simulation,
    Link,
    Pdf,
    Text,
}

impl StepType {
    pub const ALL: [StepType; 11] = [
        StepType::Content,
        StepType::Video,
        StepType::Quiz,
        StepType::ArenaGame,
        StepType::CognitiveTest,
        StepType::Reflection,
        StepType::PracticalChallenge,
        StepType::Simulation,
        StepType::Link,
        StepType::Pdf,
        StepType::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Content => "content",
            StepType::Video => "video",
            StepType::Quiz => "quiz",
            StepType::ArenaGame => "arena_game",
            StepType::CognitiveTest => "cognitive_test",
            StepType::Reflection => "reflection",
            StepType::PracticalChallenge => "practical_challenge",
            StepType::Simulation => "simulation",
            StepType::Link => "link",
            StepType::Pdf => "pdf",
            StepType::Text => "text",
        }
    }

    /// Whether completing this step yields a 0-100 score.
    pub fn produces_score(&self) -> bool {
        matches!(
            self,
            StepType::Quiz
                | StepType::ArenaGame
                | StepType::CognitiveTest
                | StepType::PracticalChallenge
                | StepType::Simulation
        )
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown step type '{}'", s))
    }
}

/// One multiple-choice question of a quiz step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    /// Index into `options`
    pub correct_option: usize,
}

/// Per-step configuration, one variant per step type.
///
/// Tagged by `step_type`; an unknown tag is a deserialization error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step_type", rename_all = "snake_case")]
pub enum StepConfig {
    Content {
        #[serde(default)]
        body: Option<String>,
    },
    Video {
        url: String,
        #[serde(default)]
        duration_seconds: Option<u32>,
        #[serde(default)]
        require_full_watch: bool,
    },
    Quiz {
        #[serde(default)]
        questions: Vec<QuizQuestion>,
        #[serde(default)]
        shuffle: bool,
    },
    ArenaGame {
        game_id: String,
        #[serde(default)]
        rounds: Option<u32>,
    },
    CognitiveTest {
        test_kind: String,
        #[serde(default)]
        time_limit_seconds: Option<u32>,
    },
    Reflection {
        prompt: String,
        #[serde(default)]
        min_words: Option<u32>,
    },
    PracticalChallenge {
        instructions: String,
        #[serde(default)]
        rubric: Vec<String>,
    },
    Simulation {
        scenario_id: String,
    },
    Link {
        url: String,
    },
    Pdf {
        url: String,
        #[serde(default)]
        pages: Option<u32>,
    },
    Text {
        body: String,
    },
}

impl StepConfig {
    pub fn step_type(&self) -> StepType {
        match self {
            StepConfig::Content { .. } => StepType::Content,
            StepConfig::Video { .. } => StepType::Video,
            StepConfig::Quiz { .. } => StepType::Quiz,
            StepConfig::ArenaGame { .. } => StepType::ArenaGame,
            StepConfig::CognitiveTest { .. } => StepType::CognitiveTest,
            StepConfig::Reflection { .. } => StepType::Reflection,
            StepConfig::PracticalChallenge { .. } => StepType::PracticalChallenge,
            StepConfig::Simulation { .. } => StepType::Simulation,
            StepConfig::Link { .. } => StepType::Link,
            StepConfig::Pdf { .. } => StepType::Pdf,
            StepConfig::Text { .. } => StepType::Text,
        }
    }

    /// Grade quiz answers as a rounded percentage of correct answers.
    ///
    /// Returns `None` for non-quiz steps and for quizzes without questions.
    /// Missing trailing answers count as wrong.
    pub fn grade_quiz(&self, answers: &[usize]) -> Option<u8> {
        let StepConfig::Quiz { questions, .. } = self else {
            return None;
        };
        if questions.is_empty() {
            return None;
        }
        let correct = questions
            .iter()
            .zip(answers.iter())
            .filter(|(q, a)| q.correct_option == **a)
            .count();
        Some(rounded_percent(correct, questions.len()))
    }
}

/// A learning unit within a training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub training_id: String,
    pub title: String,
    /// Ordinal position within the training
    pub position: u32,
    pub step: StepConfig,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub xp_reward: u32,
    #[serde(default)]
    pub coins_reward: u32,
    #[serde(default)]
    pub is_checkpoint: bool,
    /// Minimum score (0-100) the next module requires of this one
    #[serde(default)]
    pub min_score: Option<u8>,
    /// Preview modules are never locked
    #[serde(default)]
    pub is_preview: bool,
    #[serde(default)]
    pub is_optional: bool,
}

impl Module {
    pub fn step_type(&self) -> StepType {
        self.step.step_type()
    }
}

// ============================================================================
// Progress types
// ============================================================================

/// Evidence attached to a completion, keyed by the kind of step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepEvidence {
    QuizAnswers { answers: Vec<usize> },
    Reflection { text: String },
    VideoWatch { watched_seconds: u32 },
    /// Result reported by an embedded game, test, challenge or simulation
    External { payload: serde_json::Value },
}

impl StepEvidence {
    pub fn kind(&self) -> &'static str {
        match self {
            StepEvidence::QuizAnswers { .. } => "quiz_answers",
            StepEvidence::Reflection { .. } => "reflection",
            StepEvidence::VideoWatch { .. } => "video_watch",
            StepEvidence::External { .. } => "external",
        }
    }

    /// Whether this evidence can come from a step of the given type.
    pub fn fits(&self, step_type: StepType) -> bool {
        match self {
            StepEvidence::QuizAnswers { .. } => step_type == StepType::Quiz,
            StepEvidence::Reflection { .. } => step_type == StepType::Reflection,
            StepEvidence::VideoWatch { .. } => step_type == StepType::Video,
            StepEvidence::External { .. } => matches!(
                step_type,
                StepType::ArenaGame
                    | StepType::CognitiveTest
                    | StepType::PracticalChallenge
                    | StepType::Simulation
            ),
        }
    }
}

/// What the learner submits when finishing a module.
///
/// For a quiz with questions, `QuizAnswers` evidence is graded and the
/// graded score replaces `score`. Otherwise `score` is taken as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    #[serde(default)]
    pub score: Option<u8>,
    #[serde(default)]
    pub time_spent_seconds: u64,
    #[serde(default)]
    pub evidence: Option<StepEvidence>,
}

impl CompletionResult {
    pub fn with_score(score: u8) -> Self {
        Self {
            score: Some(score),
            ..Default::default()
        }
    }

    pub fn time_spent(mut self, seconds: u64) -> Self {
        self.time_spent_seconds = seconds;
        self
    }

    pub fn evidence(mut self, evidence: StepEvidence) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

/// Per-(user, module) progress record.
///
/// The module counts as completed exactly when `completed_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub user_id: String,
    pub training_id: String,
    pub module_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: Option<u8>,
    pub time_spent_seconds: u64,
    /// Accepted completion submissions
    pub attempts: u32,
    pub evidence: Option<StepEvidence>,
}

impl ModuleProgress {
    /// A fresh "started" row with no completion.
    pub fn started(user_id: &str, training_id: &str, module_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            training_id: training_id.to_string(),
            module_id: module_id.to_string(),
            started_at: now,
            completed_at: None,
            score: None,
            time_spent_seconds: 0,
            attempts: 0,
            evidence: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Per-(user, training) aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingProgress {
    pub user_id: String,
    pub training_id: String,
    /// 0-100, never decreases
    pub percentage: u8,
    pub completed_at: Option<DateTime<Utc>>,
    pub average_score: Option<u8>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingProgress {
    pub fn new(user_id: &str, training_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            training_id: training_id.to_string(),
            percentage: 0,
            completed_at: None,
            average_score: None,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

// ============================================================================
// Reward types
// ============================================================================

/// Event a reward grant is tied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    ModuleCompletion,
    TrainingCompletion,
}

impl RewardSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardSource::ModuleCompletion => "module_completion",
            RewardSource::TrainingCompletion => "training_completion",
        }
    }
}

impl fmt::Display for RewardSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "module_completion" => Ok(RewardSource::ModuleCompletion),
            "training_completion" => Ok(RewardSource::TrainingCompletion),
            other => Err(format!("unknown reward source '{}'", other)),
        }
    }
}

/// Request to credit XP and coins for one source event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRequest {
    pub user_id: String,
    pub xp: u32,
    pub coins: u32,
    pub source: RewardSource,
    /// Module id or training id, depending on `source`
    pub source_id: String,
}

/// Immutable XP/coin ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardGrant {
    pub id: String,
    pub user_id: String,
    pub xp: u32,
    pub coins: u32,
    pub source: RewardSource,
    pub source_id: String,
    pub granted_at: DateTime<Utc>,
}

/// One-per-(user, training) completion certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub user_id: String,
    pub training_id: String,
    pub certificate_number: String,
    pub issued_at: DateTime<Utc>,
}

/// round(100 * part / whole), 0 when `whole` is 0.
pub fn rounded_percent(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    let pct = ((part as f64) * 100.0 / (whole as f64)).round();
    pct.clamp(0.0, 100.0) as u8
}
