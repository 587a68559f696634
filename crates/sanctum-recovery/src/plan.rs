//! The weighted-threshold chunk plan.
//!
//! A plain 3-of-5 scheme would let any three answers reconstruct the
//! secret. Here one question, the keystone, must always be among them:
//! it carries 3 of the 7 share weights, the other four carry 1 each, and
//! the threshold is 5. Any subset without the keystone maxes out at 4;
//! the keystone plus any two others reaches exactly 5.
//!
//! Word spans are engineered so that the keystone's range together with
//! any two other ranges covers the full 24-word secret, guaranteeing
//! complete coverage whenever the weight threshold is met.

use crate::errors::{RecoveryError, Result};
use sanctum_crypto::{
    KEYSTONE_WEIGHT, MEMBER_WEIGHT, QUESTION_COUNT, RECOVERY_THRESHOLD, SECRET_WORD_COUNT,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Word span assigned to the keystone question.
const KEYSTONE_SPAN: ChunkSpan = ChunkSpan { start: 0, end: 18 };

/// Word spans assigned to the four non-keystone questions, in the order
/// the questions are supplied. Every word index in `[18, 24)` is covered
/// by at least three of them, so any pair of non-keystone spans completes
/// the keystone's range.
const MEMBER_SPANS: [ChunkSpan; 4] = [
    ChunkSpan { start: 10, end: 24 },
    ChunkSpan { start: 6, end: 20 },
    ChunkSpan { start: 12, end: 24 },
    ChunkSpan { start: 16, end: 24 },
];

/// A personal security question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityQuestion {
    /// Stable identifier, used as the key in every vault map
    pub id: String,
    /// Prompt text shown to the user
    pub prompt: String,
    /// Whether this question is the mandatory keystone
    pub keystone: bool,
}

impl SecurityQuestion {
    /// Create a question.
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, keystone: bool) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            keystone,
        }
    }
}

/// A caller-supplied answer to one security question.
///
/// The answer text is a low-entropy secret; it is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Answer {
    /// Id of the question being answered
    pub question_id: String,
    /// The answer text, as typed (normalization happens at derivation)
    pub text: String,
}

impl Answer {
    /// Create an answer.
    pub fn new(question_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            text: text.into(),
        }
    }
}

impl std::fmt::Debug for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Answer")
            .field("question_id", &self.question_id)
            .field("text", &"..")
            .finish()
    }
}

/// A half-open word index range `[start, end)` over the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    /// First covered word index
    pub start: usize,
    /// One past the last covered word index
    pub end: usize,
}

impl ChunkSpan {
    /// Number of words covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span covers no words.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Whether the span covers the given word index.
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }
}

/// One question's row in the plan: its span and share weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// The question
    pub question: SecurityQuestion,
    /// Word span encrypted under this question's answer
    pub span: ChunkSpan,
    /// Share weight contributed by a correct answer
    pub weight: u32,
}

/// The static table mapping each question to a word span and share weight.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    entries: Vec<PlanEntry>,
}

impl ChunkPlan {
    /// Assign spans and weights to a question set.
    ///
    /// Requires exactly five questions with unique ids, exactly one of
    /// them flagged as the keystone. The keystone receives the wide span
    /// and weight 3; the remaining questions receive the member spans in
    /// the order supplied, weight 1 each.
    pub fn for_questions(questions: &[SecurityQuestion]) -> Result<Self> {
        if questions.len() != QUESTION_COUNT {
            return Err(RecoveryError::InvalidPlan(format!(
                "expected {} questions, got {}",
                QUESTION_COUNT,
                questions.len()
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for q in questions {
            if !seen.insert(q.id.as_str()) {
                return Err(RecoveryError::DuplicateQuestion(q.id.clone()));
            }
        }

        let keystone_count = questions.iter().filter(|q| q.keystone).count();
        if keystone_count != 1 {
            return Err(RecoveryError::InvalidPlan(format!(
                "expected exactly 1 keystone question, got {keystone_count}"
            )));
        }

        let mut member_spans = MEMBER_SPANS.iter();
        let entries = questions
            .iter()
            .map(|q| {
                let (span, weight) = if q.keystone {
                    (KEYSTONE_SPAN, KEYSTONE_WEIGHT)
                } else {
                    // Four non-keystone questions, four member spans.
                    (*member_spans.next().expect("member span per question"), MEMBER_WEIGHT)
                };
                PlanEntry {
                    question: q.clone(),
                    span,
                    weight,
                }
            })
            .collect();

        let plan = Self { entries };
        plan.verify_coverage()?;
        Ok(plan)
    }

    /// All plan entries, in the order the questions were supplied.
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Look up the entry for a question id.
    pub fn entry(&self, question_id: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.question.id == question_id)
    }

    /// Id of the keystone question.
    pub fn keystone_id(&self) -> &str {
        self.entries
            .iter()
            .find(|e| e.question.keystone)
            .map(|e| e.question.id.as_str())
            .expect("plan construction guarantees one keystone")
    }

    /// Check the structural invariants of the span/weight table.
    ///
    /// - every span lies inside `[0, 24)` and is non-empty
    /// - the union of all spans is the full secret range
    /// - the keystone span plus any two other spans is the full range
    /// - no keystone-free subset reaches the threshold, and the keystone
    ///   plus any two others does
    pub fn verify_coverage(&self) -> Result<()> {
        for entry in &self.entries {
            if entry.span.is_empty() || entry.span.end > SECRET_WORD_COUNT {
                return Err(RecoveryError::InvalidPlan(format!(
                    "span [{}, {}) for '{}' is out of bounds",
                    entry.span.start, entry.span.end, entry.question.id
                )));
            }
        }

        for index in 0..SECRET_WORD_COUNT {
            if !self.entries.iter().any(|e| e.span.contains(index)) {
                return Err(RecoveryError::InvalidPlan(format!(
                    "word {index} is covered by no span"
                )));
            }
        }

        let keystone = self
            .entries
            .iter()
            .find(|e| e.question.keystone)
            .ok_or_else(|| RecoveryError::InvalidPlan("no keystone entry".to_string()))?;
        let members: Vec<&PlanEntry> =
            self.entries.iter().filter(|e| !e.question.keystone).collect();

        let member_weight_total: u32 = members.iter().map(|e| e.weight).sum();
        if member_weight_total >= RECOVERY_THRESHOLD {
            return Err(RecoveryError::InvalidPlan(
                "non-keystone questions alone reach the threshold".to_string(),
            ));
        }

        for (i, a) in members.iter().enumerate() {
            for b in members.iter().skip(i + 1) {
                if keystone.weight + a.weight + b.weight < RECOVERY_THRESHOLD {
                    return Err(RecoveryError::InvalidPlan(format!(
                        "keystone plus '{}' and '{}' misses the threshold",
                        a.question.id, b.question.id
                    )));
                }
                for index in 0..SECRET_WORD_COUNT {
                    let covered = keystone.span.contains(index)
                        || a.span.contains(index)
                        || b.span.contains(index);
                    if !covered {
                        return Err(RecoveryError::InvalidPlan(format!(
                            "keystone plus '{}' and '{}' leaves word {index} uncovered",
                            a.question.id, b.question.id
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// A five-question set with `q3` as the keystone, shared across the
/// crate's unit tests.
#[cfg(test)]
pub(crate) fn five_questions() -> Vec<SecurityQuestion> {
    vec![
        SecurityQuestion::new("q1", "First pet's name?", false),
        SecurityQuestion::new("q2", "Street you grew up on?", false),
        SecurityQuestion::new("q3", "Mother's birthplace?", true),
        SecurityQuestion::new("q4", "First concert?", false),
        SecurityQuestion::new("q5", "Childhood best friend?", false),
    ]
}
