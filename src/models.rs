use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Mcq,
    TrueFalse,
    MultipleCorrect,
    FillBlank,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Mcq => "mcq",
            QuestionType::TrueFalse => "true_false",
            QuestionType::MultipleCorrect => "multiple_correct",
            QuestionType::FillBlank => "fill_blank",
        }
    }

    pub fn has_options(self) -> bool {
        matches!(self, QuestionType::Mcq | QuestionType::MultipleCorrect)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const CYCLE: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// Correct answer stored with a question. Never sent to students.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerKey {
    Flag(bool),
    Index(usize),
    Indices(Vec<usize>),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub q_type: QuestionType,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<AnswerKey>,
}

impl Question {
    /// Key under which this question's answer is collected and graded: the id,
    /// or the display position when the id is blank.
    pub fn slot_key(&self, position: usize) -> String {
        if self.id.trim().is_empty() {
            position.to_string()
        } else {
            self.id.clone()
        }
    }

    /// Copy safe to hand to a student: no answer key, no explanation.
    pub fn masked(&self) -> Question {
        Question {
            correct: None,
            explanation: None,
            ..self.clone()
        }
    }

    pub fn option_count(&self) -> usize {
        self.options.as_ref().map(Vec::len).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Test {
    pub test_id: String,
    pub title: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TypeDistribution {
    #[serde(default)]
    pub mcq: u32,
    #[serde(default)]
    pub true_false: u32,
    #[serde(default)]
    pub multiple_correct: u32,
    #[serde(default)]
    pub fill_blank: u32,
}

impl TypeDistribution {
    /// Widened so that any combination of `u32` counts adds up.
    pub fn total(&self) -> u64 {
        [self.mcq, self.true_false, self.multiple_correct, self.fill_blank]
            .into_iter()
            .map(u64::from)
            .sum()
    }

    pub fn count(&self, q_type: QuestionType) -> u32 {
        match q_type {
            QuestionType::Mcq => self.mcq,
            QuestionType::TrueFalse => self.true_false,
            QuestionType::MultipleCorrect => self.multiple_correct,
            QuestionType::FillBlank => self.fill_blank,
        }
    }

    pub fn default_for(num_questions: u32) -> Self {
        let third = num_questions / 3;
        let sixth = num_questions / 6;
        let mcq = third.max(1);
        Self {
            mcq,
            true_false: third,
            multiple_correct: sixth,
            fill_blank: num_questions.saturating_sub(mcq + third + sixth),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DifficultyDistribution {
    #[serde(default)]
    pub easy: u32,
    #[serde(default)]
    pub medium: u32,
    #[serde(default)]
    pub hard: u32,
}

impl DifficultyDistribution {
    pub fn total(&self) -> u64 {
        [self.easy, self.medium, self.hard].into_iter().map(u64::from).sum()
    }

    pub fn default_for(num_questions: u32) -> Self {
        let half = num_questions / 2;
        let third = num_questions / 3;
        Self {
            easy: half,
            medium: third,
            hard: num_questions - half - third,
        }
    }
}

/// Largest test a single request may ask for.
pub const MAX_QUESTIONS: u32 = 100;

fn default_num_questions() -> u32 {
    10
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_num_questions")]
    pub num_questions: u32,
    #[serde(default)]
    pub type_distribution: TypeDistribution,
    #[serde(default)]
    pub difficulty_distribution: DifficultyDistribution,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_questions: default_num_questions(),
            type_distribution: TypeDistribution::default(),
            difficulty_distribution: DifficultyDistribution::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Number of questions must be greater than zero")]
    NoQuestions,
    #[error("At most {max} questions can be requested, got {requested}")]
    TooManyQuestions { max: u32, requested: u32 },
    #[error("Type distribution adds up to {actual} but {expected} questions were requested")]
    TypeMismatch { expected: u32, actual: u64 },
    #[error("Difficulty distribution adds up to {actual} but {expected} questions were requested")]
    DifficultyMismatch { expected: u32, actual: u64 },
}

impl Settings {
    /// `num_questions` must lie in `1..=MAX_QUESTIONS` and both
    /// distributions must add up to it. The type distribution is checked
    /// before the difficulty distribution.
    pub fn validate(self) -> Result<Settings, SettingsError> {
        if self.num_questions == 0 {
            return Err(SettingsError::NoQuestions);
        }
        if self.num_questions > MAX_QUESTIONS {
            return Err(SettingsError::TooManyQuestions {
                max: MAX_QUESTIONS,
                requested: self.num_questions,
            });
        }
        let types = self.type_distribution.total();
        if types != u64::from(self.num_questions) {
            return Err(SettingsError::TypeMismatch {
                expected: self.num_questions,
                actual: types,
            });
        }
        let difficulties = self.difficulty_distribution.total();
        if difficulties != u64::from(self.num_questions) {
            return Err(SettingsError::DifficultyMismatch {
                expected: self.num_questions,
                actual: difficulties,
            });
        }
        Ok(self)
    }

    /// Fills empty distributions with the stock split for `num_questions`.
    pub fn with_default_distributions(mut self) -> Settings {
        if self.type_distribution.total() == 0 {
            self.type_distribution = TypeDistribution::default_for(self.num_questions);
        }
        if self.difficulty_distribution.total() == 0 {
            self.difficulty_distribution = DifficultyDistribution::default_for(self.num_questions);
        }
        self
    }
}

/// A student's answer to one question, as sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    Index(usize),
    Indices(Vec<usize>),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradedDetail {
    pub id: String,
    #[serde(rename = "type")]
    pub q_type: QuestionType,
    pub prompt: String,
    pub correct: bool,
    #[serde(default)]
    pub correct_answer: Option<AnswerKey>,
    #[serde(default)]
    pub student_answer: Option<AnswerValue>,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionResult {
    #[serde(default)]
    pub submission_id: String,
    pub score: u32,
    pub total: u32,
    #[serde(default)]
    pub correct: u32,
    pub accuracy: f64,
    pub details: Vec<GradedDetail>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rating {
    pub question_idx: usize,
    pub rating: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_a() -> Settings {
        Settings {
            num_questions: 10,
            type_distribution: TypeDistribution {
                mcq: 4,
                true_false: 3,
                multiple_correct: 1,
                fill_blank: 2,
            },
            difficulty_distribution: DifficultyDistribution {
                easy: 4,
                medium: 3,
                hard: 3,
            },
        }
    }

    #[test]
    fn balanced_settings_pass_unchanged() {
        let settings = scenario_a();
        assert_eq!(settings.validate(), Ok(settings));
    }

    #[test]
    fn difficulty_short_by_one_is_rejected() {
        let mut settings = scenario_a();
        settings.difficulty_distribution.hard = 2;
        let err = settings.validate().unwrap_err();
        assert_eq!(
            err,
            SettingsError::DifficultyMismatch {
                expected: 10,
                actual: 9
            }
        );
        assert!(err.to_string().starts_with("Difficulty distribution"));
    }

    #[test]
    fn type_mismatch_reported_before_difficulty() {
        let mut settings = scenario_a();
        settings.type_distribution.mcq = 0;
        settings.difficulty_distribution.easy = 0;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, SettingsError::TypeMismatch { actual: 6, .. }));
    }

    #[test]
    fn validate_iff_both_sums_match() {
        for n in 1..8u32 {
            for mcq in 0..=n {
                for easy in 0..=n {
                    let settings = Settings {
                        num_questions: n,
                        type_distribution: TypeDistribution {
                            mcq,
                            fill_blank: 2,
                            ..Default::default()
                        },
                        difficulty_distribution: DifficultyDistribution {
                            easy,
                            hard: 1,
                            ..Default::default()
                        },
                    };
                    let expected = mcq + 2 == n && easy + 1 == n;
                    assert_eq!(settings.validate().is_ok(), expected, "n={n} mcq={mcq} easy={easy}");
                }
            }
        }
    }

    #[test]
    fn huge_counts_are_rejected_without_overflow() {
        let settings = Settings {
            num_questions: 10,
            type_distribution: TypeDistribution {
                mcq: u32::MAX,
                true_false: 11,
                ..Default::default()
            },
            difficulty_distribution: DifficultyDistribution {
                easy: 10,
                ..Default::default()
            },
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::TypeMismatch {
                expected: 10,
                actual: u64::from(u32::MAX) + 11
            })
        );
    }

    #[test]
    fn question_count_is_bounded() {
        let zero = Settings {
            num_questions: 0,
            ..Default::default()
        };
        assert_eq!(zero.validate(), Err(SettingsError::NoQuestions));

        let big = Settings {
            num_questions: u32::MAX,
            type_distribution: TypeDistribution {
                mcq: u32::MAX,
                ..Default::default()
            },
            difficulty_distribution: DifficultyDistribution {
                hard: u32::MAX,
                ..Default::default()
            },
        };
        assert_eq!(
            big.validate(),
            Err(SettingsError::TooManyQuestions {
                max: MAX_QUESTIONS,
                requested: u32::MAX
            })
        );

        let most = Settings {
            num_questions: MAX_QUESTIONS,
            ..Default::default()
        }
        .with_default_distributions();
        assert!(most.validate().is_ok());
    }

    #[test]
    fn default_distributions_add_up() {
        for n in 1..40 {
            let settings = Settings {
                num_questions: n,
                ..Default::default()
            }
            .with_default_distributions();
            assert!(settings.validate().is_ok(), "n={n}");
        }
    }

    #[test]
    fn masked_question_hides_key_and_explanation() {
        let q = Question {
            id: "q1".into(),
            q_type: QuestionType::Mcq,
            difficulty: Difficulty::Easy,
            prompt: "Pick".into(),
            options: Some(vec!["a".into(), "b".into()]),
            topic: Some("Letters".into()),
            explanation: Some("because".into()),
            correct: Some(AnswerKey::Index(1)),
        };
        let masked = q.masked();
        assert!(masked.correct.is_none());
        assert!(masked.explanation.is_none());
        assert_eq!(masked.options, q.options);
        let raw = serde_json::to_value(&masked).unwrap();
        assert!(raw.get("correct").is_none());
    }

    #[test]
    fn question_without_id_uses_position() {
        let q: Question =
            serde_json::from_value(serde_json::json!({"type": "fill_blank", "prompt": "x ____"})).unwrap();
        assert_eq!(q.slot_key(3), "3");
        assert_eq!(q.difficulty, Difficulty::Medium);
    }

    #[test]
    fn answer_key_shapes_decode() {
        let keys: Vec<AnswerKey> = serde_json::from_str(r#"[true, 2, [0, 3], "word"]"#).unwrap();
        assert_eq!(
            keys,
            vec![
                AnswerKey::Flag(true),
                AnswerKey::Index(2),
                AnswerKey::Indices(vec![0, 3]),
                AnswerKey::Text("word".into()),
            ]
        );
    }
}
