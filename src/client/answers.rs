//! Student answer sheet: the typed question list, the state of every answer
//! control, and collection of that state into an [`AnswerMap`].

use crate::client::render;
use crate::models::{AnswerValue, Question, QuestionType};
use maud::Markup;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnswerError {
    #[error("no question '{0}' on this test")]
    UnknownQuestion(String),
    #[error("question '{key}' is a {kind} question")]
    WrongControl { key: String, kind: &'static str },
    #[error("question '{key}' has {count} options, option {option} does not exist")]
    OptionOutOfRange { key: String, option: usize, count: usize },
    #[error("'{value}' is not a valid answer for question '{key}'")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Single(Option<usize>),
    Multiple(BTreeSet<usize>),
    Binary(Option<bool>),
    Text(String),
}

impl Control {
    fn empty_for(q_type: QuestionType) -> Self {
        match q_type {
            QuestionType::Mcq => Control::Single(None),
            QuestionType::MultipleCorrect => Control::Multiple(BTreeSet::new()),
            QuestionType::TrueFalse => Control::Binary(None),
            QuestionType::FillBlank => Control::Text(String::new()),
        }
    }

    fn value(&self) -> Option<AnswerValue> {
        match self {
            Control::Single(choice) => choice.map(AnswerValue::Index),
            Control::Multiple(set) => Some(AnswerValue::Indices(set.iter().copied().collect())),
            Control::Binary(choice) => choice.map(AnswerValue::Flag),
            Control::Text(text) => Some(AnswerValue::Text(text.clone())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuestionBlock {
    pub key: String,
    pub question: Question,
    pub control: Control,
}

/// Answers keyed by question slot, in display order. Serializes as a JSON
/// object; unanswered single choices serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerMap {
    entries: Vec<(String, Option<AnswerValue>)>,
}

impl AnswerMap {
    pub fn get(&self, key: &str) -> Option<&Option<AnswerValue>> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&AnswerValue>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for AnswerMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StudentForm {
    blocks: Vec<QuestionBlock>,
}

impl StudentForm {
    /// Replaces every block with a fresh, unanswered one per question.
    pub fn render(&mut self, questions: &[Question]) -> Markup {
        self.blocks = questions
            .iter()
            .enumerate()
            .map(|(pos, q)| QuestionBlock {
                key: q.slot_key(pos),
                question: q.masked(),
                control: Control::empty_for(q.q_type),
            })
            .collect();
        self.markup()
    }

    /// Current markup, reflecting the selections made so far.
    pub fn markup(&self) -> Markup {
        render::student_test(&self.blocks)
    }

    pub fn blocks(&self) -> &[QuestionBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn block_mut(&mut self, key: &str) -> Result<&mut QuestionBlock, AnswerError> {
        self.blocks
            .iter_mut()
            .find(|b| b.key == key)
            .ok_or_else(|| AnswerError::UnknownQuestion(key.to_string()))
    }

    fn checked_option(block: &QuestionBlock, option: usize) -> Result<(), AnswerError> {
        let count = block.question.option_count();
        if option < count {
            Ok(())
        } else {
            Err(AnswerError::OptionOutOfRange {
                key: block.key.clone(),
                option,
                count,
            })
        }
    }

    fn wrong_control(block: &QuestionBlock) -> AnswerError {
        AnswerError::WrongControl {
            key: block.key.clone(),
            kind: block.question.q_type.as_str(),
        }
    }

    /// Picks one option of an mcq question, replacing any earlier pick.
    pub fn select(&mut self, key: &str, option: usize) -> Result<(), AnswerError> {
        let block = self.block_mut(key)?;
        Self::checked_option(block, option)?;
        match &mut block.control {
            Control::Single(choice) => {
                *choice = Some(option);
                Ok(())
            }
            _ => Err(Self::wrong_control(block)),
        }
    }

    /// Flips one checkbox of a multiple_correct question; returns whether it
    /// is now checked.
    pub fn toggle(&mut self, key: &str, option: usize) -> Result<bool, AnswerError> {
        let block = self.block_mut(key)?;
        Self::checked_option(block, option)?;
        match &mut block.control {
            Control::Multiple(set) => {
                if set.remove(&option) {
                    Ok(false)
                } else {
                    set.insert(option);
                    Ok(true)
                }
            }
            _ => Err(Self::wrong_control(block)),
        }
    }

    pub fn choose(&mut self, key: &str, value: bool) -> Result<(), AnswerError> {
        let block = self.block_mut(key)?;
        match &mut block.control {
            Control::Binary(choice) => {
                *choice = Some(value);
                Ok(())
            }
            _ => Err(Self::wrong_control(block)),
        }
    }

    pub fn fill(&mut self, key: &str, text: &str) -> Result<(), AnswerError> {
        let block = self.block_mut(key)?;
        match &mut block.control {
            Control::Text(current) => {
                *current = text.to_string();
                Ok(())
            }
            _ => Err(Self::wrong_control(block)),
        }
    }

    /// Sets a whole answer at once. Multi-select values are stored as a set,
    /// so they collect back sorted and deduplicated.
    pub fn answer(&mut self, key: &str, value: AnswerValue) -> Result<(), AnswerError> {
        match value {
            AnswerValue::Index(option) => self.select(key, option),
            AnswerValue::Flag(flag) => self.choose(key, flag),
            AnswerValue::Text(text) => self.fill(key, &text),
            AnswerValue::Indices(options) => {
                let block = self.block_mut(key)?;
                for option in &options {
                    Self::checked_option(block, *option)?;
                }
                match &mut block.control {
                    Control::Multiple(set) => {
                        *set = options.into_iter().collect();
                        Ok(())
                    }
                    _ => Err(Self::wrong_control(block)),
                }
            }
        }
    }

    /// Applies one posted form field the way a browser sends it: option
    /// indices for choices, `true`/`false` for binary questions, raw text
    /// for fill-ins. Checkbox fields repeat once per checked option.
    pub fn apply_field(&mut self, key: &str, raw: &str) -> Result<(), AnswerError> {
        let q_type = self.block_mut(key)?.question.q_type;
        let invalid = || AnswerError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        };
        match q_type {
            QuestionType::Mcq => {
                let option = raw.trim().parse().map_err(|_| invalid())?;
                self.select(key, option)
            }
            QuestionType::MultipleCorrect => {
                let option = raw.trim().parse().map_err(|_| invalid())?;
                let block = self.block_mut(key)?;
                Self::checked_option(block, option)?;
                if let Control::Multiple(set) = &mut block.control {
                    set.insert(option);
                }
                Ok(())
            }
            QuestionType::TrueFalse => match raw.trim() {
                "true" => self.choose(key, true),
                "false" => self.choose(key, false),
                _ => Err(invalid()),
            },
            QuestionType::FillBlank => self.fill(key, raw),
        }
    }

    /// One entry per rendered block, in display order, unanswered blocks
    /// included with their empty value.
    pub fn collect(&self) -> AnswerMap {
        AnswerMap {
            entries: self
                .blocks
                .iter()
                .map(|b| (b.key.clone(), b.control.value()))
                .collect(),
        }
    }
}
