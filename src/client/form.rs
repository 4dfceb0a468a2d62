use crate::models::{DifficultyDistribution, Settings, TypeDistribution};
use thiserror::Error;

pub const DEFAULT_TITLE: &str = "Untitled Test";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("{field} must be a whole number, got '{value}'")]
    NotANumber { field: &'static str, value: String },
    #[error("Number of questions must be greater than zero")]
    NoQuestions,
}

/// Raw values of the settings inputs, as typed.
#[derive(Debug, Clone, Default)]
pub struct SettingsForm {
    pub num_questions: String,
    pub mcq: String,
    pub true_false: String,
    pub multiple_correct: String,
    pub fill_blank: String,
    pub easy: String,
    pub medium: String,
    pub hard: String,
}

fn count(field: &'static str, raw: &str) -> Result<u32, FormError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse().map_err(|_| FormError::NotANumber {
        field,
        value: raw.to_string(),
    })
}

impl SettingsForm {
    /// Blank distribution inputs count as zero.
    pub fn extract(&self) -> Result<Settings, FormError> {
        let num_questions = count("num_questions", &self.num_questions)?;
        if num_questions == 0 {
            return Err(FormError::NoQuestions);
        }
        Ok(Settings {
            num_questions,
            type_distribution: TypeDistribution {
                mcq: count("mcq", &self.mcq)?,
                true_false: count("true_false", &self.true_false)?,
                multiple_correct: count("multiple_correct", &self.multiple_correct)?,
                fill_blank: count("fill_blank", &self.fill_blank)?,
            },
            difficulty_distribution: DifficultyDistribution {
                easy: count("easy", &self.easy)?,
                medium: count("medium", &self.medium)?,
                hard: count("hard", &self.hard)?,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    File(FileUpload),
    Url(String),
    Text(String),
}

/// Everything the teacher filled in on the creation form.
#[derive(Debug, Clone, Default)]
pub struct CreateTestInput {
    pub title: String,
    pub settings: SettingsForm,
    pub file: Option<FileUpload>,
    pub url: String,
    pub text: String,
}

impl CreateTestInput {
    pub fn title_or_default(&self) -> String {
        let title = self.title.trim();
        if title.is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            title.to_string()
        }
    }

    /// File first, then URL, then pasted text. Blank inputs do not count.
    pub fn content_source(&self) -> Option<ContentSource> {
        if let Some(file) = self.file.as_ref().filter(|f| !f.file_name.trim().is_empty()) {
            return Some(ContentSource::File(file.clone()));
        }
        if !self.url.trim().is_empty() {
            return Some(ContentSource::Url(self.url.trim().to_string()));
        }
        if !self.text.trim().is_empty() {
            return Some(ContentSource::Text(self.text.clone()));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(n: &str) -> SettingsForm {
        SettingsForm {
            num_questions: n.into(),
            mcq: "4".into(),
            true_false: "3".into(),
            multiple_correct: " 1 ".into(),
            fill_blank: "2".into(),
            easy: "4".into(),
            medium: "3".into(),
            hard: "3".into(),
        }
    }

    #[test]
    fn extracts_numbers() {
        let settings = form("10").extract().unwrap();
        assert_eq!(settings.num_questions, 10);
        assert_eq!(settings.type_distribution.multiple_correct, 1);
        assert_eq!(settings.difficulty_distribution.total(), 10);
    }

    #[test]
    fn blank_distribution_fields_are_zero() {
        let mut raw = form("10");
        raw.hard = "".into();
        assert_eq!(raw.extract().unwrap().difficulty_distribution.hard, 0);
    }

    #[test]
    fn rejects_garbage_and_zero_total() {
        assert_eq!(form("0").extract(), Err(FormError::NoQuestions));
        assert_eq!(form("").extract(), Err(FormError::NoQuestions));
        let mut raw = form("10");
        raw.easy = "four".into();
        assert_eq!(
            raw.extract(),
            Err(FormError::NotANumber {
                field: "easy",
                value: "four".into()
            })
        );
    }

    #[test]
    fn source_priority_is_file_url_text() {
        let mut input = CreateTestInput {
            file: Some(FileUpload {
                file_name: "notes.txt".into(),
                bytes: b"x".to_vec(),
            }),
            url: "https://example.com".into(),
            text: "words".into(),
            ..Default::default()
        };
        assert!(matches!(input.content_source(), Some(ContentSource::File(_))));
        input.file = None;
        assert_eq!(input.content_source(), Some(ContentSource::Url("https://example.com".into())));
        input.url = "  ".into();
        assert_eq!(input.content_source(), Some(ContentSource::Text("words".into())));
        input.text.clear();
        assert_eq!(input.content_source(), None);
    }

    #[test]
    fn blank_title_gets_placeholder() {
        let input = CreateTestInput {
            title: "   ".into(),
            ..Default::default()
        };
        assert_eq!(input.title_or_default(), DEFAULT_TITLE);
    }
}
