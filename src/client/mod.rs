//! Browser-side half of the app as a typed library: form extraction, the
//! student answer sheet, HTML views, results with ratings, the chat
//! transcript and the REST calls that tie them together.

pub mod answers;
pub mod api;
pub mod form;
pub mod render;
pub mod results;
pub mod router;
pub mod session;

pub use answers::{AnswerError, AnswerMap, StudentForm};
pub use api::{ClientConfig, QuizApi};
pub use form::{ContentSource, CreateTestInput, FileUpload, FormError, SettingsForm};
pub use results::{RatingControl, RatingError, ResultsView};
pub use router::Route;
pub use session::{ChatLine, Mode, Session, Speaker};

use crate::models::SettingsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("Please upload a file, paste a URL, or enter some text")]
    MissingContent,
    #[error("A test is already being generated")]
    Busy,
    #[error("No test is loaded")]
    NoActiveTest,
    #[error("No results to rate yet")]
    NoResults,
    #[error("Message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Rating(#[from] RatingError),
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid server address: {0}")]
    InvalidBaseUrl(String),
    #[error("could not encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ClientError {
    /// Text for the user-facing error notice.
    pub fn notice(&self) -> maud::Markup {
        render::error_notice(&self.to_string())
    }
}
