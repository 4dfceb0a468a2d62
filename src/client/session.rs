use crate::client::answers::{AnswerError, StudentForm};
use crate::client::api::{ClientConfig, QuizApi};
use crate::client::form::CreateTestInput;
use crate::client::render;
use crate::client::results::ResultsView;
use crate::client::router::Route;
use crate::client::ClientError;
use crate::models::{AnswerValue, Question, SubmissionResult, Test};
use maud::Markup;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Teacher,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub speaker: Speaker,
    pub text: String,
}

/// Holds the generating flag up for as long as it lives, so a cancelled
/// request cannot leave the generate control disabled.
struct GeneratingFlag<'a>(&'a mut bool);

impl<'a> GeneratingFlag<'a> {
    fn raise(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for GeneratingFlag<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

/// The active test as far as this session knows it.
#[derive(Debug, Clone, Default)]
struct ActiveTest {
    test_id: Option<String>,
    title: String,
    questions: Vec<Question>,
}

/// One browser tab's worth of state: mode, the current test, the student's
/// answer sheet, the last results and the chat transcript.
pub struct Session {
    api: QuizApi,
    mode: Mode,
    active: ActiveTest,
    generating: bool,
    form: StudentForm,
    results: Option<ResultsView>,
    transcript: Vec<ChatLine>,
    pending_ratings: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(api: QuizApi) -> Self {
        Self {
            api,
            mode: Mode::Teacher,
            active: ActiveTest::default(),
            generating: false,
            form: StudentForm::default(),
            results: None,
            transcript: Vec::new(),
            pending_ratings: Vec::new(),
        }
    }

    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::new(QuizApi::new(config)?))
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn test_id(&self) -> Option<&str> {
        self.active.test_id.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.active.title
    }

    pub fn questions(&self) -> &[Question] {
        &self.active.questions
    }

    /// True while a creation request is in flight; the generate control is
    /// disabled for that time.
    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn form(&self) -> &StudentForm {
        &self.form
    }

    pub fn results(&self) -> Option<&ResultsView> {
        self.results.as_ref()
    }

    pub fn transcript(&self) -> &[ChatLine] {
        &self.transcript
    }

    /// Validates the form locally, sends one creation request and, on
    /// success, makes the new test current and returns its preview.
    pub async fn generate(&mut self, input: &CreateTestInput) -> Result<Markup, ClientError> {
        if self.generating {
            return Err(ClientError::Busy);
        }
        let settings = input.settings.extract()?.validate()?;
        let source = input.content_source().ok_or(ClientError::MissingContent)?;
        let title = input.title_or_default();

        let flag = GeneratingFlag::raise(&mut self.generating);
        let outcome = self.api.create_test(&title, &settings, &source).await;
        drop(flag);

        let test = outcome?;
        info!(test_id = %test.test_id, questions = test.questions.len(), "test created");
        let preview = render::preview(&test.questions);
        self.active = ActiveTest {
            test_id: Some(test.test_id),
            title: test.title,
            questions: test.questions,
        };
        Ok(preview)
    }

    /// Applies the navigation path: student routes load their test, all
    /// others switch to teacher mode.
    pub async fn open(&mut self, path: &str) -> Result<Option<Markup>, ClientError> {
        match Route::from_location(path) {
            Route::Student { test_id } => {
                let markup = self.load_test(&test_id).await?;
                self.mode = Mode::Student;
                Ok(Some(markup))
            }
            Route::Teacher => {
                self.mode = Mode::Teacher;
                Ok(None)
            }
        }
    }

    /// Fetches a test and renders the student form. On failure nothing
    /// rendered so far changes.
    pub async fn load_test(&mut self, test_id: &str) -> Result<Markup, ClientError> {
        let Test {
            test_id,
            title,
            questions,
        } = self.api.get_test(test_id).await?;
        let markup = self.form.render(&questions);
        self.results = None;
        self.active = ActiveTest {
            test_id: Some(test_id),
            title,
            questions,
        };
        Ok(markup)
    }

    pub fn select(&mut self, key: &str, option: usize) -> Result<(), AnswerError> {
        self.form.select(key, option)
    }

    pub fn toggle(&mut self, key: &str, option: usize) -> Result<bool, AnswerError> {
        self.form.toggle(key, option)
    }

    pub fn choose(&mut self, key: &str, value: bool) -> Result<(), AnswerError> {
        self.form.choose(key, value)
    }

    pub fn fill(&mut self, key: &str, text: &str) -> Result<(), AnswerError> {
        self.form.fill(key, text)
    }

    pub fn answer(&mut self, key: &str, value: AnswerValue) -> Result<(), AnswerError> {
        self.form.answer(key, value)
    }

    /// Sends the collected answers and shows the graded result. Grading is
    /// entirely the server's.
    pub async fn submit(&mut self, student_name: &str) -> Result<Markup, ClientError> {
        let test_id = self.active.test_id.clone().ok_or(ClientError::NoActiveTest)?;
        let name = match student_name.trim() {
            "" => ANONYMOUS,
            trimmed => trimmed,
        };
        let answers = self.form.collect();
        let result: SubmissionResult = self.api.submit(&test_id, name, &answers).await?;
        info!(test_id = %test_id, score = result.score, total = result.total, "submission graded");
        let view = ResultsView::new(result);
        let markup = view.markup();
        self.results = Some(view);
        Ok(markup)
    }

    /// Marks the question as rated right away and sends the rating in the
    /// background. A failed rating is logged and otherwise ignored.
    pub fn rate(&mut self, question_idx: usize, rating: u8) -> Result<Markup, ClientError> {
        let test_id = self.active.test_id.clone().ok_or(ClientError::NoActiveTest)?;
        let view = self.results.as_mut().ok_or(ClientError::NoResults)?;
        let rating = view.activate(question_idx, rating)?;
        let markup = view.markup();

        let api = self.api.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = api.rate(&test_id, rating).await {
                debug!(question_idx = rating.question_idx, "rating not recorded: {}", err);
            }
        });
        self.pending_ratings.retain(|h| !h.is_finished());
        self.pending_ratings.push(handle);
        Ok(markup)
    }

    /// Waits for rating requests still in flight.
    pub async fn flush_ratings(&mut self) {
        for handle in self.pending_ratings.drain(..) {
            let _ = handle.await;
        }
    }

    pub async fn export_link(&self) -> Result<String, ClientError> {
        let test_id = self.active.test_id.as_deref().ok_or(ClientError::NoActiveTest)?;
        self.api.export_link(test_id).await
    }

    /// Appends the message to the transcript, then the reply once it
    /// arrives. Returns the reply.
    pub async fn chat(&mut self, message: &str) -> Result<String, ClientError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        self.transcript.push(ChatLine {
            speaker: Speaker::User,
            text: message.to_string(),
        });
        let reply = self.api.chat(message, self.active.test_id.as_deref()).await?;
        self.transcript.push(ChatLine {
            speaker: Speaker::Assistant,
            text: reply.clone(),
        });
        Ok(reply)
    }

    pub fn chat_markup(&self) -> Markup {
        render::chat_log(&self.transcript)
    }
}
