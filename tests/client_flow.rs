use futures::future::BoxFuture;
use quize::client::{
    ClientConfig, ClientError, CreateTestInput, FileUpload, Mode, RatingError, Route, Session, SettingsForm, Speaker,
};
use quize::config::Config;
use quize::generator::QuestionGenerator;
use quize::models::{AnswerValue, Settings};
use quize::routes::build_router;
use quize::state::AppState;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct FixedGenerator;

impl QuestionGenerator for FixedGenerator {
    fn generate_questions_json(&self, _source_text: &str, _settings: &Settings) -> BoxFuture<'static, anyhow::Result<String>> {
        let raw = json!([
            {"id": "q1", "type": "mcq", "difficulty": "easy", "prompt": "Which gas do plants release?",
             "options": ["Nitrogen", "Oxygen", "Helium"], "correct": 1, "explanation": "Oxygen is a byproduct."},
            {"id": "q2", "type": "multiple_correct", "difficulty": "medium", "prompt": "Inputs of photosynthesis?",
             "options": ["Water", "Salt", "Carbon dioxide", "Sand"], "correct": [0, 2]},
            {"id": "q3", "type": "true_false", "difficulty": "medium", "prompt": "Chlorophyll is green.", "correct": true},
            {"id": "q4", "type": "fill_blank", "difficulty": "hard", "prompt": "Plants store ____ as starch.",
             "correct": "glucose"}
        ])
        .to_string();
        Box::pin(async move { Ok(raw) })
    }
}

const NOTES: &str = "Plants release oxygen during photosynthesis. Chlorophyll makes leaves green.";

async fn spawn_server() -> (String, AppState) {
    let schema = serde_json::from_str(include_str!("../contracts/questions.schema.json")).unwrap();
    let state = AppState::new(Config::ephemeral(), Arc::new(FixedGenerator), schema);
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

fn settings(n: &str, types: [&str; 4], levels: [&str; 3]) -> SettingsForm {
    SettingsForm {
        num_questions: n.into(),
        mcq: types[0].into(),
        true_false: types[1].into(),
        multiple_correct: types[2].into(),
        fill_blank: types[3].into(),
        easy: levels[0].into(),
        medium: levels[1].into(),
        hard: levels[2].into(),
    }
}

fn input() -> CreateTestInput {
    CreateTestInput {
        title: "Plants".into(),
        settings: settings("4", ["1", "1", "1", "1"], ["1", "2", "1"]),
        text: NOTES.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn teacher_creates_and_student_completes_a_test() {
    let (base, state) = spawn_server().await;

    let mut teacher = Session::connect(&ClientConfig::new(&base)).unwrap();
    let preview = teacher.generate(&input()).await.unwrap().into_string();
    assert!(preview.contains("Which gas do plants release?"));
    assert!(preview.contains("<li class=\"correct\">Oxygen</li>"));
    assert!(!teacher.is_generating());
    assert_eq!(teacher.title(), "Plants");
    assert_eq!(teacher.questions().len(), 4);

    let link = teacher.export_link().await.unwrap();
    let test_id = teacher.test_id().unwrap().to_string();
    assert_eq!(Route::from_location(&link).test_id(), Some(test_id.as_str()));

    let mut student = Session::connect(&ClientConfig::new(&base)).unwrap();
    let form = student.open(&link).await.unwrap().unwrap().into_string();
    assert_eq!(student.mode(), Mode::Student);
    assert_eq!(student.form().len(), 4);
    assert!(!form.contains("Oxygen is a byproduct."));

    student.select("q1", 1).unwrap();
    student.toggle("q2", 0).unwrap();
    student.toggle("q2", 2).unwrap();
    student.choose("q3", false).unwrap();
    student.fill("q4", " Glucose ").unwrap();

    let results = student.submit("  ").await.unwrap().into_string();
    assert!(results.contains("Score: 3/4"));
    assert!(results.contains("Accuracy: 75.0%"));
    assert_eq!(results.matches("result-row correct").count(), 3);
    assert_eq!(results.matches("result-row incorrect").count(), 1);
    assert_eq!(state.store.submissions.read().await[0].student_name, "Anonymous");

    let after = student.rate(2, 4).unwrap().into_string();
    assert_eq!(after.matches("rating-ack").count(), 1);
    assert!(matches!(student.rate(2, 5), Err(ClientError::Rating(RatingError::AlreadyRated(2)))));
    student.flush_ratings().await;

    let ratings = state.store.ratings.read().await;
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0].question_idx, 2);
    assert_eq!(ratings[0].rating, 4);
}

#[tokio::test]
async fn inconsistent_settings_never_reach_the_server() {
    let (base, state) = spawn_server().await;
    let mut session = Session::connect(&ClientConfig::new(&base)).unwrap();
    let mut bad = input();
    bad.settings = settings("10", ["4", "3", "1", "2"], ["5", "3", "3"]);

    let err = session.generate(&bad).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Difficulty distribution adds up to 11 but 10 questions were requested"
    );
    assert!(session.test_id().is_none());
    assert!(state.store.tests.read().await.is_empty());
}

#[tokio::test]
async fn missing_content_is_reported_locally() {
    let (base, state) = spawn_server().await;
    let mut session = Session::connect(&ClientConfig::new(&base)).unwrap();
    let mut empty = input();
    empty.text = "   ".into();
    assert!(matches!(session.generate(&empty).await, Err(ClientError::MissingContent)));
    assert!(state.store.tests.read().await.is_empty());
}

#[tokio::test]
async fn server_errors_surface_their_message() {
    let (base, _) = spawn_server().await;
    let mut session = Session::connect(&ClientConfig::new(&base)).unwrap();
    let mut pdf = input();
    pdf.file = Some(FileUpload {
        file_name: "slides.pdf".into(),
        bytes: b"%PDF".to_vec(),
    });
    match session.generate(&pdf).await {
        Err(ClientError::Server { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Unsupported file type: only .txt uploads are supported");
        }
        other => panic!("unexpected outcome: {:?}", other.map(|m| m.into_string())),
    }
    assert!(!session.is_generating());
}

#[tokio::test]
async fn failed_load_keeps_current_test() {
    let (base, _) = spawn_server().await;
    let mut session = Session::connect(&ClientConfig::new(&base)).unwrap();
    session.generate(&input()).await.unwrap();
    let test_id = session.test_id().unwrap().to_string();
    session.load_test(&test_id).await.unwrap();
    session.answer("q1", AnswerValue::Index(2)).unwrap();

    match session.load_test("does-not-exist").await {
        Err(ClientError::Server { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Test not found");
        }
        other => panic!("unexpected outcome: {:?}", other.map(|m| m.into_string())),
    }
    assert_eq!(session.test_id(), Some(test_id.as_str()));
    assert_eq!(session.form().len(), 4);
    assert_eq!(session.form().collect().get("q1"), Some(&Some(AnswerValue::Index(2))));
}

#[tokio::test]
async fn chat_transcript_alternates_speakers() {
    let (base, _) = spawn_server().await;
    let mut session = Session::connect(&ClientConfig::new(&base)).unwrap();
    assert!(matches!(session.chat("  ").await, Err(ClientError::EmptyMessage)));
    assert!(session.transcript().is_empty());

    let reply = session.chat("What is <b>chlorophyll</b>?").await.unwrap();
    assert_eq!(reply, "I'm here to help. Your question was: 'What is <b>chlorophyll</b>?'.");

    session.generate(&input()).await.unwrap();
    let reply = session.chat("Why green?").await.unwrap();
    assert!(reply.contains("Context: Plants release oxygen"));

    let speakers: Vec<Speaker> = session.transcript().iter().map(|l| l.speaker).collect();
    assert_eq!(speakers, vec![Speaker::User, Speaker::Assistant, Speaker::User, Speaker::Assistant]);
    let html = session.chat_markup().into_string();
    assert!(html.contains("&lt;b&gt;chlorophyll&lt;/b&gt;"));
}

#[tokio::test]
async fn teacher_paths_do_not_load_anything() {
    let (base, _) = spawn_server().await;
    let mut session = Session::connect(&ClientConfig::new(&base)).unwrap();
    assert!(session.open("/").await.unwrap().is_none());
    assert_eq!(session.mode(), Mode::Teacher);
    assert!(matches!(session.submit("Ada").await, Err(ClientError::NoActiveTest)));
    assert!(matches!(session.rate(0, 3), Err(ClientError::NoActiveTest)));
}

#[tokio::test]
async fn cancelled_generation_releases_the_generate_control() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let mut session = Session::connect(&ClientConfig::new(format!("http://{}", addr))).unwrap();
    let first = tokio::time::timeout(Duration::from_millis(200), session.generate(&input())).await;
    assert!(first.is_err());
    assert!(!session.is_generating());

    let second = tokio::time::timeout(Duration::from_millis(200), session.generate(&input())).await;
    assert!(second.is_err(), "expected another pending request, got {:?}", second.map(|r| r.map(|m| m.into_string())));
    assert!(!session.is_generating());
}
