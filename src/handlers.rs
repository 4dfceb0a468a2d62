use crate::client::answers::StudentForm;
use crate::client::form::{SettingsForm, DEFAULT_TITLE};
use crate::client::render;
use crate::client::results::ResultsView;
use crate::error::{AppError, ErrorDetail};
use crate::generator::generate_questions;
use crate::grading::evaluate_answers;
use crate::models::{AnswerValue, Question, Settings, SubmissionResult, Test};
use crate::source::{resolve_source_text, ContentInput, Upload};
use crate::state::{AppState, SubmissionRecord, TestRecord};
use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use maud::Markup;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::{debug, info, warn};
use validator::Validate;

const CONTEXT_EXCERPT_CHARS: usize = 200;

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// The first `x-forwarded-for` entry is only honoured behind a trusted
/// proxy; otherwise the socket peer is the client.
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    match (forwarded, peer) {
        (Some(addr), _) => addr.to_string(),
        (None, Some(peer)) => peer.ip().to_string(),
        (None, None) => "local".to_string(),
    }
}

fn enforce_rate_limit(
    state: &AppState,
    scope: &str,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    limit_per_minute: u32,
    req_id: &str,
) -> Result<(), AppError> {
    let key = client_key(headers, peer, state.config.trust_forwarded_for);
    if state.limiter.check(scope, &key, limit_per_minute) {
        Ok(())
    } else {
        Err(AppError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "too many requests",
            req_id,
        ))
    }
}

fn json_error(rejection: JsonRejection, status: StatusCode, req_id: String) -> AppError {
    AppError::new(status, "VALIDATION_ERROR", rejection.body_text(), req_id)
}

fn multipart_error(err: MultipartError, req_id: &str) -> AppError {
    AppError::new(err.status(), "VALIDATION_ERROR", err.body_text(), req_id)
}

#[derive(Debug, Default)]
struct CreateTestForm {
    title: Option<String>,
    settings: Option<String>,
    /// Separate inputs as the creation page posts them.
    settings_fields: Option<SettingsForm>,
    content: ContentInput,
}

fn settings_field<'a>(fields: &'a mut SettingsForm, name: &str) -> Option<&'a mut String> {
    Some(match name {
        "num_questions" => &mut fields.num_questions,
        "mcq" => &mut fields.mcq,
        "true_false" => &mut fields.true_false,
        "multiple_correct" => &mut fields.multiple_correct,
        "fill_blank" => &mut fields.fill_blank,
        "easy" => &mut fields.easy,
        "medium" => &mut fields.medium,
        "hard" => &mut fields.hard,
        _ => return None,
    })
}

async fn read_create_form(mut multipart: Multipart, req_id: &str) -> Result<CreateTestForm, AppError> {
    let mut form = CreateTestForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, req_id))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, req_id))?;
                form.content.file = Some(Upload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            "title" | "settings" | "url" | "text" => {
                let value = field.text().await.map_err(|e| multipart_error(e, req_id))?;
                match name.as_str() {
                    "title" => form.title = Some(value),
                    "settings" => form.settings = Some(value),
                    "url" => form.content.url = Some(value),
                    _ => form.content.text = Some(value),
                }
            }
            setting @ ("num_questions" | "mcq" | "true_false" | "multiple_correct" | "fill_blank" | "easy"
            | "medium" | "hard") => {
                let value = field.text().await.map_err(|e| multipart_error(e, req_id))?;
                let fields = form.settings_fields.get_or_insert_with(SettingsForm::default);
                if let Some(slot) = settings_field(fields, setting) {
                    *slot = value;
                }
            }
            other => warn!("ignoring unexpected form field '{}'", other),
        }
    }
    Ok(form)
}

fn parse_settings(raw: Option<&str>, req_id: &str) -> Result<Settings, AppError> {
    let settings = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => serde_json::from_str::<Settings>(raw).map_err(|e| {
            AppError::bad_request(format!("Invalid settings: {}", e), req_id).with_details(vec![ErrorDetail {
                field: "settings".into(),
                issue: e.to_string(),
            }])
        })?,
        None => Settings::default(),
    };
    checked_settings(settings, req_id)
}

fn settings_error(message: String, req_id: &str) -> AppError {
    AppError::bad_request(message.clone(), req_id).with_details(vec![ErrorDetail {
        field: "settings".into(),
        issue: message,
    }])
}

fn checked_settings(settings: Settings, req_id: &str) -> Result<Settings, AppError> {
    settings
        .with_default_distributions()
        .validate()
        .map_err(|e| settings_error(e.to_string(), req_id))
}

/// A `settings` JSON field wins; otherwise the page's separate inputs are
/// read with the same rules the client applies.
fn resolve_settings(form: &CreateTestForm, req_id: &str) -> Result<Settings, AppError> {
    let has_json = form.settings.as_deref().is_some_and(|s| !s.trim().is_empty());
    match &form.settings_fields {
        Some(fields) if !has_json => {
            let settings = fields.extract().map_err(|e| settings_error(e.to_string(), req_id))?;
            checked_settings(settings, req_id)
        }
        _ => parse_settings(form.settings.as_deref(), req_id),
    }
}

pub async fn create_test(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<Test>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let peer = peer.map(|ConnectInfo(addr)| addr);
    enforce_rate_limit(
        &state,
        "create_test",
        &headers,
        peer,
        state.config.create_limit_per_minute,
        &req_id,
    )?;

    let form = read_create_form(multipart, &req_id).await?;
    let settings = resolve_settings(&form, &req_id)?;
    let title = form
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let source_text = resolve_source_text(&state.http, form.content, state.config.max_upload_bytes)
        .await
        .map_err(|e| AppError::bad_request(e.to_string(), &req_id))?;

    let questions = generate_questions(
        state.generator.as_ref(),
        &state.question_schema,
        &source_text,
        &settings,
    )
    .await;

    let record = state.insert_test(title, settings, questions, source_text).await;
    info!(test_id = %record.id, questions = record.questions.len(), "test created");
    Ok(Json(Test {
        test_id: record.id,
        title: record.title,
        questions: record.questions,
    }))
}

pub async fn get_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(test_id): Path<String>,
) -> Result<Json<Test>, AppError> {
    let record = state
        .find_test(&test_id)
        .await
        .ok_or_else(|| AppError::test_not_found(request_id_from_headers(&headers)))?;
    Ok(Json(Test {
        test_id: record.id,
        title: record.title,
        questions: record.questions.iter().map(Question::masked).collect(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitPayload {
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub answers: HashMap<String, serde_json::Value>,
}

/// Values that are not a valid answer shape are kept as unanswered.
fn decode_answers(raw: HashMap<String, serde_json::Value>) -> HashMap<String, Option<AnswerValue>> {
    raw.into_iter()
        .map(|(key, value)| (key, serde_json::from_value::<AnswerValue>(value).ok()))
        .collect()
}

pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(test_id): Path<String>,
    payload: Result<Json<SubmitPayload>, JsonRejection>,
) -> Result<Json<SubmissionResult>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let Json(payload) = payload.map_err(|r| {
        let status = r.status();
        json_error(r, status, req_id.clone())
    })?;
    let record = state
        .find_test(&test_id)
        .await
        .ok_or_else(|| AppError::test_not_found(&req_id))?;

    let answers = decode_answers(payload.answers);
    Ok(Json(grade_and_record(&state, record, payload.student_name, answers).await))
}

async fn grade_and_record(
    state: &AppState,
    record: TestRecord,
    student_name: Option<String>,
    answers: HashMap<String, Option<AnswerValue>>,
) -> SubmissionResult {
    let student_name = student_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Anonymous".to_string());

    let mut result = evaluate_answers(&record.questions, &answers);
    result.submission_id = uuid::Uuid::new_v4().to_string();

    info!(test_id = %record.id, score = result.score, total = result.total, "submission graded");
    state
        .record_submission(SubmissionRecord {
            id: result.submission_id.clone(),
            test_id: record.id,
            submitted_at: Utc::now(),
            student_name,
            answers,
            score: result.score,
            accuracy: result.accuracy,
            details: result.details.clone(),
        })
        .await;
    result
}

#[derive(Debug, Deserialize, Validate)]
pub struct RatePayload {
    pub question_idx: usize,
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

pub async fn rate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(test_id): Path<String>,
    payload: Result<Json<RatePayload>, JsonRejection>,
) -> Result<Json<OkResponse>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let Json(payload) = payload.map_err(|r| json_error(r, StatusCode::BAD_REQUEST, req_id.clone()))?;
    if let Err(errors) = payload.validate() {
        let details = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| ErrorDetail {
                field: field.to_string(),
                issue: errs
                    .iter()
                    .map(|e| e.code.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect();
        return Err(AppError::bad_request("Invalid rating payload", req_id).with_details(details));
    }
    if !state.test_exists(&test_id).await {
        return Err(AppError::test_not_found(req_id));
    }
    state
        .record_rating(&test_id, payload.question_idx, payload.rating)
        .await;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Serialize)]
pub struct ExportLink {
    pub link: String,
}

fn public_base(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = state.config.public_base_url.as_deref() {
        return base.to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("localhost:{}", state.config.port));
    format!("http://{}", host)
}

pub async fn export(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(test_id): Path<String>,
) -> Result<Json<ExportLink>, AppError> {
    if !state.test_exists(&test_id).await {
        return Err(AppError::test_not_found(request_id_from_headers(&headers)));
    }
    let link = format!("{}/test/{}", public_base(&state, &headers), test_id);
    Ok(Json(ExportLink { link }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub test_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
}

pub fn compose_reply(message: &str, context: &str) -> String {
    if message.trim().is_empty() {
        return "Please enter a question.".to_string();
    }
    let mut reply = String::from("I'm here to help. ");
    if !context.is_empty() {
        let excerpt: String = context.chars().take(CONTEXT_EXCERPT_CHARS).collect();
        reply.push_str(&format!("Context: {} ...\n", excerpt));
    }
    reply.push_str(&format!("Your question was: '{}'.", message));
    reply
}

pub async fn chat(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> Result<Json<ChatReply>, AppError> {
    let req_id = request_id_from_headers(&headers);
    let Json(payload) = payload.map_err(|r| {
        let status = r.status();
        json_error(r, status, req_id.clone())
    })?;
    let peer = peer.map(|ConnectInfo(addr)| addr);
    enforce_rate_limit(&state, "chat", &headers, peer, state.config.chat_limit_per_minute, &req_id)?;

    let context = match payload.test_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => state
            .find_test(id)
            .await
            .map(|t| t.source_text)
            .unwrap_or_default(),
        None => String::new(),
    };
    let message = payload.message.unwrap_or_default();
    Ok(Json(ChatReply {
        reply: compose_reply(&message, &context),
    }))
}

pub async fn teacher_page() -> Markup {
    render::teacher_page()
}

pub async fn student_page(State(state): State<AppState>, Path(test_id): Path<String>) -> (StatusCode, Markup) {
    match state.find_test(&test_id).await {
        Some(record) => {
            let mut form = StudentForm::default();
            let questions = form.render(&record.questions);
            (
                StatusCode::OK,
                render::student_page(&record.title, &record.id, Ok(questions)),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            render::student_page("Test not found", &test_id, Err("Test not found".to_string())),
        ),
    }
}

/// Form post from the student page: fields map onto the answer sheet the
/// page was rendered from, then the results page comes back.
pub async fn submit_page(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
    body: Bytes,
) -> (StatusCode, Markup) {
    let Some(record) = state.find_test(&test_id).await else {
        return (
            StatusCode::NOT_FOUND,
            render::student_page("Test not found", &test_id, Err("Test not found".to_string())),
        );
    };

    let mut form = StudentForm::default();
    form.render(&record.questions);
    let mut student_name = None;
    for (key, value) in url::form_urlencoded::parse(&body) {
        if key == "student_name" {
            student_name = Some(value.into_owned());
        } else if let Err(err) = form.apply_field(&key, &value) {
            debug!(test_id = %test_id, "ignoring posted field: {}", err);
        }
    }
    let answers = form
        .collect()
        .iter()
        .map(|(key, value)| (key.to_string(), value.cloned()))
        .collect();

    let title = record.title.clone();
    let result = grade_and_record(&state, record, student_name, answers).await;
    (StatusCode::OK, render::results_page(&title, &ResultsView::new(result)))
}
