//! HTML views. Everything interpolated here goes through maud's escaping,
//! including prompts, options and chat replies that come from the server.

use crate::client::answers::{Control, QuestionBlock};
use crate::client::results::{RatingControl, ResultsView};
use crate::client::session::{ChatLine, Speaker};
use crate::models::{AnswerKey, Question, QuestionType};
use maud::{html, Markup, DOCTYPE};

pub const RATING_VALUES: std::ops::RangeInclusive<u8> = 1..=5;

fn option_marker(question: &Question, index: usize) -> bool {
    match &question.correct {
        Some(AnswerKey::Index(i)) => *i == index,
        Some(AnswerKey::Indices(list)) => list.contains(&index),
        _ => false,
    }
}

fn answer_summary(question: &Question) -> Option<String> {
    match (&question.correct, question.q_type) {
        (Some(AnswerKey::Flag(value)), _) => Some(if *value { "True" } else { "False" }.to_string()),
        (Some(AnswerKey::Text(text)), QuestionType::FillBlank) => Some(text.clone()),
        _ => None,
    }
}

/// Teacher review list of freshly generated questions, answers shown.
pub fn preview(questions: &[Question]) -> Markup {
    html! {
        ol #preview {
            @for question in questions {
                li.preview-item data-type=(question.q_type.as_str()) {
                    span.badge { (question.q_type.as_str()) " · " (question.difficulty.as_str()) }
                    @if let Some(topic) = &question.topic {
                        span.topic { (topic) }
                    }
                    p.prompt { (question.prompt) }
                    @if let Some(options) = &question.options {
                        ul.options {
                            @for (i, option) in options.iter().enumerate() {
                                @if option_marker(question, i) {
                                    li.correct { (option) }
                                } @else {
                                    li { (option) }
                                }
                            }
                        }
                    }
                    @if let Some(answer) = answer_summary(question) {
                        p.answer { "Answer: " (answer) }
                    }
                    @if let Some(explanation) = question.explanation.as_deref().filter(|e| !e.is_empty()) {
                        p.explanation { (explanation) }
                    }
                }
            }
        }
    }
}

fn block_controls(block: &QuestionBlock) -> Markup {
    let key = block.key.as_str();
    let options = block.question.options.as_deref().unwrap_or(&[]);
    html! {
        @match &block.control {
            Control::Single(choice) => {
                @for (i, option) in options.iter().enumerate() {
                    label.option {
                        input type="radio" name=(key) value=(i) checked[*choice == Some(i)];
                        " " (option)
                    }
                }
            }
            Control::Multiple(selected) => {
                @for (i, option) in options.iter().enumerate() {
                    label.option {
                        input type="checkbox" name=(key) value=(i) checked[selected.contains(&i)];
                        " " (option)
                    }
                }
            }
            Control::Binary(choice) => {
                label.option {
                    input type="radio" name=(key) value="true" checked[*choice == Some(true)];
                    " True"
                }
                label.option {
                    input type="radio" name=(key) value="false" checked[*choice == Some(false)];
                    " False"
                }
            }
            Control::Text(text) => {
                @if text.is_empty() {
                    input type="text" name=(key) placeholder="Your answer";
                } @else {
                    input type="text" name=(key) placeholder="Your answer" value=(text);
                }
            }
        }
    }
}

/// Student answer form. Each block carries its slot key and type so the
/// markup can be mapped back to the answer sheet.
pub fn student_test(blocks: &[QuestionBlock]) -> Markup {
    html! {
        div #test-questions {
            @for (pos, block) in blocks.iter().enumerate() {
                div.question data-qid=(block.key) data-type=(block.question.q_type.as_str()) {
                    p.prompt { strong { (pos + 1) ". " } (block.question.prompt) }
                    (block_controls(block))
                }
            }
        }
    }
}

pub fn results(view: &ResultsView) -> Markup {
    html! {
        section #results {
            h3.score { (view.score_line()) }
            p.accuracy { (view.accuracy_line()) }
            @for (idx, row) in view.rows().enumerate() {
                @let outcome = if row.detail.correct { "correct" } else { "incorrect" };
                div class={ "result-row " (outcome) } data-question-idx=(idx) {
                    p.prompt { (row.detail.prompt) }
                    p.outcome {
                        @if row.detail.correct { "Correct" } @else { "Incorrect" }
                    }
                    @if !row.detail.explanation.is_empty() {
                        p.explanation { (row.detail.explanation) }
                    }
                    div.rating {
                        @match row.control {
                            RatingControl::Open => {
                                span { "Rate this question: " }
                                @for value in RATING_VALUES {
                                    button.rate type="button" data-question-idx=(idx) value=(value) { (value) }
                                }
                            }
                            RatingControl::Acknowledged(_) => {
                                span.rating-ack { "Thanks for your feedback!" }
                            }
                        }
                    }
                }
            }
        }
    }
}

pub fn chat_log(lines: &[ChatLine]) -> Markup {
    html! {
        div #chat-log {
            @for line in lines {
                @match line.speaker {
                    Speaker::User => {
                        div.chat-line.user { strong { "You: " } (line.text) }
                    }
                    Speaker::Assistant => {
                        div.chat-line.assistant { strong { "Assistant: " } (line.text) }
                    }
                }
            }
        }
    }
}

pub fn error_notice(message: &str) -> Markup {
    html! {
        div.error role="alert" { (message) }
    }
}

fn page(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) }
            }
            body {
                main { (body) }
            }
        }
    }
}

/// Page for `/`: the test creation form and an empty preview area.
pub fn teacher_page() -> Markup {
    page(
        "Quiz generator",
        html! {
            h1 { "Create a test" }
            form #create-form method="post" action="/api/create_test" enctype="multipart/form-data" {
                label { "Title " input type="text" name="title" placeholder="Untitled Test"; }
                label { "Upload (.txt) " input type="file" name="file" accept=".txt"; }
                label { "URL " input type="url" name="url"; }
                label { "Text " textarea name="text" rows="8" {} }
                fieldset {
                    legend { "Settings" }
                    label { "Questions " input type="number" name="num_questions" min="1" value="10"; }
                    @for (name, label) in [("mcq", "MCQ"), ("true_false", "True/False"), ("multiple_correct", "Multiple correct"), ("fill_blank", "Fill in the blank")] {
                        label { (label) " " input type="number" name=(name) min="0" value="0"; }
                    }
                    @for (name, label) in [("easy", "Easy"), ("medium", "Medium"), ("hard", "Hard")] {
                        label { (label) " " input type="number" name=(name) min="0" value="0"; }
                    }
                }
                button #generate type="submit" { "Generate" }
            }
            div #preview-area {}
        },
    )
}

/// Page for `/test/{id}`: the student form, or the load error.
pub fn student_page(title: &str, test_id: &str, form: Result<Markup, String>) -> Markup {
    page(
        title,
        html! {
            h1 { (title) }
            @match form {
                Ok(questions) => {
                    form #student-form data-test-id=(test_id) method="post" action={ "/test/" (test_id) } {
                        label { "Your name " input type="text" name="student_name" placeholder="Anonymous"; }
                        (questions)
                        button #submit type="submit" { "Submit" }
                    }
                    div #results-area {}
                }
                Err(message) => {
                    (error_notice(&message))
                }
            }
        },
    )
}

/// Page answering a posted student form: the graded results.
pub fn results_page(title: &str, view: &ResultsView) -> Markup {
    page(
        title,
        html! {
            h1 { (title) }
            (results(view))
        },
    )
}
