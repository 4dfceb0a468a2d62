use crate::models::{AnswerKey, Difficulty, Question, QuestionType, Settings, MAX_QUESTIONS};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").expect("static regex"));
static BLANK_CANDIDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]{4,}").expect("static regex"));
static KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]{5,}").expect("static regex"));

const PROMPT_SOURCE_CHARS: usize = 20_000;
const MIN_SENTENCE_CHARS: usize = 40;
const KEYWORD_POOL: usize = 40;

/// Produces raw question JSON for a source text. Output is untrusted and goes
/// through [`parse_generated`].
pub trait QuestionGenerator: Send + Sync {
    fn generate_questions_json(
        &self,
        source_text: &str,
        settings: &Settings,
    ) -> BoxFuture<'static, anyhow::Result<String>>;
}

/// Used when no external generator is configured; the heuristic always runs.
#[derive(Clone)]
pub struct NoGenerator;

impl QuestionGenerator for NoGenerator {
    fn generate_questions_json(
        &self,
        _source_text: &str,
        _settings: &Settings,
    ) -> BoxFuture<'static, anyhow::Result<String>> {
        Box::pin(async { Err::<String, _>(anyhow::anyhow!("no question generator configured")) })
    }
}

/// Runs an external program, writes the generation prompt to its stdin and
/// reads the question array from its stdout.
#[derive(Clone)]
pub struct CommandGenerator {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandGenerator {
    pub fn new(command_line: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }
}

impl QuestionGenerator for CommandGenerator {
    fn generate_questions_json(
        &self,
        source_text: &str,
        settings: &Settings,
    ) -> BoxFuture<'static, anyhow::Result<String>> {
        let program = self.program.clone();
        let args = self.args.clone();
        let timeout = self.timeout;
        let prompt = build_prompt(source_text, settings);

        Box::pin(async move {
            let mut child = Command::new(&program)
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(prompt.as_bytes()).await?;
            }

            let output = tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| anyhow::anyhow!("generator timed out after {:?}", timeout))??;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                anyhow::bail!("generator command failed: {}", stderr);
            }

            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let trimmed = stdout.trim();
            let cleaned = if trimmed.starts_with("```") {
                trimmed
                    .trim_start_matches("```json")
                    .trim_start_matches("```")
                    .trim_end_matches("```")
                    .trim()
                    .to_string()
            } else {
                trimmed.to_string()
            };
            if cleaned.is_empty() {
                anyhow::bail!("generator returned empty output");
            }
            Ok(cleaned)
        })
    }
}

pub fn build_prompt(source_text: &str, settings: &Settings) -> String {
    let excerpt: String = source_text.chars().take(PROMPT_SOURCE_CHARS).collect();
    let settings_json = serde_json::to_string(settings).unwrap_or_default();
    format!(
        "You are an expert educational question setter. Given the source material, generate a JSON array of questions.\n\
         Each question must be an object with keys: id, type in ['mcq','multiple_correct','true_false','fill_blank'], \
         difficulty in ['easy','medium','hard'], prompt, options (array for choice types), correct (index for mcq, \
         array of indices for multiple_correct, boolean for true_false, or string for fill_blank), explanation, topic.\n\
         Adhere to the requested counts per type and difficulty. Keep prompts concise and unambiguous.\n\
         Settings JSON: {settings_json}\n\
         Source material begins:\n{excerpt}\nSource material ends."
    )
}

fn answer_fits(question: &Question) -> bool {
    let options = question.option_count();
    if question.q_type.has_options() != question.options.is_some() {
        return false;
    }
    match (question.q_type, question.correct.as_ref()) {
        (QuestionType::Mcq, Some(AnswerKey::Index(i))) => options >= 2 && *i < options,
        (QuestionType::MultipleCorrect, Some(AnswerKey::Indices(list))) => {
            options >= 2 && !list.is_empty() && list.iter().all(|i| *i < options)
        }
        (QuestionType::TrueFalse, Some(AnswerKey::Flag(_))) => true,
        (QuestionType::FillBlank, Some(AnswerKey::Text(t))) => !t.trim().is_empty(),
        _ => false,
    }
}

/// Pulls the outermost JSON array out of generator output and keeps the
/// entries that match the question schema and carry a usable answer key.
pub fn parse_generated(raw: &str, schema: &serde_json::Value) -> Vec<Question> {
    let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }
    let Ok(serde_json::Value::Array(items)) = serde_json::from_str(&raw[start..=end]) else {
        return Vec::new();
    };
    let compiled = match jsonschema::draft202012::new(schema) {
        Ok(v) => v,
        Err(err) => {
            warn!("question schema does not compile: {}", err);
            return Vec::new();
        }
    };

    let mut seen_ids = HashSet::new();
    items
        .into_iter()
        .filter(|item| compiled.is_valid(item))
        .filter_map(|item| serde_json::from_value::<Question>(item).ok())
        .filter(|q| !q.prompt.trim().is_empty() && answer_fits(q))
        .map(|mut q| {
            if q.id.trim().is_empty() || !seen_ids.insert(q.id.clone()) {
                q.id = uuid::Uuid::new_v4().to_string();
                seen_ids.insert(q.id.clone());
            }
            q.topic.get_or_insert_with(|| "General".to_string());
            q.explanation.get_or_insert_with(String::new);
            q
        })
        .collect()
}

/// Generator first, heuristic when it fails or yields nothing usable.
pub async fn generate_questions(
    generator: &dyn QuestionGenerator,
    schema: &serde_json::Value,
    source_text: &str,
    settings: &Settings,
) -> Vec<Question> {
    match generator.generate_questions_json(source_text, settings).await {
        Ok(raw) => {
            let mut parsed = parse_generated(&raw, schema);
            if !parsed.is_empty() {
                parsed.truncate(settings.num_questions as usize);
                info!(count = parsed.len(), "questions generated externally");
                return parsed;
            }
            warn!("generator output held no valid questions, using heuristic");
        }
        Err(err) => info!("generator unavailable ({}), using heuristic", err),
    }
    heuristic_generate(source_text, settings)
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for m in SENTENCE_BREAK.find_iter(text) {
        pieces.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    pieces.push(&text[start..]);

    let sentences: Vec<String> = pieces
        .into_iter()
        .map(str::trim)
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .map(str::to_string)
        .collect();
    if !sentences.is_empty() {
        return sentences;
    }
    if text.trim().is_empty() {
        vec!["Sample context for question generation.".to_string()]
    } else {
        vec![text.chars().take(200).collect()]
    }
}

fn top_words(text: &str, k: usize) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut freq: HashMap<&str, (usize, usize)> = HashMap::new();
    for (order, m) in KEYWORD.find_iter(&lower).enumerate() {
        freq.entry(m.as_str()).or_insert((0, order)).0 += 1;
    }
    let mut ranked: Vec<_> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(k).map(|(w, _)| w.to_string()).collect()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Answers first, then distractors from the keyword pool, deduplicated.
fn option_pool(answers: &[String], distractors: &[String], from: usize, take: usize, cap: usize) -> Vec<String> {
    let end = (from + take).min(distractors.len());
    let start = from.min(end);
    let mut options: Vec<String> = Vec::with_capacity(cap);
    for word in answers.iter().chain(&distractors[start..end]) {
        if options.len() == cap {
            break;
        }
        if !options.contains(word) {
            options.push(word.clone());
        }
    }
    options
}

/// Upper bound on how many questions one heuristic run builds.
fn question_budget(settings: &Settings) -> usize {
    settings.num_questions.min(MAX_QUESTIONS) as usize
}

struct DifficultyPlan {
    planned: std::vec::IntoIter<Difficulty>,
    issued: usize,
}

impl DifficultyPlan {
    fn new(settings: &Settings) -> Self {
        let d = settings.difficulty_distribution;
        let planned: Vec<Difficulty> = [
            (Difficulty::Easy, d.easy),
            (Difficulty::Medium, d.medium),
            (Difficulty::Hard, d.hard),
        ]
        .into_iter()
        .flat_map(|(level, count)| std::iter::repeat(level).take(count as usize))
        .take(question_budget(settings))
        .collect();
        Self {
            planned: planned.into_iter(),
            issued: 0,
        }
    }

    fn next_level(&mut self) -> Difficulty {
        let level = self
            .planned
            .next()
            .unwrap_or(Difficulty::CYCLE[self.issued % Difficulty::CYCLE.len()]);
        self.issued += 1;
        level
    }
}

/// Builds questions straight from the text: blanked key terms, true/false
/// statements and keyword recognition.
pub fn heuristic_generate(source_text: &str, settings: &Settings) -> Vec<Question> {
    let settings = settings.with_default_distributions();
    let types = settings.type_distribution;
    let sentences = split_sentences(source_text);
    let mut levels = DifficultyPlan::new(&settings);
    let mut questions = Vec::new();

    for sentence in sentences.iter().take(types.fill_blank as usize) {
        let words: Vec<&str> = BLANK_CANDIDATE.find_iter(sentence).map(|m| m.as_str()).collect();
        if words.is_empty() {
            continue;
        }
        let blank = words[words.len() / 2];
        questions.push(Question {
            id: uuid::Uuid::new_v4().to_string(),
            q_type: QuestionType::FillBlank,
            difficulty: levels.next_level(),
            prompt: sentence.replacen(blank, "____", 1),
            options: None,
            topic: Some("Key term".to_string()),
            explanation: Some(format!("The missing word is '{}'.", blank)),
            correct: Some(AnswerKey::Text(blank.to_string())),
        });
    }

    for (idx, sentence) in sentences.iter().take(types.true_false as usize).enumerate() {
        let truth = idx % 2 == 0;
        let prompt = if truth {
            sentence.clone()
        } else if sentence.contains(" is ") {
            sentence.replace(" is ", " is not ")
        } else {
            format!("Not true: {}", sentence)
        };
        questions.push(Question {
            id: uuid::Uuid::new_v4().to_string(),
            q_type: QuestionType::TrueFalse,
            difficulty: levels.next_level(),
            prompt,
            options: None,
            topic: Some("Comprehension".to_string()),
            explanation: Some("Based on the provided source text.".to_string()),
            correct: Some(AnswerKey::Flag(truth)),
        });
    }

    let keywords = top_words(source_text, KEYWORD_POOL);

    for idx in 0..(types.mcq as usize).min(question_budget(&settings)) {
        let answer = match keywords.len() {
            0 | 1 => break,
            n => keywords[idx % n].clone(),
        };
        let mut options = option_pool(std::slice::from_ref(&answer), &keywords, idx, 5, 4);
        if options.len() < 2 {
            break;
        }
        let shift = idx % options.len();
        options.rotate_right(shift);
        let correct_index = options.iter().position(|o| *o == answer).unwrap_or(0);
        questions.push(Question {
            id: uuid::Uuid::new_v4().to_string(),
            q_type: QuestionType::Mcq,
            difficulty: levels.next_level(),
            prompt: format!("Which of the following best relates to the topic: '{}'?", answer),
            options: Some(options),
            topic: Some(title_case(&answer)),
            explanation: Some(format!("'{}' appears frequently in the source material.", answer)),
            correct: Some(AnswerKey::Index(correct_index)),
        });
    }

    for idx in 0..(types.multiple_correct as usize).min(question_budget(&settings)) {
        if keywords.len() < 2 {
            break;
        }
        let answers: Vec<String> = (0..2).map(|j| keywords[(idx + j) % keywords.len()].clone()).collect();
        let mut options = option_pool(&answers, &keywords, idx, 6, 5);
        let shift = idx % options.len();
        options.rotate_right(shift);
        let mut correct: Vec<usize> = answers
            .iter()
            .filter_map(|a| options.iter().position(|o| o == a))
            .collect();
        correct.sort_unstable();
        questions.push(Question {
            id: uuid::Uuid::new_v4().to_string(),
            q_type: QuestionType::MultipleCorrect,
            difficulty: levels.next_level(),
            prompt: "Select all options that are key topics in the material.".to_string(),
            options: Some(options),
            topic: Some(answers.iter().map(|a| title_case(a)).collect::<Vec<_>>().join(", ")),
            explanation: Some("Multiple core terms are present.".to_string()),
            correct: Some(AnswerKey::Indices(correct)),
        });
    }

    questions.truncate(settings.num_questions as usize);
    questions
}
