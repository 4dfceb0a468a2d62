use crate::config::Config;
use crate::generator::QuestionGenerator;
use crate::models::{AnswerValue, GradedDetail, Question, Settings};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::fs;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub settings: Settings,
    pub questions: Vec<Question>,
    pub source_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub test_id: String,
    pub submitted_at: DateTime<Utc>,
    pub student_name: String,
    pub answers: HashMap<String, Option<AnswerValue>>,
    pub score: u32,
    pub accuracy: f64,
    pub details: Vec<GradedDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRecord {
    pub id: String,
    pub test_id: String,
    pub question_idx: usize,
    pub rating: u8,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryStore {
    pub tests: RwLock<HashMap<String, TestRecord>>,
    pub submissions: RwLock<Vec<SubmissionRecord>>,
    pub ratings: RwLock<Vec<RatingRecord>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistentSnapshot {
    tests: HashMap<String, TestRecord>,
    submissions: Vec<SubmissionRecord>,
    ratings: Vec<RatingRecord>,
}

impl InMemoryStore {
    pub fn new(snapshot_path: Option<&Path>) -> Self {
        let snapshot = snapshot_path
            .and_then(|path| {
                let raw = fs::read_to_string(path).ok()?;
                match serde_json::from_str::<PersistentSnapshot>(&raw) {
                    Ok(s) => Some(s),
                    Err(err) => {
                        warn!("failed to read local snapshot {}: {}", path.display(), err);
                        None
                    }
                }
            })
            .unwrap_or_default();

        Self {
            tests: RwLock::new(snapshot.tests),
            submissions: RwLock::new(snapshot.submissions),
            ratings: RwLock::new(snapshot.ratings),
        }
    }

    async fn snapshot(&self) -> PersistentSnapshot {
        PersistentSnapshot {
            tests: self.tests.read().await.clone(),
            submissions: self.submissions.read().await.clone(),
            ratings: self.ratings.read().await.clone(),
        }
    }
}

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Fixed one-minute windows per scope and client key. Windows older than a
/// minute are dropped whenever a new key is inserted.
#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, (u32, Instant)>,
}

impl RateLimiter {
    pub fn check(&self, scope: &str, key: &str, limit_per_minute: u32) -> bool {
        self.check_at(scope, key, limit_per_minute, Instant::now())
    }

    fn check_at(&self, scope: &str, key: &str, limit_per_minute: u32, now: Instant) -> bool {
        let full_key = format!("{scope}:{key}");
        if let Some(mut entry) = self.windows.get_mut(&full_key) {
            return if now.duration_since(entry.1) > RATE_WINDOW {
                *entry = (1, now);
                true
            } else if entry.0 >= limit_per_minute {
                false
            } else {
                entry.0 += 1;
                true
            };
        }
        self.windows
            .retain(|_, (_, started)| now.duration_since(*started) <= RATE_WINDOW);
        self.windows.insert(full_key, (1, now));
        true
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<InMemoryStore>,
    pub generator: Arc<dyn QuestionGenerator>,
    pub question_schema: Arc<serde_json::Value>,
    pub http: reqwest::Client,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, generator: Arc<dyn QuestionGenerator>, question_schema: serde_json::Value) -> Self {
        let store = InMemoryStore::new(config.state_path.as_deref());
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            generator,
            question_schema: Arc::new(question_schema),
            http: reqwest::Client::new(),
            limiter: Arc::new(RateLimiter::default()),
        }
    }

    pub async fn insert_test(&self, title: String, settings: Settings, questions: Vec<Question>, source_text: String) -> TestRecord {
        let record = TestRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            created_at: Utc::now(),
            settings,
            questions,
            source_text,
        };
        self.store
            .tests
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        self.persist_logged("create_test").await;
        record
    }

    pub async fn find_test(&self, id: &str) -> Option<TestRecord> {
        self.store.tests.read().await.get(id).cloned()
    }

    pub async fn test_exists(&self, id: &str) -> bool {
        self.store.tests.read().await.contains_key(id)
    }

    pub async fn record_submission(&self, record: SubmissionRecord) {
        self.store.submissions.write().await.push(record);
        self.persist_logged("submit").await;
    }

    pub async fn record_rating(&self, test_id: &str, question_idx: usize, rating: u8) {
        self.store.ratings.write().await.push(RatingRecord {
            id: uuid::Uuid::new_v4().to_string(),
            test_id: test_id.to_string(),
            question_idx,
            rating,
            created_at: Utc::now(),
        });
        self.persist_logged("rate").await;
    }

    async fn persist_logged(&self, after: &str) {
        if let Err(err) = self.persist_core_data().await {
            warn!("failed to persist local state after {}: {}", after, err);
        }
    }

    pub async fn persist_core_data(&self) -> anyhow::Result<()> {
        let Some(path) = self.config.state_path.as_ref() else {
            return Ok(());
        };
        let snapshot = self.store.snapshot().await;
        let serialized = serde_json::to_vec_pretty(&snapshot)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serialized).await?;
        Ok(())
    }
}
