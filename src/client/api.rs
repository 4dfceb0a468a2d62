use crate::client::answers::AnswerMap;
use crate::client::form::ContentSource;
use crate::client::ClientError;
use crate::models::{Rating, Settings, SubmissionResult, Test};
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    student_name: &'a str,
    answers: &'a AnswerMap,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct RateAck {
    #[serde(default)]
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
struct ExportLink {
    link: String,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    reply: Option<String>,
}

/// Typed wrapper over the REST endpoints.
#[derive(Debug, Clone)]
pub struct QuizApi {
    http: reqwest::Client,
    base: Url,
}

impl QuizApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base = Url::parse(&config.base_url)
            .ok()
            .filter(|u| !u.cannot_be_a_base())
            .ok_or_else(|| ClientError::InvalidBaseUrl(config.base_url.clone()))?;
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Decodes a 2xx body, or turns the `error` field of anything else into
    /// [`ClientError::Server`].
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn create_test(
        &self,
        title: &str,
        settings: &Settings,
        source: &ContentSource,
    ) -> Result<Test, ClientError> {
        let form = Form::new()
            .text("title", title.to_string())
            .text("settings", serde_json::to_string(settings)?);
        let form = match source {
            ContentSource::File(file) => form.part(
                "file",
                Part::bytes(file.bytes.clone()).file_name(file.file_name.clone()),
            ),
            ContentSource::Url(url) => form.text("url", url.clone()),
            ContentSource::Text(text) => form.text("text", text.clone()),
        };
        let response = self
            .http
            .post(self.endpoint(&["api", "create_test"])?)
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn get_test(&self, test_id: &str) -> Result<Test, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&["api", "test", test_id])?)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn submit(
        &self,
        test_id: &str,
        student_name: &str,
        answers: &AnswerMap,
    ) -> Result<SubmissionResult, ClientError> {
        let response = self
            .http
            .post(self.endpoint(&["api", "submit", test_id])?)
            .json(&SubmitBody { student_name, answers })
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn rate(&self, test_id: &str, rating: Rating) -> Result<RateAck, ClientError> {
        let response = self
            .http
            .post(self.endpoint(&["api", "rate", test_id])?)
            .json(&rating)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn export_link(&self, test_id: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&["api", "export", test_id])?)
            .send()
            .await?;
        Ok(Self::decode::<ExportLink>(response).await?.link)
    }

    /// Reply text; an absent reply reads as empty.
    pub async fn chat(&self, message: &str, test_id: Option<&str>) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.endpoint(&["api", "chat"])?)
            .json(&ChatBody { message, test_id })
            .send()
            .await?;
        Ok(Self::decode::<ChatReply>(response).await?.reply.unwrap_or_default())
    }
}
