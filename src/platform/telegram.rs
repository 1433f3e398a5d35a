use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::platform::OutboundPayload;

/// Status and body of a completed form POST.
#[derive(Debug, Clone)]
pub struct PostResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Anything that can POST a url-encoded form. Swapped for a recorder in tests.
#[async_trait]
pub trait FormPoster: Send + Sync {
    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> anyhow::Result<PostResponse>;
}

#[async_trait]
impl FormPoster for reqwest::Client {
    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> anyhow::Result<PostResponse> {
        // The url carries the bot token; keep it out of errors.
        let response = self
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => format!("<unreadable body: {}>", e.without_url()),
        };
        Ok(PostResponse { status, body })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("sending response failed. ChatID:{chat_id}, Text:{text}. Error:{source}")]
    Transport {
        chat_id: i64,
        text: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{} server error. ChatID:{chat_id}, Text:{text}", .status.as_u16())]
    Server {
        status: StatusCode,
        chat_id: i64,
        text: String,
    },
}

/// Sends replies through the Bot API `sendMessage` method.
#[derive(Clone)]
pub struct TelegramClient {
    poster: Arc<dyn FormPoster>,
    url: String,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str) -> Self {
        Self::with_poster(api_base, token, Arc::new(reqwest::Client::new()))
    }

    pub fn with_poster(api_base: &str, token: &str, poster: Arc<dyn FormPoster>) -> Self {
        Self {
            poster,
            url: send_message_url(api_base, token),
        }
    }

    /// Deliver `payload` with a single POST.
    ///
    /// A 4xx answer (the user blocked the bot, bad markup, ...) is logged and
    /// counted as delivered. Transport failures and 5xx answers are errors.
    pub async fn send(&self, chat_id: i64, payload: &OutboundPayload) -> Result<(), SendError> {
        let text = payload.text();
        let response = self
            .poster
            .post_form(&self.url, payload.pairs())
            .await
            .map_err(|source| SendError::Transport {
                chat_id,
                text: text.to_string(),
                source,
            })?;

        let status = response.status;
        if status.is_client_error() {
            warn!(
                "Unable to send response for ChatID:{}. Text:{}. Status:{}. Response body:{}",
                chat_id, text, status, response.body
            );
            return Ok(());
        }

        if status.is_server_error() {
            return Err(SendError::Server {
                status,
                chat_id,
                text: text.to_string(),
            });
        }

        debug!(
            "Response to ChatID:{} sent. Message:{}. Status:{}. Response:{}",
            chat_id, text, status, response.body
        );
        Ok(())
    }
}

fn send_message_url(api_base: &str, token: &str) -> String {
    format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token)
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use super::*;

    /// One recorded POST.
    #[derive(Debug, Clone)]
    pub struct Call {
        pub url: String,
        pub form: Vec<(String, String)>,
    }

    impl Call {
        pub fn get(&self, key: &str) -> Option<&str> {
            self.form
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        }
    }

    /// Records every POST and answers from a script; once the script runs out it answers 200.
    #[derive(Default)]
    pub struct RecordingPoster {
        calls: Mutex<Vec<Call>>,
        script: Mutex<Vec<Option<u16>>>,
    }

    impl RecordingPoster {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Queue answers; `None` simulates a transport failure.
        pub fn scripted(answers: Vec<Option<u16>>) -> Arc<Self> {
            let poster = Self::default();
            *poster.script.lock().unwrap() = answers.into_iter().rev().collect();
            Arc::new(poster)
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FormPoster for RecordingPoster {
        async fn post_form(
            &self,
            url: &str,
            form: &[(String, String)],
        ) -> anyhow::Result<PostResponse> {
            self.calls.lock().unwrap().push(Call {
                url: url.to_string(),
                form: form.to_vec(),
            });
            let answer = self.script.lock().unwrap().pop().unwrap_or(Some(200));
            match answer {
                Some(code) => Ok(PostResponse {
                    status: StatusCode::from_u16(code).unwrap(),
                    body: format!("{{\"ok\":{}}}", code < 300),
                }),
                None => anyhow::bail!("connection refused"),
            }
        }
    }
}
