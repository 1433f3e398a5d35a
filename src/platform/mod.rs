pub mod keyboard;
pub mod telegram;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use self::keyboard::ReplyKeyboardMarkup;

/// Webhook body delivered by the Bot API. Only message updates are handled.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Update {
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

/// A single chat message received through the webhook.
///
/// Every field defaults when absent so partial payloads still decode.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IncomingMessage {
    pub text: String,
    pub chat: Chat,
    pub from: Sender,
    pub location: Option<Location>,
}

impl IncomingMessage {
    pub fn chat_id(&self) -> i64 {
        self.chat.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
#[allow(dead_code)]
pub struct Chat {
    pub id: i64,
    pub first_name: String,
    pub username: String,
    #[serde(rename = "type")]
    pub chat_type: String,
}

/// Author of a message (`from` on the wire).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
#[allow(dead_code)]
pub struct Sender {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: String,
    pub language_code: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Form fields posted to `sendMessage`. Keys keep insertion order and may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundPayload {
    fields: Vec<(String, String)>,
}

impl OutboundPayload {
    /// Payload carrying the two fields every reply needs.
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self::default()
            .with("chat_id", chat_id.to_string())
            .with("text", text)
    }

    /// Set `key`, replacing any existing values for it.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.fields.retain(|(k, _)| *k != key);
        self.fields.push((key, value.into()));
        self
    }

    /// Add another value under `key` without touching existing ones.
    #[cfg(test)]
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.get("chat_id")
    }

    /// Message text, or an empty string when the handler left it out.
    pub fn text(&self) -> &str {
        self.get("text").unwrap_or_default()
    }

    /// Attach a reply keyboard, encoded as JSON text the way the Bot API expects in forms.
    pub fn with_reply_markup(self, markup: &ReplyKeyboardMarkup) -> Result<Self> {
        let encoded =
            serde_json::to_string(markup).context("Failed to encode reply keyboard markup")?;
        Ok(self.with("reply_markup", encoded))
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::keyboard::KeyboardButton;
    use super::*;

    #[test]
    fn test_decode_minimal_update() {
        let update: Update =
            serde_json::from_str(r#"{"message":{"text":"/start","chat":{"id":123}}}"#).unwrap();
        let msg = update.message.unwrap();
        assert_eq!(msg.text, "/start");
        assert_eq!(msg.chat_id(), 123);
        assert_eq!(msg.from, Sender::default());
        assert!(msg.location.is_none());
    }

    #[test]
    fn test_decode_full_update() {
        let body = r#"{
            "update_id": 10,
            "message": {
                "message_id": 7,
                "text": "hi",
                "chat": {"id": -42, "first_name": "Ann", "username": "ann", "type": "private"},
                "from": {"id": 99, "is_bot": false, "first_name": "Ann", "username": "ann", "language_code": "en"},
                "location": {"latitude": 51.5, "longitude": -0.12}
            }
        }"#;
        let msg = serde_json::from_str::<Update>(body)
            .unwrap()
            .message
            .unwrap();
        assert_eq!(msg.chat.chat_type, "private");
        assert_eq!(msg.chat_id(), -42);
        assert_eq!(msg.from.language_code, "en");
        assert_eq!(
            msg.location,
            Some(Location {
                latitude: 51.5,
                longitude: -0.12
            })
        );
    }

    #[test]
    fn test_update_without_message() {
        let update: Update = serde_json::from_str(r#"{"update_id": 1}"#).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn test_payload_new_sets_chat_and_text() {
        let payload = OutboundPayload::new(123, "test start case");
        assert_eq!(payload.chat_id(), Some("123"));
        assert_eq!(payload.text(), "test start case");
        assert_eq!(payload.pairs().len(), 2);
    }

    #[test]
    fn test_payload_with_replaces_and_append_keeps() {
        let mut payload = OutboundPayload::new(1, "first").with("text", "second");
        assert_eq!(payload.text(), "second");
        assert_eq!(payload.pairs().len(), 2);

        payload.append("entities", "a");
        payload.append("entities", "b");
        assert_eq!(payload.get("entities"), Some("a"));
        assert_eq!(payload.pairs().len(), 4);
    }

    #[test]
    fn test_payload_reply_markup_is_json_text() {
        let markup =
            ReplyKeyboardMarkup::new(vec![vec![KeyboardButton::request_location("Share")]]);
        let payload = OutboundPayload::new(5, "where?")
            .with_reply_markup(&markup)
            .unwrap();
        let raw = payload.get("reply_markup").unwrap();
        let value: serde_json::Value = serde_json::from_str(raw).unwrap();
        assert_eq!(value["keyboard"][0][0]["text"], "Share");
        assert_eq!(value["keyboard"][0][0]["request_location"], true);
    }

    #[test]
    fn test_payload_text_defaults_to_empty() {
        assert_eq!(OutboundPayload::default().text(), "");
        assert_eq!(OutboundPayload::default().chat_id(), None);
    }
}
