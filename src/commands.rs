use anyhow::Result;
use async_trait::async_trait;

use crate::bot::{CommandHandler, Dispatcher};
use crate::platform::keyboard::{KeyboardButton, ReplyKeyboardMarkup};
use crate::platform::{IncomingMessage, OutboundPayload};

const GREETING: &str = "Hello! Send me any text and I'll echo it back.\n\n\
                        Tap the button below to share your location.";

/// Greets the user and offers a keyboard that shares their location or starts over.
pub struct Start;

#[async_trait]
impl CommandHandler for Start {
    async fn handle(&self, _message: &IncomingMessage, chat_id: i64) -> Result<OutboundPayload> {
        let keyboard = ReplyKeyboardMarkup::new(vec![
            vec![KeyboardButton::request_location("Share location")],
            vec![KeyboardButton::new("/start")],
        ]);
        OutboundPayload::new(chat_id, GREETING).with_reply_markup(&keyboard)
    }
}

/// Answers free text by echoing it, or reports coordinates for a shared location.
pub struct Echo;

#[async_trait]
impl CommandHandler for Echo {
    async fn handle(&self, message: &IncomingMessage, chat_id: i64) -> Result<OutboundPayload> {
        let text = match message.location {
            Some(loc) if message.text.is_empty() => {
                format!("Your location: {:.5}, {:.5}\n", loc.latitude, loc.longitude)
            }
            _ => format!("This is your input: {}\n", message.text),
        };
        Ok(OutboundPayload::new(chat_id, text))
    }
}

/// Install the stock handlers.
pub fn register_defaults(dispatcher: &mut Dispatcher) {
    dispatcher.register_command("/start", Start);
    dispatcher.register_fallback(Echo);
}
