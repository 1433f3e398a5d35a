use serde::{Deserialize, Serialize};

/// A button on a custom reply keyboard.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KeyboardButton {
    pub text: String,
    /// When set, pressing the button shares the user's current location.
    #[serde(rename = "request_location", default)]
    pub location: bool,
}

impl KeyboardButton {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: false,
        }
    }

    pub fn request_location(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: true,
        }
    }
}

/// Rows of buttons shown in place of the user's keyboard.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ReplyKeyboardMarkup {
    pub keyboard: Vec<Vec<KeyboardButton>>,
}

impl ReplyKeyboardMarkup {
    pub fn new(keyboard: Vec<Vec<KeyboardButton>>) -> Self {
        Self { keyboard }
    }
}
