//! Static bot commands. These never touch conversation history.

use super::format::escape_html;
use super::telegram::{Message, OutgoingMessage, ParseMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
}

impl Command {
    /// Recognise `/start` and `/help`, optionally addressed as `/help@SomeBot`
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);

        match name {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            _ => None,
        }
    }

    pub fn reply(&self, message: &Message) -> OutgoingMessage {
        match self {
            Command::Start => {
                let greeting = match &message.from {
                    Some(user) => format!(
                        "Hi <a href=\"tg://user?id={}\">{}</a>!",
                        user.id,
                        escape_html(&user.full_name())
                    ),
                    None => "Hi!".to_string(),
                };
                OutgoingMessage::plain(message.chat.id, greeting)
                    .with_parse_mode(ParseMode::Html)
                    .with_force_reply()
            }
            Command::Help => OutgoingMessage::plain(message.chat.id, "Help!"),
        }
    }
}

/// Any slash-prefixed text. Unknown commands are ignored, not answered.
pub fn is_command(text: &str) -> bool {
    text.trim_start().starts_with('/')
}
