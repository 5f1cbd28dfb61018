pub mod answer;

pub use answer::{AnswerRequest, AnswerService, HistoryEntry, HttpAnswerClient};
