//! Messaging front-end adapters for tutorbot.

mod telegram;

pub use telegram::{TelegramChannel, TelegramConfig};
