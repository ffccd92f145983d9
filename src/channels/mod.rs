//! External messaging channels

pub mod telegram;

pub use telegram::TelegramManager;
