//! Telegram adapters.
//!
//! - `feed`: the `ica-core` ChannelFeed port over public channel previews
//! - `router` + `handlers`: an optional teloxide bot exposing the assistant
//!   tools as chat commands

pub mod feed;
pub mod handlers;
pub mod router;

pub use feed::TelegramWebFeed;
