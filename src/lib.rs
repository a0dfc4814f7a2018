#![deny(missing_docs)]
//! Media Fetch Bot
//!
//! A Telegram bot that takes a media link, asks for a format via inline
//! buttons, runs yt-dlp and uploads the resulting file back to the chat.

/// Telegram bot implementation
pub mod bot;
/// Configuration management
pub mod config;
/// yt-dlp backed media extraction
pub mod downloader;
/// Telegram runtime entrypoint
pub mod runner;
pub mod utils;
