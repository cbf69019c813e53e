//! Media Saver Bot Library
//!
//! A Telegram bot that saves media from Instagram, TikTok, Snapchat, Likee
//! and YouTube links sent to it.
//!
//! This crate provides the core functionality for:
//! - Downloading and transcoding media per platform
//! - Gating usage behind mandatory channel subscriptions
//! - Persisting users, admins, channels and settings in SQLite
//! - The admin panel: statistics, broadcasts, backups and settings

pub mod broadcast;
pub mod commands;
pub mod config;
pub mod download;
pub mod handlers;
pub mod scheduler;
pub mod stats;
pub mod storage;
pub mod subscription;
pub mod system;
pub mod telegram;
