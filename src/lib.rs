//! Snapchat Memories Bot Library
//!
//! A Telegram bot that backs up Snapchat Memories into a chat.
//!
//! This crate provides the core functionality for:
//! - Parsing Snapchat data export pages and downloading the linked media
//! - Uploading memories to Telegram with date and location captions
//! - Serving a liveness endpoint and probing it
//! - Describing, rendering and auditing the container deployment

pub mod commands;
pub mod config;
pub mod deploy;
pub mod health;
pub mod memories;
pub mod telegram;
