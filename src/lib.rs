//! Library core for Mailsift.
//!
//! A personal email triage backend: mailbox accounts are linked over OAuth,
//! new inbox mail is pulled on a schedule, archived at the source, stored
//! locally, and enriched (summary, category, unsubscribe link) by a language
//! model. The API exposes CRUD over categories and emails plus sync
//! triggers.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
