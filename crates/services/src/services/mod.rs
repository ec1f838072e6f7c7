pub mod assistant;
pub mod auth;
pub mod chat;
pub mod claude_api;
pub mod config;
pub mod contact;
pub mod content;
pub mod image;
pub mod image_generation;
pub mod mailer;
pub mod storage;
pub mod users;
