pub mod chat;
pub mod contact;
pub mod document;
pub mod email_code;
pub mod event;
pub mod gallery;
pub mod message;
pub mod news;
pub mod program;
pub mod user;
pub mod vote;
