pub mod anki;
pub mod bot;
pub mod config;
pub mod core;
pub mod flashcard;
pub mod pending;
pub mod pipeline;
pub mod translator;
