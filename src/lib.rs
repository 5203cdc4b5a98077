pub mod audio;
pub mod audio_bridge;
pub mod chat;
pub mod config;
pub mod controller;
pub mod error;
pub mod genai;
pub mod net_link;
pub mod news;
pub mod persona;
pub mod protocol;
pub mod schedule;
