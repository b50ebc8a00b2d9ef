//! OpenAI-compatible provider (OpenAI and Azure OpenAI)

mod backend;
mod client;
mod types;

pub use backend::{OpenAIChatBackend, OpenAIConnector};
pub use client::{ApiFlavor, OpenAIClient};
