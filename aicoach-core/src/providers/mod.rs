//! Concrete adapters behind [`crate::provider::StructuredProvider`].

pub mod gemini;
pub mod openai;
