// Language-model services: vacancy match scoring, resume and cover-letter generation.
// All model calls go through llm_client; every service commits its own write through Store.

pub mod cover_letter;
pub mod handlers;
pub mod match_scorer;
pub mod prompts;
pub mod resume_generator;
