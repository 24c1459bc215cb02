pub mod handlers;
pub mod interpret;
pub mod matching;
pub mod prompts;
