pub mod job;
pub mod plan;
pub mod tokenizer;
