pub mod client;
pub mod config;
pub mod error;
pub mod generator;
pub mod grading;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod source;
pub mod state;

use std::sync::Arc;

pub fn build_state(config: config::Config) -> anyhow::Result<state::AppState> {
    let schema_raw = include_str!("../contracts/questions.schema.json");
    let schema: serde_json::Value = serde_json::from_str(schema_raw)?;
    let generator: Arc<dyn generator::QuestionGenerator> = match config
        .generator_command
        .as_deref()
        .and_then(|cmd| generator::CommandGenerator::new(cmd, config.generator_timeout))
    {
        Some(command) => Arc::new(command),
        None => Arc::new(generator::NoGenerator),
    };
    Ok(state::AppState::new(config, generator, schema))
}
