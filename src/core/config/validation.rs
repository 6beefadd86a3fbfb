use super::settings::RagConfig;
use crate::core::errors::RagError;

pub fn validate_config(config: &RagConfig) -> Result<(), RagError> {
    let gateway = &config.gateway;
    if gateway.base_url.trim().is_empty() {
        return Err(config_error("gateway.base_url", "must not be empty"));
    }
    validate_f64_field("gateway.temperature", gateway.temperature, 0.0, 2.0)?;
    validate_u64_field("gateway.max_tokens", gateway.max_tokens as u64, 1, 1_000_000)?;
    validate_u64_field(
        "gateway.request_timeout_secs",
        gateway.request_timeout_secs,
        1,
        86_400,
    )?;

    let index = &config.index;
    validate_u64_field("index.retrieval_k", index.retrieval_k as u64, 1, 100)?;
    validate_u64_field("index.min_chunk_chars", index.min_chunk_chars as u64, 0, 100_000)?;
    validate_u64_field("index.embed_batch_size", index.embed_batch_size as u64, 1, 2048)?;

    let pipeline = &config.pipeline;
    validate_u64_field(
        "pipeline.max_context_chunks",
        pipeline.max_context_chunks as u64,
        1,
        50,
    )?;
    validate_u64_field(
        "pipeline.chunk_char_budget",
        pipeline.chunk_char_budget as u64,
        1,
        100_000,
    )?;
    validate_u64_field(
        "pipeline.max_history_turns",
        pipeline.max_history_turns as u64,
        0,
        200,
    )?;
    validate_u64_field(
        "pipeline.history_turn_chars",
        pipeline.history_turn_chars as u64,
        1,
        100_000,
    )?;
    validate_u64_field(
        "pipeline.completion_timeout_secs",
        pipeline.completion_timeout_secs,
        1,
        86_400,
    )?;

    let conversation = &config.conversation;
    validate_u64_field(
        "conversation.title_prefix_chars",
        conversation.title_prefix_chars as u64,
        1,
        1_000,
    )?;
    validate_u64_field(
        "conversation.max_title_chars",
        conversation.max_title_chars as u64,
        1,
        10_000,
    )?;
    validate_u64_field(
        "conversation.default_list_limit",
        conversation.default_list_limit as u64,
        1,
        100_000,
    )?;

    Ok(())
}

fn validate_u64_field(path: &str, value: u64, min: u64, max: u64) -> Result<(), RagError> {
    if value < min || value > max {
        return Err(config_error(
            path,
            &format!("must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

fn validate_f64_field(path: &str, value: f64, min: f64, max: f64) -> Result<(), RagError> {
    if !value.is_finite() || value < min || value > max {
        return Err(config_error(
            path,
            &format!("must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

fn config_error(path: &str, message: &str) -> RagError {
    RagError::Config(format!("{} {}", path, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&RagConfig::default()).is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = RagConfig::default();
        config.index.retrieval_k = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("index.retrieval_k"));

        let mut config = RagConfig::default();
        config.gateway.temperature = 3.5;
        assert!(validate_config(&config).is_err());

        let mut config = RagConfig::default();
        config.pipeline.max_context_chunks = 51;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_history_window_is_allowed() {
        let mut config = RagConfig::default();
        config.pipeline.max_history_turns = 0;
        assert!(validate_config(&config).is_ok());
    }
}
