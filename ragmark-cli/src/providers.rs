//! Provider wiring: turn configuration flags into concrete embedding and
//! generation backends.

use std::sync::Arc;

use anyhow::{Result, bail};
use ragmark_core::mock::{MockEmbeddingProvider, MockGenerator};
use ragmark_core::ollama::OllamaEmbedding;
use ragmark_core::openai::OpenAiEmbedding;
use ragmark_core::{
    AcceleratorConfig, AnswerGenerator, DeviceRequest, EmbeddingProvider, EngineConfig, RagEngine,
    RetryPolicy, detect_gpu_count, select_device,
};
use ragmark_model::{OllamaGenerator, OpenAiGenerator};
use tracing::info;

use crate::ConfigArgs;

/// Build a fully wired engine from the CLI configuration.
pub fn build_engine(args: &ConfigArgs) -> Result<RagEngine> {
    let requested: DeviceRequest = args.device.parse()?;
    let device = select_device(requested, detect_gpu_count());
    let accelerator = AcceleratorConfig::new(device, args.gpu_memory_fraction)?;
    info!(%device, memory_fraction = accelerator.memory_fraction, "resolved accelerator");

    let mut config = EngineConfig::builder()
        .knowledge_dir(&args.knowledge_dir)
        .store_dir(&args.store_dir)
        .chunk_size(args.chunk_size)
        .chunk_overlap(args.chunk_overlap)
        .top_k(args.top_k)
        .request_timeout_secs(args.request_timeout_secs)
        .max_retries(args.max_retries)
        .accelerator(accelerator);
    if let Some(threshold) = args.score_threshold {
        config = config.score_threshold(threshold);
    }
    let config = config.build()?;

    let retry = RetryPolicy::new(args.max_retries);
    let timeout = config.request_timeout();

    let embedder: Arc<dyn EmbeddingProvider> = match args.embedding_provider.as_str() {
        "ollama" => Arc::new(
            OllamaEmbedding::new(
                &args.ollama_base_url,
                &args.embedding_model,
                args.embedding_dimensions,
                &accelerator,
            )?
            .with_timeout(timeout)?
            .with_retry_policy(retry),
        ),
        "openai" => {
            let mut provider = OpenAiEmbedding::from_env()?
                .with_model(&args.embedding_model, args.embedding_dimensions);
            if let Some(base_url) = &args.openai_base_url {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider.with_timeout(timeout)?.with_retry_policy(retry))
        }
        "mock" => Arc::new(MockEmbeddingProvider::new(args.embedding_dimensions)),
        other => bail!("unknown embedding provider '{other}' (expected ollama, openai, or mock)"),
    };

    let generator: Arc<dyn AnswerGenerator> = match args.generator_provider.as_str() {
        "ollama" => Arc::new(
            OllamaGenerator::new(&args.ollama_base_url, &args.generator_model)?
                .with_timeout(timeout)?
                .with_retry_policy(retry),
        ),
        "openai" => {
            let mut provider = OpenAiGenerator::from_env()?.with_model(&args.generator_model);
            if let Some(base_url) = &args.openai_base_url {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider.with_timeout(timeout)?.with_retry_policy(retry))
        }
        "mock" => Arc::new(MockGenerator::new(
            "No generator is configured; this is a mock response.",
        )),
        other => bail!("unknown generator provider '{other}' (expected ollama, openai, or mock)"),
    };

    Ok(RagEngine::builder()
        .config(config)
        .embedder(embedder)
        .generator(generator)
        .build()?)
}
