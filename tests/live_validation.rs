use pdfqa::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingLoader, HttpEmbeddingLoader},
    generation::{GenerationClient, GenerationRequest, build_generation_client},
};

fn live_config() -> Config {
    dotenvy::dotenv().ok();
    Config::from_env()
        .expect("live configuration (set GENERATION_API_KEY or GENERATION_PROVIDER=ollama)")
}

#[tokio::test]
#[ignore = "Requires live embedding provider"]
async fn live_embedding_model_loads() {
    let config = live_config();
    let loader = HttpEmbeddingLoader::from_config(&config);
    let model = config
        .embedding_models
        .first()
        .expect("at least one embedding model");

    let client = loader.load(model).await.expect("embedding model should load");
    let vectors = client
        .generate_embeddings(vec!["pdfqa live embedding".to_string(), "second".to_string()])
        .await
        .expect("failed to request embeddings from provider");

    assert_eq!(vectors.len(), 2, "expected embedding per input chunk");
    assert_eq!(vectors[0].len(), vectors[1].len(), "embedding dimension mismatch");
}

#[tokio::test]
#[ignore = "Requires live generation provider"]
async fn live_generation_answers_from_context() {
    let config = live_config();
    let client = build_generation_client(&config).expect("generation client");

    let answer = client
        .complete(GenerationRequest {
            system: "Answer using only the provided context.".into(),
            prompt: "Context: The sky is blue.\nQuestion: What color is the sky?\nAnswer:".into(),
        })
        .await
        .expect("generation should succeed");

    assert!(answer.to_lowercase().contains("blue"), "unexpected answer: {answer}");
}
