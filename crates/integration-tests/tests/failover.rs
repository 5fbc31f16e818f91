mod harness;

use harness::{DEFAULT_REPLY, MockVendor, config};
use quill_llm::{CallContext, CompletionRequest, LlmError, LlmService, Message};

fn request(model: &str) -> CompletionRequest {
    CompletionRequest::new(vec![Message::user("Summarize the diff")]).with_model(model)
}

#[tokio::test]
async fn missing_model_falls_back_once() {
    let mock = MockVendor::builder().missing("gpt-4-turbo").start().await.unwrap();
    let service = LlmService::new(&config(&mock.openai_section()));

    let response = service
        .complete(&request("gpt-4-turbo"), &CallContext::new())
        .await
        .unwrap();

    assert_eq!(response.content, DEFAULT_REPLY);
    assert_eq!(response.model, "gpt-4o-mini");
    assert_eq!(mock.requested_models(), ["gpt-4-turbo", "gpt-4o-mini"]);
}

#[tokio::test]
async fn missing_fallback_surfaces_not_found() {
    let mock = MockVendor::builder()
        .missing("claude-3-opus-latest")
        .missing("claude-3-5-sonnet-latest")
        .start()
        .await
        .unwrap();
    let service = LlmService::new(&config(&mock.anthropic_section()));

    let err = service
        .complete(&request("claude-3-opus-latest"), &CallContext::new())
        .await
        .unwrap_err();

    let LlmError::ModelNotFound { model, alternatives } = err else {
        panic!("expected model not found, got {err:?}");
    };
    assert_eq!(model, "claude-3-5-sonnet-latest");
    assert!(!alternatives.is_empty());
    assert_eq!(mock.completion_count(), 2);
}

#[tokio::test]
async fn ollama_large_model_falls_back_to_installed_size() {
    let mock = MockVendor::builder().missing("llama3.1:70b").start().await.unwrap();
    let service = LlmService::new(&config(&mock.ollama_section()));

    let response = service
        .complete(&request("llama3.1:70b"), &CallContext::new())
        .await
        .unwrap();

    assert_eq!(response.model, "llama3.1:8b");
}

#[tokio::test]
async fn rate_limit_is_retried_until_success() {
    let mock = MockVendor::builder().rate_limited(2).start().await.unwrap();
    let service = LlmService::new(&config(&mock.gemini_section()));

    let response = service
        .complete(&request("gemini-2.0-flash"), &CallContext::new())
        .await
        .unwrap();

    assert_eq!(response.content, DEFAULT_REPLY);
    assert_eq!(mock.completion_count(), 3);
}

#[tokio::test]
async fn persistent_rate_limit_gives_up_after_retries() {
    let mock = MockVendor::builder().rate_limited(100).start().await.unwrap();
    let service = LlmService::new(&config(&mock.openai_section()));

    let err = service
        .complete(&request("gpt-4o-mini"), &CallContext::new())
        .await
        .unwrap_err();

    assert!(err.is_rate_limited());
    // initial attempt plus three retries
    assert_eq!(mock.completion_count(), 4);
}

#[tokio::test]
async fn malformed_model_id_is_replaced_without_a_call() {
    let mock = MockVendor::start().await.unwrap();
    let service = LlmService::new(&config(&mock.openai_section()));

    let response = service
        .complete(&request("gpt 4o\n"), &CallContext::new())
        .await
        .unwrap();

    assert_eq!(response.model, "gpt-4o-mini");
    assert_eq!(mock.requested_models(), ["gpt-4o-mini"]);
}
