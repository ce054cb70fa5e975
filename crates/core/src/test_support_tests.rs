use super::*;

#[tokio::test]
async fn fake_llm_client_replays_scripted_responses_in_order() {
    let client = FakeLlmClient::with_text_replies(["first", "second"]);
    let req = CompletionRequest {
        model: "test-model".into(),
        instructions: String::new(),
        messages: Vec::new(),
        tools: Vec::new(),
        max_output_tokens: None,
        temperature: None,
        extra: Default::default(),
    };
    let first = client.complete(req.clone(), None).await.expect("first reply");
    let second = client.complete(req, None).await.expect("second reply");
    assert_eq!(first.text, "first");
    assert_eq!(second.text, "second");
    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn fake_llm_client_errors_once_queue_is_exhausted() {
    let client = FakeLlmClient::new(Vec::new());
    let req = CompletionRequest {
        model: "test-model".into(),
        instructions: String::new(),
        messages: Vec::new(),
        tools: Vec::new(),
        max_output_tokens: None,
        temperature: None,
        extra: Default::default(),
    };
    let err = client.complete(req, None).await.expect_err("should error");
    assert!(err.message().contains("exhausted"));
}

#[test]
fn sample_request_has_non_zero_context_length() {
    let req = sample_request("hello");
    assert!(req.model_capabilities.context_length > 0);
    assert_eq!(req.prompt, "hello");
}
