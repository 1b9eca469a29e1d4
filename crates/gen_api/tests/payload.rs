use gen_api::payload::{created_session_id, list_page};
use gen_api::GenerateRequestBody;
use gen_contract::{
    ExplanationDetail, GenerationRequest, Intent, PersonalizationProfile, SamplingProfile,
    SkillLevel,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn request(context: Option<&str>) -> GenerationRequest {
    GenerationRequest {
        prompt: "print hello".to_string(),
        context: context.map(ToString::to_string),
        intent: Intent::Fix,
        sampling: SamplingProfile {
            temperature: 0.1,
            top_p: 0.9,
            max_tokens: 512,
            include_comments: true,
            include_docstring: false,
            include_type_hints: true,
        },
        personalization: PersonalizationProfile {
            skill_level: SkillLevel::Expert,
            explanation_detail: ExplanationDetail::Brief,
            project_context: "data pipelines".to_string(),
        },
    }
}

#[test]
fn generate_body_carries_intent_sampling_and_personalization() {
    let body = serde_json::to_value(GenerateRequestBody::from(&request(Some("x = 1"))))
        .expect("body should serialize");

    assert_eq!(
        body,
        json!({
            "prompt": "print hello",
            "context": "x = 1",
            "intent": "fix",
            "model_type": "fix",
            "temperature": 0.1,
            "top_p": 0.9,
            "max_tokens": 512,
            "include_comments": true,
            "include_docstring": false,
            "include_type_hints": true,
            "skill_level": "expert",
            "explanation_detail": "brief",
            "project_context": "data pipelines",
            "stream": true,
        })
    );
}

#[test]
fn generate_body_omits_blank_context() {
    let body = serde_json::to_value(GenerateRequestBody::from(&request(Some("  "))))
        .expect("body should serialize");
    assert!(body.get("context").is_none());
}

#[test]
fn list_page_accepts_bare_arrays_and_envelopes() {
    let (items, next) = list_page(json!([{"id": "1"}]), &["results"]).expect("array");
    assert_eq!(items.len(), 1);
    assert_eq!(next, None);

    let (items, next) = list_page(
        json!({"results": [{"id": "1"}, {"id": "2"}], "next": "http://host/api/history/sessions?page=2"}),
        &["results"],
    )
    .expect("envelope");
    assert_eq!(items.len(), 2);
    assert_eq!(next.as_deref(), Some("http://host/api/history/sessions?page=2"));

    assert!(list_page(json!({"count": 0}), &["results"]).is_none());
}

#[test]
fn created_session_id_reads_string_and_numeric_ids() {
    assert_eq!(created_session_id(&json!({"id": "abc"})).as_deref(), Some("abc"));
    assert_eq!(created_session_id(&json!({"id": 17})).as_deref(), Some("17"));
    assert_eq!(
        created_session_id(&json!({"session": {"id": "nested"}})).as_deref(),
        Some("nested")
    );
    assert_eq!(created_session_id(&json!({"id": "  "})), None);
}
