//! Request classification and node tag merging

use serde_json::Value;

/// Header carrying comma-separated `key=value` node tags
pub const NODE_TAGS_HEADER: &str = "x-confsec-node-tags";

/// Inference endpoints whose bodies name a model
pub const INFERENCE_PATHS: &[&str] = &["/v1/completions", "/v1/chat/completions"];

const MODEL_TAG_PREFIX: &str = "model=";

/// Derive a `model=<value>` tag from an inference request body
///
/// Returns `None` for unrecognized paths, missing or malformed bodies and
/// bodies without a string `model` field.
pub fn classify(path: &str, body: Option<&[u8]>) -> Option<String> {
    if !INFERENCE_PATHS.contains(&path) {
        return None;
    }

    let body = body?;
    let parsed: Value = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::trace!("Skipping classification of {}: {}", path, err);
            return None;
        }
    };

    let model = parsed.get("model")?.as_str()?;
    Some(format!("{MODEL_TAG_PREFIX}{model}"))
}

/// Merge a derived tag into an existing tags header value
///
/// A caller-supplied `model=` tag always wins, in which case the existing
/// value is returned untouched.
pub fn merge_tag(existing: Option<&str>, tag: &str) -> String {
    match existing {
        None => tag.to_string(),
        Some(existing) if existing.is_empty() => tag.to_string(),
        Some(existing) if has_model_tag(existing) => existing.to_string(),
        Some(existing) => format!("{existing},{tag}"),
    }
}

fn has_model_tag(tags: &str) -> bool {
    tags.split(',')
        .any(|entry| entry.trim_start().starts_with(MODEL_TAG_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_completions() {
        let tag = classify("/v1/completions", Some(br#"{"model":"gpt-x","prompt":"hi"}"#));
        assert_eq!(tag.as_deref(), Some("model=gpt-x"));
    }

    #[test]
    fn test_classify_chat_completions() {
        let body = br#"{"model":"llama-3","messages":[{"role":"user","content":"hi"}]}"#;
        let tag = classify("/v1/chat/completions", Some(body));
        assert_eq!(tag.as_deref(), Some("model=llama-3"));
    }

    #[test]
    fn test_classify_unrecognized_path() {
        assert_eq!(classify("/v1/embeddings", Some(br#"{"model":"gpt-x"}"#)), None);
        assert_eq!(classify("/v1/completions/", Some(br#"{"model":"gpt-x"}"#)), None);
    }

    #[test]
    fn test_classify_swallows_bad_bodies() {
        assert_eq!(classify("/v1/completions", None), None);
        assert_eq!(classify("/v1/completions", Some(b"")), None);
        assert_eq!(classify("/v1/completions", Some(b"{not json")), None);
        assert_eq!(classify("/v1/completions", Some(b"[1,2,3]")), None);
        assert_eq!(classify("/v1/completions", Some(br#"{"prompt":"hi"}"#)), None);
        assert_eq!(classify("/v1/completions", Some(br#"{"model":42}"#)), None);
    }

    #[test]
    fn test_merge_without_existing() {
        assert_eq!(merge_tag(None, "model=gpt-x"), "model=gpt-x");
        assert_eq!(merge_tag(Some(""), "model=gpt-x"), "model=gpt-x");
    }

    #[test]
    fn test_merge_appends() {
        assert_eq!(merge_tag(Some("foo=bar"), "model=gpt-x"), "foo=bar,model=gpt-x");
    }

    #[test]
    fn test_merge_keeps_existing_model() {
        assert_eq!(
            merge_tag(Some("foo=bar,model=llama"), "model=gpt-x"),
            "foo=bar,model=llama"
        );
        assert_eq!(
            merge_tag(Some("model=llama, foo=bar"), "model=gpt-x"),
            "model=llama, foo=bar"
        );
    }

    #[test]
    fn test_merge_does_not_match_model_suffix() {
        // `gpu_model=` is a different key
        assert_eq!(
            merge_tag(Some("gpu_model=h100"), "model=gpt-x"),
            "gpu_model=h100,model=gpt-x"
        );
    }
}
