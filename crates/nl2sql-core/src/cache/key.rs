use sha2::{Digest, Sha256};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Completion cache key. Temperature is fixed at zero, so provider, model
/// and prompt fully determine the request.
pub fn completion_key(provider: &str, model: &str, prompt: &str) -> String {
    let mut h = Sha256::new();
    for part in [provider, model, prompt] {
        h.update(part.as_bytes());
        h.update(b"\n");
    }
    format!("llm|{}", hex::encode(h.finalize()))
}

/// Embedding cache key. The model id is part of the key so vectors from
/// different embedding spaces never share an entry.
pub fn embedding_key(model_id: &str, text: &str) -> String {
    format!("emb|{}|{}", model_id, sha256_hex(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_separate_models() {
        assert_ne!(
            embedding_key("hashing-256", "revenue"),
            embedding_key("text-embedding-3-small", "revenue")
        );
        assert_ne!(
            completion_key("groq", "m", "p"),
            completion_key("openai", "m", "p")
        );
        // Field boundaries are delimited.
        assert_ne!(completion_key("a", "bc", "d"), completion_key("ab", "c", "d"));
    }

    #[test]
    fn keys_are_stable() {
        assert_eq!(completion_key("p", "m", "x"), completion_key("p", "m", "x"));
        assert!(embedding_key("m", "x").starts_with("emb|m|"));
    }
}
