use super::Embedder;
use async_trait::async_trait;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "by", "did", "do", "does", "each", "for", "from", "had",
    "has", "have", "how", "in", "is", "it", "me", "of", "on", "or", "show", "the", "to", "was",
    "were", "what", "which", "with",
];

/// Offline embedder: feature hashing over word unigrams and bigrams.
/// Deterministic and dependency-free, so similarity selection works without
/// network access.
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(8) }
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| stem(&w.to_lowercase()))
            .filter(|w| !STOPWORDS.contains(&w.as_str()))
            .collect();

        let mut v = vec![0.0f32; self.dims];
        for w in &words {
            self.add(&mut v, w, 1.0);
        }
        for pair in words.windows(2) {
            self.add(&mut v, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        v
    }

    fn add(&self, v: &mut [f32], feature: &str, weight: f32) {
        let h = fnv1a(feature.as_bytes());
        let idx = (h % self.dims as u64) as usize;
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in bytes {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

/// Strips a few English suffixes so "ratios" and "ratio" share a feature.
fn stem(w: &str) -> String {
    for suffix in ["ies", "es", "s"] {
        if w.len() > suffix.len() + 3 && w.ends_with(suffix) {
            let base = &w[..w.len() - suffix.len()];
            return if suffix == "ies" {
                format!("{}y", base)
            } else {
                base.to_string()
            };
        }
    }
    w.to_string()
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn model_id(&self) -> String {
        format!("hashing-{}", self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cos(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (na * nb)
    }

    #[test]
    fn similar_questions_score_higher() {
        let e = HashingEmbedder::default();
        let q = e.vectorize("What is the current ratio trend?");
        let near = e.vectorize("Compare the current ratio across all years");
        let far = e.vectorize("Summarize operating cash flows per year");
        assert!(cos(&q, &near) > cos(&q, &far));
    }

    #[test]
    fn vectors_are_deterministic() {
        let e = HashingEmbedder::new(64);
        assert_eq!(e.vectorize("net profit 2024"), e.vectorize("net profit 2024"));
        assert_eq!(e.model_id(), "hashing-64");
    }

    #[test]
    fn stemming_merges_plurals() {
        assert_eq!(stem("ratios"), "ratio");
        assert_eq!(stem("liabilities"), "liability");
        assert_eq!(stem("is"), "is");
    }
}
