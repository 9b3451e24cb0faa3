use std::collections::HashMap;

const MAX_N: usize = 4;

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for w in tokens.windows(n) {
            *counts.entry(w).or_insert(0) += 1;
        }
    }
    counts
}

/// Token BLEU over 1..=4-grams. Each order contributes the F1 of clipped
/// precision and recall; orders above one use add-one smoothing. The score is
/// the geometric mean of the four F1 values.
pub fn bleu_score(candidate: &[String], reference: &[String]) -> f64 {
    if candidate.is_empty() || reference.is_empty() {
        return 0.0;
    }
    let mut log_sum = 0.0;
    for n in 1..=MAX_N {
        let cand = ngram_counts(candidate, n);
        let refs = ngram_counts(reference, n);
        let cand_total: usize = cand.values().sum();
        let ref_total: usize = refs.values().sum();
        let clipped: usize = cand
            .iter()
            .map(|(g, c)| (*c).min(refs.get(g).copied().unwrap_or(0)))
            .sum();

        let smooth = if n > 1 { 1.0 } else { 0.0 };
        let precision = (clipped as f64 + smooth) / (cand_total as f64 + smooth);
        let recall = (clipped as f64 + smooth) / (ref_total as f64 + smooth);
        if precision + recall == 0.0 {
            return 0.0;
        }
        let f1 = 2.0 * precision * recall / (precision + recall);
        log_sum += f1.ln();
    }
    (log_sum / MAX_N as f64).exp()
}
