use crate::normalize::normalize_sql;

pub fn exact_match(generated: &str, ground_truth: &str) -> bool {
    normalize_sql(generated) == normalize_sql(ground_truth)
}

/// Normalized Levenshtein similarity of the canonical forms, in `[0, 1]`.
pub fn sql_similarity(generated: &str, ground_truth: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize_sql(generated), &normalize_sql(ground_truth))
}
