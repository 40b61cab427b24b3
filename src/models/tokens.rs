//! Token lists (post tags, project technologies)
//!
//! Tokens are stored in one comma-joined column. Normalised tokens never
//! contain commas, so `',' || tags || ','` can be matched with
//! `LIKE '%,token,%'`.

/// Trim, lowercase and deduplicate tokens, dropping empties and commas.
/// Order of first appearance is kept.
pub fn normalize_tokens<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    for raw in tokens {
        for piece in raw.as_ref().split(',') {
            let token = piece.trim().to_lowercase();
            if !token.is_empty() && !out.contains(&token) {
                out.push(token);
            }
        }
    }
    out
}

pub fn tokens_to_column(tokens: &[String]) -> String {
    tokens.join(",")
}

pub fn tokens_from_column(column: &str) -> Vec<String> {
    column
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
