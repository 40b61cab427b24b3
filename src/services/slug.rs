//! URL slugs for posts, projects and categories

pub const MAX_SLUG_LENGTH: usize = 200;

/// Build a URL-friendly slug.
///
/// Lowercases, turns every run of separators or ASCII punctuation into a
/// single hyphen and trims hyphens from both ends. Non-ASCII letters are
/// kept as they are. Hand-written slugs go through the same function.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.trim().to_lowercase().chars() {
        let keep = c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric());
        if keep {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    if slug.chars().count() > MAX_SLUG_LENGTH {
        slug = slug.chars().take(MAX_SLUG_LENGTH).collect();
        slug = slug.trim_end_matches('-').to_string();
    }
    slug
}

/// Append `-2`, `-3`, ... until `taken` says the candidate is free
pub async fn unique_slug<F, Fut>(base: &str, mut taken: F) -> anyhow::Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<bool>>,
{
    if !taken(base.to_string()).await? {
        return Ok(base.to_string());
    }
    for n in 2..1000 {
        let candidate = format!("{}-{}", base, n);
        if !taken(candidate.clone()).await? {
            return Ok(candidate);
        }
    }
    anyhow::bail!("No free slug derived from '{}'", base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("  Rust: Ownership & Borrowing!  "), "rust-ownership-borrowing");
        assert_eq!(generate_slug("already-a-slug"), "already-a-slug");
        assert_eq!(generate_slug("snake_case__title"), "snake-case-title");
        assert_eq!(generate_slug("Über Größe"), "über-größe");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[test]
    fn test_generate_slug_truncates() {
        let slug = generate_slug(&"a ".repeat(300));
        assert!(slug.chars().count() <= MAX_SLUG_LENGTH);
        assert!(!slug.ends_with('-'));
    }

    #[tokio::test]
    async fn test_unique_slug_appends_counter() {
        let existing = ["intro".to_string(), "intro-2".to_string()];
        let slug = unique_slug("intro", |s| {
            let taken = existing.contains(&s);
            async move { Ok(taken) }
        })
        .await
        .unwrap();
        assert_eq!(slug, "intro-3");

        let free = unique_slug("fresh", |_| async { Ok(false) }).await.unwrap();
        assert_eq!(free, "fresh");
    }

    proptest! {
        #[test]
        fn slugs_are_url_safe(title in "\\PC{0,80}") {
            let slug = generate_slug(&title);
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(slug.chars().all(|c| c == '-' || c.is_alphanumeric()));
            prop_assert!(!slug.chars().any(|c| c.is_ascii_uppercase()));
        }

        #[test]
        fn generate_slug_is_idempotent(title in "[A-Za-z0-9 _.,!-]{0,60}") {
            let once = generate_slug(&title);
            prop_assert_eq!(generate_slug(&once), once.clone());
        }
    }
}
