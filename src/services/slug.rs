//! Slug generation
//!
//! A slug is the lower-case, hyphen-separated form of a store name used in
//! `/store/{slug}`. [`generate_slug`] normalises a name; [`next_free_slug`]
//! keeps `base` when it is free and otherwise numbers the slug after the
//! stores already sharing it, skipping numbers that are taken.

use regex::RegexBuilder;

/// Fallback when a name has no sluggable characters
const EMPTY_SLUG: &str = "store";

/// Compiled size allowed for the collision pattern
const REGEX_SIZE_LIMIT: usize = 10 * (1 << 20);

/// Generate a URL-friendly slug from a store name.
///
/// ASCII letters and digits are kept (lower-cased), non-ASCII letters are
/// kept as-is, and every other character becomes a separator. Runs of
/// separators collapse to one `-` and leading/trailing ones are dropped.
pub fn generate_slug(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut prev_hyphen = true;

    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
            result.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen {
            result.push('-');
            prev_hyphen = true;
        }
    }

    let trimmed = result.trim_end_matches('-');
    if trimmed.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Pick the slug for a store named with slug `base`.
///
/// `existing` holds slugs that start with `base` (other stores only). Those
/// matching `^(base)(-[0-9]*)?$` case-insensitively count as collisions;
/// with `n` collisions the result is `base-{n+1}`, bumped further if that
/// exact slug is already taken.
pub fn next_free_slug(base: &str, existing: &[String]) -> String {
    next_free_slug_within(base, existing, REGEX_SIZE_LIMIT)
}

fn next_free_slug_within(base: &str, existing: &[String], size_limit: usize) -> String {
    let pattern = format!("^({})(-[0-9]*)?$", regex::escape(base));
    let collisions: Vec<&String> = match RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .size_limit(size_limit)
        .build()
    {
        Ok(matcher) => existing.iter().filter(|s| matcher.is_match(s)).collect(),
        // Only a name too long for the size limit gets here; every
        // prefixed slug then counts as a collision
        Err(e) => {
            tracing::warn!("Slug pattern for {} chars rejected: {}", base.len(), e);
            existing.iter().collect()
        }
    };
    if collisions.is_empty() {
        return base.to_string();
    }

    let mut n = collisions.len() + 1;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !collisions.iter().any(|s| s.eq_ignore_ascii_case(&candidate)) {
            return candidate;
        }
        n += 1;
    }
}
