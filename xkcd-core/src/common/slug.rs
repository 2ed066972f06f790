//! Slugs identify extra comics, which have no issue number.

use regex::Regex;

/// Derives a URL-safe slug from a comic title.
///
/// `+` and `%` are spelled out so "1+1" and "1%" do not collide with "1-1".
/// Runs of anything that is not a letter or digit collapse into a single `-`.
/// A title with nothing sluggable left (e.g. all punctuation) is used verbatim.
pub fn slugify(title: &str) -> String {
    let spelled = title.replace('+', " plus ").replace('%', " pct ");
    let lowered = spelled.to_lowercase();

    let separators = match Regex::new(r"[^\p{L}\p{N}]+") {
        Ok(re) => re,
        Err(_) => return title.to_string(),
    };
    let slug = separators.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');

    if slug.is_empty() {
        title.to_string()
    } else {
        slug.to_string()
    }
}
