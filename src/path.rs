//! Path templating and final URL resolution.

use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[A-Za-z_0-9]+\}").expect("Failed to compile path placeholder regex")
});

/// Replace `{name}` placeholders in a path template from a flat list of
/// name/value pairs.
///
/// An empty or odd-length list leaves the template untouched. Placeholders
/// without a matching name pass through verbatim, as do braces around
/// anything other than word characters.
pub fn expand_path(template: &str, params: &[String]) -> String {
    if params.is_empty() || params.len() % 2 != 0 {
        return template.to_string();
    }

    PLACEHOLDER
        .replace_all(template, |captures: &regex::Captures<'_>| {
            let placeholder = &captures[0];
            let name = &placeholder[1..placeholder.len() - 1];
            for pair in params.chunks(2) {
                if pair[0] == name {
                    return pair[1].clone();
                }
            }
            placeholder.to_string()
        })
        .into_owned()
}

/// Combine a base URL and a path into the final request URL.
///
/// The path is used as-is when it already contains the base URL anywhere
/// inside it. This is a substring test, not a prefix test.
pub fn resolve_url(base_url: &str, path: &str) -> String {
    if !base_url.is_empty() && !path.contains(base_url) {
        return format!("{base_url}{path}");
    }
    path.to_string()
}
