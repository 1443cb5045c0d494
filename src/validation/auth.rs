/// Where users land when no usable return path was requested.
pub const DEFAULT_REDIRECT: &str = "/";

/// Maximum accepted length of a post-login return path.
const MAX_REDIRECT_LEN: usize = 2048;

/// Validates a post-login return path.
///
/// Only same-origin absolute paths are accepted: the value must start with a
/// single `/`, and must not contain a backslash or control characters that
/// browsers normalize into a scheme-relative URL.
///
/// # Returns
///
/// `true` if the path can be used as a redirect target.
pub fn is_safe_redirect(target: &str) -> bool {
    if target.is_empty() || target.len() > MAX_REDIRECT_LEN {
        return false;
    }

    if !target.starts_with('/') || target.starts_with("//") {
        return false;
    }

    !target.chars().any(|c| c == '\\' || c.is_control())
}

/// Returns `target` when safe, otherwise [`DEFAULT_REDIRECT`].
pub fn sanitize_redirect(target: Option<&str>) -> String {
    match target {
        Some(t) if is_safe_redirect(t) => t.to_string(),
        Some(t) => {
            tracing::warn!(target = %t, "Rejected unsafe redirect target");
            DEFAULT_REDIRECT.to_string()
        }
        None => DEFAULT_REDIRECT.to_string(),
    }
}
