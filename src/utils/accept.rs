//! `Accept` content negotiation for manifest responses.
//!
//! A manifest is served only when the client's `Accept` header admits its
//! stored media type. Wildcards (`*/*`, `type/*`) and quality values are
//! honored; an absent or empty header accepts anything.

/// True iff `media_type` matches some entry of `accept` with q > 0.
pub fn is_acceptable(accept: Option<&str>, media_type: &str) -> bool {
    let Some(accept) = accept else {
        return true;
    };
    if accept.trim().is_empty() {
        return true;
    }

    for entry in accept.split(',') {
        let mut parts = entry.split(';');
        let Some(pattern) = parts.next().map(str::trim) else {
            continue;
        };
        if pattern.is_empty() {
            continue;
        }

        let mut quality = 1.0f32;
        for param in parts {
            if let Some(value) = param.trim().strip_prefix("q=") {
                quality = value.trim().parse().unwrap_or(0.0);
            }
        }
        if quality <= 0.0 {
            continue;
        }

        if pattern == "*/*" || pattern == media_type {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix("/*") {
            if media_type.split('/').next() == Some(prefix) {
                return true;
            }
        }
    }
    false
}
