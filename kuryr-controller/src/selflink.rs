//! Deriving an Endpoints path from its twin Service's `selfLink`: the
//! last-but-one path segment, which must read `services`, is replaced with
//! `endpoints`.

use kuryr_k8s_core::HandlerError;

/// `/api/v1/namespaces/ns/services/web` -> `/api/v1/namespaces/ns/endpoints/web`.
///
/// Fails with [`HandlerError::Integrity`] if `self_link` doesn't have at
/// least two path segments or its last-but-one segment isn't `services`.
pub fn endpoints_selflink(self_link: &str) -> Result<String, HandlerError> {
    let trimmed = self_link.trim_end_matches('/');
    let mut segments: Vec<&str> = trimmed.split('/').collect();
    if segments.len() < 2 {
        return Err(HandlerError::integrity(format!(
            "selfLink {self_link:?} has too few path segments to derive an Endpoints path"
        )));
    }
    let idx = segments.len() - 2;
    if segments[idx] != "services" {
        return Err(HandlerError::integrity(format!(
            "selfLink {self_link:?} does not have 'services' as its last-but-one segment"
        )));
    }
    segments[idx] = "endpoints";
    Ok(segments.join("/"))
}
