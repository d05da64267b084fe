use thiserror::Error;
use url::Url;

/// Fixed path of the gesture inference channel on the application host.
pub const INFERENCE_PATH: &str = "/ws/gesture";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EndpointError {
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Parse an application origin such as `https://example.org`.
///
/// # Errors
///
/// Returns `EndpointError::InvalidUrl` if the string is not an absolute URL.
pub fn parse_base(raw: &str) -> Result<Url, EndpointError> {
    Url::parse(raw.trim()).map_err(|err| EndpointError::InvalidUrl(err.to_string()))
}

/// Inference channel URL on the same host as `base`.
///
/// `https` upgrades to `wss`, `http` to `ws`; `ws`/`wss` bases are kept.
///
/// # Errors
///
/// Returns `EndpointError::UnsupportedScheme` for any other scheme.
pub fn inference_url(base: &Url) -> Result<Url, EndpointError> {
    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    };
    let host = base
        .host_str()
        .ok_or_else(|| EndpointError::InvalidUrl(format!("{base} has no host")))?;
    let authority = match base.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    parse_base(&format!("{scheme}://{authority}{INFERENCE_PATH}"))
}

/// Join a REST path onto `base` and an API prefix, tolerating stray slashes.
///
/// # Errors
///
/// Returns `EndpointError::InvalidUrl` if the joined URL does not parse.
pub fn api_url(base: &Url, prefix: &str, path: &str) -> Result<Url, EndpointError> {
    let origin = base.as_str().trim_end_matches('/');
    let prefix = prefix.trim_matches('/');
    let path = path.trim_start_matches('/');
    let joined = if prefix.is_empty() {
        format!("{origin}/{path}")
    } else {
        format!("{origin}/{prefix}/{path}")
    };
    parse_base(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_origin_upgrades_to_wss() {
        let base = parse_base("https://gestu.example/app?x=1").unwrap();
        assert_eq!(
            inference_url(&base).unwrap().as_str(),
            "wss://gestu.example/ws/gesture"
        );
    }

    #[test]
    fn plain_origin_keeps_port() {
        let base = parse_base("http://127.0.0.1:8000").unwrap();
        assert_eq!(
            inference_url(&base).unwrap().as_str(),
            "ws://127.0.0.1:8000/ws/gesture"
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        let base = parse_base("ftp://host").unwrap();
        assert_eq!(
            inference_url(&base),
            Err(EndpointError::UnsupportedScheme("ftp".into()))
        );
    }

    #[test]
    fn api_url_joins_without_double_slashes() {
        let base = parse_base("http://localhost:8000/").unwrap();
        let url = api_url(&base, "/api/v1/", "/lessons").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/v1/lessons");
        let bare = api_url(&base, "", "lessons").unwrap();
        assert_eq!(bare.as_str(), "http://localhost:8000/lessons");
    }
}
