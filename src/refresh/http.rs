// src/refresh/http.rs
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, StatusCode};

use crate::refresh::error::{ConfigError, FetchError};

const USER_AGENT: &str = concat!("portfolio-refresh/", env!("CARGO_PKG_VERSION"));

/// Upper bound on pages followed per fetch for paginated listings.
pub const MAX_PAGES: usize = 10;

/// Every client gets a bounded timeout; a hung service must not pin its
/// source's in-flight guard forever.
pub fn build_client(timeout: Duration) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ConfigError::Invalid(format!("building http client: {e}")))
}

/// Map a non-success status to the fetch error taxonomy.
pub fn classify_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    let code = status.as_u16();
    let err = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Auth { status: code },
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            FetchError::Network(format!("HTTP {code}"))
        }
        s if s.is_server_error() => FetchError::Network(format!("HTTP {code}")),
        _ => FetchError::Rejected { status: code },
    };
    Some(err)
}

fn classify_transport(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Network(format!("timed out: {e}"))
    } else {
        FetchError::Network(e.to_string())
    }
}

/// Send the request and return the body of a successful response.
pub async fn send_for_text(req: RequestBuilder) -> Result<String, FetchError> {
    send_for_page(req).await.map(|(_, body)| body)
}

/// Like `send_for_text`, but keeps the response headers for paginated APIs.
pub async fn send_for_page(req: RequestBuilder) -> Result<(HeaderMap, String), FetchError> {
    let resp = req.send().await.map_err(classify_transport)?;
    if let Some(err) = classify_status(resp.status()) {
        return Err(err);
    }
    let headers = resp.headers().clone();
    let body = resp.text().await.map_err(classify_transport)?;
    Ok((headers, body))
}
