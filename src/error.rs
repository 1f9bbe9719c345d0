use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("unable to read configuration: {0}")]
  Io(#[from] std::io::Error),
  #[error("unable to parse configuration: {0}")]
  Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProxyError {
  #[error("proxy host is not configured")]
  MissingHost,
  #[error("no value captured for path parameter '{0}'")]
  MissingPathParam(String),
  #[error("invalid header value '{0}'")]
  InvalidHeader(String),
  #[error("malformed json request body: {0}")]
  MalformedJson(#[source] serde_json::Error),
  #[error("malformed multipart body: {0}")]
  MalformedMultipart(&'static str),
  #[error("Unsupported media type \"{0}\"")]
  UnsupportedMediaType(String),
  #[error("unreadable upstream body: {0}")]
  InvalidUpstreamBody(String),
}

impl ProxyError {
  pub fn status(&self) -> StatusCode {
    match self {
      ProxyError::MissingHost
      | ProxyError::MissingPathParam(_)
      | ProxyError::InvalidHeader(_) => StatusCode::INTERNAL_SERVER_ERROR,
      ProxyError::MalformedJson(_) | ProxyError::MalformedMultipart(_) => StatusCode::BAD_REQUEST,
      ProxyError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
      ProxyError::InvalidUpstreamBody(_) => StatusCode::BAD_GATEWAY,
    }
  }
}
