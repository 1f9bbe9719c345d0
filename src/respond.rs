use actix_web::HttpResponse;
use log::warn;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ProxyError;
use crate::parsers::ParserRegistry;
use crate::upstream::{OutboundOutcome, TransportErrorKind, UpstreamResponse};

#[derive(Serialize)]
struct ErrorBody {
  code: u16,
  error: String,
}

pub fn render_response(outcome: OutboundOutcome, return_raw: bool, parsers: &ParserRegistry) -> HttpResponse {
  match outcome {
    OutboundOutcome::TransportFailure(kind) => render_transport_failure(kind),
    OutboundOutcome::Success(response) => render_success(response, return_raw, parsers),
  }
}

pub fn render_proxy_error(err: &ProxyError) -> HttpResponse {
  error_response(err.status(), &err.to_string())
}

fn render_transport_failure(kind: TransportErrorKind) -> HttpResponse {
  match kind {
    TransportErrorKind::ConnectFailed | TransportErrorKind::TlsFailed => {
      error_response(StatusCode::BAD_GATEWAY, "Bad gateway")
    }
    TransportErrorKind::TimedOut => error_response(StatusCode::GATEWAY_TIMEOUT, "Gateway timed out"),
  }
}

fn render_success(response: UpstreamResponse, return_raw: bool, parsers: &ParserRegistry) -> HttpResponse {
  let status = response.status;

  if return_raw {
    let mut builder = HttpResponse::build(status);
    if let Some(content_type) = response.headers.get(CONTENT_TYPE) {
      builder.insert_header((CONTENT_TYPE, content_type.clone()));
    }
    return builder.body(response.body);
  }

  if status.as_u16() >= 400 {
    let reason = status.canonical_reason().unwrap_or("Unknown error");
    return error_response(status, reason);
  }

  match parse_upstream_body(&response, parsers) {
    Ok(value) => HttpResponse::build(status).json(value),
    Err(err) => {
      warn!("Unable to translate upstream response: {err}");
      render_proxy_error(&err)
    }
  }
}

fn parse_upstream_body(response: &UpstreamResponse, parsers: &ParserRegistry) -> Result<Value, ProxyError> {
  let content_type = response
    .headers
    .get(CONTENT_TYPE)
    .and_then(|value| value.to_str().ok());

  // Nothing to negotiate on; mirror an empty payload.
  let Some(content_type) = content_type else {
    return Ok(Value::Object(Map::new()));
  };
  if response.body.is_empty() {
    return Ok(Value::Object(Map::new()));
  }

  parsers.parse(&response.body, content_type)
}

fn error_response(status: StatusCode, message: &str) -> HttpResponse {
  HttpResponse::build(status).json(ErrorBody {
    code: status.as_u16(),
    error: String::from(message),
  })
}
