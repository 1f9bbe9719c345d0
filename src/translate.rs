use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;

use crate::error::ProxyError;
use crate::multipart::FilePart;
use crate::proxy_service::proxy_config::ProxyConfig;
use crate::settings::ProxySettings;

pub struct InboundRequest {
  pub method: Method,
  pub path_params: Vec<(String, String)>,
  pub query: Vec<(String, String)>,
  pub accept: Option<String>,
  pub accept_language: Option<String>,
  pub content_type: Option<String>,
  pub body: Bytes,
  pub fields: Vec<(String, String)>,
  pub files: Vec<FilePart>,
  pub cookies: Vec<(String, String)>,
}

pub enum OutboundBody {
  Empty,
  Bytes(Bytes),
  Multipart {
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
  },
}

pub struct OutboundRequest {
  pub method: Method,
  pub url: String,
  pub query: Vec<(String, String)>,
  pub headers: HeaderMap,
  pub body: OutboundBody,
  pub cookies: Vec<(String, String)>,
}

pub fn build_outbound(
  inbound: InboundRequest,
  route: &ProxyConfig,
  settings: &ProxySettings,
) -> Result<OutboundRequest, ProxyError> {
  let InboundRequest {
    method,
    path_params,
    query,
    accept,
    accept_language,
    content_type,
    body,
    fields,
    files,
    cookies,
  } = inbound;

  let url = request_url(route, settings, &path_params)?;
  let query = request_params(&query, route.query_params.as_deref(), settings);
  let headers = request_headers(
    accept.as_deref(),
    accept_language.as_deref(),
    content_type.as_deref(),
    settings,
  )?;
  let cookies = request_cookies(cookies, settings);

  let body = if files.is_empty() {
    request_body(content_type.as_deref(), body)?
  } else {
    OutboundBody::Multipart { fields, files }
  };

  Ok(OutboundRequest {
    method,
    url,
    query,
    headers,
    body,
    cookies,
  })
}

fn request_url(
  route: &ProxyConfig,
  settings: &ProxySettings,
  path_params: &[(String, String)],
) -> Result<String, ProxyError> {
  let host = route
    .host
    .as_deref()
    .or(settings.host.as_deref())
    .ok_or(ProxyError::MissingHost)?;

  match route.source.as_deref() {
    Some(template) => {
      let path = resolve_source_path(template, path_params)?;
      Ok(format!("{}/{}", host.trim_end_matches('/'), path))
    }
    None => Ok(String::from(host)),
  }
}

fn resolve_source_path(template: &str, path_params: &[(String, String)]) -> Result<String, ProxyError> {
  let mut resolved = String::with_capacity(template.len());
  let mut rest = template;

  while let Some(open) = rest.find('{') {
    resolved.push_str(&rest[..open]);

    let close = match rest[open + 1..].find('}') {
      Some(offset) => open + 1 + offset,
      None => {
        resolved.push_str(&rest[open..]);
        return Ok(resolved);
      }
    };

    let name = &rest[open + 1..close];
    let value = path_params
      .iter()
      .find(|(param, _)| param == name)
      .map(|(_, value)| value.as_str())
      .ok_or_else(|| ProxyError::MissingPathParam(String::from(name)))?;

    resolved.push_str(value);
    rest = &rest[close + 1..];
  }

  resolved.push_str(rest);
  Ok(resolved)
}

fn request_params(
  query: &[(String, String)],
  route_defaults: Option<&[(Box<str>, Box<str>)]>,
  settings: &ProxySettings,
) -> Vec<(String, String)> {
  let mut params: Vec<(String, String)> = query
    .iter()
    .filter(|(name, _)| !settings.disallowed_params.iter().any(|param| param == name))
    .cloned()
    .collect();

  if let Some(route_defaults) = route_defaults {
    for (name, value) in route_defaults {
      if !params.iter().any(|(existing, _)| existing.as_str() == name.as_ref()) {
        params.push((name.to_string(), value.to_string()));
      }
    }
  }

  params
}

fn request_headers(
  accept: Option<&str>,
  accept_language: Option<&str>,
  content_type: Option<&str>,
  settings: &ProxySettings,
) -> Result<HeaderMap, ProxyError> {
  let mut accept_value = String::from(accept.unwrap_or(&settings.default_http_accept));
  for rewrite in settings.accept_maps.iter() {
    accept_value = accept_value.replace(&rewrite.from, &rewrite.to);
  }

  let mut headers = HeaderMap::new();
  headers.insert(ACCEPT, header_value(&accept_value)?);
  headers.insert(
    ACCEPT_LANGUAGE,
    header_value(accept_language.unwrap_or(&settings.default_http_accept_language))?,
  );
  headers.insert(
    CONTENT_TYPE,
    header_value(content_type.unwrap_or(&settings.default_content_type))?,
  );

  // Basic credentials win over a configured token.
  let user = settings.auth.user.as_deref().filter(|value| !value.is_empty());
  let password = settings.auth.password.as_deref().filter(|value| !value.is_empty());
  if let (Some(user), Some(password)) = (user, password) {
    let credentials = STANDARD.encode(format!("{user}:{password}"));
    headers.insert(AUTHORIZATION, header_value(&format!("Basic {credentials}"))?);
  } else if let Some(token) = settings.auth.token.as_deref().filter(|value| !value.is_empty()) {
    // The token is forwarded verbatim; no scheme prefix is added.
    headers.insert(AUTHORIZATION, header_value(token)?);
  }

  Ok(headers)
}

fn request_body(content_type: Option<&str>, body: Bytes) -> Result<OutboundBody, ProxyError> {
  if body.is_empty() {
    return Ok(OutboundBody::Empty);
  }

  match content_type {
    Some(content_type) if content_type.contains("application/json") => {
      let value: serde_json::Value = serde_json::from_slice(&body).map_err(ProxyError::MalformedJson)?;
      let serialized = serde_json::to_string(&value).map_err(ProxyError::MalformedJson)?;
      Ok(OutboundBody::Bytes(Bytes::from(serialized)))
    }
    _ => Ok(OutboundBody::Bytes(body)),
  }
}

// Default cookie policy forwards nothing.
fn request_cookies(cookies: Vec<(String, String)>, settings: &ProxySettings) -> Vec<(String, String)> {
  if settings.forward_cookies {
    cookies
  } else {
    Vec::new()
  }
}

fn header_value(value: &str) -> Result<HeaderValue, ProxyError> {
  HeaderValue::from_str(value).map_err(|_| ProxyError::InvalidHeader(String::from(value)))
}
