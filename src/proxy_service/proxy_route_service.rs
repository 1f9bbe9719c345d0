use std::sync::Arc;

use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse};
use actix_web::error::PayloadError;
use actix_web::http::header;
use actix_web::{dev, Error, HttpRequest, HttpResponse, ResponseError};
use bytes::Bytes;
use futures_core::future::LocalBoxFuture;
use futures_core::Stream;
use futures_util::StreamExt;
use log::warn;
use reqwest::Client;

use crate::error::ProxyError;
use crate::multipart::{parse_boundary, parse_multipart};
use crate::parsers::ParserRegistry;
use crate::proxy_service::proxy_config::ProxyConfig;
use crate::respond::{render_proxy_error, render_response};
use crate::settings::ProxySettings;
use crate::translate::{build_outbound, InboundRequest};
use crate::upstream;

pub struct ProxyRouteService {
  pub(super) config: Arc<ProxyConfig>,
  pub(super) settings: Arc<ProxySettings>,
  pub(super) parsers: Arc<ParserRegistry>,
  pub(super) http_client: Client,
}

impl Service<ServiceRequest> for ProxyRouteService {
  type Response = ServiceResponse;
  type Error = Error;
  type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

  dev::always_ready!();

  fn call(&self, req: ServiceRequest) -> Self::Future {
    let (http_request, payload) = req.into_parts();
    let config = self.config.clone();
    let settings = self.settings.clone();
    let parsers = self.parsers.clone();
    let http_client = self.http_client.clone();

    Box::pin(async move {
      let response =
        ProxyRouteService::exec(&config, &settings, &parsers, &http_client, &http_request, payload).await;

      Ok(ServiceResponse::new(http_request, response))
    })
  }
}

impl ProxyRouteService {
  async fn exec(
    config: &ProxyConfig,
    settings: &ProxySettings,
    parsers: &ParserRegistry,
    http_client: &Client,
    http: &HttpRequest,
    mut payload: Payload,
  ) -> HttpResponse {
    if !config.allows(http.method().as_str()) {
      return HttpResponse::MethodNotAllowed().finish();
    }

    let body = match ProxyRouteService::collect_payload(&mut payload).await {
      Ok(bytes) => bytes,
      Err(err) => {
        warn!("Unable to read request payload: {err}");
        return err.error_response();
      }
    };

    let inbound = match ProxyRouteService::build_inbound(http, body) {
      Ok(inbound) => inbound,
      Err(err) => {
        warn!("Unable to decode request: {err}");
        return render_proxy_error(&err);
      }
    };

    let outbound = match build_outbound(inbound, config, settings) {
      Ok(outbound) => outbound,
      Err(err) => {
        warn!("Unable to translate request: {err}");
        return render_proxy_error(&err);
      }
    };

    let outcome = upstream::send(http_client, outbound, settings).await;

    render_response(outcome, config.return_raw(settings), parsers)
  }

  async fn collect_payload(payload: &mut Payload) -> Result<Bytes, PayloadError> {
    let (size, _) = payload.size_hint();
    let mut buffer: Vec<u8> = Vec::with_capacity(size);

    while let Some(chunk) = payload.next().await {
      buffer.extend_from_slice(&chunk?);
    }

    Ok(Bytes::from(buffer))
  }

  fn build_inbound(http: &HttpRequest, body: Bytes) -> Result<InboundRequest, ProxyError> {
    let query: Vec<(String, String)> = url::form_urlencoded::parse(http.query_string().as_bytes())
      .into_owned()
      .collect();

    let path_params: Vec<(String, String)> = http
      .match_info()
      .iter()
      .map(|(name, value)| (String::from(name), String::from(value)))
      .collect();

    let cookies = match http.cookies() {
      Ok(cookies) => cookies
        .iter()
        .map(|cookie| (String::from(cookie.name()), String::from(cookie.value())))
        .collect(),
      Err(_) => Vec::new(),
    };

    let accept = header_string(http, header::ACCEPT);
    let accept_language = header_string(http, header::ACCEPT_LANGUAGE);
    let content_type = header_string(http, header::CONTENT_TYPE);

    let (fields, files, body) = match content_type.as_deref() {
      Some(value) if value.starts_with("multipart/form-data") => {
        let boundary =
          parse_boundary(value).ok_or(ProxyError::MalformedMultipart("missing boundary parameter"))?;
        let parts = parse_multipart(&body, &boundary)?;
        (parts.fields, parts.files, Bytes::new())
      }
      _ => (Vec::new(), Vec::new(), body),
    };

    Ok(InboundRequest {
      method: http.method().clone(),
      path_params,
      query,
      accept,
      accept_language,
      content_type,
      body,
      fields,
      files,
      cookies,
    })
  }
}

fn header_string(http: &HttpRequest, name: header::HeaderName) -> Option<String> {
  http
    .headers()
    .get(&name)
    .and_then(|value| value.to_str().ok())
    .map(String::from)
}
