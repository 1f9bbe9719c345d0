use std::sync::Arc;

use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::Error;
use futures_core::future::LocalBoxFuture;
use reqwest::Client;

use crate::parsers::ParserRegistry;
use crate::proxy_service::proxy_config::ProxyConfig;
use crate::proxy_service::proxy_route_service::ProxyRouteService;
use crate::settings::ProxySettings;

pub struct ProxyRouteServiceFactory {
  pub config: Arc<ProxyConfig>,
  pub settings: Arc<ProxySettings>,
  pub parsers: Arc<ParserRegistry>,
  pub http_client: Client,
}

impl ServiceFactory<ServiceRequest> for ProxyRouteServiceFactory {
  type Response = ServiceResponse;
  type Error = Error;
  type Config = ();
  type Service = ProxyRouteService;
  type InitError = ();
  type Future = LocalBoxFuture<'static, Result<Self::Service, Self::InitError>>;

  fn new_service(&self, _: Self::Config) -> Self::Future {
    let service = ProxyRouteService {
      config: self.config.clone(),
      settings: self.settings.clone(),
      parsers: self.parsers.clone(),
      http_client: self.http_client.clone(),
    };

    Box::pin(async move { Ok(service) })
  }
}

impl ProxyRouteServiceFactory {
  pub fn create(
    http_client: Client,
    config: Arc<ProxyConfig>,
    settings: Arc<ProxySettings>,
    parsers: Arc<ParserRegistry>,
  ) -> Self {
    Self {
      config,
      settings,
      parsers,
      http_client,
    }
  }
}
