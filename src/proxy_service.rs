use crate::proxy_service::proxy_config::ProxyConfig;
use crate::route_config::{HttpMethod, NameValuePair, RouteConfig};

pub mod proxy_config;
pub mod proxy_factory;
pub mod proxy_route_service;

impl From<RouteConfig> for ProxyConfig {
  fn from(route: RouteConfig) -> ProxyConfig {
    let methods = extract_methods(&route);
    let query_params = extract_query_params(&route);

    ProxyConfig {
      path: Box::from(route.path.as_str()),
      source: route.source.map(|source| Box::from(source.as_str())),
      host: route.host.map(|host| Box::from(host.as_str())),
      return_raw: route.return_raw,
      methods,
      query_params,
    }
  }
}

#[inline]
fn extract_methods(route: &RouteConfig) -> Box<[HttpMethod]> {
  match &route.methods {
    Some(methods) if !methods.is_empty() => Box::from(methods.as_slice()),
    _ => Box::from(HttpMethod::all().as_slice()),
  }
}

#[inline]
fn extract_query_params(route: &RouteConfig) -> Option<Box<[(Box<str>, Box<str>)]>> {
  let query_params = match &route.query {
    Some(values) => {
      let vec: Vec<(Box<str>, Box<str>)> = values.iter().map(|pair| pair.into()).collect();

      Some(Box::from(vec.as_slice()))
    }
    None => None,
  };
  query_params
}

impl From<&NameValuePair> for (Box<str>, Box<str>) {
  fn from(pair: &NameValuePair) -> (Box<str>, Box<str>) {
    let name_ptr: Box<str> = Box::from(pair.name.as_str());
    let val_ptr: Box<str> = Box::from(pair.value.as_str());

    (name_ptr, val_ptr)
  }
}
