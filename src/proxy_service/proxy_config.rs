use crate::route_config::HttpMethod;
use crate::settings::ProxySettings;

pub struct ProxyConfig {
  pub path: Box<str>,
  pub source: Option<Box<str>>,
  pub host: Option<Box<str>>,
  pub return_raw: Option<bool>,
  pub methods: Box<[HttpMethod]>,
  pub query_params: Option<Box<[(Box<str>, Box<str>)]>>,
}

impl ProxyConfig {
  pub fn allows(&self, method: &str) -> bool {
    HttpMethod::try_from(method)
      .map(|method| self.methods.contains(&method))
      .unwrap_or(false)
  }

  pub fn return_raw(&self, settings: &ProxySettings) -> bool {
    self.return_raw.unwrap_or(settings.return_raw)
  }
}
