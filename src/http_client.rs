use reqwest::redirect::Policy;
use reqwest::Client;

use crate::settings::ProxySettings;

pub struct HttpClientConfig {
  pub verify_ssl: bool,
  pub enable_cookies: bool,
}

impl HttpClientConfig {
  pub fn from_settings(settings: &ProxySettings) -> HttpClientConfig {
    HttpClientConfig {
      verify_ssl: settings.verify_ssl,
      enable_cookies: settings.enable_cookies,
    }
  }

  pub fn to_client(self) -> Result<Client, reqwest::Error> {
    let HttpClientConfig {
      verify_ssl,
      enable_cookies,
    } = self;
    let mut client_builder = reqwest::ClientBuilder::new();

    if !verify_ssl {
      client_builder = client_builder.danger_accept_invalid_certs(true);
    }

    if enable_cookies {
      client_builder = client_builder.cookie_store(true);
    }

    let client = client_builder.redirect(Policy::limited(5)).build()?;

    Ok(client)
  }
}
