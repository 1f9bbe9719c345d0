use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct AuthSettings {
  pub user: Option<String>,
  pub password: Option<String>,
  pub token: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct AcceptRewrite {
  pub from: String,
  pub to: String,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct ProxySettings {
  pub host: Option<String>,
  pub auth: AuthSettings,
  pub timeout: Option<f64>,
  pub default_http_accept: String,
  pub default_http_accept_language: String,
  pub default_content_type: String,
  pub return_raw: bool,
  pub accept_maps: Vec<AcceptRewrite>,
  pub disallowed_params: Vec<String>,
  pub verify_ssl: bool,
  pub enable_cookies: bool,
  pub forward_cookies: bool,
  pub enable_cors: bool,
}

impl Default for ProxySettings {
  fn default() -> ProxySettings {
    ProxySettings {
      host: None,
      auth: AuthSettings::default(),
      timeout: None,
      default_http_accept: String::from("application/json"),
      default_http_accept_language: String::from("en-US,en;q=0.8"),
      default_content_type: String::from("text/plain"),
      return_raw: false,
      accept_maps: vec![AcceptRewrite {
        from: String::from("text/html"),
        to: String::from("application/json"),
      }],
      disallowed_params: vec![String::from("format")],
      verify_ssl: true,
      enable_cookies: false,
      forward_cookies: false,
      enable_cors: false,
    }
  }
}

impl ProxySettings {
  pub fn timeout_duration(&self) -> Option<Duration> {
    self.timeout.map(Duration::from_secs_f64)
  }
}
