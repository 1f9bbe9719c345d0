use std::fmt::{Display, Formatter};
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::settings::ProxySettings;

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Copy, Hash, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
  Get,
  Post,
  Put,
  Delete,
  Patch,
}

impl HttpMethod {
  pub fn all() -> [HttpMethod; 5] {
    [
      HttpMethod::Get,
      HttpMethod::Post,
      HttpMethod::Put,
      HttpMethod::Patch,
      HttpMethod::Delete,
    ]
  }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct NameValuePair {
  pub name: String,
  pub value: String,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct RouteConfig {
  pub path: String,
  pub source: Option<String>,
  pub methods: Option<Vec<HttpMethod>>,
  pub query: Option<Vec<NameValuePair>>,
  pub host: Option<String>,
  pub return_raw: Option<bool>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct RelayConfigFile {
  #[serde(default)]
  pub proxy: ProxySettings,
  pub routes: Vec<RouteConfig>,
}

impl RelayConfigFile {
  pub fn load_from_file(path: impl AsRef<Path>) -> Result<RelayConfigFile, ConfigError> {
    let file = File::open(path)?;
    let relay_config: RelayConfigFile = serde_yaml::from_reader(&file)?;

    Ok(relay_config)
  }
}

impl TryFrom<&str> for HttpMethod {
  type Error = ();

  fn try_from(value: &str) -> Result<Self, Self::Error> {
    match value.to_lowercase().as_str() {
      "get" => Ok(HttpMethod::Get),
      "post" => Ok(HttpMethod::Post),
      "patch" => Ok(HttpMethod::Patch),
      "put" => Ok(HttpMethod::Put),
      "delete" => Ok(HttpMethod::Delete),
      _ => Err(()),
    }
  }
}

impl Display for HttpMethod {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      HttpMethod::Get => f.write_str("get"),
      HttpMethod::Post => f.write_str("post"),
      HttpMethod::Put => f.write_str("put"),
      HttpMethod::Delete => f.write_str("delete"),
      HttpMethod::Patch => f.write_str("patch"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_a_full_config_document() {
    let document = r#"
proxy:
  host: https://api.example.com
  timeout: 10.0
  auth:
    token: "Token abc123"
  accept_maps:
    - from: text/html
      to: application/json
routes:
  - path: /items/{id}
    source: items/{id}
  - path: /search
    source: search
    methods: [get]
    query:
      - name: limit
        value: "25"
"#;

    let relay_config: RelayConfigFile = serde_yaml::from_str(document).unwrap();

    assert_eq!(relay_config.proxy.host.as_deref(), Some("https://api.example.com"));
    assert_eq!(relay_config.proxy.timeout, Some(10.0));
    assert_eq!(relay_config.proxy.auth.token.as_deref(), Some("Token abc123"));
    assert_eq!(relay_config.routes.len(), 2);
    assert_eq!(relay_config.routes[0].source.as_deref(), Some("items/{id}"));
    assert_eq!(relay_config.routes[1].methods, Some(vec![HttpMethod::Get]));
    assert_eq!(relay_config.routes[1].query.as_ref().unwrap()[0].name, "limit");
  }

  #[test]
  fn omitted_proxy_section_falls_back_to_defaults() {
    let document = r#"
routes:
  - path: /status
    source: status
"#;

    let relay_config: RelayConfigFile = serde_yaml::from_str(document).unwrap();

    assert_eq!(relay_config.proxy, ProxySettings::default());
    assert_eq!(relay_config.routes[0].methods, None);
  }

  #[test]
  fn method_names_parse_case_insensitively() {
    assert_eq!(HttpMethod::try_from("GET"), Ok(HttpMethod::Get));
    assert_eq!(HttpMethod::try_from("Patch"), Ok(HttpMethod::Patch));
    assert_eq!(HttpMethod::try_from("head"), Err(()));
    assert_eq!(HttpMethod::try_from("trace"), Err(()));
  }
}
