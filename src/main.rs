mod error;
mod http_client;
mod multipart;
mod parsers;
mod proxy_service;
mod respond;
mod route_config;
mod settings;
mod std_logger;
mod translate;
mod upstream;

use std::io::{ErrorKind, Result};
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Condition;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::{info, LevelFilter};

use crate::http_client::HttpClientConfig;
use crate::parsers::ParserRegistry;
use crate::proxy_service::proxy_config::ProxyConfig;
use crate::proxy_service::proxy_factory::ProxyRouteServiceFactory;
use crate::route_config::RelayConfigFile;

#[derive(Parser)]
#[command(name = "rest_relay", about = "Relays incoming HTTP requests to a remote API")]
struct Args {
  #[arg(short, long, default_value = "config.yaml")]
  config: String,

  #[arg(short, long, default_value = "0.0.0.0")]
  bind: String,

  #[arg(short, long, default_value_t = 8080)]
  port: u16,

  #[arg(short, long, default_value_t = 4)]
  workers: usize,

  #[arg(long, default_value = "info")]
  log_level: LevelFilter,
}

#[actix_web::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  std_logger::init(args.log_level).map_err(|err| std::io::Error::new(ErrorKind::Other, err))?;

  let relay_config = RelayConfigFile::load_from_file(&args.config)
    .map_err(|err| std::io::Error::new(ErrorKind::Other, err))?;

  let settings = Arc::new(relay_config.proxy);
  let parsers = Arc::new(ParserRegistry::default());
  let http_client = HttpClientConfig::from_settings(&settings)
    .to_client()
    .map_err(|err| std::io::Error::new(ErrorKind::Other, err))?;

  let routes: Vec<Arc<ProxyConfig>> = relay_config
    .routes
    .into_iter()
    .map(|route| Arc::new(ProxyConfig::from(route)))
    .collect();

  for config in routes.iter() {
    let methods: Vec<String> = config.methods.iter().map(|method| method.to_string()).collect();
    info!(
      "Proxy route registered at '{}' -> '{}' ({})",
      config.path,
      config.source.as_deref().unwrap_or(""),
      methods.join(", ")
    );
  }
  info!("Listening on {}:{}", args.bind, args.port);

  let enable_cors = settings.enable_cors;

  HttpServer::new(move || {
    let mut app = App::new().wrap(Condition::new(enable_cors, Cors::permissive()));

    for config in routes.iter() {
      app = app.service(web::service(config.path.as_ref()).finish(ProxyRouteServiceFactory::create(
        http_client.clone(),
        config.clone(),
        settings.clone(),
        parsers.clone(),
      )));
    }

    app
  })
  .workers(args.workers)
  .bind((args.bind, args.port))?
  .run()
  .await
}
