use bytes::Bytes;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use reqwest::{Body, Client, StatusCode};

use crate::multipart::{generate_boundary, StreamingMultipart};
use crate::settings::ProxySettings;
use crate::translate::{OutboundBody, OutboundRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
  ConnectFailed,
  TlsFailed,
  TimedOut,
}

pub struct UpstreamResponse {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Bytes,
}

pub enum OutboundOutcome {
  Success(UpstreamResponse),
  TransportFailure(TransportErrorKind),
}

// Exactly one outbound attempt per inbound request; retry policy belongs to
// the caller.
pub async fn send(client: &Client, request: OutboundRequest, settings: &ProxySettings) -> OutboundOutcome {
  match execute(client, request, settings).await {
    Ok(response) => OutboundOutcome::Success(response),
    Err(kind) => OutboundOutcome::TransportFailure(kind),
  }
}

async fn execute(
  client: &Client,
  request: OutboundRequest,
  settings: &ProxySettings,
) -> Result<UpstreamResponse, TransportErrorKind> {
  let OutboundRequest {
    method,
    url,
    query,
    mut headers,
    body,
    cookies,
  } = request;

  if !cookies.is_empty() {
    let pairs: Vec<String> = cookies
      .iter()
      .map(|(name, value)| format!("{name}={value}"))
      .collect();
    let cookie_header =
      HeaderValue::from_str(&pairs.join("; ")).map_err(|_| TransportErrorKind::ConnectFailed)?;
    headers.insert(COOKIE, cookie_header);
  }

  debug!("Forwarding {} {}", method, url);

  let mut builder = client.request(method, url.as_str());

  if !query.is_empty() {
    builder = builder.query(&query);
  }

  if let Some(timeout) = settings.timeout_duration() {
    builder = builder.timeout(timeout);
  }

  let builder = match body {
    OutboundBody::Empty => builder.headers(headers),
    OutboundBody::Bytes(bytes) => builder.headers(headers).body(bytes),
    OutboundBody::Multipart { fields, files } => {
      let boundary = generate_boundary();
      let mut stream = StreamingMultipart::new(fields, files, &boundary);

      // Sized streaming upload: the total is computed up front so the body
      // is not chunked-transfer encoded and is never buffered whole.
      let length = stream
        .content_length()
        .map_err(|_| TransportErrorKind::ConnectFailed)?;

      let content_type = HeaderValue::from_str(&format!("multipart/form-data; boundary={boundary}"))
        .map_err(|_| TransportErrorKind::ConnectFailed)?;
      headers.insert(CONTENT_TYPE, content_type);
      headers.insert(CONTENT_LENGTH, HeaderValue::from(length));

      builder.headers(headers).body(Body::wrap_stream(stream))
    }
  };

  let response = builder.send().await.map_err(|err| classify(&err))?;

  let status = response.status();
  let headers = response.headers().clone();
  let body = response.bytes().await.map_err(|err| classify(&err))?;

  debug!("Upstream replied {} with {} body bytes", status, body.len());

  Ok(UpstreamResponse { status, headers, body })
}

fn classify(err: &reqwest::Error) -> TransportErrorKind {
  if err.is_timeout() {
    return TransportErrorKind::TimedOut;
  }

  if is_tls_failure(err) {
    return TransportErrorKind::TlsFailed;
  }

  TransportErrorKind::ConnectFailed
}

fn is_tls_failure(err: &reqwest::Error) -> bool {
  let mut source = std::error::Error::source(err);

  while let Some(inner) = source {
    let text = inner.to_string().to_ascii_lowercase();
    if text.contains("certificate") || text.contains("handshake") || text.contains("tls") {
      return true;
    }
    source = inner.source();
  }

  false
}

#[cfg(test)]
mod tests {
  use std::io::{Read, Write};
  use std::net::{SocketAddr, TcpListener, TcpStream};
  use std::sync::mpsc;
  use std::thread;
  use std::time::Duration;

  use reqwest::Method;

  use super::*;
  use crate::multipart::FilePart;

  const JSON_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 15\r\nConnection: close\r\n\r\n{\"status\":\"ok\"}";

  fn outbound(method: Method, url: String) -> OutboundRequest {
    OutboundRequest {
      method,
      url,
      query: Vec::new(),
      headers: HeaderMap::new(),
      body: OutboundBody::Empty,
      cookies: Vec::new(),
    }
  }

  fn read_http_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut data = Vec::new();
    let mut buffer = [0u8; 4096];

    loop {
      let read = socket.read(&mut buffer).unwrap();
      if read == 0 {
        break;
      }
      data.extend_from_slice(&buffer[..read]);

      if let Some(header_end) = find(&data, b"\r\n\r\n") {
        let headers = String::from_utf8_lossy(&data[..header_end]).into_owned();
        let content_length = headers
          .lines()
          .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name
              .eq_ignore_ascii_case("content-length")
              .then(|| value.trim().parse::<usize>().ok())?
          })
          .unwrap_or(0);

        if data.len() >= header_end + 4 + content_length {
          break;
        }
      }
    }

    data
  }

  fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
      .windows(needle.len())
      .position(|window| window == needle)
  }

  fn spawn_capture_stub(response: &'static [u8]) -> (SocketAddr, mpsc::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
      if let Ok((mut socket, _)) = listener.accept() {
        let request = read_http_request(&mut socket);
        socket.write_all(response).unwrap();
        let _ = tx.send(request);
      }
    });

    (addr, rx)
  }

  #[actix_web::test]
  async fn buffered_calls_return_the_upstream_payload() {
    let (addr, rx) = spawn_capture_stub(JSON_RESPONSE);
    let client = Client::new();

    let outcome = send(
      &client,
      outbound(Method::GET, format!("http://{addr}/items")),
      &ProxySettings::default(),
    )
    .await;

    let OutboundOutcome::Success(response) = outcome else {
      panic!("expected a successful outcome");
    };
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), b"{\"status\":\"ok\"}");
    assert_eq!(
      response.headers.get(CONTENT_TYPE).unwrap(),
      "application/json"
    );

    let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(seen.starts_with(b"GET /items HTTP/1.1\r\n"));
  }

  #[actix_web::test]
  async fn query_pairs_keep_their_duplicates_on_the_wire() {
    let (addr, rx) = spawn_capture_stub(JSON_RESPONSE);
    let client = Client::new();

    let mut request = outbound(Method::GET, format!("http://{addr}/search"));
    request.query = vec![
      (String::from("page"), String::from("1")),
      (String::from("page"), String::from("2")),
    ];

    send(&client, request, &ProxySettings::default()).await;

    let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(seen.starts_with(b"GET /search?page=1&page=2 HTTP/1.1\r\n"));
  }

  #[actix_web::test]
  async fn streamed_uploads_arrive_fully_delimited_with_a_length() {
    let (addr, rx) = spawn_capture_stub(JSON_RESPONSE);
    let client = Client::new();

    let mut request = outbound(Method::POST, format!("http://{addr}/upload"));
    request.body = OutboundBody::Multipart {
      fields: vec![(String::from("kind"), String::from("report"))],
      files: vec![FilePart::new(
        "file",
        "report.json",
        std::io::Cursor::new(b"{\"rows\": []}".to_vec()),
      )],
    };

    let outcome = send(&client, request, &ProxySettings::default()).await;
    assert!(matches!(outcome, OutboundOutcome::Success(_)));

    let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let header_end = find(&seen, b"\r\n\r\n").unwrap();
    let head = String::from_utf8_lossy(&seen[..header_end]).to_lowercase();
    let body = &seen[header_end + 4..];

    assert!(head.contains("content-type: multipart/form-data; boundary="));
    assert!(!head.contains("transfer-encoding"));

    let declared_length = head
      .lines()
      .find_map(|line| line.strip_prefix("content-length: "))
      .and_then(|value| value.trim().parse::<usize>().ok())
      .unwrap();
    assert_eq!(declared_length, body.len());

    let boundary = head
      .lines()
      .find_map(|line| line.split_once("boundary=").map(|(_, b)| b.trim().to_string()))
      .unwrap();
    assert!(body.starts_with(format!("--{boundary}\r\n").as_bytes()));
    assert!(body.ends_with(format!("--{boundary}--\r\n").as_bytes()));

    let text = String::from_utf8_lossy(body);
    assert!(text.contains("Content-Disposition: form-data; name=\"kind\""));
    assert!(text.contains("filename=\"report.json\""));
    assert!(text.contains("Content-Type: application/json"));
  }

  #[actix_web::test]
  async fn forwarded_cookies_collapse_into_one_header() {
    let (addr, rx) = spawn_capture_stub(JSON_RESPONSE);
    let client = Client::new();

    let mut request = outbound(Method::GET, format!("http://{addr}/cookies"));
    request.cookies = vec![
      (String::from("a"), String::from("1")),
      (String::from("b"), String::from("2")),
    ];

    send(&client, request, &ProxySettings::default()).await;

    let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let head = String::from_utf8_lossy(&seen).into_owned();
    assert!(head.contains("cookie: a=1; b=2") || head.contains("Cookie: a=1; b=2"));
  }

  #[actix_web::test]
  async fn refused_connections_classify_as_connect_failures() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Client::new();
    let outcome = send(
      &client,
      outbound(Method::GET, format!("http://{addr}/")),
      &ProxySettings::default(),
    )
    .await;

    assert!(matches!(
      outcome,
      OutboundOutcome::TransportFailure(TransportErrorKind::ConnectFailed)
    ));
  }

  #[actix_web::test]
  async fn stalled_upstreams_classify_as_timeouts() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
      if let Ok((mut socket, _)) = listener.accept() {
        let mut buffer = [0u8; 4096];
        let _ = socket.read(&mut buffer);
        thread::sleep(Duration::from_secs(2));
      }
    });

    let settings = ProxySettings {
      timeout: Some(0.25),
      ..ProxySettings::default()
    };
    let client = Client::new();

    let outcome = send(
      &client,
      outbound(Method::GET, format!("http://{addr}/")),
      &settings,
    )
    .await;

    assert!(matches!(
      outcome,
      OutboundOutcome::TransportFailure(TransportErrorKind::TimedOut)
    ));
  }
}
