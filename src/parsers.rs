use std::io::Read;

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::ProxyError;
use crate::multipart::{parse_boundary, parse_multipart};

// Parsers may return plain data or data plus attachments; callers only ever
// forward the data portion.
pub struct ParsedBody {
  pub data: Value,
  pub attachments: Vec<(String, Bytes)>,
}

impl ParsedBody {
  fn data(value: Value) -> ParsedBody {
    ParsedBody {
      data: value,
      attachments: Vec::new(),
    }
  }
}

pub trait ResponseParser: Send + Sync {
  fn media_type(&self) -> &str;
  fn parse(&self, body: &[u8], content_type: &str) -> Result<ParsedBody, ProxyError>;
}

pub fn media_type_matches(pattern: &str, content_type: &str) -> bool {
  let actual = content_type.split(';').next().unwrap_or("").trim();
  let (pattern_type, pattern_subtype) = split_media_type(pattern);
  let (actual_type, actual_subtype) = split_media_type(actual);

  (pattern_type == "*" || pattern_type.eq_ignore_ascii_case(actual_type))
    && (pattern_subtype == "*" || pattern_subtype.eq_ignore_ascii_case(actual_subtype))
}

fn split_media_type(value: &str) -> (&str, &str) {
  match value.split_once('/') {
    Some((main_type, subtype)) => (main_type.trim(), subtype.trim()),
    None => (value.trim(), ""),
  }
}

pub struct JsonParser;

impl ResponseParser for JsonParser {
  fn media_type(&self) -> &str {
    "application/json"
  }

  fn parse(&self, body: &[u8], _content_type: &str) -> Result<ParsedBody, ProxyError> {
    let value =
      serde_json::from_slice(body).map_err(|err| ProxyError::InvalidUpstreamBody(err.to_string()))?;

    Ok(ParsedBody::data(value))
  }
}

pub struct FormParser;

impl ResponseParser for FormParser {
  fn media_type(&self) -> &str {
    "application/x-www-form-urlencoded"
  }

  fn parse(&self, body: &[u8], _content_type: &str) -> Result<ParsedBody, ProxyError> {
    let mut data = Map::new();

    for (name, value) in url::form_urlencoded::parse(body) {
      data.insert(name.into_owned(), Value::String(value.into_owned()));
    }

    Ok(ParsedBody::data(Value::Object(data)))
  }
}

pub struct MultipartParser;

impl ResponseParser for MultipartParser {
  fn media_type(&self) -> &str {
    "multipart/form-data"
  }

  fn parse(&self, body: &[u8], content_type: &str) -> Result<ParsedBody, ProxyError> {
    let boundary = parse_boundary(content_type)
      .ok_or(ProxyError::MalformedMultipart("missing boundary parameter"))?;
    let mut parts = parse_multipart(body, &boundary)?;

    let mut data = Map::new();
    for (name, value) in parts.fields.drain(..) {
      data.insert(name, Value::String(value));
    }

    let mut attachments = Vec::new();
    for part in parts.files.iter_mut() {
      let mut content = Vec::new();
      part
        .content
        .read_to_end(&mut content)
        .map_err(|err| ProxyError::InvalidUpstreamBody(err.to_string()))?;
      attachments.push((part.name.clone(), Bytes::from(content)));
    }

    Ok(ParsedBody {
      data: Value::Object(data),
      attachments,
    })
  }
}

pub struct ParserRegistry {
  parsers: Vec<Box<dyn ResponseParser>>,
}

impl Default for ParserRegistry {
  fn default() -> ParserRegistry {
    ParserRegistry {
      parsers: vec![
        Box::new(JsonParser),
        Box::new(FormParser),
        Box::new(MultipartParser),
      ],
    }
  }
}

impl ParserRegistry {
  pub fn register(&mut self, parser: Box<dyn ResponseParser>) {
    self.parsers.push(parser);
  }

  // Mirrors content negotiation order: the last registered match wins.
  pub fn find(&self, content_type: &str) -> Option<&dyn ResponseParser> {
    let mut found = None;

    for parser in self.parsers.iter() {
      if media_type_matches(parser.media_type(), content_type) {
        found = Some(parser.as_ref());
      }
    }

    found
  }

  pub fn parse(&self, body: &[u8], content_type: &str) -> Result<Value, ProxyError> {
    let parser = self
      .find(content_type)
      .ok_or_else(|| ProxyError::UnsupportedMediaType(String::from(content_type)))?;

    Ok(parser.parse(body, content_type)?.data)
  }
}
