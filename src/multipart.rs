use std::io::{Cursor, Read, Seek, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use rand::RngCore;

use crate::error::ProxyError;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

pub trait FileSource: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> FileSource for T {}

pub struct FilePart {
  pub name: String,
  pub file_name: String,
  pub content: Box<dyn FileSource>,
}

impl FilePart {
  pub fn new(name: &str, file_name: &str, content: impl FileSource + 'static) -> FilePart {
    FilePart {
      name: String::from(name),
      file_name: String::from(file_name),
      content: Box::new(content),
    }
  }
}

pub fn generate_boundary() -> String {
  let mut raw = [0u8; 16];
  rand::thread_rng().fill_bytes(&mut raw);

  raw.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn guess_content_type(file_name: &str) -> &'static str {
  let extension = match file_name.rsplit_once('.') {
    Some((_, extension)) => extension,
    None => return "application/octet-stream",
  };

  match extension.to_ascii_lowercase().as_str() {
    "txt" => "text/plain",
    "html" | "htm" => "text/html",
    "css" => "text/css",
    "csv" => "text/csv",
    "json" => "application/json",
    "xml" => "application/xml",
    "pdf" => "application/pdf",
    "zip" => "application/zip",
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "svg" => "image/svg+xml",
    _ => "application/octet-stream",
  }
}

#[derive(Clone, Copy)]
enum EncodeStep {
  FieldHeader(usize),
  FieldValue(usize),
  FileHeader(usize),
  FileBody(usize),
  Footer,
  Done,
}

pub struct StreamingMultipart {
  fields: Vec<(String, String)>,
  files: Vec<FilePart>,
  boundary: String,
  chunk_size: usize,
  step: EncodeStep,
}

impl StreamingMultipart {
  pub fn new(fields: Vec<(String, String)>, files: Vec<FilePart>, boundary: &str) -> StreamingMultipart {
    StreamingMultipart::with_chunk_size(fields, files, boundary, DEFAULT_CHUNK_SIZE)
  }

  pub fn with_chunk_size(
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
    boundary: &str,
    chunk_size: usize,
  ) -> StreamingMultipart {
    let step = StreamingMultipart::initial_step(&fields, &files);

    StreamingMultipart {
      fields,
      files,
      boundary: String::from(boundary),
      chunk_size,
      step,
    }
  }

  pub fn boundary(&self) -> &str {
    &self.boundary
  }

  // One full traversal; file positions are restored by the seek performed
  // when each file part is encoded again.
  pub fn content_length(&mut self) -> std::io::Result<u64> {
    self.step = StreamingMultipart::initial_step(&self.fields, &self.files);

    let mut total: u64 = 0;
    while let Some(chunk) = self.next_chunk() {
      total += chunk?.len() as u64;
    }

    self.step = StreamingMultipart::initial_step(&self.fields, &self.files);
    Ok(total)
  }

  fn initial_step(fields: &[(String, String)], files: &[FilePart]) -> EncodeStep {
    if !fields.is_empty() {
      EncodeStep::FieldHeader(0)
    } else if !files.is_empty() {
      EncodeStep::FileHeader(0)
    } else {
      EncodeStep::Footer
    }
  }

  fn step_after_field(&self, index: usize) -> EncodeStep {
    if index + 1 < self.fields.len() {
      EncodeStep::FieldHeader(index + 1)
    } else if !self.files.is_empty() {
      EncodeStep::FileHeader(0)
    } else {
      EncodeStep::Footer
    }
  }

  fn step_after_file(&self, index: usize) -> EncodeStep {
    if index + 1 < self.files.len() {
      EncodeStep::FileHeader(index + 1)
    } else {
      EncodeStep::Footer
    }
  }

  fn part_header(&self, name: &str, file_name: Option<&str>, content_type: Option<&str>) -> String {
    let mut header = format!(
      "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
      self.boundary, name
    );

    if let Some(file_name) = file_name {
      header.push_str(&format!("; filename=\"{file_name}\""));
    }

    if let Some(content_type) = content_type {
      header.push_str(&format!("\r\nContent-Type: {content_type}"));
    }

    header.push_str("\r\n\r\n");
    header
  }

  fn next_chunk(&mut self) -> Option<std::io::Result<Bytes>> {
    match self.step {
      EncodeStep::FieldHeader(index) => {
        let header = self.part_header(&self.fields[index].0, None, None);
        self.step = EncodeStep::FieldValue(index);
        Some(Ok(Bytes::from(header)))
      }
      EncodeStep::FieldValue(index) => {
        let value = format!("{}\r\n", self.fields[index].1);
        self.step = self.step_after_field(index);
        Some(Ok(Bytes::from(value)))
      }
      EncodeStep::FileHeader(index) => {
        let name = self.files[index].name.clone();
        let file_name = self.files[index].file_name.clone();
        let content_type = guess_content_type(&file_name);
        let header = self.part_header(&name, Some(&file_name), Some(content_type));

        // Seek back to the start; a length computation may have consumed the stream.
        if let Err(err) = self.files[index].content.seek(SeekFrom::Start(0)) {
          self.step = EncodeStep::Done;
          return Some(Err(err));
        }

        self.step = EncodeStep::FileBody(index);
        Some(Ok(Bytes::from(header)))
      }
      EncodeStep::FileBody(index) => {
        let mut buffer = vec![0u8; self.chunk_size];

        match self.files[index].content.read(&mut buffer) {
          Ok(0) => {
            self.step = self.step_after_file(index);
            Some(Ok(Bytes::from_static(b"\r\n")))
          }
          Ok(read) => {
            buffer.truncate(read);
            Some(Ok(Bytes::from(buffer)))
          }
          Err(err) => {
            self.step = EncodeStep::Done;
            Some(Err(err))
          }
        }
      }
      EncodeStep::Footer => {
        self.step = EncodeStep::Done;
        Some(Ok(Bytes::from(format!("--{}--\r\n", self.boundary))))
      }
      EncodeStep::Done => None,
    }
  }
}

impl Stream for StreamingMultipart {
  type Item = std::io::Result<Bytes>;

  fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    Poll::Ready(self.get_mut().next_chunk())
  }
}

pub struct MultipartBody {
  pub fields: Vec<(String, String)>,
  pub files: Vec<FilePart>,
}

pub fn parse_boundary(content_type: &str) -> Option<String> {
  for segment in content_type.split(';').skip(1) {
    if let Some((key, value)) = segment.split_once('=') {
      if key.trim().eq_ignore_ascii_case("boundary") {
        let value = value.trim().trim_matches('"');
        if !value.is_empty() {
          return Some(String::from(value));
        }
      }
    }
  }

  None
}

pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<MultipartBody, ProxyError> {
  let delimiter = format!("--{boundary}").into_bytes();
  let mut parts = MultipartBody {
    fields: Vec::new(),
    files: Vec::new(),
  };

  let mut pos = find(body, &delimiter, 0).ok_or(ProxyError::MalformedMultipart("missing opening boundary"))?;

  loop {
    pos += delimiter.len();

    if body[pos..].starts_with(b"--") {
      break;
    }

    if body[pos..].starts_with(b"\r\n") {
      pos += 2;
    }

    let header_end = find(body, b"\r\n\r\n", pos).ok_or(ProxyError::MalformedMultipart("unterminated part headers"))?;
    let headers_raw = &body[pos..header_end];
    let content_start = header_end + 4;

    let next = find(body, &delimiter, content_start).ok_or(ProxyError::MalformedMultipart("unterminated part"))?;
    let mut content_end = next;
    if content_end >= content_start + 2 && &body[content_end - 2..content_end] == b"\r\n" {
      content_end -= 2;
    }

    let content = &body[content_start..content_end];
    let (name, file_name) = parse_part_headers(headers_raw)?;

    match file_name {
      Some(file_name) => parts.files.push(FilePart {
        name,
        file_name,
        content: Box::new(Cursor::new(content.to_vec())),
      }),
      None => parts
        .fields
        .push((name, String::from_utf8_lossy(content).into_owned())),
    }

    pos = next;
  }

  Ok(parts)
}

fn parse_part_headers(raw: &[u8]) -> Result<(String, Option<String>), ProxyError> {
  let text = String::from_utf8_lossy(raw);

  for line in text.split("\r\n") {
    let Some((header_name, header_value)) = line.split_once(':') else {
      continue;
    };

    if header_name.trim().eq_ignore_ascii_case("content-disposition") {
      let name = disposition_param(header_value, "name")
        .ok_or(ProxyError::MalformedMultipart("part without a field name"))?;
      let file_name = disposition_param(header_value, "filename");
      return Ok((name, file_name));
    }
  }

  Err(ProxyError::MalformedMultipart("part without content-disposition"))
}

fn disposition_param(header_value: &str, key: &str) -> Option<String> {
  for segment in header_value.split(';') {
    if let Some((segment_key, segment_value)) = segment.split_once('=') {
      if segment_key.trim().eq_ignore_ascii_case(key) {
        return Some(String::from(segment_value.trim().trim_matches('"')));
      }
    }
  }

  None
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
  if haystack.len() < from + needle.len() {
    return None;
  }

  haystack[from..]
    .windows(needle.len())
    .position(|window| window == needle)
    .map(|offset| from + offset)
}
