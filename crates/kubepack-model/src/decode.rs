//! Streaming manifest decoders
//!
//! Accepts a byte stream that is either concatenated YAML documents
//! (separated by `---`) or concatenated/newline-delimited JSON. Documents of
//! kind `List` are flattened recursively. Every flattened document is
//! validated to carry apiVersion, kind and metadata.name.

use std::collections::VecDeque;

use serde_yaml::Value;

use crate::error::{ModelError, Result};
use crate::resource::Resource;
use crate::tree;

/// Decodes a manifest into a lazy sequence of resource events. The sequence
/// ends after the first error.
pub fn decode_documents(input: &[u8]) -> Documents {
    if is_json(input) {
        let mut decoder = JsonStreamDecoder::new();
        let mut ready: VecDeque<Result<Resource>> = decoder.push(input).into();
        if !ready.iter().any(|r| r.is_err()) {
            if let Err(e) = decoder.finish() {
                ready.push_back(Err(e));
            }
        }
        return Documents {
            pending_docs: VecDeque::new(),
            ready,
            closed: true,
        };
    }
    let text = String::from_utf8_lossy(input);
    Documents {
        pending_docs: split_yaml_documents(&text).into(),
        ready: VecDeque::new(),
        closed: false,
    }
}

/// Decodes a manifest strictly, failing on the first invalid document
pub fn parse_resources(input: &[u8]) -> Result<Vec<Resource>> {
    decode_documents(input).collect()
}

/// Lazy document sequence over a manifest byte stream
pub struct Documents {
    pending_docs: VecDeque<String>,
    ready: VecDeque<Result<Resource>>,
    closed: bool,
}

impl Iterator for Documents {
    type Item = Result<Resource>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                if item.is_err() {
                    self.closed = true;
                    self.pending_docs.clear();
                }
                return Some(item);
            }
            if self.closed {
                return None;
            }
            let doc = self.pending_docs.pop_front()?;
            match parse_yaml_document(&doc) {
                Ok(resources) => self.ready.extend(resources.into_iter().map(Ok)),
                Err(e) => self.ready.push_back(Err(e)),
            }
        }
    }
}

fn is_json(input: &[u8]) -> bool {
    input
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{')
}

fn split_yaml_documents(text: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.trim_end() == "---" {
            docs.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    docs.push(current);
    docs
}

fn parse_yaml_document(doc: &str) -> Result<Vec<Resource>> {
    if doc
        .lines()
        .all(|l| l.trim().is_empty() || l.trim_start().starts_with('#'))
    {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_yaml::from_str(doc).map_err(|e| ModelError::parse(format!("yaml document: {e}")))?;
    if value.is_null() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    flatten(value, &mut out)?;
    Ok(out)
}

/// Recursively flattens `List` kinds and validates each leaf document
fn flatten(value: Value, out: &mut Vec<Resource>) -> Result<()> {
    if tree::string_at(&value, "kind") == "List" {
        let items = match tree::lookup(&value, "items").and_then(Value::as_sequence) {
            Some(items) => items.clone(),
            None => return Err(ModelError::parse("object of kind List does not declare items")),
        };
        for item in items {
            flatten(item, out)?;
        }
        return Ok(());
    }
    let resource = Resource::from_value(value);
    resource.validate()?;
    out.push(resource);
    Ok(())
}

/// Incremental decoder for a concatenated JSON document stream, fed from a
/// child process as bytes arrive. Complete documents are returned on each
/// push; partial tails are buffered.
#[derive(Default)]
pub struct JsonStreamDecoder {
    buf: Vec<u8>,
}

impl JsonStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns every document completed so far
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Resource>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        let mut consumed = self.buf.len();
        {
            let mut iter =
                serde_json::Deserializer::from_slice(&self.buf).into_iter::<serde_json::Value>();
            loop {
                match iter.next() {
                    Some(Ok(doc)) => {
                        let offset = iter.byte_offset();
                        match json_to_resources(doc) {
                            Ok(resources) => {
                                consumed = offset;
                                out.extend(resources.into_iter().map(Ok));
                            }
                            Err(e) => {
                                out.push(Err(e));
                                consumed = self.buf.len();
                                break;
                            }
                        }
                    }
                    Some(Err(e)) if e.is_eof() => {
                        consumed = iter.byte_offset();
                        break;
                    }
                    Some(Err(e)) => {
                        out.push(Err(ModelError::parse(format!("json document: {e}"))));
                        consumed = self.buf.len();
                        break;
                    }
                    None => {
                        consumed = iter.byte_offset();
                        break;
                    }
                }
            }
        }
        self.buf.drain(..consumed);
        out
    }

    /// Fails when the stream ended inside an incomplete document
    pub fn finish(self) -> Result<()> {
        if self.buf.iter().all(|b| b.is_ascii_whitespace()) {
            Ok(())
        } else {
            Err(ModelError::parse("unexpected end of json stream"))
        }
    }
}

fn json_to_resources(doc: serde_json::Value) -> Result<Vec<Resource>> {
    let value: Value =
        serde_yaml::to_value(doc).map_err(|e| ModelError::parse(format!("json document: {e}")))?;
    let mut out = Vec::new();
    flatten(value, &mut out)?;
    Ok(out)
}
