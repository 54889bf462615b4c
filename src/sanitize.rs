//! Extracting a JSON payload from noisy generative output.
//!
//! Model output is adversarial input from the pipeline's perspective: it may
//! wrap the payload in markdown fences, prepend commentary, refuse outright,
//! or truncate mid-object. Every stage routes raw output through [`extract`]
//! and must keep a deterministic fallback ready for when it fails.

use thiserror::Error;

/// The sanitizer could not recover a structured payload.
/// This is an expected, frequent outcome — callers degrade, they never throw.
#[derive(Debug, Error)]
pub enum ParseFailure {
  #[error("no JSON object or array found in output")]
  NoPayload,
  #[error("payload is not valid JSON: {0}")]
  Invalid(#[from] serde_json::Error),
  #[error("payload has unexpected shape: {0}")]
  WrongShape(String),
}

/// Extract and parse the JSON object or array embedded in `raw`.
///
/// Steps: trim, drop markdown fence lines (with or without a language tag),
/// slice from the first `{`/`[` to the last matching `}`/`]`, then parse.
pub fn extract(raw: &str) -> Result<serde_json::Value, ParseFailure> {
  // Strip only the fence tokens themselves; the payload may share a line
  // with its fence, so dropping whole lines would lose it.
  let defenced = strip_fence_tokens(raw.trim());

  let open = defenced
    .char_indices()
    .find(|(_, c)| *c == '{' || *c == '[')
    .ok_or(ParseFailure::NoPayload)?;
  let close_char = if open.1 == '{' { '}' } else { ']' };
  let close = defenced.rfind(close_char).ok_or(ParseFailure::NoPayload)?;
  if close < open.0 {
    return Err(ParseFailure::NoPayload);
  }

  let slice = &defenced[open.0..close + close_char.len_utf8()];
  Ok(serde_json::from_str(slice)?)
}

/// Remove every ``` delimiter, along with a language tag glued to it
/// (```json, ```JSON5, ...). Everything between fences stays put.
fn strip_fence_tokens(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut rest = s;
  while let Some(pos) = rest.find("```") {
    out.push_str(&rest[..pos]);
    rest = &rest[pos + 3..];
    let tag_len = rest
      .find(|c: char| !c.is_ascii_alphanumeric())
      .unwrap_or(rest.len());
    rest = &rest[tag_len..];
  }
  out.push_str(rest);
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn extracts_bare_object() {
    let v = extract(r#"{"a": 1}"#).expect("parse");
    assert_eq!(v, json!({"a": 1}));
  }

  #[test]
  fn strips_fences_and_surrounding_prose() {
    let raw = "Sure! Here is your JSON:\n```json\n{\"topics\": [\"Algebra\"]}\n```\nHope that helps.";
    let v = extract(raw).expect("parse");
    assert_eq!(v, json!({"topics": ["Algebra"]}));
  }

  #[test]
  fn recovers_payload_sharing_a_line_with_its_fences() {
    let v = extract("```json{\"a\": 1}```").expect("parse");
    assert_eq!(v, json!({"a": 1}));
    let v = extract("```{\"a\": 1}```").expect("parse");
    assert_eq!(v, json!({"a": 1}));
  }

  #[test]
  fn recovers_embedded_object_exactly() {
    let inner = json!({"summary": "short", "n": 3, "nested": {"k": [1, 2]}});
    let raw = format!("prefix text {} suffix", inner);
    let v = extract(&raw).expect("parse");
    assert_eq!(v, inner);
  }

  #[test]
  fn extracts_top_level_array() {
    let raw = "```\n[{\"q\": \"x\"}, {\"q\": \"y\"}]\n```";
    let v = extract(raw).expect("parse");
    assert!(v.is_array());
    assert_eq!(v.as_array().map(Vec::len), Some(2));
  }

  #[test]
  fn no_brackets_is_a_parse_failure_not_a_panic() {
    let err = extract("I'm sorry, I can't help with that.").unwrap_err();
    assert!(matches!(err, ParseFailure::NoPayload));
  }

  #[test]
  fn truncated_object_is_invalid() {
    let err = extract(r#"{"topics": ["Algebra", "Geo"#).unwrap_err();
    assert!(matches!(err, ParseFailure::NoPayload | ParseFailure::Invalid(_)));
  }

  #[test]
  fn garbage_between_brackets_is_invalid() {
    let err = extract("{ this is not json }").unwrap_err();
    assert!(matches!(err, ParseFailure::Invalid(_)));
  }
}
