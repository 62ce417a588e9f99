/// Turns untrusted text into text safe to store and render.
///
/// Implementations must be total and free of side effects.
pub trait Sanitizer: Send + Sync {
  fn sanitize(&self, input: &str) -> String;

  /// Sanitize an optional value, treating a blank result as absent.
  fn sanitize_opt(&self, input: Option<&str>) -> Option<String> {
    input
      .map(|s| self.sanitize(s))
      .filter(|s| !s.trim().is_empty())
  }
}

/// Strips markup and control characters.
///
/// Anything that looks like a tag or comment is removed whole. A `<` or `>`
/// that does not open a closed tag is escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlSanitizer;

impl Sanitizer for HtmlSanitizer {
  fn sanitize(&self, input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
      let after = &rest[c.len_utf8()..];
      match c {
        '<' if opens_tag(after) => match after.find('>') {
          Some(end) => {
            rest = &after[end + 1..];
            continue;
          }
          None => out.push_str("&lt;"),
        },
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        c if c.is_control() && !matches!(c, '\n' | '\r' | '\t') => {}
        c => out.push(c),
      }
      rest = after;
    }

    out
  }
}

fn opens_tag(after: &str) -> bool {
  after
    .chars()
    .next()
    .is_some_and(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?'))
}

/// Returns input unchanged. For trusted callers and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSanitizer;

impl Sanitizer for PassthroughSanitizer {
  fn sanitize(&self, input: &str) -> String {
    input.to_string()
  }
}
