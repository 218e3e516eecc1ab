//! Command templates for custom build rules.
//!
//! A rule command is a shell command line with two recognized placeholders:
//!
//! - `$in` - the matched source file
//! - `$out` - the output artifact path
//!
//! `$$` produces a literal `$`. Any other `$name` is rejected when the template
//! is parsed, so a typo such as `$input` is reported while the manifest is
//! being resolved rather than when the command runs.
//!
//! Substituted paths are shell-quoted, so file names containing spaces or
//! shell metacharacters cannot change the shape of the command.
//!
//! # Example
//!
//! ```
//! use iceforge_lib::template::Template;
//!
//! let template = Template::parse("glslc $in -o $out").unwrap();
//! assert_eq!(
//!   template.render("shaders/a b.vert", "out/a b.vert.spv"),
//!   "glslc 'shaders/a b.vert' -o 'out/a b.vert.spv'"
//! );
//! ```

use std::fmt;

use thiserror::Error;

/// A recognized placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
  /// `$in`
  In,
  /// `$out`
  Out,
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Placeholder(Placeholder),
}

/// Errors produced while parsing a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
  #[error("unknown placeholder `${name}` at position {position} (expected $in or $out)")]
  UnknownPlaceholder { name: String, position: usize },

  #[error("`$` at position {position} is not followed by a placeholder name (use `$$` for a literal `$`)")]
  DanglingDollar { position: usize },
}

/// A parsed, validated command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
  source: String,
  segments: Vec<Segment>,
}

impl Template {
  /// Parse a command template.
  ///
  /// # Errors
  ///
  /// Returns [`TemplateError`] for unknown placeholders and for a `$` that is
  /// neither `$$` nor the start of a placeholder name.
  pub fn parse(input: &str) -> Result<Self, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
      if ch != '$' {
        literal.push(ch);
        continue;
      }

      if let Some((_, '$')) = chars.peek() {
        chars.next();
        literal.push('$');
        continue;
      }

      let mut name = String::new();
      while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
          name.push(c);
          chars.next();
        } else {
          break;
        }
      }

      let placeholder = match name.as_str() {
        "in" => Placeholder::In,
        "out" => Placeholder::Out,
        "" => return Err(TemplateError::DanglingDollar { position: pos }),
        _ => return Err(TemplateError::UnknownPlaceholder { name, position: pos }),
      };

      if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(&mut literal)));
      }
      segments.push(Segment::Placeholder(placeholder));
    }

    if !literal.is_empty() {
      segments.push(Segment::Literal(literal));
    }

    Ok(Self {
      source: input.to_string(),
      segments,
    })
  }

  /// The template text as written in the manifest.
  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  /// Substitute `$in` and `$out`, shell-quoting both values.
  pub fn render(&self, input: &str, output: &str) -> String {
    let mut result = String::with_capacity(self.source.len() + input.len() + output.len());
    for segment in &self.segments {
      match segment {
        Segment::Literal(s) => result.push_str(s),
        Segment::Placeholder(Placeholder::In) => result.push_str(&shell_quote(input)),
        Segment::Placeholder(Placeholder::Out) => result.push_str(&shell_quote(output)),
      }
    }
    result
  }
}

impl fmt::Display for Template {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.source)
  }
}

/// Quote a value for a POSIX shell.
///
/// Values made only of characters that are never special to the shell are
/// returned unchanged; everything else is wrapped in single quotes.
pub fn shell_quote(value: &str) -> String {
  let plain = !value.is_empty()
    && value
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | ',' | '+' | '=' | '@' | '%'));

  if plain {
    value.to_string()
  } else {
    format!("'{}'", value.replace('\'', r"'\''"))
  }
}
