//! Header templates.
//!
//! A template is literal text with `{{ session.<key> }}` placeholders. The
//! only thing a template can do is read a session value, so rendering can
//! never run code or reach outside the session it is given.

use axum::http::HeaderValue;

use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unclosed placeholder at byte {0}")]
    Unclosed(usize),
    #[error("unsupported placeholder '{0}', expected 'session.<key>'")]
    Unsupported(String),
    #[error("rendered value is not a valid header value")]
    InvalidValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    SessionValue(String),
}

/// A compiled header template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTemplate {
    segments: Vec<Segment>,
}

impl HeaderTemplate {
    /// Compile a template. Fails on malformed placeholders.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or(TemplateError::Unclosed(offset + start))?;
            segments.push(Segment::SessionValue(parse_placeholder(&after[..end])?));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Render against a session. Missing session values render as empty.
    pub fn render(&self, session: &Session) -> Result<HeaderValue, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::SessionValue(key) => out.push_str(session.get(key).unwrap_or_default()),
            }
        }
        HeaderValue::from_str(&out).map_err(|_| TemplateError::InvalidValue)
    }
}

fn parse_placeholder(inner: &str) -> Result<String, TemplateError> {
    let expr = inner.trim();
    let key = expr
        .strip_prefix("session.")
        .filter(|key| {
            !key.is_empty()
                && key
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        })
        .ok_or_else(|| TemplateError::Unsupported(expr.to_string()))?;
    Ok(key.to_string())
}
