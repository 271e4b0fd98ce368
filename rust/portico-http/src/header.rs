//! `Authorization` and `WWW-Authenticate` header syntax.

use std::fmt::{Display, Formatter};

use http::HeaderValue;
use http::header::WWW_AUTHENTICATE;
use portico_auth::{AuthError, Exchange};

/// A malformed list of auth parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    /// A quoted value never ends.
    #[error("unterminated quoted string starting at byte {position}")]
    UnterminatedQuote {
        /// Where the quoted string starts.
        position: usize,
    },
    /// A parameter has no `=`.
    #[error("parameter '{name}' has no value")]
    MissingValue {
        /// The parameter name.
        name: String,
    },
    /// A `=` follows no name.
    #[error("parameter without a name at byte {position}")]
    MissingName {
        /// Where the parameter starts.
        position: usize,
    },
    /// A rendered value contains bytes a header cannot carry.
    #[error("'{value}' is not a valid header value")]
    InvalidValue {
        /// The offending value.
        value: String,
    },
}

/// Turns `value` into a header value.
pub fn header_value(value: String) -> Result<HeaderValue, HeaderError> {
    HeaderValue::try_from(value.as_str()).map_err(|_| HeaderError::InvalidValue { value })
}

/// Splits `Scheme rest` into the scheme and what follows it.
pub fn split_scheme(value: &str) -> Option<(&str, &str)> {
    let value = value.trim_start();
    let (scheme, rest) = value.split_once(char::is_whitespace).unwrap_or((value, ""));
    if scheme.is_empty() {
        None
    } else {
        Some((scheme, rest.trim()))
    }
}

/// Parses `name=value, name="quoted value", ...`.
///
/// Names are lowercased. Backslash escapes inside quoted values are
/// resolved.
pub fn parse_auth_params(input: &str) -> Result<Vec<(String, String)>, HeaderError> {
    let bytes = input.as_bytes();
    let mut params = Vec::new();
    let mut position = 0;

    let skip = |position: &mut usize, separators: &[u8]| {
        while *position < bytes.len()
            && (bytes[*position].is_ascii_whitespace() || separators.contains(&bytes[*position]))
        {
            *position += 1;
        }
    };

    loop {
        skip(&mut position, b",");
        if position >= bytes.len() {
            return Ok(params);
        }

        let start = position;
        while position < bytes.len() && bytes[position] != b'=' && bytes[position] != b',' {
            position += 1;
        }
        let name = input[start..position].trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(HeaderError::MissingName { position: start });
        }
        if position >= bytes.len() || bytes[position] != b'=' {
            return Err(HeaderError::MissingValue { name });
        }
        position += 1;
        skip(&mut position, b"");

        let value = if bytes.get(position) == Some(&b'"') {
            let quote = position;
            position += 1;
            let mut value = String::new();
            let mut closed = false;
            let mut chars = input[position..].char_indices();
            while let Some((offset, c)) = chars.next() {
                match c {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        position += offset + 1;
                        closed = true;
                        break;
                    }
                    c => value.push(c),
                }
            }
            if !closed {
                return Err(HeaderError::UnterminatedQuote { position: quote });
            }
            value
        } else {
            let start = position;
            while position < bytes.len() && bytes[position] != b',' {
                position += 1;
            }
            input[start..position].trim().to_string()
        };
        params.push((name, value));
    }
}

/// Quotes `value` for use in a header, escaping `"` and `\`.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// A challenge as sent in `WWW-Authenticate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    scheme: String,
    params: Vec<(String, String)>,
}

impl Challenge {
    /// A challenge of `scheme` without parameters.
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            params: Vec::new(),
        }
    }

    /// Adds a quoted parameter.
    pub fn quoted(mut self, name: impl Into<String>, value: &str) -> Self {
        self.params.push((name.into(), quote(value)));
        self
    }

    /// Adds a parameter as is.
    pub fn token(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }
}

/// Appends `challenge` to the `WWW-Authenticate` headers of the response.
///
/// A challenge that cannot be sent, e.g. because a configured realm holds a
/// line break, is a configuration error.
pub(crate) fn send_challenge(
    exchange: &mut Exchange<'_>,
    challenge: &Challenge,
) -> Result<(), AuthError> {
    let value = header_value(challenge.to_string())
        .map_err(|error| AuthError::configuration(error.to_string()))?;
    exchange.response_mut().append_header(WWW_AUTHENTICATE, value);
    Ok(())
}

impl Display for Challenge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.scheme)?;
        for (index, (name, value)) in self.params.iter().enumerate() {
            let separator = if index == 0 { " " } else { ", " };
            write!(f, "{separator}{name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_splits_the_scheme() {
        assert_eq!(split_scheme("Basic  YWxpY2U="), Some(("Basic", "YWxpY2U=")));
        assert_eq!(split_scheme("Negotiate"), Some(("Negotiate", "")));
        assert_eq!(split_scheme("   "), None);
    }

    #[test]
    fn it_parses_quoted_and_bare_params() -> testresult::TestResult {
        let params = parse_auth_params(
            r#"username="Mufasa", realm="a \"quoted\" realm", nc=00000001 ,qop=auth,"#,
        )?;
        assert_eq!(
            params,
            vec![
                ("username".to_string(), "Mufasa".to_string()),
                ("realm".to_string(), r#"a "quoted" realm"#.to_string()),
                ("nc".to_string(), "00000001".to_string()),
                ("qop".to_string(), "auth".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn it_rejects_malformed_params() {
        assert_eq!(
            parse_auth_params(r#"realm="open"#),
            Err(HeaderError::UnterminatedQuote { position: 6 })
        );
        assert_eq!(
            parse_auth_params("realm"),
            Err(HeaderError::MissingValue {
                name: "realm".into()
            })
        );
        assert!(matches!(
            parse_auth_params("=value"),
            Err(HeaderError::MissingName { .. })
        ));
    }

    #[test]
    fn it_formats_challenges() {
        let challenge = Challenge::new("Digest")
            .quoted("realm", "example.net")
            .token("stale", "true");
        assert_eq!(
            challenge.to_string(),
            r#"Digest realm="example.net", stale=true"#
        );
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn it_refuses_values_a_header_cannot_carry() -> testresult::TestResult {
        let value = header_value(r#"Basic realm="example.net""#.to_string())?;
        assert_eq!(value.to_str()?, r#"Basic realm="example.net""#);
        assert_eq!(
            header_value("two\nlines".to_string()),
            Err(HeaderError::InvalidValue {
                value: "two\nlines".into()
            })
        );
        Ok(())
    }
}
