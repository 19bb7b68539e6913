use std::borrow::Cow;

const REDACTED: &str = "REDACTED";

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let nee = needle.as_bytes();
    if nee.is_empty() {
        return Some(0);
    }
    if nee.len() > hay.len() {
        return None;
    }

    (0..=hay.len() - nee.len()).find(|&i| {
        hay[i..i + nee.len()]
            .iter()
            .zip(nee)
            .all(|(a, b)| a.to_ascii_lowercase() == b.to_ascii_lowercase())
    })
}

/// Replaces whatever follows each `marker` with `REDACTED`, up to the first
/// byte for which `stop` returns true.
fn redact_after(text: &str, marker: &str, stop: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = find_ascii_case_insensitive(rest, marker) {
        let value_start = idx + marker.len();
        out.push_str(&rest[..value_start]);
        rest = &rest[value_start..];

        let consumed: usize = rest
            .chars()
            .take_while(|ch| !stop(*ch))
            .map(char::len_utf8)
            .sum();
        if consumed > 0 {
            out.push_str(REDACTED);
        }
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    out
}

/// Masks bearer tokens, whether they appear in an `Authorization` header dump
/// or in a JSON body (`"token":"..."`).
pub fn redact_secrets(input: &str) -> Cow<'_, str> {
    let mut value = redact_after(input, "Bearer ", |ch| {
        ch.is_whitespace() || ch == '"' || ch == '\'' || ch == ','
    });
    value = redact_after(&value, "\"token\":\"", |ch| ch == '"');
    value = redact_after(&value, "\"token\": \"", |ch| ch == '"');

    if value == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_secrets_redacts_bearer_header_line() {
        let input = "Authorization: Bearer abc.def-123\nOther: ok\n";
        let out = redact_secrets(input).to_string();
        assert_eq!(out, "Authorization: Bearer REDACTED\nOther: ok\n");
    }

    #[test]
    fn redact_secrets_redacts_token_in_json_body() {
        let input = r#"{"data":{"token":"abc","user":{"id":"1"}}}"#;
        let out = redact_secrets(input).to_string();
        assert_eq!(out, r#"{"data":{"token":"REDACTED","user":{"id":"1"}}}"#);
    }

    #[test]
    fn redact_secrets_is_case_insensitive_on_scheme() {
        let out = redact_secrets("authorization: bearer xyz").to_string();
        assert_eq!(out, "authorization: bearer REDACTED");
    }

    #[test]
    fn redact_secrets_borrows_when_clean() {
        let input = "request timed out";
        assert!(matches!(redact_secrets(input), Cow::Borrowed(_)));
    }
}
