// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scrub credentials out of strings before they reach logs.

use std::borrow::Cow;

/// Short, non-reversible label for a token (`abcd…(32)`).
pub fn mask(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}…({})", token.chars().count())
}

/// Replace bearer tokens in free text with `REDACTED`.
pub fn redact_bearer(input: &str) -> Cow<'_, str> {
    const MARKER: &str = "Bearer ";
    if !input.contains(MARKER) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(idx) = rest.find(MARKER) {
        out.push_str(&rest[..idx + MARKER.len()]);
        rest = &rest[idx + MARKER.len()..];
        let consumed: usize = rest
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '"' && *c != ',')
            .map(char::len_utf8)
            .sum();
        out.push_str("REDACTED");
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}
