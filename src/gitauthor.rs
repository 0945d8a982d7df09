//! gitauthor
//!
//! Free-text git author parsing for commit attribution.
//!
//! Automation configs carry the commit author as a single string, either a
//! bare email address (`bot@example.com`) or a display name followed by an
//! angle-bracketed address (`Anna Bot <bot@example.com>`). This module turns
//! that string into a structured identity and guarantees that the structured
//! form can be rendered back to a string and re-parsed without drifting.
//!
//! # Design
//!
//! Parsing never fails with an error. An input that matches neither surface
//! form yields `None`, and the caller decides whether that is fatal. Display
//! names are neutralized on the way in: characters that would corrupt a
//! rendered author line (`[`, `]`, `<`, `>`, `"`) are backslash-escaped, and
//! escaping is idempotent so re-parsing a rendered identity is a fixpoint.
//!
//! # Example
//!
//! ```
//! use omniforge::gitauthor::parse_git_author;
//!
//! let author = parse_git_author(Some("Jane Doe <jane@example.com>")).unwrap();
//! assert_eq!(author.name.as_deref(), Some("Jane Doe"));
//! assert_eq!(author.email, "jane@example.com");
//!
//! assert!(parse_git_author(Some("not an author")).is_none());
//! assert!(parse_git_author(None).is_none());
//! ```

use std::fmt;

/// A structured commit-author identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitAuthor {
    /// Display name, absent when the input was a bare email address.
    pub name: Option<String>,
    /// Email address, preserved verbatim (bot-style local parts included).
    pub email: String,
}

impl GitAuthor {
    /// Render the canonical single-line form: `name <email>`, or the bare
    /// email when no name is present.
    ///
    /// The rendered string round-trips: parsing it yields an identity equal
    /// to `self`.
    ///
    /// # Example
    ///
    /// ```
    /// use omniforge::gitauthor::parse_git_author;
    ///
    /// let author = parse_git_author(Some("Jane <jane@example.com>")).unwrap();
    /// assert_eq!(author.to_git_string(), "Jane <jane@example.com>");
    /// ```
    pub fn to_git_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GitAuthor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

/// Parse a free-text git author string.
///
/// Accepts two surface forms:
///
/// - a bare email address, which yields an identity with no display name
/// - an optionally quoted display name followed by `<email>`
///
/// One layer of surrounding double quotes is stripped from the name, and any
/// unescaped `[`, `]`, `<`, `>` or `"` remaining in it is backslash-escaped.
/// The email must have a basic `local@domain` shape; bot-style local parts
/// such as `some[bot]` pass through verbatim.
///
/// Returns `None` for absent input, for whitespace-only input, and for input
/// matching neither form. This function never errors: an unusable author is
/// a policy decision for the caller.
pub fn parse_git_author(raw: Option<&str>) -> Option<GitAuthor> {
    let input = raw?.trim();
    if input.is_empty() {
        return None;
    }

    if let Some(open) = input.rfind('<') {
        // Name-and-address form. Everything after the last '<' must be the
        // address, closed by a trailing '>'.
        let email = input[open + 1..].strip_suffix('>')?.trim();
        if !is_plausible_email(email) {
            return None;
        }
        let name = neutralize_name(strip_surrounding_quotes(input[..open].trim()));
        return Some(GitAuthor {
            name: (!name.is_empty()).then_some(name),
            email: email.to_string(),
        });
    }

    // Bare address form.
    if !is_plausible_email(input) {
        return None;
    }
    Some(GitAuthor {
        name: None,
        email: input.to_string(),
    })
}

/// Basic shape check: exactly one `@` with a non-empty local part and domain,
/// and none of the characters that would break an author line.
fn is_plausible_email(candidate: &str) -> bool {
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !candidate
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"'))
}

/// Strip one layer of surrounding double quotes, if present.
fn strip_surrounding_quotes(name: &str) -> &str {
    name.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(name)
}

/// Backslash-escape every unescaped `[`, `]`, `<`, `>` and `"`.
///
/// Characters already preceded by an odd number of backslashes are left
/// alone, which makes the transformation idempotent.
fn neutralize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut escaped = false;
    for ch in name.chars() {
        match ch {
            '\\' if !escaped => {
                escaped = true;
                out.push(ch);
            }
            '[' | ']' | '<' | '>' | '"' if !escaped => {
                out.push('\\');
                out.push(ch);
            }
            _ => {
                escaped = false;
                out.push(ch);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parsing {
        use super::*;

        #[test]
        fn absent_input_yields_none() {
            assert_eq!(parse_git_author(None), None);
        }

        #[test]
        fn empty_and_whitespace_input_yields_none() {
            assert_eq!(parse_git_author(Some("")), None);
            assert_eq!(parse_git_author(Some("   ")), None);
        }

        #[test]
        fn bare_email_has_no_name() {
            let author = parse_git_author(Some("some[bot]@users.noreply.example.com"))
                .expect("bare bot email should parse");
            assert_eq!(author.name, None);
            assert_eq!(author.email, "some[bot]@users.noreply.example.com");
        }

        #[test]
        fn quoted_bot_name_and_address() {
            let author =
                parse_git_author(Some("\"some[bot]\" <some[bot]@users.noreply.example.com>"))
                    .expect("quoted bot author should parse");
            assert_eq!(author.name.as_deref(), Some("some\\[bot\\]"));
            assert_eq!(author.email, "some[bot]@users.noreply.example.com");
        }

        #[test]
        fn unquoted_name_with_brackets_is_escaped() {
            let author = parse_git_author(Some("name [what] <name@what.com>"))
                .expect("bracketed name should parse");
            assert_eq!(author.name.as_deref(), Some("name \\[what\\]"));
            assert_eq!(author.email, "name@what.com");
        }

        #[test]
        fn dotted_word_is_not_an_email() {
            assert_eq!(parse_git_author(Some("a.b.c")), None);
        }

        #[test]
        fn name_without_angle_address_is_rejected() {
            assert_eq!(parse_git_author(Some("Jane Doe jane@example.com")), None);
        }

        #[test]
        fn missing_closing_bracket_is_rejected() {
            assert_eq!(parse_git_author(Some("Jane <jane@example.com")), None);
        }

        #[test]
        fn angle_only_address_has_no_name() {
            let author = parse_git_author(Some("<jane@example.com>")).expect("should parse");
            assert_eq!(author.name, None);
            assert_eq!(author.email, "jane@example.com");
        }

        #[test]
        fn double_at_is_rejected() {
            assert_eq!(parse_git_author(Some("a@b@c.com")), None);
            assert_eq!(parse_git_author(Some("Jane <a@b@c.com>")), None);
        }

        #[test]
        fn empty_quoted_name_collapses_to_bare_identity() {
            let author = parse_git_author(Some("\"\" <jane@example.com>")).expect("should parse");
            assert_eq!(author.name, None);
            assert_eq!(author.email, "jane@example.com");
        }
    }

    mod escaping {
        use super::*;

        #[test]
        fn already_escaped_characters_are_untouched() {
            let author = parse_git_author(Some("name \\[what\\] <name@what.com>"))
                .expect("pre-escaped name should parse");
            assert_eq!(author.name.as_deref(), Some("name \\[what\\]"));
        }

        #[test]
        fn inner_quotes_are_escaped() {
            let author = parse_git_author(Some("Jane \"JD\" Doe <jane@example.com>"))
                .expect("inner quotes should parse");
            assert_eq!(author.name.as_deref(), Some("Jane \\\"JD\\\" Doe"));
        }

        #[test]
        fn doubled_backslash_does_not_escape() {
            // The second backslash of a pair is itself escaped, so a bracket
            // after the pair still needs neutralizing.
            let author = parse_git_author(Some("a\\\\[b] <a@b.com>")).expect("should parse");
            assert_eq!(author.name.as_deref(), Some("a\\\\\\[b\\]"));
        }

        #[test]
        fn rendering_and_reparsing_is_a_fixpoint() {
            for input in [
                "some[bot]@users.noreply.example.com",
                "\"some[bot]\" <some[bot]@users.noreply.example.com>",
                "name [what] <name@what.com>",
                "Jane Doe <jane@example.com>",
                "<jane@example.com>",
            ] {
                let first = parse_git_author(Some(input)).expect("seed input should parse");
                let second = parse_git_author(Some(&first.to_git_string()))
                    .expect("rendered form should parse");
                assert_eq!(first, second, "re-parse drifted for {input:?}");
            }
        }
    }

    mod display {
        use super::*;

        #[test]
        fn renders_name_and_email() {
            let author = GitAuthor {
                name: Some("Jane".to_string()),
                email: "jane@example.com".to_string(),
            };
            assert_eq!(author.to_string(), "Jane <jane@example.com>");
        }

        #[test]
        fn renders_bare_email() {
            let author = GitAuthor {
                name: None,
                email: "jane@example.com".to_string(),
            };
            assert_eq!(author.to_string(), "jane@example.com");
        }
    }
}
