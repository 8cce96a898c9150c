// This is adapted from Kubernetes.
// See apimachinery/pkg/util/validation/validation.go in the Kubernetes source

use std::{fmt::Display, sync::LazyLock};

use const_format::concatcp;
use regex::Regex;
use snafu::Snafu;

const C_IDENTIFIER_FMT: &str = "[A-Za-z_][A-Za-z0-9_]*";
const C_IDENTIFIER_ERROR_MSG: &str = "a valid environment variable name must consist of alphabetic characters, digits or '_', and must not start with a digit";

/// Config map and secret keys share this limit with DNS subdomains.
const CONFIG_MAP_KEY_MAX_LENGTH: usize = 253;
const CONFIG_MAP_KEY_FMT: &str = "[-._a-zA-Z0-9]+";
const CONFIG_MAP_KEY_ERROR_MSG: &str =
    "a valid config key must consist of alphanumeric characters, '-', '_' or '.'";

const RFC_1123_SUBDOMAIN_MAX_LENGTH: usize = 253;
const RFC_1123_LABEL_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";
const RFC_1123_SUBDOMAIN_FMT: &str =
    concatcp!(RFC_1123_LABEL_FMT, "(\\.", RFC_1123_LABEL_FMT, ")*");
const RFC_1123_SUBDOMAIN_ERROR_MSG: &str = "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' or '.', and must start and end with an alphanumeric character";

type Result<T = (), E = Errors> = std::result::Result<T, E>;

/// A collection of errors discovered during validation.
#[derive(Debug, PartialEq)]
pub struct Errors(Vec<Error>);

impl Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => ", ",
            };
            write!(f, "{prefix}{error}")?;
        }
        Ok(())
    }
}
impl std::error::Error for Errors {}

/// A single validation error.
#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(transparent)]
    Regex { source: RegexError },

    #[snafu(display("input is {length} bytes long but must be no more than {max_length}"))]
    TooLong { length: usize, max_length: usize },
}

#[derive(Debug, PartialEq)]
pub struct RegexError {
    /// The primary error message.
    msg: &'static str,

    /// The regex that the input must match.
    regex: &'static str,

    /// Examples of valid inputs.
    examples: &'static [&'static str],
}

impl Display for RegexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            msg,
            regex,
            examples,
        } = self;
        write!(f, "{msg} (")?;
        for (i, example) in examples.iter().enumerate() {
            let prefix = match i {
                0 => "e.g.",
                _ => "or",
            };
            write!(f, "{prefix} {example:?}, ")?;
        }
        write!(f, "regex used for validation is {regex:?})")
    }
}

impl std::error::Error for RegexError {}

/// An input format: the pattern a value must match, an optional length
/// limit and the explanation given when a value does not fit.
struct Format {
    regex: LazyLock<Regex>,
    pattern: &'static str,
    max_length: Option<usize>,
    error_msg: &'static str,
    examples: &'static [&'static str],
}

static C_IDENTIFIER: Format = Format {
    regex: LazyLock::new(|| anchored(C_IDENTIFIER_FMT)),
    pattern: C_IDENTIFIER_FMT,
    max_length: None,
    error_msg: C_IDENTIFIER_ERROR_MSG,
    examples: &["MY_NAME", "MY_NAME_1"],
};

static CONFIG_MAP_KEY: Format = Format {
    regex: LazyLock::new(|| anchored(CONFIG_MAP_KEY_FMT)),
    pattern: CONFIG_MAP_KEY_FMT,
    max_length: Some(CONFIG_MAP_KEY_MAX_LENGTH),
    error_msg: CONFIG_MAP_KEY_ERROR_MSG,
    examples: &["key.name", "KEY_NAME", "key-name"],
};

static RFC_1123_SUBDOMAIN: Format = Format {
    regex: LazyLock::new(|| anchored(RFC_1123_SUBDOMAIN_FMT)),
    pattern: RFC_1123_SUBDOMAIN_FMT,
    max_length: Some(RFC_1123_SUBDOMAIN_MAX_LENGTH),
    error_msg: RFC_1123_SUBDOMAIN_ERROR_MSG,
    examples: &["example.com"],
};

fn anchored(pattern: &str) -> Regex {
    Regex::new(&format!("^{pattern}$")).expect("failed to compile validation regex")
}

impl Format {
    /// Checks `value` against every rule of the format, reporting all
    /// violations at once.
    fn validate(&self, value: &str) -> Result {
        let mut errors = Vec::new();

        if let Some(max_length) = self.max_length {
            if value.len() > max_length {
                errors.push(
                    TooLongSnafu {
                        length: value.len(),
                        max_length,
                    }
                    .build(),
                );
            }
        }

        if !self.regex.is_match(value) {
            errors.push(Error::from(RegexError {
                msg: self.error_msg,
                regex: self.pattern,
                examples: self.examples,
            }));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Errors(errors))
        }
    }
}

/// Tests for a string that is a valid environment variable name (a C
/// identifier).
pub fn is_env_var_name(value: &str) -> Result {
    C_IDENTIFIER.validate(value)
}

/// Tests for a string that can be used as a key of a config map or secret.
pub fn is_config_map_key(value: &str) -> Result {
    CONFIG_MAP_KEY.validate(value)
}

/// Tests for a string that conforms to the definition of a subdomain in DNS
/// (RFC 1123), which is what the names of secrets and config maps must be.
pub fn is_rfc_1123_subdomain(value: &str) -> Result {
    RFC_1123_SUBDOMAIN.validate(value)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("A")]
    #[case("_")]
    #[case("DB_URL")]
    #[case("db_url")]
    #[case("_PRIVATE2")]
    #[case(&"A".repeat(300))]
    fn is_env_var_name_pass(#[case] value: &str) {
        assert!(is_env_var_name(value).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("1A")]
    #[case("A-B")]
    #[case("A.B")]
    #[case("A B")]
    fn is_env_var_name_fail(#[case] value: &str) {
        assert!(is_env_var_name(value).is_err());
    }

    #[rstest]
    #[case("password")]
    #[case("tls.crt")]
    #[case("my-key_1")]
    fn is_config_map_key_pass(#[case] value: &str) {
        assert!(is_config_map_key(value).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("a/b")]
    #[case(&"a".repeat(254))]
    fn is_config_map_key_fail(#[case] value: &str) {
        assert!(is_config_map_key(value).is_err());
    }

    #[rstest]
    #[case("creds")]
    #[case("db-credentials")]
    #[case("app.settings")]
    fn is_rfc_1123_subdomain_pass(#[case] value: &str) {
        assert!(is_rfc_1123_subdomain(value).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("Creds")]
    #[case("-creds")]
    #[case("creds_1")]
    #[case(&"a".repeat(254))]
    fn is_rfc_1123_subdomain_fail(#[case] value: &str) {
        assert!(is_rfc_1123_subdomain(value).is_err());
    }

    #[test]
    fn test_errors_display() {
        let errors = is_rfc_1123_subdomain(&"A".repeat(254)).unwrap_err();
        assert_eq!(errors.0.len(), 2);
        assert_eq!(
            errors.to_string(),
            format!(
                "input is 254 bytes long but must be no more than 253, {RFC_1123_SUBDOMAIN_ERROR_MSG} (e.g. \"example.com\", regex used for validation is {RFC_1123_SUBDOMAIN_FMT:?})"
            )
        );
    }
}
