//! `KEY=VALUE` environment files.
//!
//! Blank lines and `#` comments are skipped, an `export ` prefix is
//! tolerated, and a value wrapped in matching single or double quotes is
//! unquoted. Nothing is interpolated.

use std::path::Path;

use berth_common::error::{BerthError, Result};

/// Parses the content of an environment file.
///
/// # Errors
///
/// Returns a parse error naming `origin:line` for a line without `=` or
/// with an invalid variable name.
pub fn parse_env(content: &str, origin: &str) -> Result<Vec<(String, String)>> {
    let mut vars = Vec::new();
    for (number, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let location = format!("{origin}:{}", number + 1);
        let Some((key, value)) = line.split_once('=') else {
            return Err(BerthError::parse(location, "expected KEY=VALUE"));
        };
        let key = key.trim();
        if !is_valid_name(key) {
            return Err(BerthError::parse(
                location,
                format!("invalid variable name \"{key}\""),
            ));
        }
        vars.push((key.to_string(), unquote(value.trim()).to_string()));
    }
    Ok(vars)
}

/// Reads and parses an environment file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, otherwise the errors of
/// [`parse_env`].
pub fn read_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    tracing::debug!(path = %path.display(), "reading env file");
    let content = std::fs::read_to_string(path).map_err(|e| BerthError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_env(&content, &path.display().to_string())
}

fn is_valid_name(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_postgres_env() {
        let content = "\
# database
POSTGRES_USER=foodgram
POSTGRES_PASSWORD=\"s3cr=t\"

export DB_HOST=db
DB_PORT='5432'
";
        let vars = parse_env(content, ".env").expect("parse");
        assert_eq!(
            vars,
            vec![
                ("POSTGRES_USER".into(), "foodgram".into()),
                ("POSTGRES_PASSWORD".into(), "s3cr=t".into()),
                ("DB_HOST".into(), "db".into()),
                ("DB_PORT".into(), "5432".into()),
            ]
        );
    }

    #[test]
    fn empty_value_is_allowed() {
        let vars = parse_env("DEBUG=\n", ".env").expect("parse");
        assert_eq!(vars, vec![("DEBUG".into(), String::new())]);
    }

    #[test]
    fn missing_equals_names_the_line() {
        let err = parse_env("A=1\nbroken\n", ".env").unwrap_err();
        assert!(
            matches!(&err, BerthError::Parse { key, .. } if key == ".env:2"),
            "got: {err}"
        );
    }

    #[test]
    fn invalid_name_is_rejected() {
        assert!(parse_env("1ABC=x\n", ".env").is_err());
        assert!(parse_env("MY-VAR=x\n", ".env").is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = read_env_file(&dir.path().join(".env")).unwrap_err();
        assert!(matches!(err, BerthError::Io { .. }));
    }
}
