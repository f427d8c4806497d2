//! Logical reference parsing and textual path normalization.

use crate::{FsError, Result};

const SCHEME_DELIMITER: &str = "://";

/// A parsed `scheme://target` reference.
///
/// The scheme selects the registered backend; the target is the normalized
/// path handed to it. Normalization is purely textual: separators collapse,
/// `.` segments drop, `..` segments resolve against the preceding segment and
/// may never escape the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsUri {
    scheme: String,
    target: String,
}

impl VfsUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri.split_once(SCHEME_DELIMITER).ok_or(FsError::InvalidInput)?;

        if scheme.is_empty() {
            return Err(FsError::InvalidInput);
        }

        Ok(Self {
            scheme: scheme.to_owned(),
            target: normalize(rest)?,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The backend-relative path. Empty for the backend root.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The normalized full reference, used as the advisory lock key.
    pub fn canonical(&self) -> String {
        format!("{}{}{}", self.scheme, SCHEME_DELIMITER, self.target)
    }
}

/// Collapses a raw target into its canonical relative form.
pub(crate) fn normalize(path: &str) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                // Traversal above the backend root is never valid.
                segments.pop().ok_or(FsError::InvalidInput)?;
            }
            other => segments.push(other),
        }
    }

    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let uri = VfsUri::parse("mem://foo/bar.txt").unwrap();
        assert_eq!(uri.scheme(), "mem");
        assert_eq!(uri.target(), "foo/bar.txt");
        assert_eq!(uri.canonical(), "mem://foo/bar.txt");

        assert_eq!(
            VfsUri::parse("no-delimiter"),
            Err(FsError::InvalidInput),
            "missing scheme delimiter",
        );
        assert_eq!(
            VfsUri::parse("://foo"),
            Err(FsError::InvalidInput),
            "empty scheme",
        );
    }

    #[test]
    fn test_parse_splits_at_first_delimiter() {
        let uri = VfsUri::parse("s3://bucket://nested").unwrap();
        assert_eq!(uri.scheme(), "s3");
        assert_eq!(uri.target(), "bucket:/nested");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), Ok(String::new()), "empty stays empty");
        assert_eq!(normalize("/"), Ok(String::new()), "root collapses to empty");
        assert_eq!(normalize("a/b"), Ok("a/b".to_string()));
        assert_eq!(normalize("/a//b/"), Ok("a/b".to_string()), "redundant separators");
        assert_eq!(normalize("./a/./b"), Ok("a/b".to_string()), "dot segments");
        assert_eq!(normalize("a\\b\\c"), Ok("a/b/c".to_string()), "backslash separators");
        assert_eq!(normalize("a/b/../c"), Ok("a/c".to_string()), "textual dot-dot");
        assert_eq!(normalize("a/.."), Ok(String::new()));
        assert_eq!(
            normalize("../a"),
            Err(FsError::InvalidInput),
            "escaping the root",
        );
        assert_eq!(normalize("a/../../b"), Err(FsError::InvalidInput));
    }
}
