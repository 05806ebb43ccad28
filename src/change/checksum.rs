use sha2::{Digest, Sha256};

/// Canonical form hashed for drift detection.
///
/// Line endings become `\n`, trailing whitespace is dropped from every line and trailing blank
/// lines are dropped. Leading whitespace and case are kept.
pub fn normalize(content: &str) -> String {
    let unified = content.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = unified.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

pub fn checksum(content: &str) -> String {
    let digest = Sha256::digest(normalize(content).as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_endings_and_trailing_space_do_not_matter() {
        let unix = "CREATE TABLE T (\n  ID int\n)\n";
        let windows = "CREATE TABLE T (  \r\n  ID int\t\r\n)\r\n\r\n\r\n";
        assert_eq!(checksum(unix), checksum(windows));
    }

    #[test]
    fn leading_whitespace_and_case_matter() {
        assert_ne!(checksum("SELECT 1"), checksum("  SELECT 1"));
        assert_ne!(checksum("select 1"), checksum("SELECT 1"));
    }

    #[test]
    fn checksum_is_lower_hex_sha256() {
        let value = checksum("");
        assert_eq!(
            value,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn lone_carriage_returns_are_line_breaks() {
        assert_eq!(normalize("a\rb\r"), "a\nb");
    }
}
