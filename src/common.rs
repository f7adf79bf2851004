use std::path::{Path, PathBuf};

/// Sibling path used for write-then-rename.
pub fn tmp_path(dest: &Path) -> PathBuf {
    let fname = dest
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    dest.with_file_name(format!("{fname}.tmp"))
}

pub fn truncate_for_log(text: &str) -> String {
    let trimmed = text.trim();
    let max_len = 300usize;
    if trimmed.len() <= max_len {
        return trimmed.to_string();
    }
    let mut end = max_len;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

/// Expands a leading `~` to `$HOME`.
pub fn expand_home(raw: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (raw.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmp_path() {
        assert_eq!(
            tmp_path(Path::new("data/rules.csv")),
            PathBuf::from("data/rules.csv.tmp")
        );
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("  short  "), "short");
        let long = "é".repeat(400);
        let out = truncate_for_log(&long);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 303);
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/puf.zip"), PathBuf::from("/tmp/puf.zip"));
        assert_eq!(expand_home("data/x.csv"), PathBuf::from("data/x.csv"));
        assert_eq!(expand_home("~other/x"), PathBuf::from("~other/x"));
    }

    #[test]
    fn test_expand_home_prefix() {
        if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
            assert_eq!(expand_home("~/puf.zip"), home.join("puf.zip"));
            assert_eq!(expand_home("~"), home);
        }
    }
}
