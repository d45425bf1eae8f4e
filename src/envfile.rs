//! Line-oriented `KEY=VALUE` configuration store.
//!
//! The store is the project's `.env` file: read once at startup and upserted
//! in place when provisioning derives a new secret. Updates preserve every
//! unrelated line and its position verbatim.
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct EnvFile {
    path: PathBuf,
    content: String,
}

impl EnvFile {
    /// Load the store, treating a missing file as empty.
    pub fn load(path: &Path) -> Result<Self> {
        let content = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("read env file {}", path.display()))?
        } else {
            String::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            content,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value for `key` with surrounding quotes stripped, if present.
    pub fn get(&self, key: &str) -> Option<String> {
        for line in self.content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            if name.trim() == key {
                return Some(unquote(value.trim()).to_string());
            }
        }
        None
    }

    /// Replace the `key` line in place, or append one when absent, and write
    /// the store back out. All other lines are kept byte-for-byte.
    pub fn upsert(&mut self, key: &str, value: &str) -> Result<()> {
        let prefix = format!("{key}=");
        // match with the same leniency as `get`, so a readable key is never
        // duplicated by an append
        let matches = |line: &str| line.trim_start().starts_with(&prefix);
        if self.content.lines().any(matches) {
            let had_trailing_newline = self.content.ends_with('\n');
            let updated: Vec<String> = self
                .content
                .lines()
                .map(|line| {
                    if matches(line) {
                        format!("{key}=\"{value}\"")
                    } else {
                        line.to_string()
                    }
                })
                .collect();
            self.content = updated.join("\n");
            if had_trailing_newline {
                self.content.push('\n');
            }
        } else {
            if !self.content.is_empty() && !self.content.ends_with('\n') {
                self.content.push('\n');
            }
            self.content.push_str(&format!("{key}=\"{value}\"\n"));
        }
        self.save()
    }

    fn save(&self) -> Result<()> {
        fs::write(&self.path, self.content.as_bytes())
            .with_context(|| format!("write env file {}", self.path.display()))?;
        Ok(())
    }
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn load_with(content: &str) -> (tempfile::TempDir, EnvFile) {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join(".env");
        fs::write(&path, content).expect("seed env file");
        let env_file = EnvFile::load(&path).expect("load env file");
        (dir, env_file)
    }

    #[test]
    fn get_strips_quotes_and_skips_comments() {
        let (_dir, env_file) = load_with("# comment\nAZURE_TENANT=\"abc\"\nPLAIN=def\n");
        assert_eq!(env_file.get("AZURE_TENANT").as_deref(), Some("abc"));
        assert_eq!(env_file.get("PLAIN").as_deref(), Some("def"));
        assert_eq!(env_file.get("MISSING"), None);
    }

    #[test]
    fn upsert_replaces_only_the_matching_line() {
        let (_dir, mut env_file) = load_with(
            "AZURE_TENANT=\"abc\"\nAZURE_SAS_TOKEN=\"old\"\nSNOWFLAKE_USER=alice\n",
        );
        env_file.upsert("AZURE_SAS_TOKEN", "new").expect("upsert");

        let written = fs::read_to_string(env_file.path()).expect("read back");
        assert_eq!(
            written,
            "AZURE_TENANT=\"abc\"\nAZURE_SAS_TOKEN=\"new\"\nSNOWFLAKE_USER=alice\n"
        );
    }

    #[test]
    fn upsert_matches_keys_with_leading_whitespace() {
        let (_dir, mut env_file) = load_with("  AZURE_SAS_TOKEN=\"old\"\nPLAIN=def\n");
        env_file.upsert("AZURE_SAS_TOKEN", "new").expect("upsert");

        let written = fs::read_to_string(env_file.path()).expect("read back");
        assert_eq!(written, "AZURE_SAS_TOKEN=\"new\"\nPLAIN=def\n");
        assert_eq!(env_file.get("AZURE_SAS_TOKEN").as_deref(), Some("new"));
    }

    #[test]
    fn upsert_appends_when_key_is_absent() {
        let (_dir, mut env_file) = load_with("AZURE_TENANT=\"abc\"");
        env_file.upsert("AZURE_SAS_TOKEN", "tok").expect("upsert");

        let written = fs::read_to_string(env_file.path()).expect("read back");
        assert_eq!(written, "AZURE_TENANT=\"abc\"\nAZURE_SAS_TOKEN=\"tok\"\n");
    }

    #[test]
    fn upsert_creates_a_missing_file() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join(".env");
        let mut env_file = EnvFile::load(&path).expect("load missing file");
        env_file.upsert("AZURE_SAS_TOKEN", "tok").expect("upsert");

        let written = fs::read_to_string(&path).expect("read back");
        assert_eq!(written, "AZURE_SAS_TOKEN=\"tok\"\n");
    }
}
