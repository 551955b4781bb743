//! Rule plugins
//!
//! A plugin can only do one thing: look at a raw line and optionally name
//! its severity. Plugins are plain TOML rule files found by scanning a
//! directory; nothing is executed.
//!
//! ```toml
//! [[rule]]
//! pattern = "Failed password"
//! severity = "warning"
//!
//! [[rule]]
//! pattern = "segfault at [0-9a-f]+"
//! severity = "crit"
//! case_insensitive = false
//! ```

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use journalscope_types::Severity;

/// Extension point consulted before the keyword heuristic
pub trait SeverityOverride: Send + Sync {
    /// Name shown in logs and diagnostics
    fn name(&self) -> &str;

    /// Severity for this line, or `None` to defer
    fn classify(&self, raw: &str) -> Option<Severity>;
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid rule file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid pattern '{pattern}' in {path}: {source}")]
    Pattern {
        path: PathBuf,
        pattern: String,
        source: regex::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleSpec>,
}

#[derive(Debug, Deserialize)]
struct RuleSpec {
    pattern: String,
    #[serde(deserialize_with = "deserialize_severity")]
    severity: Severity,
    #[serde(default = "default_true")]
    case_insensitive: bool,
}

fn default_true() -> bool {
    true
}

/// Accept either a level name or a 0-7 number
fn deserialize_severity<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u8),
        Name(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Severity::try_from(n).map_err(serde::de::Error::custom),
        Raw::Name(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Ordered regex rules loaded from one file
#[derive(Debug)]
pub struct RulePlugin {
    name: String,
    rules: Vec<(Regex, Severity)>,
}

impl RulePlugin {
    /// Parse a rule file's contents
    pub fn from_toml(name: &str, contents: &str, path: &Path) -> Result<Self, PluginError> {
        let file: RuleFile = toml::from_str(contents).map_err(|source| PluginError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let rules = file
            .rules
            .into_iter()
            .map(|spec| {
                RegexBuilder::new(&spec.pattern)
                    .case_insensitive(spec.case_insensitive)
                    .build()
                    .map(|re| (re, spec.severity))
                    .map_err(|source| PluginError::Pattern {
                        path: path.to_path_buf(),
                        pattern: spec.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            rules,
        })
    }

    /// Load one rule file from disk
    pub fn from_file(path: &Path) -> Result<Self, PluginError> {
        let contents = fs::read_to_string(path).map_err(|source| PluginError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_toml(&name, &contents, path)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl SeverityOverride for RulePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, raw: &str) -> Option<Severity> {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(raw))
            .map(|(_, severity)| *severity)
    }
}

/// Load every `*.toml` rule file in `dir`, sorted by file name
///
/// Files whose names start with `_` are skipped. A missing directory yields
/// no plugins. Files that fail to load are logged and skipped.
pub fn load_rule_plugins(dir: &Path) -> Vec<RulePlugin> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = %dir.display(), error = %e, "cannot read plugin directory");
            }
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_rule_file(path))
        .collect();
    paths.sort();

    let mut plugins = Vec::new();
    for path in paths {
        match RulePlugin::from_file(&path) {
            Ok(plugin) => {
                tracing::debug!(plugin = plugin.name(), rules = plugin.len(), "loaded rule plugin");
                plugins.push(plugin);
            }
            Err(e) => {
                tracing::warn!("skipping plugin: {}", e);
            }
        }
    }
    plugins
}

fn is_rule_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    path.is_file() && name.ends_with(".toml") && !name.starts_with('_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_in_order() {
        let plugin = RulePlugin::from_toml(
            "ssh",
            r#"
                [[rule]]
                pattern = "failed password"
                severity = "warning"

                [[rule]]
                pattern = "password"
                severity = 7
            "#,
            Path::new("ssh.toml"),
        )
        .unwrap();

        assert_eq!(plugin.len(), 2);
        assert_eq!(plugin.classify("sshd: Failed password for root"), Some(Severity::Warning));
        assert_eq!(plugin.classify("password changed"), Some(Severity::Debug));
        assert_eq!(plugin.classify("unrelated"), None);
    }

    #[test]
    fn test_case_sensitive_rule() {
        let plugin = RulePlugin::from_toml(
            "kernel",
            r#"
                [[rule]]
                pattern = "OOM"
                severity = "crit"
                case_insensitive = false
            "#,
            Path::new("kernel.toml"),
        )
        .unwrap();

        assert_eq!(plugin.classify("OOM killer"), Some(Severity::Crit));
        assert_eq!(plugin.classify("room"), None);
    }

    #[test]
    fn test_invalid_pattern() {
        let result = RulePlugin::from_toml(
            "bad",
            "[[rule]]\npattern = \"(\"\nseverity = \"err\"\n",
            Path::new("bad.toml"),
        );
        assert!(matches!(result, Err(PluginError::Pattern { .. })));
    }

    #[test]
    fn test_invalid_severity() {
        let result = RulePlugin::from_toml(
            "bad",
            "[[rule]]\npattern = \"x\"\nseverity = 12\n",
            Path::new("bad.toml"),
        );
        assert!(matches!(result, Err(PluginError::Parse { .. })));
    }

    #[test]
    fn test_directory_scan() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("b.toml"),
            "[[rule]]\npattern = \"b\"\nseverity = \"notice\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.toml"),
            "[[rule]]\npattern = \"a\"\nseverity = \"alert\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("_disabled.toml"),
            "[[rule]]\npattern = \"x\"\nseverity = \"emerg\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("broken.toml"), "not toml [[").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let plugins = load_rule_plugins(dir.path());
        let names: Vec<&str> = plugins.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_rule_plugins(&dir.path().join("nope")).is_empty());
    }
}
