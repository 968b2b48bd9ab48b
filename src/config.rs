/*!
Board configuration file.

A plain `[section]` / `key=value` format:

```text
# comment
[global]
cpu_clock = 12000000
imagedir  = /var/lib/softgun
[uart0]
backend = stdio
```

Whitespace around keys and values is ignored, `#` and `;` start comments,
and a later duplicate key overrides an earlier one. Parse failures are
configuration errors carrying the file name and line number.
*/

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::registry::Registry;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can not read config file \"{path}\": {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("{file}:{line}: {reason}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },
    #[error("{file}: [{section}] {key}: not a number: \"{value}\"")]
    BadNumber {
        file: String,
        section: String,
        key: String,
        value: String,
    },
}

#[derive(Debug)]
pub struct Config {
    file: String,
    entries: Registry<String>,
}

impl Config {
    /// Parse a configuration file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let name = path.as_ref().display().to_string();
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: name.clone(),
            source,
        })?;
        Self::parse(&text, &name)
    }

    /// Parse configuration text; `file` only labels diagnostics.
    pub fn parse(text: &str, file: &str) -> Result<Self, ConfigError> {
        let mut entries: Registry<String> = Registry::new();
        let mut section: Option<String> = None;
        for (nr, raw) in text.lines().enumerate() {
            let line = match raw.find(['#', ';']) {
                Some(pos) => &raw[..pos],
                None => raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix('[') {
                let Some(name) = rest.strip_suffix(']') else {
                    return Err(ConfigError::Parse {
                        file: file.to_string(),
                        line: nr + 1,
                        reason: "unterminated section header".to_string(),
                    });
                };
                section = Some(name.trim().to_string());
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Parse {
                    file: file.to_string(),
                    line: nr + 1,
                    reason: format!("expected key=value, got \"{line}\""),
                });
            };
            let Some(section) = &section else {
                return Err(ConfigError::Parse {
                    file: file.to_string(),
                    line: nr + 1,
                    reason: "key before any [section]".to_string(),
                });
            };
            let full = format!("{section}.{}", key.trim());
            let value = value.trim().to_string();
            // Later keys override earlier ones.
            if !entries.create(&full, value.clone()) {
                *entries.find_mut(&full).expect("entry exists") = value;
            }
        }
        Ok(Self {
            file: file.to_string(),
            entries,
        })
    }

    pub fn read_str(&self, section: &str, key: &str) -> Option<&str> {
        self.entries
            .find(&format!("{section}.{key}"))
            .map(String::as_str)
    }

    pub fn read_u32(&self, section: &str, key: &str) -> Result<Option<u32>, ConfigError> {
        self.read_number(section, key)
    }

    pub fn read_u64(&self, section: &str, key: &str) -> Result<Option<u64>, ConfigError> {
        self.read_number(section, key)
    }

    pub fn read_i32(&self, section: &str, key: &str) -> Result<Option<i32>, ConfigError> {
        self.read_number(section, key)
    }

    fn read_number<T: std::str::FromStr>(
        &self,
        section: &str,
        key: &str,
    ) -> Result<Option<T>, ConfigError> {
        let Some(value) = self.read_str(section, key) else {
            return Ok(None);
        };
        value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::BadNumber {
                file: self.file.clone(),
                section: section.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            })
    }
}
