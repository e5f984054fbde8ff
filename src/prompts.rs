//! Prompt library for unattended generations.
//!
//! When an operation starts without a caller-supplied prompt, the manager
//! draws a random entry from this library. Entries may carry `{key}`
//! placeholders expanded from per-prompt word lists, falling back to the
//! library-wide `global_placeholders` table, so one template yields many
//! concrete prompts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ArtgateError, Result};

/// A concrete prompt drawn from the library, placeholders expanded.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptValue {
    pub prompt: String,
    pub negative: Option<String>,
}

/// One library entry as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptEntry {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub placeholders: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PromptFile {
    #[serde(default)]
    prompts: Vec<PromptEntry>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    global_placeholders: HashMap<String, Vec<String>>,
}

/// Thread-safe prompt catalogue, optionally backed by a TOML file.
#[derive(Debug)]
pub struct PromptLibrary {
    path: Option<PathBuf>,
    inner: Mutex<PromptFile>,
}

impl PromptLibrary {
    /// Load a library from a TOML file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|e| {
            ArtgateError::Configuration(format!(
                "failed to read prompt file {}: {e}",
                path.display()
            ))
        })?;
        let file: PromptFile = toml::from_str(&content).map_err(|e| {
            ArtgateError::Configuration(format!(
                "failed to parse prompt file {}: {e}",
                path.display()
            ))
        })?;
        info!(path = %path.display(), count = file.prompts.len(), "prompt library loaded");
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(file),
        })
    }

    /// Build an in-memory library (no persistence).
    pub fn in_memory(entries: Vec<PromptEntry>) -> Self {
        Self {
            path: None,
            inner: Mutex::new(PromptFile {
                prompts: entries,
                global_placeholders: HashMap::new(),
            }),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Draw a uniformly random entry and expand its placeholders.
    pub fn random_prompt(&self) -> Result<PromptValue> {
        let inner = self.lock();
        let entry = inner
            .prompts
            .choose(&mut rand::thread_rng())
            .ok_or(ArtgateError::NoPrompts)?;

        let mut prompt = expand(&entry.prompt, &entry.placeholders);
        prompt = expand(&prompt, &inner.global_placeholders);
        debug!(prompt = %prompt, "selected prompt");
        Ok(PromptValue {
            prompt,
            negative: entry.negative.clone(),
        })
    }

    /// Append an entry, persisting to the backing file when present.
    pub fn add(&self, prompt: String, negative: Option<String>) -> Result<()> {
        if prompt.trim().is_empty() {
            return Err(ArtgateError::InvalidInput("empty prompt".into()));
        }
        let mut inner = self.lock();
        inner.prompts.push(PromptEntry {
            prompt,
            negative: negative.filter(|n| !n.trim().is_empty()),
            placeholders: HashMap::new(),
        });
        if let Some(path) = &self.path {
            persist(path, &inner)?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PromptFile> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn persist(path: &Path, file: &PromptFile) -> Result<()> {
    let content = toml::to_string_pretty(file)
        .map_err(|e| ArtgateError::Configuration(format!("failed to serialize prompts: {e}")))?;
    fs::write(path, content)?;
    Ok(())
}

/// Replace every `{key}` whose key appears in `lists` with a random entry
/// from its list. Unknown keys are left intact for the next expansion
/// pass (or verbatim, if nothing defines them).
fn expand(template: &str, lists: &HashMap<String, Vec<String>>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match lists.get(key).filter(|v| !v.is_empty()) {
                    Some(values) => {
                        let idx = rand::thread_rng().gen_range(0..values.len());
                        out.push_str(&values[idx]);
                    }
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(prompt: &str) -> PromptEntry {
        PromptEntry {
            prompt: prompt.to_string(),
            negative: None,
            placeholders: HashMap::new(),
        }
    }

    #[test]
    fn empty_library_reports_no_prompts() {
        let lib = PromptLibrary::in_memory(vec![]);
        assert!(matches!(lib.random_prompt(), Err(ArtgateError::NoPrompts)));
    }

    #[test]
    fn single_entry_is_always_selected() {
        let lib = PromptLibrary::in_memory(vec![entry("a quiet forest")]);
        let value = lib.random_prompt().unwrap();
        assert_eq!(value.prompt, "a quiet forest");
        assert_eq!(value.negative, None);
    }

    #[test]
    fn placeholders_expand_from_entry_list() {
        let mut placeholders = HashMap::new();
        placeholders.insert("style".to_string(), vec!["watercolor".to_string()]);
        let lib = PromptLibrary::in_memory(vec![PromptEntry {
            prompt: "a {style} fox".to_string(),
            negative: Some("blurry".to_string()),
            placeholders,
        }]);
        let value = lib.random_prompt().unwrap();
        assert_eq!(value.prompt, "a watercolor fox");
        assert_eq!(value.negative.as_deref(), Some("blurry"));
    }

    #[test]
    fn unknown_placeholder_stays_verbatim() {
        let lib = PromptLibrary::in_memory(vec![entry("a {mystery} fox")]);
        assert_eq!(lib.random_prompt().unwrap().prompt, "a {mystery} fox");
    }

    #[test]
    fn global_placeholders_fill_remaining_keys() {
        let toml = r#"
            global_placeholders = { mood = ["serene"] }

            [[prompts]]
            prompt = "a {mood} lake at {time}"
            [prompts.placeholders]
            time = ["dawn", "dusk"]
        "#;
        let file: PromptFile = toml::from_str(toml).unwrap();
        let lib = PromptLibrary {
            path: None,
            inner: Mutex::new(file),
        };
        let value = lib.random_prompt().unwrap();
        assert!(value.prompt == "a serene lake at dawn" || value.prompt == "a serene lake at dusk");
    }

    #[test]
    fn add_rejects_blank_prompt() {
        let lib = PromptLibrary::in_memory(vec![]);
        assert!(matches!(
            lib.add("   ".into(), None),
            Err(ArtgateError::InvalidInput(_))
        ));
    }

    #[test]
    fn add_persists_to_backing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompts.toml");
        fs::write(&path, "prompts = []\n").unwrap();

        let lib = PromptLibrary::load(&path).unwrap();
        lib.add("city at night".into(), Some("daylight".into())).unwrap();
        assert_eq!(lib.len(), 1);

        let reloaded = PromptLibrary::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        let value = reloaded.random_prompt().unwrap();
        assert_eq!(value.prompt, "city at night");
        assert_eq!(value.negative.as_deref(), Some("daylight"));
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompts.toml");
        fs::write(&path, "prompts = 3").unwrap();
        assert!(matches!(
            PromptLibrary::load(&path),
            Err(ArtgateError::Configuration(_))
        ));
    }
}
