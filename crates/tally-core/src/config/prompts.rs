use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use super::shellexpand;

/// Bundled prompt file, embedded at compile time.
const BUNDLED_PROMPTS: &str = include_str!("../../../../prompts/PROMPTS.md");

/// System instructions sent to the language models.
///
/// Loaded from `{data_dir}/prompts/PROMPTS.md`. Missing file or sections
/// fall back to the bundled defaults.
#[derive(Debug, Clone)]
pub struct Prompts {
    /// Text → intent classification rules.
    pub classifier: String,
    /// Image → intent extraction rules.
    pub vision: String,
}

impl Default for Prompts {
    fn default() -> Self {
        let sections = parse_markdown_sections(BUNDLED_PROMPTS);
        Self {
            classifier: sections.get("Classifier").cloned().unwrap_or_default(),
            vision: sections.get("Vision").cloned().unwrap_or_default(),
        }
    }
}

/// Deploy the bundled prompt file to `{data_dir}/prompts/`, creating the directory if needed.
///
/// Never overwrites an existing file so user edits are preserved.
pub fn install_bundled_prompts(data_dir: &str) {
    let expanded = shellexpand(data_dir);
    let dir = Path::new(&expanded).join("prompts");
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("prompts: failed to create {}: {e}", dir.display());
        return;
    }

    let dest = dir.join("PROMPTS.md");
    if !dest.exists() {
        if let Err(e) = std::fs::write(&dest, BUNDLED_PROMPTS) {
            warn!("prompts: failed to write {}: {e}", dest.display());
        } else {
            info!("prompts: deployed bundled PROMPTS.md");
        }
    }
}

impl Prompts {
    /// Load prompts from `{data_dir}/prompts/PROMPTS.md`.
    pub fn load(data_dir: &str) -> Self {
        let mut prompts = Self::default();
        let dir = shellexpand(data_dir);

        let prompt_path = format!("{dir}/prompts/PROMPTS.md");
        if let Ok(content) = std::fs::read_to_string(&prompt_path) {
            let sections = parse_markdown_sections(&content);
            if let Some(v) = sections.get("Classifier") {
                prompts.classifier = v.clone();
            }
            if let Some(v) = sections.get("Vision") {
                prompts.vision = v.clone();
            }
            info!("loaded prompts from {prompt_path}");
        }

        prompts
    }
}

/// Parse a markdown file with `## Section` headers into a map of section name → body.
fn parse_markdown_sections(content: &str) -> HashMap<String, String> {
    let mut sections = HashMap::new();
    let mut current_key: Option<String> = None;
    let mut current_body = String::new();

    for line in content.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            if let Some(key) = current_key.take() {
                let trimmed = current_body.trim().to_string();
                if !trimmed.is_empty() {
                    sections.insert(key, trimmed);
                }
            }
            current_key = Some(header.trim().to_string());
            current_body.clear();
        } else if current_key.is_some() {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }

    if let Some(key) = current_key {
        let trimmed = current_body.trim().to_string();
        if !trimmed.is_empty() {
            sections.insert(key, trimmed);
        }
    }

    sections
}
