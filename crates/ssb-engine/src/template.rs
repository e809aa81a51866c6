use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ssb_core::{AppInstance, EngineIdentity, TemplateFilter};

/// Token values for templated bundle files.
pub fn app_tokens(app: &AppInstance, identity: &EngineIdentity) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("APP_ID".to_string(), app.id.clone()),
        ("APP_NAME".to_string(), app.name.clone()),
        ("ENGINE_EXECUTABLE".to_string(), identity.executable.clone()),
    ])
}

/// Replaces `@TOKEN@` markers in a text file.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenFilter;

impl TokenFilter {
    pub fn render(template: &str, tokens: &BTreeMap<String, String>) -> String {
        tokens
            .iter()
            .fold(template.to_string(), |text, (token, value)| {
                text.replace(&format!("@{token}@"), value)
            })
    }
}

impl TemplateFilter for TokenFilter {
    fn filter(
        &self,
        source: &Path,
        destination: &Path,
        tokens: &BTreeMap<String, String>,
    ) -> Result<()> {
        let template = fs::read_to_string(source)
            .with_context(|| format!("failed to read template {}", source.display()))?;
        fs::write(destination, Self::render(&template, tokens))
            .with_context(|| format!("failed to write {}", destination.display()))
    }
}
