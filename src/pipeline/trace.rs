use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;

/// Debug artifacts for one run. A disabled writer accepts and drops everything.
pub struct TraceWriter {
    dir: PathBuf,
    enabled: bool,
}

impl TraceWriter {
    pub fn new(dir: PathBuf, enabled: bool) -> anyhow::Result<Self> {
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create trace dir: {}", dir.display()))?;
        }
        Ok(Self { dir, enabled })
    }

    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn write_named_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        self.write_named_bytes(name, text.as_bytes())
    }

    pub fn write_named_bytes(&self, name: &str, bytes: &[u8]) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.dir.join(sanitize_filename(name));
        std::fs::write(&path, bytes).with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(value).context("serialize trace json")?;
        self.write_named_text(name, &json)
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}
