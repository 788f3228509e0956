use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::fill::markup::MarkupSettings;
use crate::placeholder::ScanSettings;

pub const CONFIG_FILE_NAME: &str = "docfill.toml";
pub const CONFIG_ENV_VAR: &str = "DOCFILL_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub markup: MarkupSection,
    /// Default raw answers keyed by placeholder key.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

/// Detection windows, all in chars. Unset fields keep the built-in defaults.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct ScanSection {
    #[serde(default)]
    pub signature_window: Option<usize>,
    #[serde(default)]
    pub signature_block_after: Option<usize>,
    #[serde(default)]
    pub currency_keyword_window: Option<usize>,
    #[serde(default)]
    pub marker_range: Option<usize>,
    #[serde(default)]
    pub after_marker_range: Option<usize>,
    #[serde(default)]
    pub last_marker_before: Option<usize>,
    #[serde(default)]
    pub last_marker_after: Option<usize>,
}

impl ScanSection {
    pub fn to_settings(&self) -> ScanSettings {
        let mut s = ScanSettings::default();
        let ctx = &mut s.context;
        override_with(&mut s.signature_window, self.signature_window);
        override_with(&mut s.signature_block_after, self.signature_block_after);
        override_with(&mut s.currency_keyword_window, self.currency_keyword_window);
        override_with(&mut ctx.marker_range, self.marker_range);
        override_with(&mut ctx.after_marker_range, self.after_marker_range);
        override_with(&mut ctx.last_marker_before, self.last_marker_before);
        override_with(&mut ctx.last_marker_after, self.last_marker_after);
        s
    }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct MarkupSection {
    #[serde(default)]
    pub text_elements: Option<Vec<String>>,
    #[serde(default)]
    pub paragraph_element: Option<String>,
    #[serde(default)]
    pub boundary_elements: Option<Vec<String>>,
    #[serde(default)]
    pub strip_trailing_empty_paragraphs: Option<bool>,
}

impl MarkupSection {
    /// `scan` supplies the party windows so text and markup agree.
    pub fn to_settings(&self, scan: &ScanSettings) -> MarkupSettings {
        let mut s = MarkupSettings {
            context: scan.context,
            signature_window: scan.signature_window,
            ..MarkupSettings::default()
        };
        if let Some(v) = self.text_elements.as_ref().filter(|v| !v.is_empty()) {
            s.dialect.text_elements = v.clone();
        }
        if let Some(v) = self.paragraph_element.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            s.dialect.paragraph_element = v.to_string();
        }
        if let Some(v) = self.boundary_elements.as_ref() {
            s.dialect.boundary_elements = v.clone();
        }
        override_with(&mut s.strip_trailing_empty_paragraphs, self.strip_trailing_empty_paragraphs);
        s
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

/// `--config`, then `$DOCFILL_CONFIG`, then an upward search.
pub fn resolve_config_path(explicit: Option<&Path>, workdir: &Path) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Some(p) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(p));
    }
    find_default_config(workdir, CONFIG_FILE_NAME)
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

/// Raw answers from a `.json` file, or TOML for any other extension.
/// Numbers and booleans are taken as written.
pub fn load_values_file(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read values: {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let mut out = BTreeMap::new();
    if is_json {
        let map: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&text).context("parse values json")?;
        for (key, value) in map {
            let raw = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => return Err(anyhow!("value for {key:?} is not a scalar: {other}")),
            };
            out.insert(key, raw);
        }
    } else {
        let map: BTreeMap<String, toml::Value> = toml::from_str(&text).context("parse values toml")?;
        for (key, value) in map {
            let raw = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(n) => n.to_string(),
                toml::Value::Float(n) => n.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                other => return Err(anyhow!("value for {key:?} is not a scalar: {other}")),
            };
            out.insert(key, raw);
        }
    }
    Ok(out)
}

const DEFAULT_CONFIG_TOML: &str = r#"# docfill configuration

[scan]
# chars searched before [name] / [title] for "company" or "investor"
# signature_window = 1000
# chars after [COMPANY] searched for "By:" or a label line
# signature_block_after = 500
# chars on each side of $[___] searched for amount keywords
# currency_keyword_window = 100
# party markers farther than this from a label are ignored
# marker_range = 3000
# a marker after a label counts only this close
# after_marker_range = 500
# one-party documents: labels this far before / after the last marker
# last_marker_before = 500
# last_marker_after = 3000

[markup]
# text_elements = ["w:t", "a:t"]
# paragraph_element = "w:p"
# boundary_elements = ["w:sectPr"]
# strip_trailing_empty_paragraphs = true

[values]
# "Company Name" = "Acme, Inc."
# "Purchase Amount" = "100k"
"#;

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        return Err(anyhow!(
            "config already exists: {} (use --force to overwrite)",
            cfg_path.display()
        ));
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}
