use anyhow::{Context, Result};
use chrono::Datelike;
use std::fs;
use std::path::{Path, PathBuf};

use crate::entry::JournalEntry;

const CATEGORIES: [&str; 3] = ["hardware", "software", "hacking"];

/// Turns a new or changed entry into output content
///
/// Implementations must be idempotent: transforming the same entry twice
/// leaves the output as if it had been transformed once.
pub trait EntryTransformer {
    /// Write the output for `entry` and return its location relative to the site root
    fn transform(&self, entry: &JournalEntry) -> Result<PathBuf>;
}

/// Writes each entry as `posts/YYYY/MM/<slug>.md` with YAML front matter
pub struct MarkdownPostWriter {
    site_root: PathBuf,
    posts_dir: PathBuf,
}

impl MarkdownPostWriter {
    pub fn new(site_root: &Path, posts_dir: &Path) -> Self {
        Self {
            site_root: site_root.to_path_buf(),
            posts_dir: posts_dir.to_path_buf(),
        }
    }

    /// Where `entry` is written, based on its creation month and title
    pub fn post_path(&self, entry: &JournalEntry) -> PathBuf {
        let created = entry.creation_date;
        self.posts_dir
            .join(created.year().to_string())
            .join(format!("{:02}", created.month()))
            .join(format!("{}.md", slugify(entry.title.as_deref().unwrap_or("untitled"))))
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.site_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

impl EntryTransformer for MarkdownPostWriter {
    fn transform(&self, entry: &JournalEntry) -> Result<PathBuf> {
        let path = self.post_path(entry);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create post directory: {}", parent.display()))?;
        }

        let content = format!("{}\n{}\n", front_matter(entry), entry.text.trim_end());
        fs::write(&path, content)
            .with_context(|| format!("Failed to write post: {}", path.display()))?;

        log::debug!("Wrote {}", path.display());
        Ok(self.relative(&path))
    }
}

fn front_matter(entry: &JournalEntry) -> String {
    let title = entry
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or("Untitled");

    let mut yaml = String::from("---\n");
    yaml.push_str(&format!("title: {}\n", quote(title)));
    yaml.push_str(&format!("publishDate: {}\n", quote(&entry.creation_date.to_rfc3339())));
    yaml.push_str(&format!("editDate: {}\n", quote(&entry.modified_date.to_rfc3339())));
    yaml.push_str(&format!("uuid: {}\n", quote(&entry.uuid)));
    yaml.push_str(&format!("tags: {}\n", quote_list(&entry.tags)));
    yaml.push_str(&format!("category: {}\n", category(&entry.tags)));
    let images: Vec<String> = entry
        .attachments
        .iter()
        .map(|a| format!("{}.png", a.identifier))
        .collect();
    yaml.push_str(&format!("images: {}\n", quote_list(&images)));
    yaml.push_str("---\n");
    yaml
}

// JSON string literals are valid double-quoted YAML scalars
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn quote_list(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
    format!("[{}]", quoted.join(", "))
}

/// First tag naming a known category, otherwise `general`
pub fn category(tags: &[String]) -> String {
    tags.iter()
        .map(|t| t.to_lowercase())
        .find(|t| CATEGORIES.contains(&t.as_str()))
        .unwrap_or_else(|| "general".to_string())
}

pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}
