//! Front-matter document model and in-place mutation.
//!
//! A document is a `---`-delimited YAML header (an ordered mapping of simple
//! scalars) followed by a Markdown body.  Loading normalizes the `tags` field
//! through [`TagValue`]; saving re-serializes the header with the tag
//! formatting policy the external note editor expects: five or fewer tags are
//! written inline (`tags: [a, b]`), more than five as a block list.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::{Result, VaultError};

/// Shapes the `tags` front-matter field shows up in across real vaults.
/// Normalized once at the boundary so the pipeline only ever sees a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Absent,
    Single(String),
    Many(Vec<String>),
    /// A non-string scalar (number, bool); carried as its string rendering.
    Other(String),
}

impl TagValue {
    pub fn from_yaml(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Absent,
            Some(Value::String(s)) => Self::Single(s.clone()),
            Some(Value::Sequence(items)) => Self::Many(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => render_scalar(other),
                    })
                    .collect(),
            ),
            Some(other) => Self::Other(render_scalar(other)),
        }
    }

    /// Canonical list form used by all tag logic.
    pub fn into_list(self) -> Vec<String> {
        match self {
            Self::Absent => Vec::new(),
            Self::Single(tag) => vec![tag],
            Self::Many(tags) => tags,
            Self::Other(tag) => vec![tag],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    metadata: Mapping,
    body: String,
}

impl Document {
    /// Read and parse a document.  Invalid UTF-8 or a malformed front-matter
    /// block is a [`VaultError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path)?;
        let raw = String::from_utf8(bytes).map_err(|err| VaultError::Parse {
            path: path.clone(),
            message: format!("not valid UTF-8: {err}"),
        })?;

        let (metadata, body) = split_front_matter(&path, &raw)?;
        Ok(Self {
            path,
            metadata,
            body,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bare filename, used as the index source key.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Filename without the `.md` extension; used as the note title in
    /// prompts.
    pub fn title(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn metadata(&self) -> &Mapping {
        &self.metadata
    }

    /// Current tags, normalized to a list.
    pub fn tags(&self) -> Vec<String> {
        TagValue::from_yaml(self.metadata.get("tags")).into_list()
    }

    /// Merge `new_tags` into the document's tag set.  Returns `true` only
    /// when the sorted result differs from the sorted original, so a second
    /// call with the same input is a no-op.
    pub fn update_tags(&mut self, new_tags: &[String]) -> bool {
        let current = self.tags();

        let mut merged: BTreeSet<String> = current.iter().cloned().collect();
        merged.extend(new_tags.iter().cloned());
        let final_tags: Vec<String> = merged.into_iter().collect();

        let mut sorted_current = current;
        sorted_current.sort();
        if final_tags == sorted_current {
            return false;
        }

        let value = Value::Sequence(final_tags.into_iter().map(Value::String).collect());
        self.metadata
            .insert(Value::String("tags".to_string()), value);
        true
    }

    /// Append a generated section to the end of the body, separated from the
    /// existing content by exactly one blank line.  Empty input is a no-op.
    pub fn append_section(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        if !self.body.ends_with('\n') {
            self.body.push('\n');
        }
        if !self.body.ends_with("\n\n") {
            self.body.push('\n');
        }
        self.body.push_str(text);
        self.body.push('\n');
    }

    /// Serialize header + body back to the document's path.
    pub fn save(&self) -> Result<()> {
        fs::write(&self.path, self.render())?;
        Ok(())
    }

    /// Render the full document text.
    ///
    /// Non-tag metadata keys keep their original mapping order as plain
    /// `key: value` lines; `tags` is always emitted last, inline for five or
    /// fewer entries, as a block list otherwise.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = vec!["---".to_string()];

        for (key, value) in &self.metadata {
            let key = render_scalar(key);
            if key == "tags" {
                continue;
            }
            lines.push(format!("{key}: {}", render_scalar(value)));
        }

        let tags = self.tags();
        if !tags.is_empty() {
            if tags.len() <= 5 {
                lines.push(format!("tags: [{}]", tags.join(", ")));
            } else {
                lines.push("tags:".to_string());
                for tag in &tags {
                    lines.push(format!("  - {tag}"));
                }
            }
        }

        lines.push("---".to_string());

        let mut out = lines.join("\n");
        out.push('\n');
        out.push_str(&self.body);
        out
    }
}

/// Render a YAML value onto a single header line.  Scalars print bare;
/// nested sequences/mappings fall back to JSON flow form, which is valid
/// YAML.  Nested shapes are a documented limitation, not a supported format.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "null".to_string()),
    }
}

fn split_front_matter(path: &Path, raw: &str) -> Result<(Mapping, String)> {
    let Some(rest) = raw.strip_prefix("---\n").or_else(|| raw.strip_prefix("---\r\n")) else {
        return Ok((Mapping::new(), raw.to_string()));
    };

    // Empty header: the closing fence immediately follows the opening one.
    if let Some(after) = rest.strip_prefix("---") {
        if after.is_empty() || after.starts_with('\n') || after.starts_with("\r\n") {
            let body = after.trim_start_matches(['\r', '\n']);
            return Ok((Mapping::new(), body.to_string()));
        }
    }

    let closing = rest
        .match_indices("\n---")
        .find(|(idx, _)| is_closing_delimiter(&rest[*idx..]));
    let (header, body) = match closing {
        Some((idx, _)) => {
            let header = &rest[..idx];
            let after = &rest[idx + "\n---".len()..];
            // The blank separator line between header and body (when present)
            // is not part of the body.
            let body = after.trim_start_matches(['\r', '\n']);
            (header, body.to_string())
        }
        None => {
            return Err(VaultError::Parse {
                path: path.to_path_buf(),
                message: "front-matter block is never closed".to_string(),
            });
        }
    };

    if header.trim().is_empty() {
        return Ok((Mapping::new(), body));
    }

    let metadata: Mapping =
        serde_yaml::from_str(header).map_err(|err| VaultError::Parse {
            path: path.to_path_buf(),
            message: format!("invalid front matter: {err}"),
        })?;

    Ok((metadata, body))
}

/// `\n---` only closes the header when followed by a newline or end of file.
fn is_closing_delimiter(tail: &str) -> bool {
    let after = &tail["\n---".len()..];
    after.is_empty() || after.starts_with('\n') || after.starts_with("\r\n")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_doc(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_splits_front_matter_and_body() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(
            &dir,
            "note.md",
            "---\ntitle: My Note\ntags: [rust]\n---\n\nhello world\n",
        );

        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.tags(), vec!["rust"]);
        assert_eq!(doc.body(), "hello world\n");
        assert_eq!(doc.title(), "note");
        assert_eq!(doc.file_name(), "note.md");
    }

    #[test]
    fn load_without_front_matter_gives_empty_metadata() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "plain.md", "just a body\n");

        let doc = Document::load(&path).unwrap();
        assert!(doc.metadata().is_empty());
        assert_eq!(doc.body(), "just a body\n");
        assert!(doc.tags().is_empty());
    }

    #[test]
    fn load_rejects_unclosed_front_matter() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "broken.md", "---\ntitle: oops\nno closing fence\n");

        match Document::load(&path) {
            Err(VaultError::Parse { .. }) => {}
            other => panic!("expected parse failure, got {other:?}"),
        }
    }

    #[test]
    fn load_rejects_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.md");
        fs::write(&path, [0x2d, 0x2d, 0x2d, 0x0a, 0xff, 0xfe]).unwrap();

        assert!(matches!(
            Document::load(&path),
            Err(VaultError::Parse { .. })
        ));
    }

    // ── TagValue normalization ─────────────────────────────────────────────

    #[test]
    fn tags_as_single_string_become_singleton() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "n.md", "---\ntags: solo\n---\nbody\n");
        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.tags(), vec!["solo"]);
    }

    #[test]
    fn tags_as_number_become_stringified_singleton() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "n.md", "---\ntags: 2024\n---\nbody\n");
        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.tags(), vec!["2024"]);
    }

    #[test]
    fn absent_tags_are_empty() {
        assert_eq!(TagValue::from_yaml(None).into_list(), Vec::<String>::new());
        assert_eq!(
            TagValue::from_yaml(Some(&Value::Null)).into_list(),
            Vec::<String>::new()
        );
    }

    // ── update_tags ────────────────────────────────────────────────────────

    #[test]
    fn update_tags_merges_and_sorts() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "n.md", "---\ntags: [zebra, apple]\n---\nbody\n");
        let mut doc = Document::load(&path).unwrap();

        assert!(doc.update_tags(&["mango".to_string()]));
        assert_eq!(doc.tags(), vec!["apple", "mango", "zebra"]);
    }

    #[test]
    fn update_tags_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "n.md", "---\ntags: [a]\n---\nbody\n");
        let mut doc = Document::load(&path).unwrap();

        let new = vec!["b".to_string()];
        assert!(doc.update_tags(&new));
        assert!(!doc.update_tags(&new), "second identical call must be a no-op");
    }

    #[test]
    fn update_tags_with_subset_reports_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "n.md", "---\ntags: [a, b]\n---\nbody\n");
        let mut doc = Document::load(&path).unwrap();

        assert!(!doc.update_tags(&["a".to_string()]));
    }

    // ── append_section ─────────────────────────────────────────────────────

    #[test]
    fn append_section_inserts_single_blank_line() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "n.md", "---\n---\nbody line");
        let mut doc = Document::load(&path).unwrap();

        doc.append_section("> [!note] insight");
        assert_eq!(doc.body(), "body line\n\n> [!note] insight\n");
    }

    #[test]
    fn append_section_keeps_existing_blank_line() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "n.md", "---\n---\nbody\n\n");
        let mut doc = Document::load(&path).unwrap();

        doc.append_section("extra");
        assert_eq!(doc.body(), "body\n\nextra\n");
    }

    #[test]
    fn append_section_empty_input_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "n.md", "---\n---\nbody\n");
        let mut doc = Document::load(&path).unwrap();

        doc.append_section("");
        assert_eq!(doc.body(), "body\n");
    }

    // ── render / save ──────────────────────────────────────────────────────

    #[test]
    fn render_inlines_five_or_fewer_tags() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(
            &dir,
            "n.md",
            "---\ntitle: T\ntags: [c, a, b]\n---\nbody\n",
        );
        let doc = Document::load(&path).unwrap();

        // Stored order is preserved; only update_tags sorts.
        let rendered = doc.render();
        assert!(rendered.contains("tags: [c, a, b]"), "got: {rendered}");
        assert!(rendered.starts_with("---\ntitle: T\n"));
    }

    #[test]
    fn render_blocks_more_than_five_tags() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(
            &dir,
            "n.md",
            "---\ntags: [a, b, c, d, e, f]\n---\nbody\n",
        );
        let doc = Document::load(&path).unwrap();

        let rendered = doc.render();
        assert!(rendered.contains("tags:\n  - a\n  - b\n"), "got: {rendered}");
        assert!(!rendered.contains("tags: ["));
    }

    #[test]
    fn render_preserves_non_tag_key_order() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(
            &dir,
            "n.md",
            "---\nzeta: 1\nalpha: two\ncreated: 2026-01-05\n---\nbody\n",
        );
        let doc = Document::load(&path).unwrap();

        let rendered = doc.render();
        let zeta = rendered.find("zeta: 1").unwrap();
        let alpha = rendered.find("alpha: two").unwrap();
        let created = rendered.find("created: 2026-01-05").unwrap();
        assert!(zeta < alpha && alpha < created);
    }

    #[test]
    fn save_then_reload_roundtrips_tags_and_body() {
        let dir = TempDir::new().unwrap();
        let path = write_doc(&dir, "n.md", "---\ntitle: T\ntags: [x]\n---\nhello\n");
        let mut doc = Document::load(&path).unwrap();

        doc.update_tags(&["y".to_string()]);
        doc.append_section("appended");
        doc.save().unwrap();

        let reloaded = Document::load(&path).unwrap();
        assert_eq!(reloaded.tags(), vec!["x", "y"]);
        assert_eq!(reloaded.body(), "hello\n\nappended\n");
        assert_eq!(
            reloaded.metadata().get("title"),
            Some(&Value::String("T".into()))
        );
    }
}
