//! File-backed output sink
//!
//! Layout under the output root:
//!
//! ```text
//! result_json/<category>.json             full harvests
//! result_price_json/<category>.json       price-only harvests
//! result_non_price_json/<category>.json   descriptive harvests
//! result_image/<category>/<file>          product images
//! ```

use crate::categories::Category;
use crate::crawler::ItemRecord;
use crate::output::traits::{Artifact, OutputError, OutputResult, OutputSink};
use crate::state::JobKind;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Directory holding downloaded images
pub const IMAGE_DIR: &str = "result_image";

/// Writes artifacts as indented UTF-8 JSON files under one root directory
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the artifacts of `kind`
    pub fn kind_dir(&self, kind: JobKind) -> PathBuf {
        self.root.join(kind.output_dir())
    }

    pub fn artifact_path(&self, kind: JobKind, category: &Category) -> PathBuf {
        self.kind_dir(kind)
            .join(format!("{}.json", file_stem(&category.name)))
    }

    fn image_path(&self, category: &Category, file_name: &str) -> PathBuf {
        self.root
            .join(IMAGE_DIR)
            .join(file_stem(&category.name))
            .join(file_stem(file_name))
    }
}

impl OutputSink for FileSink {
    fn write_items(
        &self,
        kind: JobKind,
        category: &Category,
        items: &[ItemRecord],
    ) -> OutputResult<Artifact> {
        let path = self.artifact_path(kind, category);

        let mut body = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut body, formatter);
        items.serialize(&mut serializer)?;

        write_atomically(&path, &body)?;
        tracing::debug!(
            job = %kind,
            category = %category.name,
            "Wrote {} items to {}",
            items.len(),
            path.display()
        );

        Ok(Artifact {
            kind,
            category: category.name.clone(),
            path,
            item_count: items.len(),
        })
    }

    fn save_image(
        &self,
        category: &Category,
        file_name: &str,
        bytes: &[u8],
    ) -> OutputResult<PathBuf> {
        let path = self.image_path(category, file_name);
        write_atomically(&path, bytes)?;
        Ok(path)
    }

    fn image_size(&self, category: &Category, file_name: &str) -> Option<u64> {
        fs::metadata(self.image_path(category, file_name))
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }
}

/// Writes to a sibling temp file, syncs it, then renames over `path`
fn write_atomically(path: &Path, bytes: &[u8]) -> OutputResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| OutputError::Write(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| OutputError::Write(format!("invalid file name: {}", path.display())))?;
    let tmp = parent.join(format!(".{}.tmp", file_name));

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Keeps a name usable as a single path component
fn file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn record(id: &str) -> ItemRecord {
        match json!({ "id": id, "product_name": "사과" }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_write_items_layout_and_content() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path());
        let category = Category::new("Fruits", "6000213114");

        let artifact = sink
            .write_items(JobKind::Price, &category, &[record("1"), record("2")])
            .unwrap();

        assert_eq!(
            artifact.path,
            dir.path().join("result_price_json").join("Fruits.json")
        );
        assert_eq!(artifact.item_count, 2);

        let text = fs::read_to_string(&artifact.path).unwrap();
        assert!(text.contains("사과"), "non-ASCII text is written verbatim");
        assert!(text.contains("\n        \"id\": \"1\""), "four-space indent");
        let parsed: Vec<Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_rewrite_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path());
        let category = Category::new("Fruits", "1");

        sink.write_items(JobKind::Full, &category, &[record("1"), record("2"), record("3")])
            .unwrap();
        let artifact = sink.write_items(JobKind::Full, &category, &[record("9")]).unwrap();

        let parsed: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(&artifact.path).unwrap()).unwrap();
        assert_eq!(parsed, vec![json!({ "id": "9", "product_name": "사과" })]);

        // No temp files left behind
        let leftovers: Vec<_> = fs::read_dir(sink.kind_dir(JobKind::Full))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_images_round_trip_size() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path());
        let category = Category::new("Meat/Eggs", "1");

        assert_eq!(sink.image_size(&category, "a.jpg"), None);
        let path = sink.save_image(&category, "a.jpg", b"12345").unwrap();
        assert!(path.starts_with(dir.path().join(IMAGE_DIR).join("Meat_Eggs")));
        assert_eq!(sink.image_size(&category, "a.jpg"), Some(5));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Rice_Grains_Nuts"), "Rice_Grains_Nuts");
        assert_eq!(file_stem("a/b\\c"), "a_b_c");
        assert_eq!(file_stem(".."), "_");
        assert_eq!(file_stem("  "), "_");
    }
}
