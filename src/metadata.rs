//! In-memory metadata table and its flat-file form.
//!
//! The file is UTF-8 text, comma delimited, one header line
//! followed by one line per image:
//!
//! ```text
//! ImageName,EXIF.GPSLatitude,XMP.AbsoluteAltitude
//! DJI_0001_T.JPG,22.5,101.2
//! DJI_0002_T.JPG,22.6,
//! ```
//!
//! The first header column is always `ImageName`; the rest
//! are the sorted [vocabulary](MetadataStore::vocabulary)
//! of all records, so a tag seen on any image becomes a
//! column for every image (empty when absent).
//!
//! Plain values are written verbatim. Values containing a
//! delimiter, a quote or a line break are quoted with
//! doubled inner quotes, and the reader understands both
//! forms.
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::debug;

use crate::Error;

/// First header column of the metadata file.
pub const IMAGE_NAME_COLUMN: &str = "ImageName";

const DELIMITER: char = ',';
const QUOTE: char = '"';

/// Tags of one source image, keyed by `<group>.<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub image_name: String,
    pub tags: BTreeMap<String, String>,
}

impl MetadataRecord {
    pub fn new<S: Into<String>>(image_name: S) -> Self {
        MetadataRecord {
            image_name: image_name.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(|v| v.as_str())
    }

    /// Non-empty tags whose identifier is in the given
    /// group (case-insensitive), with the group prefix
    /// removed from the name.
    pub fn group_tags<'a>(&'a self, group: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.tags.iter().filter_map(move |(id, value)| {
            let (tag_group, name) = id.split_once('.')?;
            (tag_group.eq_ignore_ascii_case(group) && !value.is_empty())
                .then(|| (name, value.as_str()))
        })
    }
}

/// Metadata of one folder, keyed by source file name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MetadataStore {
    records: BTreeMap<String, MetadataRecord>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: MetadataRecord) {
        self.records.insert(record.image_name.clone(), record);
    }

    pub fn get(&self, image_name: &str) -> Option<&MetadataRecord> {
        self.records.get(image_name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &MetadataRecord> {
        self.records.values()
    }

    /// Union of tag identifiers over all records, sorted.
    pub fn vocabulary(&self) -> BTreeSet<&str> {
        self.records
            .values()
            .flat_map(|r| r.tags.keys().map(|k| k.as_str()))
            .collect()
    }

    /// Serialize as the flat table described in the
    /// [module docs](self).
    pub fn to_delimited(&self) -> String {
        let vocabulary = self.vocabulary();

        let mut out = String::new();
        let header = std::iter::once(IMAGE_NAME_COLUMN)
            .chain(vocabulary.iter().copied())
            .map(quote_field)
            .join(",");
        out.push_str(&header);
        out.push('\n');

        for record in self.records.values() {
            let row = std::iter::once(record.image_name.as_str())
                .chain(vocabulary.iter().map(|tag| record.get(tag).unwrap_or("")))
                .map(quote_field)
                .join(",");
            out.push_str(&row);
            out.push('\n');
        }
        out
    }

    /// Parse the flat table. `source` only names the input
    /// in errors.
    ///
    /// Rows with fewer fields than the header are skipped;
    /// fields beyond the header width are ignored. Every
    /// parsed record holds a value (possibly empty) for
    /// each header column.
    pub fn from_delimited(text: &str, source: &Path) -> Result<Self> {
        let mut rows = parse_rows(text).into_iter();
        let header = rows.next().unwrap_or_default();
        if header.first().map(|s| s.as_str()) != Some(IMAGE_NAME_COLUMN) {
            return Err(Error::MalformedMetadata {
                path: source.to_path_buf(),
                reason: format!("header must start with `{IMAGE_NAME_COLUMN}`"),
            }
            .into());
        }

        let mut store = MetadataStore::new();
        for (idx, row) in rows.enumerate() {
            if row.len() == 1 && row[0].is_empty() {
                continue;
            }
            if row.len() < header.len() {
                debug!(
                    "{}: row {} has {} fields, expected {}; skipped",
                    source.display(),
                    idx + 2,
                    row.len(),
                    header.len()
                );
                continue;
            }

            let mut record = MetadataRecord::new(row[0].clone());
            for (tag, value) in header.iter().zip(row.iter()).skip(1) {
                record.tags.insert(tag.clone(), value.clone());
            }
            store.insert(record);
        }
        Ok(store)
    }

    /// Write the table to `path`, replacing it.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_delimited())
            .with_context(|| format!("writing metadata to {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::MissingInput {
                what: "metadata file",
                path: path.to_path_buf(),
            }
            .into());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading metadata from {}", path.display()))?;
        Self::from_delimited(&text, path)
    }
}

fn quote_field(field: &str) -> String {
    if field.contains(|c: char| c == DELIMITER || c == QUOTE || c == '\n' || c == '\r') {
        format!("\"{}\"", field.replace(QUOTE, "\"\""))
    } else {
        field.to_string()
    }
}

/// Split text into rows of fields. Quotes are honoured only
/// when a field starts with one, so legacy files with stray
/// quotes inside values still load as written.
fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = vec![];
    let mut row = vec![];
    let mut field = String::new();
    let mut quoted = false;
    let mut at_field_start = true;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if quoted {
            if c == QUOTE {
                if chars.peek() == Some(&QUOTE) {
                    chars.next();
                    field.push(QUOTE);
                } else {
                    quoted = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            QUOTE if at_field_start => {
                quoted = true;
                at_field_start = false;
            }
            DELIMITER => {
                row.push(std::mem::take(&mut field));
                at_field_start = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                at_field_start = true;
            }
            c => {
                field.push(c);
                at_field_start = false;
            }
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(name: &str, tags: &[(&str, &str)]) -> MetadataRecord {
        let mut record = MetadataRecord::new(name);
        for (tag, value) in tags {
            record.tags.insert(tag.to_string(), value.to_string());
        }
        record
    }

    fn sample_store() -> MetadataStore {
        let mut store = MetadataStore::new();
        store.insert(record(
            "DJI_0001_T.JPG",
            &[("XMP.GimbalYawDegree", "-90.0"), ("EXIF.GPSLatitude", "22.5")],
        ));
        store.insert(record("DJI_0002_T.JPG", &[("EXIF.GPSLongitude", "113.9")]));
        store
    }

    #[test]
    fn header_is_image_name_then_sorted_vocabulary() {
        let text = sample_store().to_delimited();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("ImageName,EXIF.GPSLatitude,EXIF.GPSLongitude,XMP.GimbalYawDegree")
        );
        assert_eq!(lines.next(), Some("DJI_0001_T.JPG,22.5,,-90.0"));
        assert_eq!(lines.next(), Some("DJI_0002_T.JPG,,113.9,"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn round_trip_keeps_values_and_fills_gaps() -> Result<()> {
        let store = sample_store();
        let parsed = MetadataStore::from_delimited(&store.to_delimited(), Path::new("mem"))?;
        assert_eq!(parsed.len(), 2);

        for original in store.records() {
            let loaded = parsed.get(&original.image_name).expect("record");
            for (tag, value) in &original.tags {
                assert_eq!(loaded.get(tag), Some(value.as_str()));
            }
            for tag in store.vocabulary() {
                if !original.tags.contains_key(tag) {
                    assert_eq!(loaded.get(tag), Some(""));
                }
            }
        }
        Ok(())
    }

    #[test]
    fn values_with_delimiters_survive() -> Result<()> {
        let mut store = MetadataStore::new();
        store.insert(record(
            "a_T.JPG",
            &[
                ("XMP.Description", "north, then \"east\""),
                ("XMP.Notes", "line one\nline two"),
                ("XMP.Make", "DJI"),
            ],
        ));
        let text = store.to_delimited();
        let parsed = MetadataStore::from_delimited(&text, Path::new("mem"))?;
        assert_eq!(parsed, store);
        Ok(())
    }

    #[test]
    fn legacy_rows_short_and_long() -> Result<()> {
        let text = "ImageName,XMP.A,XMP.B\r\n\
                    one.jpg,1,2,extra,columns\r\n\
                    short.jpg,1\r\n\
                    \r\n\
                    two.jpg,,3";
        let store = MetadataStore::from_delimited(text, Path::new("mem"))?;
        assert_eq!(store.len(), 2);
        assert!(store.get("short.jpg").is_none());

        let one = store.get("one.jpg").expect("one");
        assert_eq!(one.tags.len(), 2);
        assert_eq!(one.get("XMP.B"), Some("2"));
        assert_eq!(store.get("two.jpg").and_then(|r| r.get("XMP.A")), Some(""));
        Ok(())
    }

    #[test]
    fn header_must_start_with_image_name() {
        for text in ["", "Name,XMP.A\nx.jpg,1\n"] {
            let err = MetadataStore::from_delimited(text, Path::new("metadata.txt")).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<Error>(),
                Some(Error::MalformedMetadata { .. })
            ));
        }
    }

    #[test]
    fn load_missing_file() {
        let err = MetadataStore::load(&PathBuf::from("/nonexistent/metadata.txt")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MissingInput { .. })
        ));
    }

    #[test]
    fn save_then_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("metadata.txt");
        let store = sample_store();
        store.save(&path)?;
        let loaded = MetadataStore::load(&path)?;
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.get("DJI_0001_T.JPG").and_then(|r| r.get("XMP.GimbalYawDegree")),
            Some("-90.0")
        );
        Ok(())
    }

    #[test]
    fn group_tags_skip_empty_and_other_groups() {
        let record = record(
            "x.jpg",
            &[
                ("XMP.GimbalYawDegree", "-90.0"),
                ("Xmp.RtkFlag", "50"),
                ("XMP.Empty", ""),
                ("EXIF.GPSLatitude", "22.5"),
            ],
        );
        let xmp: Vec<_> = record.group_tags("XMP").collect();
        assert_eq!(xmp, vec![("GimbalYawDegree", "-90.0"), ("RtkFlag", "50")]);
    }
}
