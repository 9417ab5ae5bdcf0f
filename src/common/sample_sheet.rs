//! Reads `SampleSheet.csv` in either of its two generations: the legacy
//! (IEM, v1) layout and the BCL Convert (v2) layout. Both are a sequence of
//! `[Section]` blocks; a section is either key/value rows or a table whose
//! first row names the columns.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use csv::ReaderBuilder;
use itertools::Itertools;
use log::debug;
use serde::{Serialize, Serializer};

use crate::{
    error::{Error, Result},
    parser::Descriptor,
};

/// Ordered key/value pairs from one section. Keys are unique; a repeated
/// key keeps its first position and takes the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValues(Vec<(String, String)>);

impl KeyValues {
    pub fn new() -> Self {
        KeyValues::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut kv = KeyValues::new();
        for (k, v) in iter {
            kv.insert(k, v);
        }
        kv
    }
}

impl Serialize for KeyValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// A table section: the column names and one key/value map per row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleTable {
    pub columns: Vec<String>,
    pub rows: Vec<KeyValues>,
}

/// Legacy sample sheet, as written by Illumina Experiment Manager
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct SampleSheetV1 {
    pub header: Option<KeyValues>,
    /// Cycles per read
    pub reads: Option<Vec<u32>>,
    pub settings: Option<KeyValues>,
    pub data: Option<SampleTable>,
    /// Sections with no fixed meaning, keyed by their name as written
    pub extra_sections: BTreeMap<String, KeyValues>,
}

/// BCL Convert sample sheet (`FileFormatVersion,2`)
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct SampleSheetV2 {
    pub header: Option<KeyValues>,
    pub reads: Option<KeyValues>,
    pub bclconvert_settings: Option<KeyValues>,
    pub bclconvert_data: Option<SampleTable>,
    pub cloud_settings: Option<KeyValues>,
    pub cloud_data: Option<SampleTable>,
    pub extra_sections: BTreeMap<String, KeyValues>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SampleSheet {
    V1(SampleSheetV1),
    V2(SampleSheetV2),
}

/// Serialized as the sheet's sections plus a numeric `version`
impl Serialize for SampleSheet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Versioned<'a, T> {
            version: u8,
            #[serde(flatten)]
            sheet: &'a T,
        }

        match self {
            SampleSheet::V1(sheet) => Versioned { version: 1, sheet }.serialize(serializer),
            SampleSheet::V2(sheet) => Versioned { version: 2, sheet }.serialize(serializer),
        }
    }
}

/// Decide which generation a sheet is from its first two lines: v2 sheets
/// open with `[Header]` followed by `FileFormatVersion`.
pub fn detect_version(path: &Path) -> Result<u8> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut lines = BufReader::new(file).lines();

    let mut next_line = || -> Result<String> {
        match lines.next() {
            Some(line) => line.map_err(|e| Error::io(path, e)),
            None => Ok(String::new()),
        }
    };

    let first = next_line()?;
    let first_field = first.split(',').next().unwrap_or("");
    if clean_field(first_field) != "[Header]" {
        return Ok(1);
    }

    if next_line()?.contains("FileFormatVersion") {
        Ok(2)
    } else {
        Ok(1)
    }
}

fn clean_field(field: &str) -> &str {
    field.trim_start_matches('\u{feff}').trim()
}

struct Row {
    line: u64,
    fields: Vec<String>,
}

struct Section {
    /// Name as written between the brackets
    name: String,
    rows: Vec<Row>,
}

impl Section {
    fn key(&self) -> String {
        self.name.to_lowercase()
    }

    fn key_values(&self) -> KeyValues {
        self.rows
            .iter()
            .filter(|row| row.fields.len() >= 2)
            .map(|row| (row.fields[0].as_str(), row.fields[1].as_str()))
            .collect()
    }

    fn table(&self, path: &Path) -> Result<SampleTable> {
        let mut rows = self.rows.iter();
        let columns = match rows.next() {
            Some(row) => row.fields.clone(),
            None => return Ok(SampleTable::default()),
        };

        let rows = rows
            .map(|row| {
                if row.fields.len() != columns.len() {
                    return Err(Error::SampleSheet {
                        path: path.to_owned(),
                        line: row.line,
                        message: format!(
                            "expected {} fields, found {}",
                            columns.len(),
                            row.fields.len()
                        ),
                    });
                }
                Ok(columns.iter().zip(row.fields.iter()).collect())
            })
            .collect::<Result<Vec<KeyValues>>>()?;

        Ok(SampleTable { columns, rows })
    }
}

/// Split the file into its sections, dropping blank rows
fn read_sections(path: &Path) -> Result<Vec<Section>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut sections: Vec<Section> = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|source| Error::Csv {
            path: path.to_owned(),
            source,
        })?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let line = record.position().map_or(0, |p| p.line());
        let first = clean_field(record.get(0).unwrap_or(""));

        if first.starts_with('[') && first.ends_with(']') {
            let name = first[1..first.len() - 1].to_owned();
            debug!("{}: section [{}] at line {}", path.display(), name, line);
            sections.push(Section {
                name,
                rows: Vec::new(),
            });
            continue;
        }

        match sections.last_mut() {
            Some(section) => section.rows.push(Row {
                line,
                fields: record.iter().map(str::to_owned).collect(),
            }),
            None => {
                return Err(Error::SampleSheet {
                    path: path.to_owned(),
                    line,
                    message: "content before the first section header".to_owned(),
                })
            }
        }
    }

    Ok(sections)
}

fn parse_v1(path: &Path) -> Result<SampleSheetV1> {
    let mut sheet = SampleSheetV1::default();

    for section in read_sections(path)? {
        match section.key().as_str() {
            "header" => sheet.header = Some(section.key_values()),
            "reads" => {
                sheet.reads = Some(
                    section
                        .rows
                        .iter()
                        .filter_map(|row| row.fields.first()?.trim().parse().ok())
                        .collect(),
                )
            }
            "settings" => sheet.settings = Some(section.key_values()),
            "data" => sheet.data = Some(section.table(path)?),
            _ => {
                sheet
                    .extra_sections
                    .insert(section.name.clone(), section.key_values());
            }
        }
    }

    Ok(sheet)
}

fn parse_v2(path: &Path) -> Result<SampleSheetV2> {
    let mut sheet = SampleSheetV2::default();

    for section in read_sections(path)? {
        match section.key().as_str() {
            "header" => sheet.header = Some(section.key_values()),
            "reads" => sheet.reads = Some(section.key_values()),
            "bclconvert_settings" => sheet.bclconvert_settings = Some(section.key_values()),
            "bclconvert_data" => sheet.bclconvert_data = Some(section.table(path)?),
            "cloud_settings" => sheet.cloud_settings = Some(section.key_values()),
            "cloud_data" => sheet.cloud_data = Some(section.table(path)?),
            _ => {
                sheet
                    .extra_sections
                    .insert(section.name.clone(), section.key_values());
            }
        }
    }

    Ok(sheet)
}

impl SampleSheet {
    pub fn version(&self) -> u8 {
        match self {
            SampleSheet::V1(_) => 1,
            SampleSheet::V2(_) => 2,
        }
    }

    pub fn header(&self) -> Option<&KeyValues> {
        match self {
            SampleSheet::V1(sheet) => sheet.header.as_ref(),
            SampleSheet::V2(sheet) => sheet.header.as_ref(),
        }
    }

    /// Rows of the sample table: `[Data]` in v1, `[BCLConvert_Data]` in v2
    pub fn samples(&self) -> &[KeyValues] {
        let table = match self {
            SampleSheet::V1(sheet) => sheet.data.as_ref(),
            SampleSheet::V2(sheet) => sheet.bclconvert_data.as_ref(),
        };
        table.map(|t| t.rows.as_slice()).unwrap_or(&[])
    }

    /// Distinct project names in the order they first appear
    pub fn projects(&self) -> Vec<String> {
        let cloud_rows: &[KeyValues] = match self {
            SampleSheet::V2(sheet) => sheet
                .cloud_data
                .as_ref()
                .map(|t| t.rows.as_slice())
                .unwrap_or(&[]),
            SampleSheet::V1(_) => &[],
        };

        self.samples()
            .iter()
            .filter_map(|row| row.get("Sample_Project"))
            .chain(
                cloud_rows
                    .iter()
                    .filter_map(|row| row.get("ProjectName").or_else(|| row.get("Project"))),
            )
            .filter(|project| !project.is_empty())
            .unique()
            .map(str::to_owned)
            .collect()
    }
}

impl Descriptor for SampleSheet {
    const FILE_NAME: &'static str = "SampleSheet.csv";

    fn parse(path: &Path) -> Result<Self> {
        match detect_version(path)? {
            2 => Ok(SampleSheet::V2(parse_v2(path)?)),
            _ => Ok(SampleSheet::V1(parse_v1(path)?)),
        }
    }

    /// A sheet is usable once it lists at least one sample
    fn validate(&self) -> bool {
        !self.samples().is_empty()
    }
}
