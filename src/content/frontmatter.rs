//! Front-matter parsing
//!
//! A document opens with a metadata block fenced by `---` (YAML) or `+++`
//! (TOML) marker lines. Everything after the closing marker is the body.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Front-matter errors
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("missing opening front-matter delimiter (`---` or `+++` on the first line)")]
    MissingOpeningDelimiter,

    #[error("unterminated front-matter block, no closing `{delimiter}` line")]
    Unterminated { delimiter: &'static str },

    #[error("invalid YAML front-matter: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML front-matter: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// Metadata syntax, selected by the opening delimiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
}

impl Format {
    pub fn delimiter(self) -> &'static str {
        match self {
            Format::Yaml => "---",
            Format::Toml => "+++",
        }
    }
}

/// A document cut at its front-matter delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    pub format: Format,
    pub metadata: &'a str,
    pub body: &'a str,
    /// 1-based file line on which the body starts
    pub body_line: usize,
}

/// Split raw document text into metadata and body
pub fn split(content: &str) -> Result<Split<'_>, ParseError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut lines = content.split_inclusive('\n');

    let first = lines.next().ok_or(ParseError::MissingOpeningDelimiter)?;
    let format = match first.trim_end() {
        "---" => Format::Yaml,
        "+++" => Format::Toml,
        _ => return Err(ParseError::MissingOpeningDelimiter),
    };

    let metadata_start = first.len();
    let mut offset = metadata_start;
    let mut line_no = 1;

    for line in lines {
        line_no += 1;
        if line.trim_end() == format.delimiter() {
            return Ok(Split {
                format,
                metadata: &content[metadata_start..offset],
                body: &content[offset + line.len()..],
                body_line: line_no + 1,
            });
        }
        offset += line.len();
    }

    Err(ParseError::Unterminated {
        delimiter: format.delimiter(),
    })
}

/// A front-matter timestamp, kept in the precision it was written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// `2019-01-07`
    Date(NaiveDate),
    /// `2019-01-07 10:30:00`, interpreted in the site time zone
    Local(NaiveDateTime),
    /// `2019-01-07T10:30:00+08:00`
    Offset(DateTime<FixedOffset>),
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

impl Timestamp {
    /// Parse the date notations found in blog front-matter
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Timestamp::Offset(dt));
        }
        for fmt in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Some(Timestamp::Offset(dt));
            }
        }
        for fmt in LOCAL_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Timestamp::Local(dt));
            }
        }
        for fmt in DATE_FORMATS {
            if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                return Some(Timestamp::Date(d));
            }
        }

        None
    }

    /// Pin the timestamp to an instant, using `tz` when no offset was written.
    /// `None` for a local time that does not exist in `tz`.
    pub fn resolve(&self, tz: &Tz) -> Option<DateTime<FixedOffset>> {
        match self {
            Timestamp::Offset(dt) => Some(*dt),
            Timestamp::Local(ndt) => tz
                .from_local_datetime(ndt)
                .earliest()
                .map(|dt| dt.fixed_offset()),
            Timestamp::Date(d) => {
                let ndt = d.and_hms_opt(0, 0, 0)?;
                tz.from_local_datetime(&ndt)
                    .earliest()
                    .map(|dt| dt.fixed_offset())
            }
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Timestamp::Local(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Timestamp::Offset(dt) => f.write_str(&dt.to_rfc3339()),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Timestamp::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date {:?}", s)))
    }
}

/// Custom deserializer that handles both a single string and a list of strings
fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, SeqAccess, Visitor};

    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![value.to_string()])
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![value])
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
        where
            S: SeqAccess<'de>,
        {
            let mut vec = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                vec.push(item);
            }
            Ok(vec)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Front-matter data of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,
    #[serde(skip_serializing_if = "is_false")]
    pub draft: bool,
    #[serde(
        deserialize_with = "string_or_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tags: Vec<String>,
    #[serde(
        deserialize_with = "string_or_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Additional custom fields, in written order
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_yaml::Value>,
}

impl FrontMatter {
    /// Parse front-matter from content string
    /// Returns (front_matter, body)
    pub fn parse(content: &str) -> Result<(Self, &str), ParseError> {
        let split = split(content)?;
        let fm = Self::from_split(&split)?;
        Ok((fm, split.body))
    }

    /// Decode the metadata part of an already split document
    pub fn from_split(split: &Split<'_>) -> Result<Self, ParseError> {
        match split.format {
            Format::Yaml => Self::from_yaml(split.metadata),
            Format::Toml => Self::from_toml(split.metadata),
        }
    }

    fn from_yaml(metadata: &str) -> Result<Self, ParseError> {
        let blank = metadata.lines().all(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#')
        });
        if blank {
            return Ok(FrontMatter::default());
        }
        let value: serde_yaml::Value = serde_yaml::from_str(metadata)?;
        Self::from_value(value)
    }

    fn from_toml(metadata: &str) -> Result<Self, ParseError> {
        let table: toml::Table = metadata.parse()?;
        Self::from_value(toml_to_yaml(toml::Value::Table(table)))
    }

    fn from_value(value: serde_yaml::Value) -> Result<Self, ParseError> {
        // Comment-only or empty blocks decode to null
        if value.is_null() {
            return Ok(FrontMatter::default());
        }
        Ok(serde_yaml::from_value(value)?)
    }

    /// Serialize back to a `---` delimited YAML block
    pub fn to_yaml(&self) -> Result<String, ParseError> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(format!("---\n{}---\n", yaml))
    }

    /// Resolve the publication date against the site time zone
    pub fn resolved_date(&self, tz: &Tz) -> Result<DateTime<FixedOffset>, ParseError> {
        let date = self.date.ok_or(ParseError::MissingField("date"))?;
        date.resolve(tz).ok_or_else(|| ParseError::InvalidField {
            field: "date",
            message: format!("{} does not exist in time zone {}", date, tz.name()),
        })
    }

    /// Resolve the updated date, if any
    pub fn resolved_updated(&self, tz: &Tz) -> Result<Option<DateTime<FixedOffset>>, ParseError> {
        match self.updated {
            None => Ok(None),
            Some(updated) => updated
                .resolve(tz)
                .map(Some)
                .ok_or_else(|| ParseError::InvalidField {
                    field: "updated",
                    message: format!("{} does not exist in time zone {}", updated, tz.name()),
                }),
        }
    }
}

/// TOML values are funnelled through the YAML value model so both syntaxes
/// share one decoding path; TOML datetimes become strings.
fn toml_to_yaml(value: toml::Value) -> serde_yaml::Value {
    use serde_yaml::Value;

    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Value::Number(f.into()),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Sequence(items.into_iter().map(toml_to_yaml).collect()),
        toml::Value::Table(table) => Value::Mapping(
            table
                .into_iter()
                .map(|(k, v)| (Value::String(k), toml_to_yaml(v)))
                .collect(),
        ),
    }
}
