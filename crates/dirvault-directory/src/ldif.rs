//! Minimal LDIF model and parser.
//!
//! Dynamic roles describe directory changes as LDIF; this module parses the
//! subset the engine needs: content records (implicit adds) and change
//! records with `changetype: add`, `modify` or `delete`, including base64
//! (`::`) values and folded continuation lines.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

/// LDIF parsing failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LdifError {
    #[error("LDIF record {record} does not start with a dn line")]
    MissingDn { record: usize },

    #[error("unsupported changetype {changetype:?}")]
    UnsupportedChangeType { changetype: String },

    #[error("malformed LDIF line {line:?}")]
    MalformedLine { line: String },

    #[error("invalid base64 value on line {line:?}")]
    InvalidBase64 { line: String },

    #[error("malformed modify block: {reason}")]
    MalformedModify { reason: String },

    #[error("LDIF input contains no records")]
    Empty,
}

/// One attribute with its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdifAttribute {
    pub name: String,
    pub values: Vec<String>,
}

/// A single modification within a `changetype: modify` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdifMod {
    pub op: ModOp,
    pub attribute: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Replace,
    Delete,
}

/// The change described by one LDIF record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LdifChange {
    Add { attributes: Vec<LdifAttribute> },
    Modify { mods: Vec<LdifMod> },
    Delete,
}

/// One LDIF record: a target DN and the change to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdifEntry {
    pub dn: String,
    pub change: LdifChange,
}

impl LdifEntry {
    pub fn is_add(&self) -> bool {
        matches!(self.change, LdifChange::Add { .. })
    }
}

/// Parse LDIF text into entries.
pub fn parse(input: &str) -> Result<Vec<LdifEntry>, LdifError> {
    let mut entries = Vec::new();

    for (index, record) in records(input).into_iter().enumerate() {
        entries.push(parse_record(index, &record)?);
    }

    if entries.is_empty() {
        return Err(LdifError::Empty);
    }
    Ok(entries)
}

/// Split the input into logical records: unfold continuation lines, drop
/// comments and the optional `version:` header, split on blank lines.
fn records(input: &str) -> Vec<Vec<String>> {
    let mut all = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for raw in input.lines() {
        if let Some(folded) = raw.strip_prefix(' ') {
            if let Some(last) = current.last_mut() {
                last.push_str(folded);
            }
            continue;
        }

        let line = raw.trim_end();
        if line.is_empty() {
            if !current.is_empty() {
                all.push(std::mem::take(&mut current));
            }
            continue;
        }
        if line.starts_with('#') || line.to_ascii_lowercase().starts_with("version:") {
            continue;
        }
        current.push(line.to_string());
    }
    if !current.is_empty() {
        all.push(current);
    }
    all
}

fn parse_record(index: usize, lines: &[String]) -> Result<LdifEntry, LdifError> {
    let (first_name, dn) = split_line(&lines[0])?;
    if !first_name.eq_ignore_ascii_case("dn") {
        return Err(LdifError::MissingDn { record: index });
    }

    let mut body = &lines[1..];
    let mut changetype = "add".to_string();
    if let Some(line) = body.first() {
        let (name, value) = split_line(line)?;
        if name.eq_ignore_ascii_case("changetype") {
            changetype = value.to_ascii_lowercase();
            body = &body[1..];
        }
    }

    let change = match changetype.as_str() {
        "add" => LdifChange::Add {
            attributes: parse_attributes(body)?,
        },
        "modify" => LdifChange::Modify {
            mods: parse_mods(body)?,
        },
        "delete" => LdifChange::Delete,
        other => {
            return Err(LdifError::UnsupportedChangeType {
                changetype: other.to_string(),
            });
        }
    };

    Ok(LdifEntry { dn, change })
}

fn parse_attributes(lines: &[String]) -> Result<Vec<LdifAttribute>, LdifError> {
    let mut attributes: Vec<LdifAttribute> = Vec::new();
    for line in lines {
        let (name, value) = split_line(line)?;
        match attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.values.push(value),
            None => attributes.push(LdifAttribute {
                name,
                values: vec![value],
            }),
        }
    }
    Ok(attributes)
}

fn parse_mods(lines: &[String]) -> Result<Vec<LdifMod>, LdifError> {
    let mut mods = Vec::new();
    let mut iter = lines.iter().peekable();

    while let Some(line) = iter.next() {
        if line == "-" {
            continue;
        }
        let (op_name, attribute) = split_line(line)?;
        let op = match op_name.to_ascii_lowercase().as_str() {
            "add" => ModOp::Add,
            "replace" => ModOp::Replace,
            "delete" => ModOp::Delete,
            other => {
                return Err(LdifError::MalformedModify {
                    reason: format!("unknown modify operation {other:?}"),
                });
            }
        };

        let mut values = Vec::new();
        while let Some(next) = iter.peek() {
            if *next == "-" {
                iter.next();
                break;
            }
            let (name, value) = split_line(next)?;
            if !name.eq_ignore_ascii_case(&attribute) {
                return Err(LdifError::MalformedModify {
                    reason: format!("value for {name:?} inside block for {attribute:?}"),
                });
            }
            values.push(value);
            iter.next();
        }

        mods.push(LdifMod {
            op,
            attribute,
            values,
        });
    }
    Ok(mods)
}

/// Split `name: value` or `name:: base64value`.
fn split_line(line: &str) -> Result<(String, String), LdifError> {
    let colon = line.find(':').ok_or_else(|| LdifError::MalformedLine {
        line: line.to_string(),
    })?;
    let name = line[..colon].trim().to_string();
    let rest = &line[colon + 1..];

    if let Some(encoded) = rest.strip_prefix(':') {
        let decoded =
            BASE64
                .decode(encoded.trim())
                .map_err(|_| LdifError::InvalidBase64 {
                    line: line.to_string(),
                })?;
        let value = String::from_utf8(decoded).map_err(|_| LdifError::InvalidBase64 {
            line: line.to_string(),
        })?;
        return Ok((name, value));
    }

    Ok((name, rest.trim_start().to_string()))
}
