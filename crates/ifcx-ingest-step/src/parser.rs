//! STEP physical file parser (ISO 10303-21)
//!
//! IFC models are exchanged as STEP physical files. The file is first cut
//! into `;`-terminated records (quotes and comments respected), then each
//! record is parsed with nom. A data record that fails to parse is counted
//! and skipped so one malformed instance does not sink the whole model.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{alpha1, alphanumeric1, char, digit0, digit1, multispace0, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    error::{Error as NomError, ErrorKind},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::StepError;

// ============================================================================
// STEP Data Types
// ============================================================================

/// A parsed STEP file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepFile {
    pub header: StepHeader,
    pub entities: Vec<StepEntity>,
    /// Data records that could not be parsed.
    pub skipped: usize,
}

/// STEP file header section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepHeader {
    pub file_description: Vec<String>,
    pub file_name: String,
    pub file_schema: Vec<String>,
}

/// A STEP entity instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEntity {
    pub id: u64,
    /// Upper-cased entity type, e.g. `IFCWALL`.
    pub type_name: String,
    pub attributes: Vec<StepValue>,
}

impl StepEntity {
    pub fn attr(&self, index: usize) -> Option<&StepValue> {
        self.attributes.get(index)
    }

    /// String attribute at `index`, if it holds one (typed or not).
    pub fn str_attr(&self, index: usize) -> Option<&str> {
        self.attr(index).and_then(StepValue::as_str)
    }

    pub fn ref_attr(&self, index: usize) -> Option<u64> {
        self.attr(index).and_then(StepValue::as_ref_id)
    }

    /// References held in the list attribute at `index`.
    pub fn ref_list(&self, index: usize) -> Vec<u64> {
        match self.attr(index) {
            Some(StepValue::List(items)) => items.iter().filter_map(StepValue::as_ref_id).collect(),
            _ => Vec::new(),
        }
    }
}

/// STEP attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepValue {
    /// `$`
    Null,
    /// `*`, a value derived in a supertype.
    Derived,
    Integer(i64),
    Real(f64),
    String(String),
    Enum(String),
    Binary(String),
    Reference(u64),
    List(Vec<StepValue>),
    Typed(String, Box<StepValue>),
}

impl StepValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StepValue::String(s) => Some(s),
            StepValue::Typed(_, inner) => inner.as_str(),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<u64> {
        match self {
            StepValue::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// `.T.`/`.F.` as a boolean; `.U.` and anything else as `None`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StepValue::Enum(e) if e == "T" => Some(true),
            StepValue::Enum(e) if e == "F" => Some(false),
            StepValue::Typed(_, inner) => inner.as_bool(),
            _ => None,
        }
    }
}

// ============================================================================
// Record splitting
// ============================================================================

/// Remove `/* ... */` comments that sit outside string literals.
fn strip_comments(input: &str) -> Cow<'_, str> {
    if !input.contains("/*") {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    let mut in_string = false;
    while let Some((_, ch)) = chars.next() {
        if in_string {
            out.push(ch);
            if ch == '\'' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '\'' => {
                in_string = true;
                out.push(ch);
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let mut prev = '\0';
                for (_, c) in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Split on `;` outside string literals. The terminator is not included.
fn split_records(input: &str) -> Vec<&str> {
    let mut records = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    for (i, b) in input.bytes().enumerate() {
        match b {
            b'\'' => in_string = !in_string,
            b';' if !in_string => {
                records.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if !input[start..].trim().is_empty() {
        records.push(&input[start..]);
    }
    records
}

// ============================================================================
// Parser Implementation
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Header,
    Data,
}

/// Parse a complete STEP physical file.
pub fn parse_step(input: &str) -> Result<StepFile, StepError> {
    let clean = strip_comments(input);
    let mut file = StepFile::default();
    let mut section = Section::Outside;
    let mut saw_data = false;

    for record in split_records(&clean) {
        let rec = record.trim();
        if rec.is_empty() {
            continue;
        }
        let keyword = rec
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();

        match keyword.as_str() {
            "ISO-10303-21" | "END-ISO-10303-21" => {}
            "HEADER" => section = Section::Header,
            "DATA" => {
                section = Section::Data;
                saw_data = true;
            }
            "ENDSEC" => section = Section::Outside,
            _ => match section {
                Section::Header => apply_header_record(&mut file.header, rec),
                Section::Data => match all_consuming(parse_entity)(rec) {
                    Ok((_, entity)) => file.entities.push(entity),
                    Err(err) => {
                        file.skipped += 1;
                        tracing::debug!(record = %truncate(rec, 80), error = %err, "skipping unparseable STEP record");
                    }
                },
                Section::Outside => {
                    tracing::debug!(record = %truncate(rec, 80), "ignoring record outside any section");
                }
            },
        }
    }

    if !saw_data {
        return Err(StepError::MissingDataSection);
    }
    if file.skipped > 0 {
        tracing::warn!(skipped = file.skipped, "some STEP records could not be parsed");
    }
    Ok(file)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

fn apply_header_record(header: &mut StepHeader, rec: &str) {
    let Ok((_, (name, args))) = all_consuming(parse_header_record)(rec) else {
        tracing::debug!(record = %truncate(rec, 80), "skipping unparseable header record");
        return;
    };
    let strings = |v: Option<&StepValue>| -> Vec<String> {
        match v {
            Some(StepValue::List(items)) => items
                .iter()
                .filter_map(StepValue::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    };
    match name.as_str() {
        "FILE_DESCRIPTION" => header.file_description = strings(args.first()),
        "FILE_NAME" => {
            header.file_name = args
                .first()
                .and_then(StepValue::as_str)
                .unwrap_or_default()
                .to_string()
        }
        "FILE_SCHEMA" => header.file_schema = strings(args.first()),
        _ => {}
    }
}

fn parse_header_record(input: &str) -> IResult<&str, (String, Vec<StepValue>)> {
    let (input, _) = multispace0(input)?;
    let (input, name) = parse_identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, args) = parse_list(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, (name.to_ascii_uppercase(), args)))
}

/// Parse a single entity record `#12 = IFCWALL(...)`
fn parse_entity(input: &str) -> IResult<&str, StepEntity> {
    let (input, _) = multispace0(input)?;
    let (input, id) = parse_reference(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, type_name) = parse_identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, attributes) = parse_list(input)?;
    let (input, _) = multispace0(input)?;

    Ok((
        input,
        StepEntity {
            id,
            type_name: type_name.to_ascii_uppercase(),
            attributes,
        },
    ))
}

/// Parse an identifier
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

/// Parse a STEP value
fn parse_value(input: &str) -> IResult<&str, StepValue> {
    delimited(
        multispace0,
        alt((
            value(StepValue::Null, char('$')),
            value(StepValue::Derived, char('*')),
            map(parse_reference, StepValue::Reference),
            map(parse_step_string, StepValue::String),
            map(parse_binary, StepValue::Binary),
            map(parse_enum, StepValue::Enum),
            map(parse_list, StepValue::List),
            parse_typed,
            parse_number,
        )),
        multispace0,
    )(input)
}

/// Parse a reference #123
fn parse_reference(input: &str) -> IResult<&str, u64> {
    preceded(char('#'), map_res(digit1, str::parse::<u64>))(input)
}

/// Parse a STEP string 'text' (`''` is an escaped quote)
fn parse_step_string(input: &str) -> IResult<&str, String> {
    let (body, _) = char('\'')(input)?;
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Ok((&body[i + 1..], decode_step_string(&body[..i])));
        }
        i += 1;
    }
    Err(nom::Err::Error(NomError::new(input, ErrorKind::Char)))
}

/// Parse a binary literal "0A1B"
fn parse_binary(input: &str) -> IResult<&str, String> {
    map(
        delimited(char('"'), take_while(|c: char| c.is_ascii_hexdigit()), char('"')),
        str::to_string,
    )(input)
}

/// Parse an enum .VALUE.
fn parse_enum(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('.'),
            take_while1(|c: char| c.is_alphanumeric() || c == '_'),
            char('.'),
        ),
        str::to_ascii_uppercase,
    )(input)
}

/// Parse a list (a, b, c)
fn parse_list(input: &str) -> IResult<&str, Vec<StepValue>> {
    delimited(
        pair(char('('), multispace0),
        separated_list0(char(','), parse_value),
        pair(multispace0, char(')')),
    )(input)
}

/// Parse a typed value IFCLABEL('x')
fn parse_typed(input: &str) -> IResult<&str, StepValue> {
    let (input, name) = parse_identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, inner) = delimited(char('('), parse_value, char(')'))(input)?;
    Ok((
        input,
        StepValue::Typed(name.to_ascii_uppercase(), Box::new(inner)),
    ))
}

/// Parse an integer or a real (`1`, `-2`, `3.`, `0.5`, `1.E-3`)
fn parse_number(input: &str) -> IResult<&str, StepValue> {
    let (rest, text) = recognize(tuple((
        opt(one_of("+-")),
        digit1,
        opt(pair(char('.'), digit0)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    let parsed = if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().ok().map(StepValue::Real)
    } else {
        text.parse::<i64>().ok().map(StepValue::Integer)
    };
    match parsed {
        Some(v) => Ok((rest, v)),
        None => Err(nom::Err::Error(NomError::new(input, ErrorKind::Digit))),
    }
}

// ============================================================================
// String decoding
// ============================================================================

fn hex_units<const WIDTH: usize>(hex: &str) -> impl Iterator<Item = u32> + '_ {
    hex.as_bytes()
        .chunks(WIDTH)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .filter_map(|h| u32::from_str_radix(h, 16).ok())
}

/// Decode the escapes of a STEP string body: `''`, `\\`, `\S\`, `\X\hh`,
/// `\X2\...\X0\` (UTF-16) and `\X4\...\X0\` (UTF-32). Code page switches
/// (`\PA\`) are dropped.
pub fn decode_step_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find(['\'', '\\']) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        if let Some(tail) = rest.strip_prefix("''") {
            out.push('\'');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("\\\\") {
            out.push('\\');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("\\X2\\") {
            let end = tail.find("\\X0\\").unwrap_or(tail.len());
            let units: Vec<u16> = hex_units::<4>(&tail[..end]).map(|u| u as u16).collect();
            out.extend(
                char::decode_utf16(units).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)),
            );
            rest = tail.get(end + 4..).unwrap_or("");
        } else if let Some(tail) = rest.strip_prefix("\\X4\\") {
            let end = tail.find("\\X0\\").unwrap_or(tail.len());
            out.extend(
                hex_units::<8>(&tail[..end])
                    .map(|u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER)),
            );
            rest = tail.get(end + 4..).unwrap_or("");
        } else if let Some(byte) = rest
            .strip_prefix("\\X\\")
            .and_then(|tail| tail.get(..2))
            .and_then(|h| u8::from_str_radix(h, 16).ok())
        {
            out.push(char::from(byte));
            rest = &rest[5..];
        } else if let Some(c) = rest.strip_prefix("\\S\\").and_then(|t| t.chars().next()) {
            out.push(char::from_u32(c as u32 + 128).unwrap_or(c));
            rest = &rest[3 + c.len_utf8()..];
        } else if rest.starts_with("\\P") && rest.get(3..4) == Some("\\") {
            rest = &rest[4..];
        } else {
            // Lone quote or backslash; both are one byte.
            out.push_str(&rest[..1]);
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

// ============================================================================
// Tests
// ============================================================================
