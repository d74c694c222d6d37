//! XMLTV guide import.
//!
//! Only `<programme>` elements are read; `<channel>` metadata is ignored since
//! the lineup already names its channels.  Programs come back grouped by the
//! `channel` attribute, unsorted.

use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::debug;

use crate::protocol::Program;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    None,
    Title,
    Desc,
}

#[derive(Default)]
struct PendingProgramme {
    channel: String,
    start: Option<DateTime<Local>>,
    stop: Option<DateTime<Local>>,
    title: String,
    desc: String,
}

fn get_attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            let raw = String::from_utf8(attr.value.as_ref().to_vec()).ok()?;
            return Some(decode_entities(&raw));
        }
    }
    None
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn entity_char(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Parse an XMLTV timestamp: `YYYYMMDDhhmmss` with an optional `±hhmm` offset.
/// A missing offset means UTC.
pub fn parse_xmltv_time(value: &str) -> Option<DateTime<Local>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y%m%d%H%M%S %z") {
        return Some(dt.with_timezone(&Local));
    }
    let digits = value.get(..14)?;
    let naive = NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive).with_timezone(&Local))
}

pub fn parse_str(xml: &str) -> anyhow::Result<HashMap<String, Vec<Program>>> {
    let mut reader = Reader::from_str(xml);
    let mut guide: HashMap<String, Vec<Program>> = HashMap::new();
    let mut current: Option<PendingProgramme> = None;
    let mut field = Field::None;
    let mut skipped = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"programme" => {
                    current = Some(PendingProgramme {
                        channel: get_attribute(e, b"channel").unwrap_or_default(),
                        start: get_attribute(e, b"start").and_then(|s| parse_xmltv_time(&s)),
                        stop: get_attribute(e, b"stop").and_then(|s| parse_xmltv_time(&s)),
                        ..PendingProgramme::default()
                    });
                }
                b"title" if current.is_some() => field = Field::Title,
                b"desc" if current.is_some() => field = Field::Desc,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let Some(p) = current.as_mut() {
                    let text = String::from_utf8_lossy(e.as_ref());
                    match field {
                        Field::Title => p.title.push_str(&decode_entities(&text)),
                        Field::Desc => p.desc.push_str(&decode_entities(&text)),
                        Field::None => {}
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(p) = current.as_mut() {
                    let text = String::from_utf8_lossy(e.as_ref());
                    match field {
                        Field::Title => p.title.push_str(&text),
                        Field::Desc => p.desc.push_str(&text),
                        Field::None => {}
                    }
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if let (Some(p), Some(c)) =
                    (current.as_mut(), entity_char(&String::from_utf8_lossy(&r)))
                {
                    match field {
                        Field::Title => p.title.push(c),
                        Field::Desc => p.desc.push(c),
                        Field::None => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"title" | b"desc" => field = Field::None,
                b"programme" => {
                    field = Field::None;
                    let Some(p) = current.take() else { continue };
                    let (Some(start), Some(stop)) = (p.start, p.stop) else {
                        skipped += 1;
                        continue;
                    };
                    let title = p.title.trim();
                    if p.channel.is_empty() || title.is_empty() {
                        skipped += 1;
                        continue;
                    }
                    let id = format!("{}-{}", p.channel, start.timestamp());
                    match Program::new(id, title, p.desc.trim(), start, stop, p.channel.clone()) {
                        Some(program) => guide.entry(p.channel).or_default().push(program),
                        None => skipped += 1,
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                anyhow::bail!(
                    "XMLTV parse error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )
            }
            _ => {}
        }
    }

    if skipped > 0 {
        debug!("xmltv: skipped {} incomplete programmes", skipped);
    }
    Ok(guide)
}
