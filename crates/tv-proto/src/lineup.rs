//! Channel lineup loading: M3U playlists, TOML lineups, and XMLTV guide merge.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;
use tracing::{info, warn};

use crate::config::LineupConfig;
use crate::protocol::{ArchiveLimit, ArchiveWindow, Channel, Program};
use crate::schedule;

// ── M3U ───────────────────────────────────────────────────────────────────────

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).expect("static attribute regex")
    })
}

/// Split an `#EXTINF:` payload into its attribute map and display name.
fn parse_extinf(rest: &str) -> (HashMap<String, String>, String) {
    let attrs = attr_regex()
        .captures_iter(rest)
        .map(|c| (c[1].to_ascii_lowercase(), c[2].to_string()))
        .collect();
    // The title follows the first comma after the last quoted attribute value.
    let search_from = rest.rfind('"').map(|i| i + 1).unwrap_or(0);
    let name = rest[search_from..]
        .find(',')
        .map(|i| rest[search_from + i + 1..].trim().to_string())
        .unwrap_or_default();
    (attrs, name)
}

fn archive_from_catchup_days(value: Option<&String>) -> ArchiveLimit {
    match value.map(|v| v.trim().parse::<i64>()) {
        Some(Ok(-1)) => ArchiveLimit::Unbounded,
        Some(Ok(days)) if days > 0 => {
            let hours = days
                .checked_mul(24)
                .and_then(|h| u32::try_from(h).ok())
                .unwrap_or(u32::MAX);
            ArchiveWindow::from_hours_back(hours).limit
        }
        _ => ArchiveLimit::Unknown,
    }
}

fn looks_hd(name: &str) -> bool {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|w| w.eq_ignore_ascii_case("hd") || w.eq_ignore_ascii_case("fhd"))
}

pub fn parse_m3u_from_str(content: &str) -> anyhow::Result<Vec<Channel>> {
    let mut channels = Vec::new();
    let mut pending: Option<(HashMap<String, String>, String)> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            pending = Some(parse_extinf(rest));
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let url = line.to_string();
        let (attrs, name) = pending.take().unwrap_or_default();
        let position = channels.len() as u32 + 1;

        let name = if name.is_empty() {
            attrs.get("tvg-name").cloned().unwrap_or_else(|| url.clone())
        } else {
            name
        };
        let id = attrs
            .get("tvg-id")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("ch{}", position));
        let is_hd = looks_hd(&name) || attrs.get("tvg-name").is_some_and(|n| looks_hd(n));

        channels.push(Channel {
            id,
            number: attrs
                .get("tvg-chno")
                .and_then(|n| n.trim().parse().ok())
                .unwrap_or(position),
            category: attrs.get("group-title").cloned().unwrap_or_default(),
            logo_url: attrs.get("tvg-logo").filter(|s| !s.is_empty()).cloned(),
            catchup_template: attrs.get("catchup-source").filter(|s| !s.is_empty()).cloned(),
            archive: archive_from_catchup_days(attrs.get("catchup-days")),
            is_hd,
            name,
            stream_template: url,
            ..Channel::default()
        });
    }

    Ok(channels)
}

pub fn load_channels_from_m3u(path: &Path) -> anyhow::Result<Vec<Channel>> {
    let content = std::fs::read_to_string(path)?;
    parse_m3u_from_str(&content)
}

// ── TOML lineup ───────────────────────────────────────────────────────────────

/// Mirrors the `[[channel]]` table.  Kept apart from [`Channel`] so the file
/// schema can stay friendlier than the in-memory type.
#[derive(Debug, serde::Deserialize)]
struct TomlLineupFile {
    #[serde(default)]
    channel: Vec<TomlChannel>,
}

#[derive(Debug, serde::Deserialize)]
struct TomlChannel {
    id: String,
    name: String,
    url: String,
    #[serde(default)]
    catchup_url: Option<String>,
    #[serde(default)]
    logo: Option<String>,
    #[serde(default)]
    number: Option<u32>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    hd: bool,
    #[serde(default)]
    favorite: bool,
    #[serde(default)]
    archive_hours: Option<TomlArchive>,
    #[serde(default)]
    program: Vec<TomlProgram>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum TomlArchive {
    Hours(u32),
    Word(String),
}

#[derive(Debug, serde::Deserialize)]
struct TomlProgram {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(default)]
    description: String,
    start: DateTime<chrono::FixedOffset>,
    end: DateTime<chrono::FixedOffset>,
}

fn archive_from_toml(value: Option<&TomlArchive>) -> anyhow::Result<ArchiveLimit> {
    Ok(match value {
        None => ArchiveLimit::Unknown,
        Some(TomlArchive::Hours(h)) => ArchiveWindow::from_hours_back(*h).limit,
        Some(TomlArchive::Word(w)) => match w.to_ascii_lowercase().as_str() {
            "unlimited" | "unbounded" => ArchiveLimit::Unbounded,
            "none" => ArchiveLimit::Bounded(0),
            "unknown" => ArchiveLimit::Unknown,
            other => anyhow::bail!("invalid archive_hours value {:?}", other),
        },
    })
}

pub fn parse_channels_from_toml_str(content: &str) -> anyhow::Result<Vec<Channel>> {
    let file: TomlLineupFile = toml::from_str(content)?;
    let mut channels = Vec::with_capacity(file.channel.len());
    for (pos, c) in file.channel.into_iter().enumerate() {
        let archive = archive_from_toml(c.archive_hours.as_ref())?;
        let mut programs = Vec::with_capacity(c.program.len());
        for p in c.program {
            let start = p.start.with_timezone(&Local);
            let end = p.end.with_timezone(&Local);
            let id = p
                .id
                .unwrap_or_else(|| format!("{}-{}", c.id, start.timestamp()));
            match Program::new(id, p.title, p.description, start, end, c.id.clone()) {
                Some(program) => programs.push(program),
                None => warn!("lineup: dropping program on {} that ends before it starts", c.id),
            }
        }
        let dropped = schedule::normalize(&mut programs);
        if dropped > 0 {
            warn!("lineup: dropped {} overlapping programs on {}", dropped, c.id);
        }
        channels.push(Channel {
            number: c.number.unwrap_or(pos as u32 + 1),
            id: c.id,
            name: c.name,
            stream_template: c.url,
            catchup_template: c.catchup_url,
            logo_url: c.logo,
            category: c.category,
            is_hd: c.hd,
            favorite: c.favorite,
            archive,
            programs,
        });
    }
    Ok(channels)
}

pub fn load_channels_from_toml(path: &Path) -> anyhow::Result<Vec<Channel>> {
    let content = std::fs::read_to_string(path)?;
    parse_channels_from_toml_str(&content)
}

// ── Guide merge ───────────────────────────────────────────────────────────────

/// Attach guide programs to channels by id.  Channels that already carry a
/// schedule keep it.  Returns how many channels received programs.
pub fn merge_guide(channels: &mut [Channel], mut guide: HashMap<String, Vec<Program>>) -> usize {
    let mut merged = 0;
    for channel in channels.iter_mut() {
        if !channel.programs.is_empty() {
            continue;
        }
        if let Some(mut programs) = guide.remove(&channel.id) {
            schedule::normalize(&mut programs);
            channel.programs = programs;
            merged += 1;
        }
    }
    merged
}

// ── Stream URL templates ──────────────────────────────────────────────────────

/// Substitute catchup placeholders in `template` for instant `at`.
///
/// Supported: `{utc}` (unix seconds), `{start}` (`%Y-%m-%dT%H:%M:%S`),
/// `{Y}` `{m}` `{d}` `{H}` `{M}` `{S}`, and `{offset}` (seconds before `now`).
pub fn expand_template(template: &str, at: DateTime<Local>, now: DateTime<Local>) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    let offset = (now - at).num_seconds().max(0);
    let substitutions = [
        ("{utc}", at.timestamp().to_string()),
        ("{start}", at.format("%Y-%m-%dT%H:%M:%S").to_string()),
        ("{offset}", offset.to_string()),
        ("{Y}", at.format("%Y").to_string()),
        ("{m}", at.format("%m").to_string()),
        ("{d}", at.format("%d").to_string()),
        ("{H}", at.format("%H").to_string()),
        ("{M}", at.format("%M").to_string()),
        ("{S}", at.format("%S").to_string()),
    ];
    let mut out = template.to_string();
    for (key, value) in &substitutions {
        out = out.replace(key, value);
    }
    out
}

pub fn has_placeholders(template: &str) -> bool {
    ["{utc}", "{start}", "{offset}", "{Y}"]
        .iter()
        .any(|k| template.contains(k))
}

// ── Loader ────────────────────────────────────────────────────────────────────

/// Read a URL (http/https) or local file path to a string.
pub async fn fetch_source(source: &str) -> anyhow::Result<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = reqwest::get(source).await?;
        if !response.status().is_success() {
            anyhow::bail!("HTTP {}", response.status());
        }
        Ok(response.text().await?)
    } else {
        Ok(tokio::fs::read_to_string(source).await?)
    }
}

/// Load the lineup: TOML file first, then the M3U source, else empty.
/// A configured guide is merged afterwards; guide failures only warn.
pub async fn load_lineup(config: &LineupConfig) -> anyhow::Result<Vec<Channel>> {
    let mut channels = if config.lineup_toml.exists() {
        let c = load_channels_from_toml(&config.lineup_toml)?;
        info!(
            "Loaded {} channels from TOML: {}",
            c.len(),
            config.lineup_toml.display()
        );
        c
    } else if !config.m3u_url.is_empty() {
        let text = fetch_source(&config.m3u_url).await?;
        let c = parse_m3u_from_str(&text)?;
        info!("Loaded {} channels from m3u: {}", c.len(), config.m3u_url);
        c
    } else {
        info!("No lineup source configured, starting with empty lineup");
        Vec::new()
    };

    if let Some(url) = config.xmltv_url.as_deref().filter(|u| !u.is_empty()) {
        match fetch_source(url).await.and_then(|xml| crate::xmltv::parse_str(&xml)) {
            Ok(guide) => {
                let merged = merge_guide(&mut channels, guide);
                info!("Merged XMLTV guide into {} channels", merged);
            }
            Err(e) => warn!("Failed to load XMLTV guide {}: {}", url, e),
        }
    }

    Ok(channels)
}
