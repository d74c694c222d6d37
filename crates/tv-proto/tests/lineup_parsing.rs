//! Lineup loading from M3U and TOML sources.
//!
//! Run with: cargo test -p tv-proto --test lineup_parsing

use std::io::Write;

use chrono::{Duration, Local, TimeZone};
use tv_proto::config::LineupConfig;
use tv_proto::lineup::{
    expand_template, has_placeholders, load_channels_from_toml, load_lineup, merge_guide,
    parse_channels_from_toml_str, parse_m3u_from_str,
};
use tv_proto::protocol::ArchiveLimit;

const PLAYLIST: &str = r#"#EXTM3U
#EXTINF:-1 tvg-id="one.uk" tvg-name="One HD" tvg-logo="http://logos/one.png" tvg-chno="101" group-title="News" catchup-days="2" catchup-source="http://cdn/one/{utc}/{offset}",One HD
http://cdn/one/live.m3u8
#EXTINF:-1 tvg-id="two.uk" group-title="Kids, Family" catchup-days="-1",Two
http://cdn/two/live.m3u8
#EXTINF:-1,Untagged
http://cdn/three/live.m3u8
"#;

#[test]
fn m3u_attributes_map_onto_channels() {
    let channels = parse_m3u_from_str(PLAYLIST).unwrap();
    assert_eq!(channels.len(), 3);

    let one = &channels[0];
    assert_eq!(one.id, "one.uk");
    assert_eq!(one.name, "One HD");
    assert_eq!(one.number, 101);
    assert_eq!(one.category, "News");
    assert!(one.is_hd);
    assert_eq!(one.logo_url.as_deref(), Some("http://logos/one.png"));
    assert_eq!(one.archive, ArchiveLimit::Bounded(48));
    assert_eq!(
        one.catchup_template.as_deref(),
        Some("http://cdn/one/{utc}/{offset}")
    );

    let two = &channels[1];
    assert_eq!(two.category, "Kids, Family");
    assert_eq!(two.name, "Two");
    assert_eq!(two.archive, ArchiveLimit::Unbounded);
    assert!(!two.is_hd);

    let three = &channels[2];
    assert_eq!(three.id, "ch3");
    assert_eq!(three.number, 3);
    assert_eq!(three.archive, ArchiveLimit::Unknown);
    assert_eq!(three.stream_template, "http://cdn/three/live.m3u8");
}

#[test]
fn oversized_catchup_days_saturate() {
    let playlist = "#EXTM3U\n#EXTINF:-1 tvg-id=\"big\" catchup-days=\"200000000\",Big\nhttp://cdn/big.m3u8\n#EXTINF:-1 tvg-id=\"huge\" catchup-days=\"9223372036854775807\",Huge\nhttp://cdn/huge.m3u8\n";
    let channels = parse_m3u_from_str(playlist).unwrap();
    assert_eq!(channels[0].archive, ArchiveLimit::Bounded(u32::MAX));
    assert_eq!(channels[1].archive, ArchiveLimit::Bounded(u32::MAX));

    let window = tv_proto::protocol::ArchiveWindow::new(channels[1].archive);
    let now = Local::now();
    assert!(!tv_proto::archive::is_out_of_range(&window, now, now));
}

const LINEUP: &str = r#"
[[channel]]
id = "arte"
name = "Arte"
url = "http://cdn/arte/live.m3u8"
catchup_url = "http://cdn/arte/archive?start={utc}"
category = "Culture"
hd = true
archive_hours = 72

[[channel.program]]
title = "Late film"
start = "2024-05-14T22:00:00+00:00"
end = "2024-05-15T00:00:00+00:00"

[[channel.program]]
title = "Evening doc"
description = "Whales."
start = "2024-05-14T20:00:00+00:00"
end = "2024-05-14T21:00:00+00:00"

[[channel.program]]
title = "Overlaps the doc"
start = "2024-05-14T20:30:00+00:00"
end = "2024-05-14T21:30:00+00:00"

[[channel]]
id = "loop"
name = "Loop"
url = "http://cdn/loop.m3u8"
archive_hours = "unlimited"

[[channel]]
id = "plain"
name = "Plain"
url = "http://cdn/plain.m3u8"
archive_hours = 0
favorite = true
"#;

#[test]
fn toml_lineup_sorts_and_dedups_programs() {
    let channels = parse_channels_from_toml_str(LINEUP).unwrap();
    assert_eq!(channels.len(), 3);

    let arte = &channels[0];
    assert_eq!(arte.number, 1);
    assert_eq!(arte.archive, ArchiveLimit::Bounded(72));
    let titles: Vec<_> = arte.programs.iter().map(|p| p.title()).collect();
    assert_eq!(titles, vec!["Evening doc", "Late film"]);
    assert_eq!(arte.programs[0].description(), "Whales.");

    assert_eq!(channels[1].archive, ArchiveLimit::Unbounded);
    // 0 hours back from a provider means "not reported"
    assert_eq!(channels[2].archive, ArchiveLimit::Unknown);
    assert!(channels[2].favorite);
}

#[test]
fn toml_lineup_rejects_unknown_archive_word() {
    let bad = r#"
[[channel]]
id = "x"
name = "X"
url = "http://x"
archive_hours = "forever-ish"
"#;
    assert!(parse_channels_from_toml_str(bad).is_err());
}

#[test]
fn toml_lineup_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("channels.toml");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(LINEUP.as_bytes())
        .unwrap();
    let channels = load_channels_from_toml(&path).unwrap();
    assert_eq!(channels.len(), 3);
}

#[tokio::test]
async fn load_lineup_prefers_toml_then_m3u() {
    let dir = tempfile::tempdir().unwrap();
    let m3u_path = dir.path().join("tv.m3u");
    std::fs::write(&m3u_path, PLAYLIST).unwrap();

    let config = LineupConfig {
        lineup_toml: dir.path().join("missing.toml"),
        m3u_url: m3u_path.display().to_string(),
        xmltv_url: None,
    };
    let channels = load_lineup(&config).await.unwrap();
    assert_eq!(channels.len(), 3);

    let toml_path = dir.path().join("channels.toml");
    std::fs::write(&toml_path, LINEUP).unwrap();
    let config = LineupConfig {
        lineup_toml: toml_path,
        ..config
    };
    let channels = load_lineup(&config).await.unwrap();
    assert_eq!(channels[0].id, "arte");
}

#[tokio::test]
async fn load_lineup_without_sources_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = LineupConfig {
        lineup_toml: dir.path().join("none.toml"),
        m3u_url: String::new(),
        xmltv_url: None,
    };
    assert!(load_lineup(&config).await.unwrap().is_empty());
}

#[tokio::test]
async fn load_lineup_merges_xmltv_guide() {
    let dir = tempfile::tempdir().unwrap();
    let m3u_path = dir.path().join("tv.m3u");
    std::fs::write(&m3u_path, PLAYLIST).unwrap();
    let xml_path = dir.path().join("guide.xml");
    std::fs::write(
        &xml_path,
        r#"<tv>
  <programme channel="two.uk" start="20240115090000 +0000" stop="20240115100000 +0000"><title>B</title></programme>
  <programme channel="two.uk" start="20240115080000 +0000" stop="20240115090000 +0000"><title>A</title></programme>
</tv>"#,
    )
    .unwrap();

    let config = LineupConfig {
        lineup_toml: dir.path().join("missing.toml"),
        m3u_url: m3u_path.display().to_string(),
        xmltv_url: Some(xml_path.display().to_string()),
    };
    let channels = load_lineup(&config).await.unwrap();
    let titles: Vec<_> = channels[1].programs.iter().map(|p| p.title()).collect();
    assert_eq!(titles, vec!["A", "B"]);
    assert!(channels[0].programs.is_empty());
}

#[test]
fn merge_guide_keeps_existing_schedule() {
    let mut channels = parse_channels_from_toml_str(LINEUP).unwrap();
    let before = channels[0].programs.len();
    let mut guide = std::collections::HashMap::new();
    guide.insert("arte".to_string(), Vec::new());
    assert_eq!(merge_guide(&mut channels, guide), 0);
    assert_eq!(channels[0].programs.len(), before);
}

#[test]
fn catchup_template_expansion() {
    let now = Local.with_ymd_and_hms(2024, 5, 14, 21, 0, 0).unwrap();
    let at = now - Duration::hours(2);
    let url = expand_template("http://cdn/x?utc={utc}&off={offset}&d={Y}-{m}-{d}T{H}:{M}", at, now);
    assert_eq!(
        url,
        format!(
            "http://cdn/x?utc={}&off=7200&d={}",
            at.timestamp(),
            at.format("%Y-%m-%dT%H:%M")
        )
    );
    assert_eq!(expand_template("http://plain", at, now), "http://plain");
    assert!(has_placeholders("http://x/{utc}"));
    assert!(!has_placeholders("http://x/live"));
}
