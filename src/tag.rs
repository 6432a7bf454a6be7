use std::collections::HashMap;
use std::path::PathBuf;

use regex::Regex;
use tracing::debug;

use crate::chapter::Chapter;

/// Assembled output metadata. Fields stay `None` until a source fills them;
/// the layering in [`layer`] makes higher-precedence sources win.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub title: Option<String>,
    pub sort_title: Option<String>,
    pub album: Option<String>,
    pub sort_album: Option<String>,
    pub artist: Option<String>,
    pub sort_artist: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub writer: Option<String>,
    pub year: Option<String>,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub comment: Option<String>,
    pub copyright: Option<String>,
    pub encoded_by: Option<String>,
    pub series: Option<String>,
    pub series_part: Option<String>,
    pub cover: Option<PathBuf>,
}

macro_rules! fill_missing {
    ($target:expr, $source:expr, $($field:ident),+) => {
        $(
            if $target.$field.is_none() {
                $target.$field = $source.$field.clone();
            }
        )+
    };
}

impl Tag {
    /// Fill still-unset fields from a lower-precedence source.
    pub fn fill_missing_from(&mut self, source: &Tag) {
        fill_missing!(
            self, source, title, sort_title, album, sort_album, artist, sort_artist,
            album_artist, genre, writer, year, description, long_description, comment,
            copyright, encoded_by, series, series_part, cover
        );
    }

    /// Build a partial tag from ffmpeg-convention key/value metadata
    /// (ffprobe format tags or an FFMETADATA global section), keys lowercase.
    pub fn from_ff_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            title: get("title"),
            sort_title: get("sort_name"),
            album: get("album"),
            sort_album: get("sort_album"),
            artist: get("artist"),
            sort_artist: get("sort_artist"),
            album_artist: get("album_artist"),
            genre: get("genre"),
            writer: get("composer"),
            year: get("date").or_else(|| get("year")),
            description: get("description"),
            long_description: get("synopsis"),
            comment: get("comment"),
            copyright: get("copyright"),
            encoded_by: get("encoded_by"),
            series: get("show"),
            series_part: get("episode_id"),
            cover: None,
        }
    }

    /// Extract the fields an OPF package description carries.
    pub fn from_opf(content: &str) -> Self {
        let element = |name: &str| {
            Regex::new(&format!(r"(?s)<dc:{name}[^>]*>(.*?)</dc:{name}>"))
                .ok()
                .and_then(|re| re.captures(content))
                .map(|c| decode_entities(c[1].trim()))
                .filter(|v| !v.is_empty())
        };
        let meta = |name: &str| {
            Regex::new(&format!(
                r#"<meta\s+name="calibre:{name}"\s+content="([^"]*)""#
            ))
            .ok()
            .and_then(|re| re.captures(content))
            .map(|c| decode_entities(c[1].trim()))
            .filter(|v| !v.is_empty())
        };

        let year = element("date").and_then(|date| {
            Regex::new(r"\d{4}")
                .ok()
                .and_then(|re| re.find(&date).map(|m| m.as_str().to_string()))
        });

        debug!("reading tag fields from OPF package description");

        Self {
            title: element("title"),
            artist: element("creator"),
            genre: element("subject"),
            year,
            description: element("description"),
            series: meta("series"),
            series_part: meta("series_index"),
            ..Self::default()
        }
    }
}

/// Assemble a tag from sources ordered highest precedence first; later
/// sources only fill fields the earlier ones left unset.
pub fn layer(sources: Vec<Tag>) -> Tag {
    let mut result = Tag::default();
    for source in &sources {
        result.fill_missing_from(source);
    }
    result
}

/// Render the tag and chapter list as an FFMETADATA1 document.
pub fn to_ffmetadata(tag: &Tag, chapters: &[Chapter]) -> String {
    let mut output = String::from(";FFMETADATA1\n");

    let mut field = |key: &str, value: &Option<String>| {
        if let Some(value) = value {
            output.push_str(key);
            output.push('=');
            output.push_str(&escape_ffmetadata(value));
            output.push('\n');
        }
    };

    field("title", &tag.title);
    field("sort_name", &tag.sort_title);
    field("album", &tag.album);
    field("sort_album", &tag.sort_album);
    field("artist", &tag.artist);
    field("sort_artist", &tag.sort_artist);
    field("album_artist", &tag.album_artist);
    field("genre", &tag.genre);
    field("composer", &tag.writer);
    field("date", &tag.year);
    field("description", &tag.description);
    field("synopsis", &tag.long_description);
    field("comment", &tag.comment);
    field("copyright", &tag.copyright);
    field("encoded_by", &tag.encoded_by);
    field("show", &tag.series);
    field("episode_id", &tag.series_part);

    for chapter in chapters {
        output.push_str("[CHAPTER]\nTIMEBASE=1/1000\n");
        output.push_str(&format!("START={}\n", chapter.start.as_millis()));
        output.push_str(&format!("END={}\n", chapter.end().as_millis()));
        output.push_str(&format!("title={}\n", escape_ffmetadata(&chapter.title)));
    }

    output
}

fn escape_ffmetadata(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '=' | ';' | '#' | '\\' => {
                result.push('\\');
                result.push(c);
            }
            '\n' => result.push_str("\\\n"),
            _ => result.push(c),
        }
    }
    result
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tag_with_title(title: &str) -> Tag {
        Tag {
            title: Some(title.to_string()),
            ..Tag::default()
        }
    }

    #[test]
    fn test_layer_precedence() {
        let overrides = Tag {
            title: Some("CLI Title".to_string()),
            ..Tag::default()
        };
        let opf = Tag {
            title: Some("OPF Title".to_string()),
            artist: Some("OPF Author".to_string()),
            ..Tag::default()
        };
        let baseline = Tag {
            title: Some("File Title".to_string()),
            artist: Some("File Author".to_string()),
            genre: Some("Audiobook".to_string()),
            ..Tag::default()
        };

        let tag = layer(vec![overrides, opf, baseline]);

        assert_eq!(tag.title.as_deref(), Some("CLI Title"));
        assert_eq!(tag.artist.as_deref(), Some("OPF Author"));
        assert_eq!(tag.genre.as_deref(), Some("Audiobook"));
    }

    #[test]
    fn test_layer_empty_sources() {
        let tag = layer(vec![Tag::default(), tag_with_title("fallback")]);
        assert_eq!(tag.title.as_deref(), Some("fallback"));
    }

    #[test]
    fn test_from_ff_map() {
        let mut map = HashMap::new();
        map.insert("title".to_string(), "My Book".to_string());
        map.insert("artist".to_string(), "An Author".to_string());
        map.insert("date".to_string(), "2019".to_string());
        map.insert("composer".to_string(), "A Narrator".to_string());
        map.insert("album".to_string(), "  ".to_string());

        let tag = Tag::from_ff_map(&map);
        assert_eq!(tag.title.as_deref(), Some("My Book"));
        assert_eq!(tag.artist.as_deref(), Some("An Author"));
        assert_eq!(tag.year.as_deref(), Some("2019"));
        assert_eq!(tag.writer.as_deref(), Some("A Narrator"));
        assert!(tag.album.is_none());
    }

    #[test]
    fn test_from_opf() {
        let content = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>The Long Way</dc:title>
    <dc:creator opf:role="aut">Jane Doe</dc:creator>
    <dc:description>A story of roads &amp; rivers.</dc:description>
    <dc:date>2017-05-01</dc:date>
    <meta name="calibre:series" content="Wayfarers"/>
    <meta name="calibre:series_index" content="1"/>
  </metadata>
</package>"#;

        let tag = Tag::from_opf(content);
        assert_eq!(tag.title.as_deref(), Some("The Long Way"));
        assert_eq!(tag.artist.as_deref(), Some("Jane Doe"));
        assert_eq!(tag.description.as_deref(), Some("A story of roads & rivers."));
        assert_eq!(tag.year.as_deref(), Some("2017"));
        assert_eq!(tag.series.as_deref(), Some("Wayfarers"));
        assert_eq!(tag.series_part.as_deref(), Some("1"));
    }

    #[test]
    fn test_from_opf_missing_fields() {
        let tag = Tag::from_opf("<package></package>");
        assert_eq!(tag, Tag::default());
    }

    #[test]
    fn test_to_ffmetadata_escapes_and_chapters() {
        let tag = Tag {
            title: Some("A = B; #1".to_string()),
            ..Tag::default()
        };
        let chapters = vec![Chapter::new(
            Duration::ZERO,
            Duration::from_secs(90),
            "Intro",
        )];

        let output = to_ffmetadata(&tag, &chapters);
        assert!(output.starts_with(";FFMETADATA1\n"));
        assert!(output.contains("title=A \\= B\\; \\#1\n"));
        assert!(output.contains("[CHAPTER]"));
        assert!(output.contains("TIMEBASE=1/1000"));
        assert!(output.contains("START=0"));
        assert!(output.contains("END=90000"));
        assert!(output.contains("title=Intro"));
    }
}
