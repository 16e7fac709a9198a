use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use thiserror::Error;

/// Parsed RSS document, kept only for one fetch-and-ingest pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeed {
    pub title: String,
    pub items: Vec<RawItem>,
}

/// One `<item>` exactly as the feed supplied it. Nothing is trimmed or
/// interpreted here; `pub_date` stays a string so the ingester decides how
/// to handle dates it cannot read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Document ended inside <{0}>")]
    Truncated(String),
    #[error("No <channel> element")]
    MissingChannel,
}

/// Item child elements that are kept. Matched on the full name, so
/// namespaced siblings such as `itunes:title` or `atom:link` never match.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    ChannelTitle,
    Title,
    Link,
    Description,
    PubDate,
}

impl Slot {
    fn for_item_child(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Slot::Title),
            b"link" => Some(Slot::Link),
            b"description" => Some(Slot::Description),
            b"pubDate" => Some(Slot::PubDate),
            _ => None,
        }
    }
}

#[derive(Default)]
struct ItemFields {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
}

impl ItemFields {
    fn field(&mut self, slot: Slot) -> Option<&mut Option<String>> {
        match slot {
            Slot::Title => Some(&mut self.title),
            Slot::Link => Some(&mut self.link),
            Slot::Description => Some(&mut self.description),
            Slot::PubDate => Some(&mut self.pub_date),
            Slot::ChannelTitle => None,
        }
    }

    fn finish(self) -> RawItem {
        RawItem {
            title: self.title.unwrap_or_default(),
            link: self.link.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            pub_date: self.pub_date.unwrap_or_default(),
        }
    }
}

/// Accumulates a [`RawFeed`] from reader events.
///
/// Only `<root><channel>` and its direct `<item>` children are read. For
/// each kept element the first occurrence wins; repeats and deeper markup
/// are ignored.
#[derive(Default)]
struct FeedBuilder {
    path: Vec<Vec<u8>>,
    seen_channel: bool,
    channel_title: Option<String>,
    item: Option<ItemFields>,
    items: Vec<RawItem>,
    capture: Option<(Slot, usize)>,
    text: String,
}

impl FeedBuilder {
    fn in_channel(&self) -> bool {
        self.path.get(1).is_some_and(|n| n.as_slice() == b"channel")
    }

    fn open(&mut self, name: &[u8]) {
        self.path.push(name.to_vec());
        let depth = self.path.len();
        if !self.in_channel() {
            return;
        }

        match (depth, name) {
            (2, _) => self.seen_channel = true,
            (3, b"item") => self.item = Some(ItemFields::default()),
            (3, b"title") if self.channel_title.is_none() => {
                self.start_capture(Slot::ChannelTitle, depth);
            }
            (4, _) if self.path[2].as_slice() == b"item" => {
                let unset = Slot::for_item_child(name).filter(|slot| {
                    self.item
                        .as_mut()
                        .and_then(|item| item.field(*slot))
                        .is_some_and(|field| field.is_none())
                });
                if let Some(slot) = unset {
                    self.start_capture(slot, depth);
                }
            }
            _ => {}
        }
    }

    fn start_capture(&mut self, slot: Slot, depth: usize) {
        self.capture = Some((slot, depth));
        self.text.clear();
    }

    fn text(&mut self, chunk: &str) {
        if matches!(self.capture, Some((_, depth)) if depth == self.path.len()) {
            self.text.push_str(chunk);
        }
    }

    fn close(&mut self) {
        let depth = self.path.len();
        if let Some((slot, capture_depth)) = self.capture {
            if capture_depth == depth {
                let value = std::mem::take(&mut self.text);
                match slot {
                    Slot::ChannelTitle => self.channel_title = Some(value),
                    _ => {
                        if let Some(field) = self.item.as_mut().and_then(|item| item.field(slot)) {
                            *field = Some(value);
                        }
                    }
                }
                self.capture = None;
            }
        }

        if depth == 3 && self.in_channel() && self.path[2].as_slice() == b"item" {
            if let Some(item) = self.item.take() {
                self.items.push(item.finish());
            }
        }
        self.path.pop();
    }

    fn finish(self) -> Result<RawFeed, ParseError> {
        if let Some(open) = self.path.last() {
            return Err(ParseError::Truncated(
                String::from_utf8_lossy(open).into_owned(),
            ));
        }
        if !self.seen_channel {
            return Err(ParseError::MissingChannel);
        }
        Ok(RawFeed {
            title: self.channel_title.unwrap_or_default(),
            items: self.items,
        })
    }
}

/// Decode an RSS 2.0 body into a [`RawFeed`].
///
/// Missing child elements decode as empty strings and unknown or
/// namespaced elements are ignored. A body without a `<channel>` is an
/// error. The root element name itself is not checked.
pub fn parse_rss(bytes: &[u8]) -> Result<RawFeed, ParseError> {
    let text = String::from_utf8_lossy(bytes);
    let mut reader = Reader::from_str(&text);
    let mut builder = FeedBuilder::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => builder.open(e.name().as_ref()),
            Event::End(_) => builder.close(),
            Event::Empty(e) => {
                builder.open(e.name().as_ref());
                builder.close();
            }
            Event::Text(e) => {
                // Undeclared entities (e.g. &nbsp;) keep their raw form
                let chunk = e
                    .unescape()
                    .unwrap_or_else(|_| Cow::Owned(String::from_utf8_lossy(&e).into_owned()));
                builder.text(&chunk);
            }
            Event::CData(e) => builder.text(&String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
    }

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_channel_and_items_in_order() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Boot.dev Blog</title>
    <link>https://blog.boot.dev/</link>
    <description>Latest posts</description>
    <item>
      <title>First</title>
      <link>https://blog.boot.dev/first/</link>
      <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
      <description>One</description>
    </item>
    <item>
      <title>Second</title>
      <link>https://blog.boot.dev/second/</link>
      <pubDate>Tue, 03 Jan 2006 15:04:05 -0700</pubDate>
      <description><![CDATA[<p>Two</p>]]></description>
    </item>
  </channel>
</rss>"#;

        let feed = parse_rss(xml.as_bytes()).unwrap();
        assert_eq!(feed.title, "Boot.dev Blog");
        assert_eq!(feed.items.len(), 2);
        assert_eq!(
            feed.items[0],
            RawItem {
                title: "First".into(),
                link: "https://blog.boot.dev/first/".into(),
                description: "One".into(),
                pub_date: "Mon, 02 Jan 2006 15:04:05 -0700".into(),
            }
        );
        assert_eq!(feed.items[1].description, "<p>Two</p>");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let xml = r#"<rss><channel><item><link>https://x/2</link></item></channel></rss>"#;
        let feed = parse_rss(xml.as_bytes()).unwrap();
        assert_eq!(feed.title, "");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].title, "");
        assert_eq!(feed.items[0].pub_date, "");
        assert_eq!(feed.items[0].link, "https://x/2");
    }

    #[test]
    fn test_empty_channel() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#;
        let feed = parse_rss(xml.as_bytes()).unwrap();
        assert!(feed.items.is_empty());
    }

    #[test]
    fn test_items_interleaved_with_other_elements() {
        let xml = r#"<rss><channel>
            <item><title>A</title><link>https://x/1</link></item>
            <lastBuildDate>Mon, 02 Jan 2006 15:04:05 -0700</lastBuildDate>
            <item><title>B</title><link>https://x/2</link></item>
        </channel></rss>"#;
        let feed = parse_rss(xml.as_bytes()).unwrap();
        let titles: Vec<&str> = feed.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn test_malformed_xml_is_error() {
        assert!(parse_rss(b"<not valid xml").is_err());
    }

    #[test]
    fn test_document_without_channel_is_error() {
        assert!(matches!(
            parse_rss(b"<html><body>hello</body></html>"),
            Err(ParseError::MissingChannel)
        ));
    }

    #[test]
    fn test_namespaced_siblings_are_ignored() {
        let xml = r#"<rss version="2.0"
            xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"
            xmlns:media="http://search.yahoo.com/mrss/"
            xmlns:atom="http://www.w3.org/2005/Atom">
          <channel>
            <title>Podcast</title>
            <itunes:title>Podcast (iTunes)</itunes:title>
            <atom:link href="https://x/feed" rel="self" type="application/rss+xml"/>
            <item>
              <itunes:title>Episode 1 (iTunes)</itunes:title>
              <title>Episode 1</title>
              <media:title>Episode 1 (media)</media:title>
              <atom:link href="https://x/alt/1" rel="alternate"/>
              <link>https://x/1</link>
              <media:description>alt text</media:description>
              <description>Show notes</description>
            </item>
          </channel>
        </rss>"#;

        let feed = parse_rss(xml.as_bytes()).unwrap();
        assert_eq!(feed.title, "Podcast");
        assert_eq!(
            feed.items,
            vec![RawItem {
                title: "Episode 1".into(),
                link: "https://x/1".into(),
                description: "Show notes".into(),
                pub_date: String::new(),
            }]
        );
    }

    #[test]
    fn test_atom_link_after_link_keeps_plain_link() {
        let xml = r#"<rss><channel><item>
            <title>A</title>
            <link>https://x/1</link>
            <atom:link href="https://x/other"/>
        </item></channel></rss>"#;
        let feed = parse_rss(xml.as_bytes()).unwrap();
        assert_eq!(feed.items[0].link, "https://x/1");
    }

    #[test]
    fn test_repeated_element_first_wins() {
        let xml = r#"<rss><channel><item>
            <title>First</title><title>Second</title><link>https://x/1</link>
        </item></channel></rss>"#;
        let feed = parse_rss(xml.as_bytes()).unwrap();
        assert_eq!(feed.items[0].title, "First");
    }

    #[test]
    fn test_nested_markup_in_item_is_skipped() {
        let xml = r#"<rss><channel><item>
            <title>A &amp; B</title>
            <link>https://x/1</link>
            <source url="https://other"><title>Not this</title></source>
            <description>caf&eacute; <![CDATA[<b>bold</b>]]></description>
        </item></channel></rss>"#;
        let feed = parse_rss(xml.as_bytes()).unwrap();
        assert_eq!(feed.items[0].title, "A & B");
        assert_eq!(feed.items[0].description, "caf&eacute; <b>bold</b>");
    }

    #[test]
    fn test_truncated_document_is_error() {
        let xml = r#"<rss><channel><item><title>A</title>"#;
        assert!(parse_rss(xml.as_bytes()).is_err());
    }
}
