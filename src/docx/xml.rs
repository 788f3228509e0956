use anyhow::{anyhow, Context};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlEvent {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
}

/// Element and text events of one XML part. Declarations, comments and
/// processing instructions are dropped.
pub fn parse_xml_events(name: &str, xml_bytes: &[u8]) -> anyhow::Result<Vec<XmlEvent>> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("read xml event in {name}"))?;
        match ev {
            Event::Eof => break,
            Event::Start(s) => {
                events.push(XmlEvent::Start {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::End(e) => {
                events.push(XmlEvent::End {
                    name: bytes_to_string(e.name().as_ref()),
                });
            }
            Event::Empty(s) => {
                events.push(XmlEvent::Empty {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::Text(t) => {
                let txt = t.unescape().context("unescape text")?.into_owned();
                events.push(XmlEvent::Text { text: txt });
            }
            Event::CData(t) => {
                events.push(XmlEvent::CData {
                    text: bytes_to_string(t.into_inner()),
                });
            }
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }
    Ok(events)
}

fn collect_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        let key = bytes_to_string(a.key.as_ref());
        // raw, still-escaped value
        let val = bytes_to_string(a.value.as_ref());
        attrs.push((key, val));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

fn escape_text_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

/// Escape `text` for use as element content.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_text_into(&mut out, text);
    out
}

/// Fails unless `xml_bytes` parses and every element is closed by its own end tag.
pub fn check_well_formed(name: &str, xml_bytes: &[u8]) -> anyhow::Result<()> {
    let events = parse_xml_events(name, xml_bytes)?;
    let mut stack: Vec<&str> = Vec::new();
    for ev in &events {
        match ev {
            XmlEvent::Start { name: tag, .. } => stack.push(tag),
            XmlEvent::End { name: tag } => match stack.pop() {
                Some(open) if open == tag => {}
                Some(open) => return Err(anyhow!("{name}: </{tag}> closes <{open}>")),
                None => return Err(anyhow!("{name}: stray </{tag}>")),
            },
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        return Err(anyhow!("{name}: <{open}> is never closed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_attr_entity_refs_raw() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?><root xmlns:o="urn:test" o:gfxdata="A&#xD;&#xA;B"/>"#;
        let events = parse_xml_events("test.xml", xml).expect("parse xml");
        let XmlEvent::Empty { attrs, .. } = &events[0] else {
            panic!("expected empty root, got {events:?}");
        };
        assert!(attrs.contains(&("o:gfxdata".to_string(), "A&#xD;&#xA;B".to_string())));
    }

    #[test]
    fn text_is_unescaped() {
        let events = parse_xml_events("t", b"<a>x &amp; y</a>").expect("parse");
        assert_eq!(
            events[1],
            XmlEvent::Text {
                text: "x & y".to_string()
            }
        );
    }

    #[test]
    fn escape_covers_markup_chars() {
        assert_eq!(escape_text("a & <b> \"c\""), "a &amp; &lt;b&gt; \"c\"");
    }

    #[test]
    fn well_formedness() {
        assert!(check_well_formed("ok", b"<?xml version=\"1.0\"?><a><b/><c>t</c></a>").is_ok());
        assert!(check_well_formed("open", b"<a><b></a>").is_err());
        assert!(check_well_formed("unclosed", b"<a><b>").is_err());
    }
}
