//! SAX Collectors
//!
//! `EventCollector` gathers a stream into owned events for inspection;
//! `XmlWriter` prints a stream back to markup. Both implement the content
//! and lexical handler traits so they can terminate any pipeline stage.

use crate::dom::qname::QName;
use crate::error::Result;
use crate::sax::{AttributeList, ContentHandler, LexicalHandler, SaxEvent};

/// Collector that gathers SAX events into a vector.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<SaxEvent>,
}

impl EventCollector {
    /// Create a new collector.
    pub fn new() -> Self {
        EventCollector {
            events: Vec::with_capacity(64),
        }
    }

    /// The collected events so far.
    pub fn events(&self) -> &[SaxEvent] {
        &self.events
    }

    /// Take the collected events.
    pub fn take_events(&mut self) -> Vec<SaxEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of collected events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

impl ContentHandler for EventCollector {
    fn start_document(&mut self) -> Result<()> {
        self.events.push(SaxEvent::StartDocument);
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        self.events.push(SaxEvent::EndDocument);
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.events.push(SaxEvent::StartPrefixMapping {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        });
        Ok(())
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.events.push(SaxEvent::EndPrefixMapping {
            prefix: prefix.to_string(),
        });
        Ok(())
    }

    fn start_element(&mut self, name: &QName, attributes: &AttributeList) -> Result<()> {
        self.events.push(SaxEvent::StartElement {
            name: name.clone(),
            attributes: attributes.iter().cloned().collect(),
        });
        Ok(())
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        self.events.push(SaxEvent::EndElement { name: name.clone() });
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.events.push(SaxEvent::Characters(text.to_string()));
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.events.push(SaxEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
        Ok(())
    }
}

impl LexicalHandler for EventCollector {
    fn comment(&mut self, text: &str) -> Result<()> {
        self.events.push(SaxEvent::Comment(text.to_string()));
        Ok(())
    }
}

/// Handler that prints the event stream back to markup.
#[derive(Debug, Default)]
pub struct XmlWriter {
    out: String,
}

impl XmlWriter {
    pub fn new() -> Self {
        XmlWriter {
            out: String::with_capacity(256),
        }
    }

    /// The markup written so far.
    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// Take the written markup.
    pub fn into_string(self) -> String {
        self.out
    }

    fn push_escaped_text(&mut self, text: &str) {
        for c in text.chars() {
            match c {
                '&' => self.out.push_str("&amp;"),
                '<' => self.out.push_str("&lt;"),
                '>' => self.out.push_str("&gt;"),
                _ => self.out.push(c),
            }
        }
    }

    fn push_escaped_attr(&mut self, value: &str) {
        for c in value.chars() {
            match c {
                '&' => self.out.push_str("&amp;"),
                '<' => self.out.push_str("&lt;"),
                '"' => self.out.push_str("&quot;"),
                _ => self.out.push(c),
            }
        }
    }
}

impl ContentHandler for XmlWriter {
    fn start_element(&mut self, name: &QName, attributes: &AttributeList) -> Result<()> {
        self.out.push('<');
        self.out.push_str(&name.to_string());
        for attr in attributes {
            self.out.push(' ');
            self.out.push_str(&attr.name.to_string());
            self.out.push_str("=\"");
            self.push_escaped_attr(&attr.value);
            self.out.push('"');
        }
        self.out.push('>');
        Ok(())
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        self.out.push_str("</");
        self.out.push_str(&name.to_string());
        self.out.push('>');
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.push_escaped_text(text);
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.out.push_str("<?");
        self.out.push_str(target);
        if !data.is_empty() {
            self.out.push(' ');
            self.out.push_str(data);
        }
        self.out.push_str("?>");
        Ok(())
    }
}

impl LexicalHandler for XmlWriter {
    fn comment(&mut self, text: &str) -> Result<()> {
        self.out.push_str("<!--");
        self.out.push_str(text);
        self.out.push_str("-->");
        Ok(())
    }
}
