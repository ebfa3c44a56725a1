//! CSV Extraction Trigger
//!
//! Splits the character content of configured elements on a separator
//! and re-emits the pieces as new child elements. Configuration binds a
//! slash path (with an optional `[@name eq "value"]` attribute
//! predicate) to an ordered list of `(index, element-name)` outputs:
//!
//! `<value key="product_model">SomeName|SomeCode</value>` becomes
//! `<value key="product_model"><product_name>SomeName</product_name>
//! <product_code>SomeCode</product_code></value>`.
//!
//! Running the trigger again over an already extracted document is a
//! no-op: the nested child elements abort the capture zone, and the
//! matched element no longer carries direct text.

use std::collections::HashMap;

use tracing::debug;

use crate::dom::document::Document;
use crate::dom::qname::QName;
use crate::error::{Error, Result};
use crate::sax::{AttributeList, ContentHandler, LexicalHandler};
use crate::storage::broker::Broker;
use crate::trigger::{DocumentTrigger, Parameters, ParamValue, TriggerEvent, Txn};

/// One configured output element of an extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExtractEntry {
    index: usize,
    element_name: String,
}

/// Extraction rule for one element path.
#[derive(Debug, Clone, Default)]
struct Extraction {
    /// `name eq value` attribute predicate, if any
    match_attr: Option<(String, String)>,
    /// Sorted ascending by index at configure time
    entries: Vec<ExtractEntry>,
}

impl Extraction {
    fn matches_attributes(&self, attributes: &AttributeList) -> bool {
        match &self.match_attr {
            None => true,
            Some((name, value)) => attributes
                .iter()
                .any(|a| a.name.local_name() == name && a.value == *value),
        }
    }
}

/// The element path of the SAX stream, as pushed/popped by element events.
#[derive(Debug, Default)]
struct NodePath {
    segments: Vec<QName>,
}

impl NodePath {
    fn add(&mut self, name: &QName) {
        self.segments.push(name.clone());
    }

    fn remove_last(&mut self) {
        self.segments.pop();
    }

    /// The `/`-joined local names, e.g. `/content/properties/value`.
    fn to_local_path(&self) -> String {
        let mut path = String::with_capacity(32);
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment.local_name());
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }
}

/// SAX filter extracting separated values into child elements.
///
/// Generic over the downstream handler the rewritten stream is forwarded
/// to (the document builder on the ingest path).
pub struct CsvExtractingTrigger<H> {
    output: H,
    separator: Option<String>,
    /// Path -> extraction rule
    extractions: HashMap<String, Extraction>,
    current_path: NodePath,
    /// Whether character data is being buffered for extraction
    capture: bool,
    char_buf: String,
}

impl<H> CsvExtractingTrigger<H> {
    /// Create an unconfigured trigger in front of `output`.
    pub fn new(output: H) -> Self {
        CsvExtractingTrigger {
            output,
            separator: None,
            extractions: HashMap::new(),
            current_path: NodePath::default(),
            capture: false,
            char_buf: String::new(),
        }
    }

    /// The downstream handler.
    pub fn output(&self) -> &H {
        &self.output
    }

    /// Tear down the filter, returning the downstream handler.
    pub fn into_output(self) -> H {
        self.output
    }

    fn parse_path_parameter(&mut self, path: &Parameters) -> Result<()> {
        let xpath = path.single_text("xpath").ok_or_else(|| {
            Error::InvalidTriggerConfig(
                "each path parameter needs exactly one xpath value".to_string(),
            )
        })?;

        let (path_expr, match_attr) = parse_xpath(xpath)?;

        let mut entries = Vec::new();
        for extract in path.get("extract") {
            let ParamValue::Nested(extract) = extract else {
                return Err(Error::InvalidTriggerConfig(
                    "extract entries must be structured parameters".to_string(),
                ));
            };
            let index = extract.single_text("index").ok_or_else(|| {
                Error::InvalidTriggerConfig("extract entry without an index".to_string())
            })?;
            let index = index.parse::<usize>().map_err(|_| {
                Error::InvalidTriggerConfig(format!("extract index is not a number: {index}"))
            })?;
            let element_name = extract.single_text("element-name").ok_or_else(|| {
                Error::InvalidTriggerConfig("extract entry without an element-name".to_string())
            })?;
            entries.push(ExtractEntry {
                index,
                element_name: element_name.to_string(),
            });
        }

        let extraction = self.extractions.entry(path_expr).or_default();
        if extraction.match_attr.is_none() {
            extraction.match_attr = match_attr;
        }
        extraction.entries.extend(entries);
        // The ordering guarantee is ascending extract index, regardless of
        // the order the configuration listed them in.
        extraction.entries.sort_by_key(|e| e.index);
        Ok(())
    }

    fn is_configured_for(&self, path: &str, attributes: &AttributeList) -> bool {
        match self.extractions.get(path) {
            Some(extraction) => extraction.matches_attributes(attributes),
            None => false,
        }
    }
}

impl<H: ContentHandler> CsvExtractingTrigger<H> {
    fn extract_values(&mut self) -> Result<()> {
        let Some(separator) = self.separator.as_deref() else {
            return Ok(());
        };
        let Some(extraction) = self.extractions.get(&self.current_path.to_local_path()) else {
            return Ok(());
        };
        let parts: Vec<&str> = self.char_buf.split(separator).collect();
        for entry in &extraction.entries {
            if entry.index >= parts.len() {
                continue;
            }
            let name = QName::local(entry.element_name.clone());
            self.output.start_element(&name, &AttributeList::empty())?;
            self.output.characters(parts[entry.index])?;
            self.output.end_element(&name)?;
        }
        Ok(())
    }
}

impl<H: ContentHandler> ContentHandler for CsvExtractingTrigger<H> {
    fn start_document(&mut self) -> Result<()> {
        self.output.start_document()
    }

    fn end_document(&mut self) -> Result<()> {
        self.output.end_document()
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.output.start_prefix_mapping(prefix, uri)
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.output.end_prefix_mapping(prefix)
    }

    fn start_element(&mut self, name: &QName, attributes: &AttributeList) -> Result<()> {
        // A nested element inside a capture zone aborts the capture; the
        // zone is left as it stands (this also skips already extracted
        // documents on update events).
        if self.capture {
            self.capture = false;
            self.char_buf.clear();
        }

        self.output.start_element(name, attributes)?;
        self.current_path.add(name);

        if self.is_configured_for(&self.current_path.to_local_path(), attributes) {
            self.capture = true;
            self.char_buf.clear();
        }
        Ok(())
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        if self.capture {
            self.extract_values()?;
            self.capture = false;
            self.char_buf.clear();
        }
        self.output.end_element(name)?;
        self.current_path.remove_last();
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if self.capture {
            self.char_buf.push_str(text);
            Ok(())
        } else {
            self.output.characters(text)
        }
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.output.processing_instruction(target, data)
    }
}

impl<H: LexicalHandler> LexicalHandler for CsvExtractingTrigger<H> {
    fn comment(&mut self, text: &str) -> Result<()> {
        self.output.comment(text)
    }
}

impl<H: ContentHandler + LexicalHandler> DocumentTrigger for CsvExtractingTrigger<H> {
    fn configure(
        &mut self,
        _broker: &dyn Broker,
        collection: &str,
        parameters: &Parameters,
    ) -> Result<()> {
        let separator = parameters.single_text("separator").ok_or_else(|| {
            Error::InvalidTriggerConfig(
                "a separator parameter must be provided to the CSV extraction trigger".to_string(),
            )
        })?;
        self.separator = Some(separator.to_string());

        for path in parameters.get("path") {
            let ParamValue::Nested(path) = path else {
                return Err(Error::InvalidTriggerConfig(
                    "path parameters must be structured".to_string(),
                ));
            };
            self.parse_path_parameter(path)?;
        }
        debug!(
            collection,
            extractions = self.extractions.len(),
            "csv extraction trigger configured"
        );
        Ok(())
    }

    fn prepare(
        &mut self,
        _event: TriggerEvent,
        _broker: &dyn Broker,
        _txn: &Txn,
        _document_path: &str,
        _existing: Option<&Document>,
    ) -> Result<()> {
        Ok(())
    }

    fn finish(
        &mut self,
        _event: TriggerEvent,
        _broker: &dyn Broker,
        _txn: &Txn,
        _document_path: &str,
        _document: Option<&Document>,
    ) {
    }
}

/// Split a trigger xpath into its path expression and optional attribute
/// predicate. Only `path[@name eq "value"]` predicates are understood.
fn parse_xpath(xpath: &str) -> Result<(String, Option<(String, String)>)> {
    let Some(bracket) = xpath.find('[') else {
        return Ok((xpath.to_string(), None));
    };
    let path_expr = xpath[..bracket].to_string();
    let Some(at) = xpath.find("[@") else {
        return Ok((path_expr, None));
    };
    let close = xpath[at..].find(']').ok_or_else(|| {
        Error::InvalidTriggerConfig(format!("unterminated predicate in xpath: {xpath}"))
    })? + at;
    let predicate = &xpath[at + 2..close];
    let (name, value) = predicate.split_once(" eq ").ok_or_else(|| {
        Error::InvalidTriggerConfig(format!(
            "only `name eq \"value\"` predicates are supported: {predicate}"
        ))
    })?;
    let value = value.replace('"', "");
    Ok((
        path_expr,
        Some((name.trim().to_string(), value.trim().to_string())),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sax::XmlWriter;
    use crate::storage::broker::MemoryBroker;

    fn extract_params(sep: &str, xpath: &str, extracts: &[(&str, &str)]) -> Parameters {
        let mut path = Parameters::new();
        path.add_text("xpath", xpath);
        for (index, name) in extracts {
            let mut e = Parameters::new();
            e.add_text("index", *index);
            e.add_text("element-name", *name);
            path.add_nested("extract", e);
        }
        let mut params = Parameters::new();
        params.add_text("separator", sep);
        params.add_nested("path", path);
        params
    }

    fn configured_trigger(params: &Parameters) -> CsvExtractingTrigger<XmlWriter> {
        let broker = MemoryBroker::new();
        let mut trigger = CsvExtractingTrigger::new(XmlWriter::new());
        trigger.configure(&broker, "/db/products", params).unwrap();
        trigger
    }

    fn kv(name: &str, value: &str) -> AttributeList {
        AttributeList::from(vec![crate::sax::SaxAttribute {
            name: QName::local(name),
            value: value.to_string(),
            attr_type: crate::dom::node::AttrType::Cdata,
        }])
    }

    fn drive_value_document(
        trigger: &mut CsvExtractingTrigger<XmlWriter>,
        key: &str,
        text: &str,
    ) {
        for name in ["content", "properties"] {
            trigger
                .start_element(&QName::local(name), &AttributeList::empty())
                .unwrap();
        }
        trigger
            .start_element(&QName::local("value"), &kv("key", key))
            .unwrap();
        trigger.characters(text).unwrap();
        trigger.end_element(&QName::local("value")).unwrap();
        for name in ["properties", "content"] {
            trigger.end_element(&QName::local(name)).unwrap();
        }
    }

    #[test]
    fn test_extraction_with_matching_predicate() {
        let params = extract_params(
            "|",
            "/content/properties/value[@key eq \"product_model\"]",
            &[("0", "product_name"), ("1", "product_code")],
        );
        let mut trigger = configured_trigger(&params);
        drive_value_document(&mut trigger, "product_model", "SomeName|SomeCode");

        assert_eq!(
            trigger.output().as_str(),
            "<content><properties><value key=\"product_model\">\
             <product_name>SomeName</product_name>\
             <product_code>SomeCode</product_code>\
             </value></properties></content>"
        );
    }

    #[test]
    fn test_predicate_mismatch_passes_through() {
        let params = extract_params(
            "|",
            "/content/properties/value[@key eq \"product_model\"]",
            &[("0", "product_name"), ("1", "product_code")],
        );
        let mut trigger = configured_trigger(&params);
        drive_value_document(&mut trigger, "other", "A|B");

        assert_eq!(
            trigger.output().as_str(),
            "<content><properties><value key=\"other\">A|B</value></properties></content>"
        );
    }

    #[test]
    fn test_extraction_without_predicate() {
        let params = extract_params("|", "/content/properties/value", &[("0", "name")]);
        let mut trigger = configured_trigger(&params);
        drive_value_document(&mut trigger, "anything", "First|Second");

        assert_eq!(
            trigger.output().as_str(),
            "<content><properties><value key=\"anything\">\
             <name>First</name></value></properties></content>"
        );
    }

    #[test]
    fn test_entries_emit_in_ascending_index_order() {
        // Configuration lists index 1 before index 0.
        let params = extract_params(
            "|",
            "/content/properties/value",
            &[("1", "second"), ("0", "first")],
        );
        let mut trigger = configured_trigger(&params);
        drive_value_document(&mut trigger, "k", "A|B");

        assert_eq!(
            trigger.output().as_str(),
            "<content><properties><value key=\"k\">\
             <first>A</first><second>B</second></value></properties></content>"
        );
    }

    #[test]
    fn test_index_beyond_parts_is_skipped() {
        let params = extract_params(
            "|",
            "/content/properties/value",
            &[("0", "first"), ("5", "missing")],
        );
        let mut trigger = configured_trigger(&params);
        drive_value_document(&mut trigger, "k", "OnlyOne");

        assert_eq!(
            trigger.output().as_str(),
            "<content><properties><value key=\"k\">\
             <first>OnlyOne</first></value></properties></content>"
        );
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let params = extract_params(
            "|",
            "/content/properties/value[@key eq \"product_model\"]",
            &[("0", "product_name"), ("1", "product_code")],
        );
        let mut first = configured_trigger(&params);
        drive_value_document(&mut first, "product_model", "SomeName|SomeCode");
        let first_output = first.into_output().into_string();

        // Re-run the extracted document through a fresh trigger: the
        // nested elements abort the capture zone.
        let mut second = configured_trigger(&params);
        for name in ["content", "properties"] {
            second
                .start_element(&QName::local(name), &AttributeList::empty())
                .unwrap();
        }
        second
            .start_element(&QName::local("value"), &kv("key", "product_model"))
            .unwrap();
        for (name, text) in [("product_name", "SomeName"), ("product_code", "SomeCode")] {
            second
                .start_element(&QName::local(name), &AttributeList::empty())
                .unwrap();
            second.characters(text).unwrap();
            second.end_element(&QName::local(name)).unwrap();
        }
        second.end_element(&QName::local("value")).unwrap();
        for name in ["properties", "content"] {
            second.end_element(&QName::local(name)).unwrap();
        }

        assert_eq!(second.output().as_str(), first_output);
    }

    #[test]
    fn test_missing_separator_rejected() {
        let broker = MemoryBroker::new();
        let mut trigger = CsvExtractingTrigger::new(XmlWriter::new());
        let err = trigger
            .configure(&broker, "/db", &Parameters::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTriggerConfig(_)));
    }

    #[test]
    fn test_flat_path_parameter_rejected() {
        let broker = MemoryBroker::new();
        let mut params = Parameters::new();
        params.add_text("separator", "|");
        params.add_text("path", "/content/value");
        let mut trigger = CsvExtractingTrigger::new(XmlWriter::new());
        let err = trigger.configure(&broker, "/db", &params).unwrap_err();
        assert!(matches!(err, Error::InvalidTriggerConfig(_)));
    }

    #[test]
    fn test_bad_extract_index_rejected() {
        let params = extract_params("|", "/a/b", &[("zero", "name")]);
        let broker = MemoryBroker::new();
        let mut trigger = CsvExtractingTrigger::new(XmlWriter::new());
        let err = trigger.configure(&broker, "/db", &params).unwrap_err();
        assert!(matches!(err, Error::InvalidTriggerConfig(_)));
    }

    #[test]
    fn test_bad_predicate_rejected() {
        let params = extract_params("|", "/a/b[@key != \"v\"]", &[("0", "name")]);
        let broker = MemoryBroker::new();
        let mut trigger = CsvExtractingTrigger::new(XmlWriter::new());
        let err = trigger.configure(&broker, "/db", &params).unwrap_err();
        assert!(matches!(err, Error::InvalidTriggerConfig(_)));
    }

    #[test]
    fn test_comments_pass_through() {
        let params = extract_params("|", "/a", &[("0", "x")]);
        let mut trigger = configured_trigger(&params);
        trigger.comment(" hi ").unwrap();
        assert_eq!(trigger.output().as_str(), "<!-- hi -->");
    }

    #[test]
    fn test_parse_xpath_variants() {
        assert_eq!(parse_xpath("/a/b").unwrap(), ("/a/b".to_string(), None));
        assert_eq!(
            parse_xpath("/a/b[@key eq \"v\"]").unwrap(),
            (
                "/a/b".to_string(),
                Some(("key".to_string(), "v".to_string()))
            )
        );
        // A positional predicate is not an attribute predicate.
        assert_eq!(parse_xpath("/a/b[1]").unwrap(), ("/a/b".to_string(), None));
        assert!(parse_xpath("/a/b[@key eq \"v\"").is_err());
    }
}
