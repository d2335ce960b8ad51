//! Minimal element tree over quick-xml for the layer container format.
//!
//! Attribute order is preserved so written documents are stable across
//! save cycles. Numeric attribute readers never fail: a missing
//! attribute yields the supplied default and a malformed one yields NaN.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(String),

    #[error("XML write error: {0}")]
    Write(String),

    #[error("Document has no root element")]
    NoRoot,

    #[error("Missing element <{0}>")]
    MissingElement(String),

    #[error("Unknown layer type: {0}")]
    UnknownType(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl ToString) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn attr_f64(&self, key: &str, default: f64) -> f64 {
        match self.attr(key) {
            Some(v) => v.trim().parse().unwrap_or(f64::NAN),
            None => default,
        }
    }

    pub fn attr_bool(&self, key: &str, default: bool) -> bool {
        match self.attr(key) {
            Some(v) => v.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }

    pub fn attr_string(&self, key: &str) -> String {
        self.attr(key).unwrap_or_default().to_string()
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    pub fn parse(text: &str) -> Result<XmlElement, XmlError> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(element_from_start(&e)?),
                Ok(Event::Empty(e)) => {
                    let el = element_from_start(&e)?;
                    attach(&mut stack, &mut root, el);
                }
                Ok(Event::End(_)) => {
                    if let Some(el) = stack.pop() {
                        attach(&mut stack, &mut root, el);
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(|e| XmlError::Parse(e.to_string()))?;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(XmlError::Parse(format!(
                        "at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Parse(format!("unclosed element <{}>", stack[stack.len() - 1].name)));
        }
        root.ok_or(XmlError::NoRoot)
    }

    pub fn to_xml_string(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| XmlError::Write(e.to_string()))?;
        self.write_to(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        if self.children.is_empty() && self.text.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| XmlError::Write(e.to_string()));
        }
        writer
            .write_event(Event::Start(start))
            .map_err(|e| XmlError::Write(e.to_string()))?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(|e| XmlError::Write(e.to_string()))?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| XmlError::Write(e.to_string()))
    }
}

fn element_from_start(e: &BytesStart) -> Result<XmlElement, XmlError> {
    let mut el = XmlElement::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XmlError::Parse(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Parse(err.to_string()))?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, el: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let doc = r#"<?xml version="1.0"?>
            <LayerContainer Generator="x">
              <ReferenceFrames><ReferenceFrame Name="ISS" Parent="Earth"/></ReferenceFrames>
              <Layers>
                <Layer Id="a" Name="Grid &amp; more">payload</Layer>
              </Layers>
            </LayerContainer>"#;
        let root = XmlElement::parse(doc).unwrap();
        assert_eq!(root.name, "LayerContainer");
        let frames = root.child("ReferenceFrames").unwrap();
        assert_eq!(frames.children_named("ReferenceFrame").count(), 1);
        let layer = root.child("Layers").unwrap().child("Layer").unwrap();
        assert_eq!(layer.attr("Name"), Some("Grid & more"));
        assert_eq!(layer.text, "payload");
    }

    #[test]
    fn test_write_escapes_and_reparses() {
        let mut root = XmlElement::new("Layer").with_attr("Name", "a<b>\"c\"");
        root.push_child(XmlElement::new("Data").with_attr("Rows", 3));
        let text = root.to_xml_string().unwrap();
        let back = XmlElement::parse(&text).unwrap();
        assert_eq!(back, root);
    }

    #[test]
    fn test_numeric_attribute_policy() {
        let el = XmlElement::new("Frame").with_attr("Scale", "2.5").with_attr("Lat", "north");
        assert_eq!(el.attr_f64("Scale", 1.0), 2.5);
        assert!(el.attr_f64("Lat", 0.0).is_nan());
        assert_eq!(el.attr_f64("Lng", 7.0), 7.0);
        assert!(!el.attr_bool("ShowAsPoint", false));
    }

    #[test]
    fn test_unclosed_element_is_error() {
        assert!(XmlElement::parse("<a><b></b>").is_err());
        assert_eq!(XmlElement::parse("   "), Err(XmlError::NoRoot));
    }

    #[test]
    fn test_set_attr_replaces_in_place() {
        let mut el = XmlElement::new("x").with_attr("A", 1).with_attr("B", 2);
        el.set_attr("A", 3);
        assert_eq!(el.attributes, vec![("A".into(), "3".into()), ("B".into(), "2".into())]);
    }
}
