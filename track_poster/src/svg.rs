//! Minimal SVG writer. Elements are rendered to strings in document order.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::geometry::XY;
use crate::PosterError;

/// Format a coordinate compactly: three decimals, trailing zeros dropped.
pub fn num(value: f64) -> String {
    let mut s = format!("{value:.3}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn points_attr(points: &[XY]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", num(p.x), num(p.y)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone, Debug)]
pub struct Element {
    name: &'static str,
    attrs: Vec<(&'static str, String)>,
    children: Vec<Element>,
    text: Option<String>,
}

impl Element {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attrs: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    pub fn attr(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((key, value.into()));
        self
    }

    pub fn num_attr(self, key: &'static str, value: f64) -> Self {
        self.attr(key, num(value))
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Tooltip text, emitted as a nested `<title>`.
    pub fn title(self, text: impl Into<String>) -> Self {
        self.child(Element::new("title").text(text))
    }

    pub fn desc(self, text: impl Into<String>) -> Self {
        self.child(Element::new("desc").text(text))
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn text_content(&self) -> Option<&str> {
        self.text.as_deref()
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(self.name);
        for (key, value) in &self.attrs {
            let _ = write!(out, r#" {}="{}""#, key, escape(value));
        }
        if self.children.is_empty() && self.text.is_none() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape(text));
        }
        for child in &self.children {
            child.write_to(out);
        }
        let _ = write!(out, "</{}>", self.name);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }
}

pub fn rect(insert: XY, size: XY) -> Element {
    Element::new("rect")
        .num_attr("x", insert.x)
        .num_attr("y", insert.y)
        .num_attr("width", size.x)
        .num_attr("height", size.y)
}

pub fn text(content: impl Into<String>, insert: XY) -> Element {
    Element::new("text")
        .num_attr("x", insert.x)
        .num_attr("y", insert.y)
        .text(content)
}

pub fn polyline(points: &[XY]) -> Element {
    Element::new("polyline")
        .attr("points", points_attr(points))
        .attr("fill", "none")
        .attr("stroke-linecap", "round")
        .attr("stroke-linejoin", "round")
}

pub fn circle(center: XY, r: f64) -> Element {
    Element::new("circle")
        .num_attr("cx", center.x)
        .num_attr("cy", center.y)
        .num_attr("r", r)
}

pub fn line(start: XY, end: XY) -> Element {
    Element::new("line")
        .num_attr("x1", start.x)
        .num_attr("y1", start.y)
        .num_attr("x2", end.x)
        .num_attr("y2", end.y)
}

/// A page sized in millimeters with a matching unit-less viewBox.
#[derive(Clone, Debug)]
pub struct SvgDocument {
    width: f64,
    height: f64,
    elements: Vec<Element>,
}

impl SvgDocument {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            elements: Vec::new(),
        }
    }

    pub fn size(&self) -> XY {
        XY::new(self.width, self.height)
    }

    pub fn add(&mut self, element: Element) {
        self.elements.push(element);
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Depth-first walk over every element, including nested ones.
    pub fn descendants(&self) -> Vec<&Element> {
        fn walk<'a>(e: &'a Element, out: &mut Vec<&'a Element>) {
            out.push(e);
            for c in &e.children {
                walk(c, out);
            }
        }
        let mut out = Vec::new();
        for e in &self.elements {
            walk(e, &mut out);
        }
        out
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="utf-8" ?>"#);
        out.push('\n');
        let _ = write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" version="1.1" width="{w}mm" height="{h}mm" viewBox="0 0 {w} {h}">"#,
            w = num(self.width),
            h = num(self.height),
        );
        out.push('\n');
        for element in &self.elements {
            element.write_to(&mut out);
            out.push('\n');
        }
        out.push_str("</svg>\n");
        out
    }

    pub fn save(&self, path: &Path) -> Result<(), PosterError> {
        fs::write(path, self.render())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_trims_trailing_zeros() {
        assert_eq!(num(10.0), "10");
        assert_eq!(num(2.6), "2.6");
        assert_eq!(num(1.23456), "1.235");
        assert_eq!(num(-0.0001), "0");
    }

    #[test]
    fn tooltips_are_child_elements() {
        let e = rect(XY::new(1.0, 2.0), XY::new(2.6, 2.6))
            .attr("fill", "#ff0000")
            .title("2024-03-15 5.0 km");
        assert_eq!(
            e.render(),
            r##"<rect x="1" y="2" width="2.6" height="2.6" fill="#ff0000"><title>2024-03-15 5.0 km</title></rect>"##
        );
    }

    #[test]
    fn document_declares_millimeter_size() {
        let mut doc = SvgDocument::new(200.0, 300.0);
        doc.add(text("A & B", XY::new(10.0, 20.0)));
        let out = doc.render();
        assert!(out.contains(r#"width="200mm" height="300mm" viewBox="0 0 200 300""#));
        assert!(out.contains("A &amp; B"));
        assert!(out.trim_end().ends_with("</svg>"));
    }
}
