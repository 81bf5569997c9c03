//! Markup tree.
//!
//! The minimal node tree pages and islands produce. Rendering is
//! deterministic, so two renders of equal trees yield identical text, which
//! is what island reconciliation compares.

use std::fmt::Write as _;

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Text content, escaped on render.
    Text(String),
    /// Pre-rendered markup, emitted verbatim.
    Raw(String),
    Fragment(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

/// Start an element.
pub fn el(tag: impl Into<String>) -> Element {
    Element {
        tag: tag.into(),
        attrs: Vec::new(),
        children: Vec::new(),
    }
}

pub fn text(content: impl ToString) -> Node {
    Node::Text(content.to_string())
}

pub fn raw(markup: impl Into<String>) -> Node {
    Node::Raw(markup.into())
}

pub fn fragment(children: impl IntoIterator<Item = Node>) -> Node {
    Node::Fragment(children.into_iter().collect())
}

impl Element {
    /// Set an attribute. A later value for the same name replaces the
    /// earlier one.
    pub fn attr(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
        self
    }

    pub fn id(self, id: impl ToString) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: impl ToString) -> Self {
        self.attr("class", class)
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl From<&str> for Node {
    fn from(content: &str) -> Self {
        Node::Text(content.to_string())
    }
}

impl From<String> for Node {
    fn from(content: String) -> Self {
        Node::Text(content)
    }
}

impl Node {
    /// Render to fragment text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    pub fn render_into(&self, out: &mut String) {
        match self {
            Node::Text(content) => out.push_str(&escape_text(content)),
            Node::Raw(markup) => out.push_str(markup),
            Node::Fragment(children) => {
                for child in children {
                    child.render_into(out);
                }
            }
            Node::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attrs {
                    let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
                }
                out.push('>');

                if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                    return;
                }

                for child in &element.children {
                    child.render_into(out);
                }
                let _ = write!(out, "</{}>", element.tag);
            }
        }
    }
}

/// Escape text content.
pub fn escape_text(content: &str) -> String {
    html_escape::encode_text(content).into_owned()
}

/// Escape a double-quoted attribute value.
pub fn escape_attr(value: &str) -> String {
    html_escape::encode_double_quoted_attribute(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_elements() {
        let node: Node = el("div")
            .class("card")
            .child(el("h1").child("Title"))
            .child(el("p").child(text(3)))
            .into();

        assert_eq!(
            node.render(),
            r#"<div class="card"><h1>Title</h1><p>3</p></div>"#
        );
    }

    #[test]
    fn escapes_text_and_attributes() {
        let node: Node = el("a")
            .attr("title", r#"say "hi""#)
            .child("<script>&</script>")
            .into();

        assert_eq!(
            node.render(),
            r#"<a title="say &quot;hi&quot;">&lt;script&gt;&amp;&lt;/script&gt;</a>"#
        );
    }

    #[test]
    fn void_elements_have_no_closing_tag() {
        let node: Node = el("input").attr("value", 1).into();
        assert_eq!(node.render(), r#"<input value="1">"#);
    }

    #[test]
    fn raw_is_not_escaped() {
        let node = fragment([raw("<b>x</b>"), text("&")]);
        assert_eq!(node.render(), "<b>x</b>&amp;");
    }

    #[test]
    fn later_attribute_replaces_earlier() {
        let element = el("div").class("a").class("b");
        assert_eq!(element.get_attr("class"), Some("b"));
    }
}
