//! Conversion of the HTML found in event titles, locations and descriptions to plain text.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};

static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^https?://(?:www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b(?:[-a-zA-Z0-9()@:%_\+.~#?&/=]*)$",
    )
    .expect("URL pattern is valid")
});

/// Returns whether `text` consists of nothing but a http(s) URL.
pub fn is_url(text: &str) -> bool {
    URL.is_match(text)
}

/// Converts HTML to plain text.
///
/// Tags are dropped, `<br>` becomes a line break, paragraphs and lists are separated by blank
/// lines and list items are rendered as `* item`, indented by two spaces per nesting level.
/// Links become `text (href)` unless the text already is the URL.
pub fn strip_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut writer = TextWriter::new();

    walk(fragment.root_element(), &mut writer);

    writer.finish()
}

fn walk(element: ElementRef<'_>, writer: &mut TextWriter) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if matches!(name, "script" | "style") {
                continue;
            }

            writer.start(name, child_element.value().attr("href"));
            walk(child_element, writer);
            writer.end(name);
        } else if let Some(text) = child.value().as_text() {
            writer.text(text);
        }
    }
}

/// Where the writer stands relative to block elements.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Boundary {
    /// Inside running text.
    Inline,
    /// Right after a block was opened, before any text.
    Opened,
    /// Right after a block was closed, before any text.
    Closed,
}

#[derive(Debug)]
struct Anchor {
    href: String,
    text: String,
}

/// Turns a stream of start tags, end tags and text into plain text.
#[derive(Debug)]
pub(crate) struct TextWriter {
    out: String,
    boundary: Boundary,
    /// Nesting level of the innermost list, -1 outside of lists.
    list_depth: i32,
    anchor: Option<Anchor>,
}

impl TextWriter {
    pub(crate) fn new() -> TextWriter {
        TextWriter {
            out: String::new(),
            boundary: Boundary::Inline,
            list_depth: -1,
            anchor: None,
        }
    }

    pub(crate) fn start(&mut self, tag: &str, href: Option<&str>) {
        if self.boundary == Boundary::Closed {
            self.boundary = Boundary::Inline;
        }

        match tag {
            "a" => {
                self.anchor = href.map(|href| Anchor {
                    href: href.to_owned(),
                    text: String::new(),
                });
            }
            "br" => self.out.push('\n'),
            "p" => {
                if self.boundary != Boundary::Opened {
                    self.out.push('\n');
                }
                self.boundary = Boundary::Opened;
            }
            "ul" | "ol" => {
                if self.boundary != Boundary::Opened && self.list_depth <= 0 {
                    self.out.push('\n');
                }
                self.list_depth += 1;
                self.boundary = Boundary::Opened;
            }
            "li" => {
                for _ in 0..self.list_depth.max(0) {
                    self.out.push_str("  ");
                }
                self.out.push_str("* ");
                self.boundary = Boundary::Opened;
            }
            _ => {}
        }
    }

    pub(crate) fn end(&mut self, tag: &str) {
        if self.boundary == Boundary::Opened {
            self.boundary = Boundary::Inline;
        }

        match tag {
            "a" => {
                if let Some(anchor) = self.anchor.take() {
                    if !is_url(anchor.text.trim()) {
                        self.out.push_str(" (");
                        self.out.push_str(&anchor.href);
                        self.out.push(')');
                    }
                    self.boundary = Boundary::Inline;
                }
            }
            "p" | "li" => {
                if self.boundary != Boundary::Closed {
                    self.out.push('\n');
                }
                self.boundary = Boundary::Closed;
            }
            "ul" | "ol" => {
                if self.boundary != Boundary::Closed || self.list_depth <= 0 {
                    self.out.push('\n');
                }
                self.list_depth -= 1;
                self.boundary = Boundary::Closed;
            }
            _ => {}
        }
    }

    pub(crate) fn text(&mut self, data: &str) {
        self.out.push_str(data);
        if let Some(anchor) = &mut self.anchor {
            anchor.text.push_str(data);
        }
        self.boundary = Boundary::Inline;
    }

    pub(crate) fn finish(self) -> String {
        self.out.trim().to_owned()
    }
}
