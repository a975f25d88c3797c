//! Structured document builder. All free text goes through [`escape`]; only
//! markup the builder itself constructs goes out raw, so the report is safe to
//! embed whatever the service returns.

/// Self-contained style prelude, no external stylesheet.
const STYLE: &str = "\nul {\n  margin-left: -25px;\n}\ntd {\n  padding-right: 5px;\n}\n";

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Integer literal in the common prefixes: 0x hex, leading-zero octal, else
/// decimal. Non-numeric values get no cross-reference.
pub fn parse_address(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    if text.len() > 1 && text.starts_with('0') {
        return u64::from_str_radix(&text[1..], 8).ok();
    }
    text.parse().ok()
}

/// A typed link carrying the resolved address, or the escaped literal when
/// the value does not parse as one.
pub fn address_link(text: &str) -> String {
    match parse_address(text) {
        Some(value) => format!("<a href=\"address://0x{:X}\">{}</a>", value, escape(text)),
        None => escape(text),
    }
}

pub struct Html {
    out: String,
}

impl Html {
    pub fn new() -> Self {
        let mut html = Self { out: String::new() };
        html.open("head");
        html.open("style");
        html.out.push_str(STYLE);
        html.close("style");
        html.close("head");
        html
    }

    pub fn open(&mut self, tag: &str) {
        self.out.push('<');
        self.out.push_str(tag);
        self.out.push('>');
    }

    pub fn close(&mut self, tag: &str) {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    /// Escaped text inside a tag path, e.g. `tag("li/code", s)` yields
    /// `<li><code>s</code></li>`.
    pub fn tag(&mut self, tags: &str, content: &str) {
        let parts: Vec<&str> = tags.split('/').collect();
        for part in &parts {
            self.open(part);
        }
        self.out.push_str(&escape(content));
        for part in parts.iter().rev() {
            self.close(part);
        }
    }

    /// Renderer-constructed markup, emitted verbatim.
    pub fn raw(&mut self, markup: &str) {
        self.out.push_str(markup);
    }

    pub fn section(&mut self, title: &str) {
        self.tag("h1", title);
    }

    pub fn p(&mut self, text: &str) {
        self.tag("p", text);
    }

    pub fn kv(&mut self, key: &str, value: &str) {
        self.p(&format!("{key}: {value}"));
    }

    pub fn finish(self) -> String {
        self.out
    }
}

impl Default for Html {
    fn default() -> Self {
        Self::new()
    }
}
