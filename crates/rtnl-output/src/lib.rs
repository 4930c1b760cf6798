//! Output formatting (JSON/text) for the rtnl tools.
//!
//! [`Printer`] is the one sink the command printers talk to. Every
//! field call carries both the text-mode fragment and the JSON key and
//! value, so a printer renders each record exactly once regardless of
//! format. JSON nesting is driven by `open_*`/`close_*` calls in
//! strictly matched pairs mirroring the record structure.

mod json;
mod text;

pub use json::JsonValueBuilder;
pub use text::{format_bytes, format_rate};

use std::io::Write;

use serde_json::{Map, Value};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// Rendering configuration, threaded explicitly through print calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Show detailed statistics.
    pub stats: bool,
    /// Show extra details.
    pub details: bool,
    /// Don't resolve names (show numeric values).
    pub numeric: bool,
    /// Pretty print (for JSON).
    pub pretty: bool,
    /// Use colored output.
    pub color: bool,
}

enum Frame {
    Object(Option<String>, Map<String, Value>),
    Array(Option<String>, Vec<Value>),
}

/// Structured print sink over any writer.
pub struct Printer<W: Write> {
    out: W,
    format: OutputFormat,
    pretty: bool,
    stack: Vec<Frame>,
}

impl<W: Write> Printer<W> {
    /// Create a printer for the given format.
    pub fn new(out: W, format: OutputFormat, opts: &OutputOptions) -> Self {
        Self {
            out,
            format,
            pretty: opts.pretty,
            stack: Vec::new(),
        }
    }

    /// Whether JSON output is selected.
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Open a JSON object; `key` names it inside an enclosing object.
    /// No effect on text output.
    pub fn open_object(&mut self, key: Option<&str>) {
        if self.is_json() {
            self.stack
                .push(Frame::Object(key.map(String::from), Map::new()));
        }
    }

    /// Close the innermost object. Must pair with `open_object`.
    pub fn close_object(&mut self) {
        if self.is_json() {
            match self.stack.pop() {
                Some(Frame::Object(key, map)) => self.emit(key, Value::Object(map)),
                other => {
                    debug_assert!(other.is_none(), "close_object on an open array");
                    if let Some(frame) = other {
                        self.stack.push(frame);
                    }
                }
            }
        }
    }

    /// Open a JSON array. No effect on text output.
    pub fn open_array(&mut self, key: Option<&str>) {
        if self.is_json() {
            self.stack
                .push(Frame::Array(key.map(String::from), Vec::new()));
        }
    }

    /// Close the innermost array. Must pair with `open_array`.
    pub fn close_array(&mut self) {
        if self.is_json() {
            match self.stack.pop() {
                Some(Frame::Array(key, items)) => self.emit(key, Value::Array(items)),
                other => {
                    debug_assert!(other.is_none(), "close_array on an open object");
                    if let Some(frame) = other {
                        self.stack.push(frame);
                    }
                }
            }
        }
    }

    /// Attach a completed value to the enclosing frame, or render it if
    /// the stack emptied.
    fn emit(&mut self, key: Option<String>, value: Value) {
        match self.stack.last_mut() {
            Some(Frame::Object(_, map)) => {
                map.insert(key.unwrap_or_default(), value);
            }
            Some(Frame::Array(_, items)) => items.push(value),
            None => {
                let rendered = if self.pretty {
                    serde_json::to_string_pretty(&value)
                } else {
                    serde_json::to_string(&value)
                };
                if let Ok(s) = rendered {
                    let _ = writeln!(self.out, "{}", s);
                }
            }
        }
    }

    fn put(&mut self, key: Option<&str>, value: Value) {
        debug_assert!(!self.stack.is_empty(), "field outside any open object");
        self.emit(key.map(String::from), value);
    }

    /// A string field: `text` goes to text mode, `value` to JSON under
    /// `key`.
    pub fn string(&mut self, key: Option<&str>, text: &str, value: &str) {
        match self.format {
            OutputFormat::Text => {
                let _ = write!(self.out, "{}", text);
            }
            OutputFormat::Json => self.put(key, Value::String(value.to_string())),
        }
    }

    /// An unsigned integer field.
    pub fn uint(&mut self, key: Option<&str>, text: &str, value: u64) {
        match self.format {
            OutputFormat::Text => {
                let _ = write!(self.out, "{}", text);
            }
            OutputFormat::Json => self.put(key, Value::Number(value.into())),
        }
    }

    /// A boolean field (flag presence).
    pub fn bool(&mut self, key: Option<&str>, text: &str, value: bool) {
        match self.format {
            OutputFormat::Text => {
                let _ = write!(self.out, "{}", text);
            }
            OutputFormat::Json => self.put(key, Value::Bool(value)),
        }
    }

    /// Text-mode-only fragment (spacing, separators).
    pub fn text(&mut self, text: &str) {
        if self.format == OutputFormat::Text {
            let _ = write!(self.out, "{}", text);
        }
    }

    /// Terminate a text-mode line.
    pub fn newline(&mut self) {
        if self.format == OutputFormat::Text {
            let _ = writeln!(self.out);
        }
    }

    /// Flush the underlying writer.
    pub fn finish(mut self) -> std::io::Result<()> {
        debug_assert!(self.stack.is_empty(), "unbalanced open/close calls");
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_printer(buf: &mut Vec<u8>) -> Printer<&mut Vec<u8>> {
        Printer::new(buf, OutputFormat::Json, &OutputOptions::default())
    }

    #[test]
    fn test_json_object_nesting() {
        let mut buf = Vec::new();
        let mut p = json_printer(&mut buf);
        p.open_array(None);
        p.open_object(None);
        p.string(Some("mac"), "", "de:ad:be:ef:00:01");
        p.uint(Some("vlan"), "", 10);
        p.open_array(Some("flags"));
        p.string(None, "", "self");
        p.close_array();
        p.close_object();
        p.close_array();
        p.finish().unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value[0]["mac"], "de:ad:be:ef:00:01");
        assert_eq!(value[0]["vlan"], 10);
        assert_eq!(value[0]["flags"][0], "self");
    }

    #[test]
    fn test_text_mode_passthrough() {
        let mut buf = Vec::new();
        let mut p = Printer::new(&mut buf, OutputFormat::Text, &OutputOptions::default());
        p.open_object(None);
        p.string(Some("mac"), "de:ad:be:ef:00:01 ", "de:ad:be:ef:00:01");
        p.uint(Some("vlan"), "vlan 10 ", 10);
        p.newline();
        p.close_object();
        p.finish().unwrap();

        assert_eq!(String::from_utf8(buf).unwrap(), "de:ad:be:ef:00:01 vlan 10 \n");
    }

    #[test]
    fn test_json_ignores_text_fragments() {
        let mut buf = Vec::new();
        let mut p = json_printer(&mut buf);
        p.open_object(None);
        p.text("dev ");
        p.newline();
        p.string(Some("ifname"), "eth0 ", "eth0");
        p.close_object();
        p.finish().unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["ifname"], "eth0");
    }
}
