//! Terminal printer for a [`MemoryHost`] tree.
//!
//! Draws the output tree as an indented outline. Element tags are bold, text
//! nodes take the foreground color from the nearest `color` style above
//! them:
//!
//! ```text
//! <h1 title="hello world">
//!   hello
//!   <span className="barClass">
//!     world          (cyan)
//! ```

use std::io::{self, Write};

use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use serde_json::Value;

use super::memory::{HostNodeId, HostNodeKind, MemoryHost};

const INDENT: &str = "  ";

/// Map a style color value to a terminal color.
///
/// Accepts the basic color names and `#rrggbb`.
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim().to_ascii_lowercase();
    if let Some(hex) = value.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
        return Some(Color::Rgb {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        });
    }
    let color = match value.as_str() {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" | "purple" => Color::Magenta,
        "cyan" | "aqua" => Color::Cyan,
        "white" => Color::White,
        "gray" | "grey" => Color::Grey,
        "darkgray" | "darkgrey" => Color::DarkGrey,
        "darkred" => Color::DarkRed,
        "darkgreen" => Color::DarkGreen,
        "darkyellow" | "olive" => Color::DarkYellow,
        "darkblue" | "navy" => Color::DarkBlue,
        "darkmagenta" => Color::DarkMagenta,
        "darkcyan" | "teal" => Color::DarkCyan,
        _ => return None,
    };
    Some(color)
}

/// Write the subtree under `root` to `out`.
pub fn write_tree<W: Write>(out: &mut W, host: &MemoryHost, root: HostNodeId) -> io::Result<()> {
    write_node(out, host, root, 0, None)?;
    out.flush()
}

/// Render the subtree under `root` to a string, escape sequences included.
pub fn render_to_string(host: &MemoryHost, root: HostNodeId) -> io::Result<String> {
    let mut buffer = Vec::new();
    write_tree(&mut buffer, host, root)?;
    String::from_utf8(buffer).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

fn write_node<W: Write>(
    out: &mut W,
    host: &MemoryHost,
    id: HostNodeId,
    depth: usize,
    inherited: Option<Color>,
) -> io::Result<()> {
    let Some(node) = host.node(id) else {
        return Ok(());
    };
    let indent = INDENT.repeat(depth);

    match &node.kind {
        HostNodeKind::Container => {
            for child in &node.children {
                write_node(out, host, *child, depth, inherited)?;
            }
        }
        HostNodeKind::Text => {
            write_text(out, &indent, node.text.as_deref().unwrap_or(""), inherited)?;
        }
        HostNodeKind::Element { tag } => {
            let color = node
                .style("color")
                .and_then(Value::as_str)
                .and_then(parse_color)
                .or(inherited);

            queue!(
                out,
                Print(&indent),
                SetAttribute(Attribute::Bold),
                Print(format!("<{tag}")),
                SetAttribute(Attribute::Reset),
            )?;
            for (name, value) in &node.attributes {
                let value = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                queue!(out, Print(format!(" {name}=\"{value}\"")))?;
            }
            queue!(out, SetAttribute(Attribute::Bold), Print(">"), SetAttribute(Attribute::Reset), Print("\n"))?;

            let child_indent = INDENT.repeat(depth + 1);
            if let Some(html) = &node.inner_html {
                write_text(out, &child_indent, html, color)?;
            } else if let Some(text) = &node.text {
                write_text(out, &child_indent, text, color)?;
            } else {
                for child in &node.children {
                    write_node(out, host, *child, depth + 1, color)?;
                }
            }
        }
    }
    Ok(())
}

fn write_text<W: Write>(out: &mut W, indent: &str, text: &str, color: Option<Color>) -> io::Result<()> {
    queue!(out, Print(indent))?;
    match color {
        Some(color) => queue!(out, SetForegroundColor(color), Print(text), ResetColor)?,
        None => queue!(out, Print(text))?,
    }
    queue!(out, Print("\n"))
}

// =============================================================================
// Tests
// =============================================================================
