//! HTTP/1.x message head: start line plus header fields, up to and including
//! the blank line. The body is left to the payload record.

use crate::engine::constants::{port, protocol_id};
use crate::engine::{BindingContext, LengthRule, PredicateError, ProtocolDescriptor, ProtocolId, Shortfall};
use crate::layer::transport::ports;
use crate::packet::HeaderView;

pub const NAME: &str = "http";
pub const ID: ProtocolId = protocol_id::HTTP;

const HEAD_END: &[u8] = b"\r\n\r\n";

const METHODS: [&[u8]; 9] = [
    b"GET ", b"POST ", b"PUT ", b"HEAD ", b"DELETE ", b"OPTIONS ", b"PATCH ", b"CONNECT ", b"TRACE ",
];

/// Message head length. Without a blank line the head is incomplete and
/// reported as a shortfall of one byte past the buffer.
pub fn head_len(tail: &[u8]) -> Result<usize, Shortfall> {
    tail.windows(HEAD_END.len())
        .position(|window| window == HEAD_END)
        .map(|at| at + HEAD_END.len())
        .ok_or(Shortfall {
            needed: tail.len() + 1,
        })
}

pub fn looks_like_http(payload: &[u8]) -> bool {
    payload.starts_with(b"HTTP/") || METHODS.iter().any(|method| payload.starts_with(method))
}

/// Binding predicate for TCP: an HTTP port on either side and a payload that
/// starts like an HTTP message.
pub fn detect(ctx: &BindingContext<'_>) -> Result<bool, PredicateError> {
    let (src, dst) = ports(&ctx.header())?;
    let on_http_port = [src, dst]
        .iter()
        .any(|p| *p == port::HTTP || *p == port::HTTP_ALT);
    Ok(on_http_port && looks_like_http(ctx.payload()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartLine<'a> {
    Request {
        method: &'a str,
        target: &'a str,
        version: &'a str,
    },
    Response {
        version: &'a str,
        status: u16,
        reason: &'a str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHead<'a> {
    pub start_line: StartLine<'a>,
    pub headers: Vec<(&'a str, &'a str)>,
}

impl<'a> HttpHead<'a> {
    /// `None` when the head is not valid UTF-8 or the start line is
    /// malformed.
    pub fn from_view(view: &HeaderView<'a>) -> Option<Self> {
        let text = std::str::from_utf8(view.bytes()).ok()?;
        let mut lines = text.split("\r\n").filter(|line| !line.is_empty());
        let start_line = parse_start_line(lines.next()?)?;
        let headers = lines
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim(), value.trim()))
            })
            .collect();
        Some(Self {
            start_line,
            headers,
        })
    }

    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length")?.parse().ok()
    }
}

fn parse_start_line(line: &str) -> Option<StartLine<'_>> {
    let mut parts = line.splitn(3, ' ');
    let first = parts.next()?;
    let second = parts.next()?;
    let third = parts.next().unwrap_or("");
    if first.starts_with("HTTP/") {
        Some(StartLine::Response {
            version: first,
            status: second.parse().ok()?,
            reason: third,
        })
    } else {
        Some(StartLine::Request {
            method: first,
            target: second,
            version: third,
        })
    }
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::new(NAME, LengthRule::custom(head_len)).with_id(ID)
}
