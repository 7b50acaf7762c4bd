//! # XML-RPC Encoding and Parsing
//!
//! Purpose: Encode method calls and parse method responses for the subset of
//! XML the server emits, without pulling in a general XML stack.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Responses are parsed top-down by a small lexer
//!    that yields open/close/empty tags and text slices.
//! 2. **Buffer Reuse**: Encoding appends into a caller-provided `BytesMut`.
//! 3. **Lenient Whitespace**: Indentation between tags is skipped; text inside
//!    `<value>` without a type tag is a string, as the format requires.
//! 4. **Fail Fast**: Anything outside the grammar returns a protocol error.

use std::collections::BTreeMap;
use std::fmt::Display;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};

use odoo_common::{Fault, MethodCall, MethodResponse, TransportError, Value, FAULT_APPLICATION_ERROR};

type DecodeResult<T> = Result<T, TransportError>;

/// Deepest array/struct nesting accepted in a response. The parser recurses
/// once per level, so the limit bounds its stack use.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Encodes a `<methodCall>` document into the provided buffer.
pub fn encode_call(call: &MethodCall, out: &mut BytesMut) {
    out.put_slice(b"<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    push_escaped(out, &call.method);
    out.put_slice(b"</methodName><params>");
    for param in &call.params {
        out.put_slice(b"<param>");
        encode_value(param, out);
        out.put_slice(b"</param>");
    }
    out.put_slice(b"</params></methodCall>");
}

/// Encodes one `<value>` element.
pub fn encode_value(value: &Value, out: &mut BytesMut) {
    out.put_slice(b"<value>");
    match value {
        Value::Nil => out.put_slice(b"<nil/>"),
        Value::Bool(true) => out.put_slice(b"<boolean>1</boolean>"),
        Value::Bool(false) => out.put_slice(b"<boolean>0</boolean>"),
        Value::Int(int) => {
            // Values outside the 32-bit range need the i8 extension.
            let tag: &[u8] = if i32::try_from(*int).is_ok() { b"int" } else { b"i8" };
            push_element(out, tag, int);
        }
        Value::Double(double) => push_element(out, b"double", double),
        Value::String(text) => {
            out.put_slice(b"<string>");
            push_escaped(out, text);
            out.put_slice(b"</string>");
        }
        Value::DateTime(text) => {
            out.put_slice(b"<dateTime.iso8601>");
            push_escaped(out, text);
            out.put_slice(b"</dateTime.iso8601>");
        }
        Value::Base64(data) => push_element(out, b"base64", BASE64.encode(data)),
        Value::Array(items) => {
            out.put_slice(b"<array><data>");
            for item in items {
                encode_value(item, out);
            }
            out.put_slice(b"</data></array>");
        }
        Value::Struct(members) => {
            out.put_slice(b"<struct>");
            for (name, member) in members {
                out.put_slice(b"<member><name>");
                push_escaped(out, name);
                out.put_slice(b"</name>");
                encode_value(member, out);
                out.put_slice(b"</member>");
            }
            out.put_slice(b"</struct>");
        }
    }
    out.put_slice(b"</value>");
}

/// Parses a `<methodResponse>` document.
pub fn decode_response(body: &[u8]) -> DecodeResult<MethodResponse> {
    let text = std::str::from_utf8(body).map_err(|_| protocol("response is not valid utf-8"))?;
    let mut lexer = Lexer::new(text);

    lexer.expect_open("methodResponse")?;
    let response = match lexer.next_tag()? {
        Token::Open("params") => {
            lexer.expect_open("param")?;
            let value = parse_value(&mut lexer, 0)?;
            lexer.expect_close("param")?;
            lexer.expect_close("params")?;
            MethodResponse::Success(value)
        }
        Token::Open("fault") => {
            let value = parse_value(&mut lexer, 0)?;
            lexer.expect_close("fault")?;
            MethodResponse::Fault(fault_from_value(value)?)
        }
        other => return Err(unexpected("<params> or <fault>", other)),
    };
    lexer.expect_close("methodResponse")?;

    match lexer.next_tag()? {
        Token::Eof => Ok(response),
        other => Err(unexpected("end of document", other)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Open(&'a str),
    Close(&'a str),
    Empty(&'a str),
    Text(&'a str),
    Eof,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer { src, pos: 0 }
    }

    /// Next raw token; declarations and comments are skipped.
    fn next(&mut self) -> DecodeResult<Token<'a>> {
        loop {
            let rest = &self.src[self.pos..];
            if rest.is_empty() {
                return Ok(Token::Eof);
            }

            if !rest.starts_with('<') {
                let end = rest.find('<').unwrap_or(rest.len());
                self.pos += end;
                return Ok(Token::Text(&rest[..end]));
            }

            if rest.starts_with("<?") {
                let end = rest.find("?>").ok_or_else(|| protocol("unterminated declaration"))?;
                self.pos += end + 2;
                continue;
            }
            if rest.starts_with("<!--") {
                let end = rest.find("-->").ok_or_else(|| protocol("unterminated comment"))?;
                self.pos += end + 3;
                continue;
            }
            if rest.starts_with("<!") {
                return Err(protocol("cdata sections and doctypes are not supported"));
            }

            let end = rest.find('>').ok_or_else(|| protocol("unterminated tag"))?;
            let inner = &rest[1..end];
            self.pos += end + 1;

            if let Some(name) = inner.strip_prefix('/') {
                return Ok(Token::Close(name.trim()));
            }
            if let Some(body) = inner.strip_suffix('/') {
                return Ok(Token::Empty(tag_name(body)));
            }
            return Ok(Token::Open(tag_name(inner)));
        }
    }

    /// Next token that is not whitespace-only text.
    fn next_tag(&mut self) -> DecodeResult<Token<'a>> {
        loop {
            match self.next()? {
                Token::Text(text) if text.trim().is_empty() => continue,
                token => return Ok(token),
            }
        }
    }

    fn peek_tag(&mut self) -> DecodeResult<Token<'a>> {
        let saved = self.pos;
        let token = self.next_tag();
        self.pos = saved;
        token
    }

    fn expect_open(&mut self, name: &str) -> DecodeResult<()> {
        match self.next_tag()? {
            Token::Open(tag) if tag == name => Ok(()),
            other => Err(unexpected(name, other)),
        }
    }

    fn expect_close(&mut self, name: &str) -> DecodeResult<()> {
        match self.next_tag()? {
            Token::Close(tag) if tag == name => Ok(()),
            other => Err(unexpected(name, other)),
        }
    }

    /// Reads the (possibly empty) text content of an element and its close tag.
    fn text_until_close(&mut self, name: &str) -> DecodeResult<&'a str> {
        match self.next()? {
            Token::Text(text) => {
                self.expect_close(name)?;
                Ok(text)
            }
            Token::Close(tag) if tag == name => Ok(""),
            other => Err(unexpected(name, other)),
        }
    }
}

fn tag_name(inner: &str) -> &str {
    inner.split_whitespace().next().unwrap_or("")
}

fn parse_value(lexer: &mut Lexer<'_>, depth: usize) -> DecodeResult<Value> {
    match lexer.next_tag()? {
        Token::Open("value") => {}
        Token::Empty("value") => return Ok(Value::String(String::new())),
        other => return Err(unexpected("<value>", other)),
    }

    let token = match lexer.next()? {
        Token::Text(text) => match lexer.next_tag()? {
            // Untyped content is a string, whitespace included.
            Token::Close("value") => return Ok(Value::String(unescape(text)?)),
            token if text.trim().is_empty() => token,
            other => return Err(unexpected("</value>", other)),
        },
        token => token,
    };

    let value = match token {
        Token::Close("value") => return Ok(Value::String(String::new())),
        Token::Open(tag) => parse_typed(lexer, tag, depth)?,
        Token::Empty(tag) => empty_typed(tag)?,
        other => return Err(unexpected("value type", other)),
    };
    lexer.expect_close("value")?;
    Ok(value)
}

fn parse_typed(lexer: &mut Lexer<'_>, tag: &str, depth: usize) -> DecodeResult<Value> {
    match tag {
        "int" | "i4" | "i8" => {
            let text = lexer.text_until_close(tag)?;
            text.trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| protocol(format!("invalid integer {:?}", text)))
        }
        "boolean" => match lexer.text_until_close(tag)?.trim() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            other => Err(protocol(format!("invalid boolean {:?}", other))),
        },
        "double" => {
            let text = lexer.text_until_close(tag)?;
            text.trim()
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| protocol(format!("invalid double {:?}", text)))
        }
        "string" => Ok(Value::String(unescape(lexer.text_until_close(tag)?)?)),
        "dateTime.iso8601" => {
            let text = unescape(lexer.text_until_close(tag)?)?;
            Ok(Value::DateTime(text.trim().to_string()))
        }
        "base64" => {
            let text = lexer.text_until_close(tag)?;
            let compact: String = text.chars().filter(|ch| !ch.is_ascii_whitespace()).collect();
            BASE64
                .decode(compact.as_bytes())
                .map(|data| Value::Base64(Bytes::from(data)))
                .map_err(|err| protocol(format!("invalid base64: {}", err)))
        }
        "nil" => {
            lexer.expect_close("nil")?;
            Ok(Value::Nil)
        }
        "array" => parse_array(lexer, enter(depth)?),
        "struct" => parse_struct(lexer, enter(depth)?),
        other => Err(protocol(format!("unsupported value type <{}>", other))),
    }
}

/// Depth of the container about to be parsed, refusing to go past the limit.
fn enter(depth: usize) -> DecodeResult<usize> {
    let depth = depth + 1;
    if depth > MAX_NESTING_DEPTH {
        return Err(protocol(format!(
            "nesting too deep: more than {} arrays or structs",
            MAX_NESTING_DEPTH
        )));
    }
    Ok(depth)
}

fn empty_typed(tag: &str) -> DecodeResult<Value> {
    match tag {
        "nil" => Ok(Value::Nil),
        "string" => Ok(Value::String(String::new())),
        "base64" => Ok(Value::Base64(Bytes::new())),
        "array" => Ok(Value::Array(Vec::new())),
        "struct" => Ok(Value::Struct(BTreeMap::new())),
        other => Err(protocol(format!("empty <{}/> is not a value", other))),
    }
}

fn parse_array(lexer: &mut Lexer<'_>, depth: usize) -> DecodeResult<Value> {
    let mut items = Vec::new();
    match lexer.next_tag()? {
        Token::Open("data") => loop {
            if let Token::Close("data") = lexer.peek_tag()? {
                lexer.next_tag()?;
                break;
            }
            items.push(parse_value(lexer, depth)?);
        },
        Token::Empty("data") => {}
        other => return Err(unexpected("<data>", other)),
    }
    lexer.expect_close("array")?;
    Ok(Value::Array(items))
}

fn parse_struct(lexer: &mut Lexer<'_>, depth: usize) -> DecodeResult<Value> {
    let mut members = BTreeMap::new();
    loop {
        match lexer.next_tag()? {
            Token::Close("struct") => break,
            Token::Open("member") => {
                lexer.expect_open("name")?;
                let name = unescape(lexer.text_until_close("name")?)?;
                let value = parse_value(lexer, depth)?;
                lexer.expect_close("member")?;
                members.insert(name, value);
            }
            other => return Err(unexpected("<member>", other)),
        }
    }
    Ok(Value::Struct(members))
}

fn fault_from_value(value: Value) -> DecodeResult<Fault> {
    let members = value
        .into_struct()
        .ok_or_else(|| protocol("fault payload is not a struct"))?;

    let code = match members.get("faultCode") {
        Some(Value::Int(code)) => i32::try_from(*code).unwrap_or(FAULT_APPLICATION_ERROR),
        // Some server versions put a textual code here.
        Some(Value::String(text)) => text.trim().parse().unwrap_or(FAULT_APPLICATION_ERROR),
        _ => return Err(protocol("fault without faultCode")),
    };
    let message = match members.get("faultString") {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    Ok(Fault::new(code, message))
}

fn unescape(text: &str) -> DecodeResult<String> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        let end = tail.find(';').ok_or_else(|| protocol("unterminated entity"))?;
        let entity = &tail[1..end];
        match entity {
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "amp" => out.push('&'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                let ch = code
                    .and_then(char::from_u32)
                    .ok_or_else(|| protocol(format!("unknown entity &{};", entity)))?;
                out.push(ch);
            }
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn push_escaped(out: &mut BytesMut, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.put_slice(b"&amp;"),
            '<' => out.put_slice(b"&lt;"),
            '>' => out.put_slice(b"&gt;"),
            '"' => out.put_slice(b"&quot;"),
            '\'' => out.put_slice(b"&apos;"),
            _ => {
                let mut buf = [0u8; 4];
                out.put_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn push_element(out: &mut BytesMut, tag: &[u8], content: impl Display) {
    out.put_u8(b'<');
    out.put_slice(tag);
    out.put_u8(b'>');
    out.put_slice(content.to_string().as_bytes());
    out.put_slice(b"</");
    out.put_slice(tag);
    out.put_u8(b'>');
}

fn protocol(message: impl Into<String>) -> TransportError {
    TransportError::Protocol(message.into())
}

fn unexpected(expected: &str, found: Token<'_>) -> TransportError {
    let found = match found {
        Token::Open(tag) => format!("<{}>", tag),
        Token::Close(tag) => format!("</{}>", tag),
        Token::Empty(tag) => format!("<{}/>", tag),
        Token::Text(text) => format!("text {:?}", text.trim()),
        Token::Eof => "end of document".to_string(),
    };
    protocol(format!("expected {}, found {}", expected, found))
}
