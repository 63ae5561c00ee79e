use bytes::{Buf, BufMut, BytesMut};

use crate::error::{OscError, Result};

/// A single OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Str(String),
    Bool(bool),
}

impl OscArg {
    fn tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::Str(_) => 's',
            OscArg::Bool(true) => 'T',
            OscArg::Bool(false) => 'F',
        }
    }

    /// Integer value of the argument; floats are truncated toward zero.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OscArg::Int(v) => Some(i64::from(*v)),
            OscArg::Float(v) if v.is_finite() => Some(*v as i64),
            OscArg::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        OscArg::Int(v)
    }
}

impl From<u16> for OscArg {
    fn from(v: u16) -> Self {
        OscArg::Int(i32::from(v))
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        OscArg::Float(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::Str(v.to_string())
    }
}

/// An OSC message: an address pattern plus arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    /// Create a message with no arguments.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<OscArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Create a message with the given arguments.
    pub fn with_args(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }
}

/// Encode a message into an OSC packet.
///
/// Packet layout, every field padded with NULs to a multiple of 4 bytes:
/// ```text
/// address "\0" pad | "," type-tags "\0" pad | big-endian args...
/// ```
pub fn encode_message(msg: &OscMessage, dst: &mut BytesMut) -> Result<()> {
    if !msg.address.starts_with('/') {
        return Err(OscError::InvalidAddress(msg.address.clone()));
    }

    put_padded_str(dst, &msg.address);

    let mut tags = String::with_capacity(msg.args.len() + 1);
    tags.push(',');
    tags.extend(msg.args.iter().map(OscArg::tag));
    put_padded_str(dst, &tags);

    for arg in &msg.args {
        match arg {
            OscArg::Int(v) => dst.put_i32(*v),
            OscArg::Float(v) => dst.put_f32(*v),
            OscArg::Str(s) => put_padded_str(dst, s),
            OscArg::Bool(_) => {}
        }
    }
    Ok(())
}

/// Decode one OSC packet holding a single message.
pub fn decode_message(packet: &[u8]) -> Result<OscMessage> {
    if packet.starts_with(b"#bundle\0") {
        return Err(OscError::UnsupportedBundle);
    }

    let mut src = packet;
    let address = take_padded_str(&mut src)?;
    if !address.starts_with('/') {
        return Err(OscError::InvalidAddress(address));
    }

    // Messages from very old senders may omit the type tag string.
    if src.is_empty() {
        return Ok(OscMessage::new(address));
    }

    let tags = take_padded_str(&mut src)?;
    let Some(tags) = tags.strip_prefix(',') else {
        return Err(OscError::InvalidString);
    };

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        let arg = match tag {
            'i' => OscArg::Int(take_i32(&mut src)?),
            'f' => OscArg::Float(f32::from_bits(take_i32(&mut src)? as u32)),
            's' => OscArg::Str(take_padded_str(&mut src)?),
            'T' => OscArg::Bool(true),
            'F' => OscArg::Bool(false),
            other => return Err(OscError::UnsupportedTag(other)),
        };
        args.push(arg);
    }

    Ok(OscMessage { address, args })
}

fn padded_len(len: usize) -> usize {
    (len + 4) & !3
}

fn put_padded_str(dst: &mut BytesMut, s: &str) {
    let total = padded_len(s.len());
    dst.reserve(total);
    dst.put_slice(s.as_bytes());
    dst.put_bytes(0, total - s.len());
}

fn take_padded_str(src: &mut &[u8]) -> Result<String> {
    let nul = src.iter().position(|&b| b == 0).ok_or(OscError::InvalidString)?;
    let total = padded_len(nul);
    if src.len() < total {
        return Err(OscError::Truncated {
            needed: total - src.len(),
        });
    }
    let text = std::str::from_utf8(&src[..nul])
        .map_err(|_| OscError::InvalidString)?
        .to_string();
    src.advance(total);
    Ok(text)
}

fn take_i32(src: &mut &[u8]) -> Result<i32> {
    if src.len() < 4 {
        return Err(OscError::Truncated {
            needed: 4 - src.len(),
        });
    }
    Ok(src.get_i32())
}
