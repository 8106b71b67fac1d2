//! Wire format for antiforgery tokens.
//!
//! Version 1 layout, before protection:
//!
//! ```text
//! +---------+-------------------+-------+------------------------------+
//! | version | security value    | flags | optional fields              |
//! | 1 byte  | 16 bytes          | 1 byte| u16 BE length + bytes, each  |
//! +---------+-------------------+-------+------------------------------+
//! ```
//!
//! Flag bits: `0x01` session token, `0x02` username present, `0x04` claim
//! fingerprint present, `0x08` additional data present. Optional fields
//! follow in that order. The framed bytes go through the [`Protector`] and
//! the result is encoded as unpadded URL-safe base64.

use crate::error::{AntiforgeryError, ProtectorError, TokenError};
use crate::protector::Protector;
use crate::token::{SECURITY_VALUE_LEN, SecurityValue, Token};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use std::sync::Arc;

const TOKEN_VERSION: u8 = 0x01;

const FLAG_SESSION: u8 = 0x01;
const FLAG_USERNAME: u8 = 0x02;
const FLAG_FINGERPRINT: u8 = 0x04;
const FLAG_ADDITIONAL_DATA: u8 = 0x08;
const KNOWN_FLAGS: u8 = FLAG_SESSION | FLAG_USERNAME | FLAG_FINGERPRINT | FLAG_ADDITIONAL_DATA;

const HEADER_LEN: usize = 1 + SECURITY_VALUE_LEN + 1;

/// Serializes tokens to opaque, tamper-evident strings and back.
#[derive(Clone)]
pub struct TokenSerializer {
    protector: Arc<dyn Protector>,
}

impl TokenSerializer {
    pub fn new(protector: Arc<dyn Protector>) -> Self {
        Self { protector }
    }

    pub fn serialize(&self, token: &Token) -> Result<String, AntiforgeryError> {
        let framed = encode_frame(token)?;
        let protected = self.protector.protect(&framed)?;
        Ok(URL_SAFE_NO_PAD.encode(protected))
    }

    pub fn deserialize(&self, serialized: &str) -> Result<Token, TokenError> {
        if serialized.is_empty() {
            return Err(TokenError::Malformed("empty token".to_string()));
        }

        let protected = URL_SAFE_NO_PAD
            .decode(serialized)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        let framed = self.protector.unprotect(&protected).map_err(|e| match e {
            ProtectorError::CryptographicTamper => TokenError::Tamper,
            ProtectorError::Failure(message) => TokenError::Malformed(message),
        })?;

        decode_frame(&framed)
    }
}

fn encode_frame(token: &Token) -> Result<Vec<u8>, AntiforgeryError> {
    let mut flags = 0u8;
    if token.is_session_token() {
        flags |= FLAG_SESSION;
    }
    if token.username().is_some() {
        flags |= FLAG_USERNAME;
    }
    if token.claim_fingerprint().is_some() {
        flags |= FLAG_FINGERPRINT;
    }
    if token.additional_data().is_some() {
        flags |= FLAG_ADDITIONAL_DATA;
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + 64);
    buf.push(TOKEN_VERSION);
    buf.extend_from_slice(token.security_value().as_bytes());
    buf.push(flags);

    if let Some(username) = token.username() {
        write_field(&mut buf, username.as_bytes())?;
    }
    if let Some(fingerprint) = token.claim_fingerprint() {
        write_field(&mut buf, fingerprint)?;
    }
    if let Some(data) = token.additional_data() {
        write_field(&mut buf, data.as_bytes())?;
    }

    Ok(buf)
}

fn write_field(buf: &mut Vec<u8>, field: &[u8]) -> Result<(), AntiforgeryError> {
    let len = u16::try_from(field.len()).map_err(|_| {
        AntiforgeryError::Serialization(format!("token field of {} bytes is too long", field.len()))
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(field);
    Ok(())
}

fn decode_frame(bytes: &[u8]) -> Result<Token, TokenError> {
    if bytes.len() < HEADER_LEN {
        return Err(TokenError::Malformed("token is truncated".to_string()));
    }
    if bytes[0] != TOKEN_VERSION {
        return Err(TokenError::Malformed(format!(
            "unsupported token version {}",
            bytes[0]
        )));
    }

    let mut security_value = [0u8; SECURITY_VALUE_LEN];
    security_value.copy_from_slice(&bytes[1..1 + SECURITY_VALUE_LEN]);

    let flags = bytes[HEADER_LEN - 1];
    if flags & !KNOWN_FLAGS != 0 {
        return Err(TokenError::Malformed(format!("unknown flags {flags:#04x}")));
    }

    let mut reader = FieldReader {
        rest: &bytes[HEADER_LEN..],
    };

    let username = if flags & FLAG_USERNAME != 0 {
        Some(reader.read_string()?)
    } else {
        None
    };
    let claim_fingerprint = if flags & FLAG_FINGERPRINT != 0 {
        Some(reader.read_field()?.to_vec())
    } else {
        None
    };
    let additional_data = if flags & FLAG_ADDITIONAL_DATA != 0 {
        Some(reader.read_string()?)
    } else {
        None
    };

    if !reader.rest.is_empty() {
        return Err(TokenError::Malformed("trailing bytes after token".to_string()));
    }

    Ok(Token::from_parts(
        SecurityValue::from_bytes(security_value),
        flags & FLAG_SESSION != 0,
        username,
        claim_fingerprint,
        additional_data,
    ))
}

struct FieldReader<'a> {
    rest: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn read_field(&mut self) -> Result<&'a [u8], TokenError> {
        if self.rest.len() < 2 {
            return Err(TokenError::Malformed("missing field length".to_string()));
        }
        let len = u16::from_be_bytes([self.rest[0], self.rest[1]]) as usize;
        let body = &self.rest[2..];
        if body.len() < len {
            return Err(TokenError::Malformed("field length exceeds token".to_string()));
        }
        let (field, rest) = body.split_at(len);
        self.rest = rest;
        Ok(field)
    }

    fn read_string(&mut self) -> Result<String, TokenError> {
        let field = self.read_field()?;
        String::from_utf8(field.to_vec()).map_err(|e| TokenError::Malformed(e.to_string()))
    }
}
