//! Formatters (module D): turn a Redis reply into an HTTP body. Grounded
//! on `formats/common.c` (ETag) and `formats/custom-type.c`, generalized
//! to the JSON/Raw/CustomType trio the format registry can select.

use crate::error::GatewayError;
use crate::format::{Formatter, ResolvedFormat};
use crate::parse::QueryParams;
use base64::Engine;
use md5::{Digest, Md5};
use serde_json::{json, Value as JsonValue};

/// The five reply shapes spec.md's data model names. `redis::Value`'s
/// RESP3 additions (doubles, booleans, maps, sets, push messages) fold
/// into the closest of these on the way in.
#[derive(Debug, Clone)]
pub enum ReplyValue {
    Integer(i64),
    Status(String),
    Bulk(Option<Vec<u8>>),
    Error(String),
    Array(Vec<ReplyValue>),
}

impl From<redis::Value> for ReplyValue {
    fn from(v: redis::Value) -> Self {
        use redis::Value as V;
        match v {
            V::Nil => ReplyValue::Bulk(None),
            V::Int(i) => ReplyValue::Integer(i),
            V::BulkString(bytes) => ReplyValue::Bulk(Some(bytes)),
            V::Okay => ReplyValue::Status("OK".to_string()),
            V::SimpleString(s) => ReplyValue::Status(s),
            V::Array(items) | V::Set(items) => {
                ReplyValue::Array(items.into_iter().map(ReplyValue::from).collect())
            }
            V::Map(pairs) => ReplyValue::Array(
                pairs
                    .into_iter()
                    .flat_map(|(k, v)| [ReplyValue::from(k), ReplyValue::from(v)])
                    .collect(),
            ),
            V::Double(d) => ReplyValue::Bulk(Some(d.to_string().into_bytes())),
            V::Boolean(b) => ReplyValue::Integer(if b { 1 } else { 0 }),
            V::BigNumber(n) => ReplyValue::Bulk(Some(n.to_string().into_bytes())),
            V::VerbatimString { text, .. } => ReplyValue::Bulk(Some(text.into_bytes())),
            V::Push { data, .. } => {
                ReplyValue::Array(data.into_iter().map(ReplyValue::from).collect())
            }
            V::ServerError(e) => ReplyValue::Error(e.to_string()),
        }
    }
}

pub struct Rendered {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Applies the resolved formatter to a reply, producing the final body
/// bytes and Content-Type. `verb_upper` is the JSON object's top-level
/// key.
pub fn render(
    format: &ResolvedFormat,
    verb_upper: &str,
    reply: &ReplyValue,
    query: &QueryParams,
) -> Result<Rendered, GatewayError> {
    match format.formatter {
        Formatter::Json => Ok(render_json(verb_upper, reply, query)),
        Formatter::Raw => Ok(Rendered {
            body: raw_bytes(reply),
            content_type: format.content_type.clone(),
        }),
        Formatter::CustomType => {
            let (body, content_type) =
                custom_type(reply, format.forced_mime.as_deref())?;
            Ok(Rendered { body, content_type })
        }
    }
}

fn render_json(verb_upper: &str, reply: &ReplyValue, query: &QueryParams) -> Rendered {
    let payload = json!({ verb_upper: payload_to_json(reply) });
    let body_str = payload.to_string();

    if let Some(cb) = &query.jsonp {
        if is_valid_jsonp_callback(cb) {
            return Rendered {
                body: format!("{cb}({body_str});").into_bytes(),
                content_type: "application/javascript".to_string(),
            };
        }
    }

    Rendered {
        body: body_str.into_bytes(),
        content_type: "application/json".to_string(),
    }
}

fn is_valid_jsonp_callback(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn payload_to_json(reply: &ReplyValue) -> JsonValue {
    match reply {
        ReplyValue::Integer(i) => json!(i),
        ReplyValue::Status(s) => json!([true, s]),
        ReplyValue::Bulk(None) => JsonValue::Null,
        ReplyValue::Bulk(Some(bytes)) => match std::str::from_utf8(bytes) {
            Ok(s) => json!([true, s]),
            Err(_) => json!([true, base64::engine::general_purpose::STANDARD.encode(bytes)]),
        },
        ReplyValue::Error(msg) => json!([false, msg]),
        ReplyValue::Array(items) => {
            JsonValue::Array(items.iter().map(payload_to_json).collect())
        }
    }
}

/// RESP-like proxy framing: `:N\r\n`, `$len\r\nbytes\r\n`, `+bytes\r\n`,
/// `-bytes\r\n`, `*N\r\n` + elements.
pub fn raw_bytes(reply: &ReplyValue) -> Vec<u8> {
    match reply {
        ReplyValue::Integer(i) => format!(":{i}\r\n").into_bytes(),
        ReplyValue::Status(s) => format!("+{s}\r\n").into_bytes(),
        ReplyValue::Error(e) => format!("-{e}\r\n").into_bytes(),
        ReplyValue::Bulk(None) => b"$-1\r\n".to_vec(),
        ReplyValue::Bulk(Some(bytes)) => {
            let mut out = format!("${}\r\n", bytes.len()).into_bytes();
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\r\n");
            out
        }
        ReplyValue::Array(items) => {
            let mut out = format!("*{}\r\n", items.len()).into_bytes();
            for item in items {
                out.extend(raw_bytes(item));
            }
            out
        }
    }
}

/// `cmd->mime` set (from `type=` or an extension): reply must be a bulk
/// string, written verbatim under the forced Content-Type. Otherwise the
/// reply must be a 2-element `[value, content-type]` array.
fn custom_type(
    reply: &ReplyValue,
    forced_mime: Option<&str>,
) -> Result<(Vec<u8>, String), GatewayError> {
    if let Some(mime) = forced_mime {
        return match reply {
            ReplyValue::Bulk(Some(bytes)) => Ok((bytes.clone(), mime.to_string())),
            _ => Err(GatewayError::FormatMismatch),
        };
    }

    if let ReplyValue::Array(items) = reply {
        if let [value, content_type] = items.as_slice() {
            if let ReplyValue::Bulk(Some(value_bytes)) = value {
                let ct = match content_type {
                    ReplyValue::Bulk(Some(ct_bytes)) => {
                        String::from_utf8_lossy(ct_bytes).into_owned()
                    }
                    ReplyValue::Status(s) => s.clone(),
                    _ => "binary/octet-stream".to_string(),
                };
                return Ok((value_bytes.clone(), ct));
            }
        }
    }

    Err(GatewayError::FormatMismatch)
}

/// Quoted 32-hex-digit MD5 content hash, as `ETag:` / `If-None-Match`
/// expect.
pub fn etag_for(body: &[u8]) -> String {
    let digest = Md5::digest(body);
    format!("\"{}\"", hex::encode(digest))
}
