//! Extended JSON encoding for BSON values
//!
//! Values without a JSON equivalent are written as single-key tagged objects
//! (`{"$oid": "..."}`, `{"$date": ...}`, ...), so a result envelope can be
//! parsed back into exactly the BSON it was built from.
//!
//! # Modes
//!
//! - [`ExtJsonMode::Relaxed`] (default): int32/int64/finite doubles become
//!   plain JSON numbers and dates in years 1970–9999 become ISO-8601 strings.
//! - [`ExtJsonMode::Canonical`]: every numeric type and every date is tagged,
//!   so the type survives the round trip.
//!
//! The decoder accepts both modes, plus the `$uuid` shorthand and legacy
//! `{"$date": <millis>}`. An object whose `$`-keys do not form a known tag is
//! an ordinary document, so query operators such as `{"$gt": 5}` pass through.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{
    Binary, Bson, DateTime, Decimal128, Document, JavaScriptCodeWithScope, Regex, Timestamp,
};
use chrono::{Datelike, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Output flavour of the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtJsonMode {
    #[default]
    Relaxed,
    Canonical,
}

/// Errors raised while decoding Extended JSON
#[derive(Debug, thiserror::Error)]
pub enum ExtJsonError {
    /// A tagged object has the right key but an unusable payload
    #[error("invalid {tag} value: {message}")]
    InvalidTag { tag: &'static str, message: String },

    /// A document was required but another JSON type was found
    #[error("expected a document, got {found}")]
    NotADocument { found: &'static str },
}

impl ExtJsonError {
    fn tag(tag: &'static str, message: impl ToString) -> Self {
        ExtJsonError::InvalidTag {
            tag,
            message: message.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a document as an Extended JSON object, keeping field order
pub fn encode_document(doc: &Document, mode: ExtJsonMode) -> Value {
    let mut map = Map::with_capacity(doc.len());
    for (key, value) in doc {
        map.insert(key.clone(), encode(value, mode));
    }
    Value::Object(map)
}

/// Encode a single BSON value
pub fn encode(value: &Bson, mode: ExtJsonMode) -> Value {
    match value {
        Bson::Null => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(|v| encode(v, mode)).collect()),
        Bson::Document(doc) => encode_document(doc, mode),
        Bson::Int32(n) => match mode {
            ExtJsonMode::Relaxed => Value::from(*n),
            ExtJsonMode::Canonical => tagged("$numberInt", Value::String(n.to_string())),
        },
        Bson::Int64(n) => match mode {
            ExtJsonMode::Relaxed => Value::from(*n),
            ExtJsonMode::Canonical => tagged("$numberLong", Value::String(n.to_string())),
        },
        Bson::Double(f) => encode_double(*f, mode),
        Bson::Decimal128(d) => tagged("$numberDecimal", Value::String(d.to_string())),
        Bson::ObjectId(oid) => tagged("$oid", Value::String(oid.to_hex())),
        Bson::DateTime(dt) => encode_date(*dt, mode),
        Bson::Timestamp(ts) => {
            let mut inner = Map::new();
            inner.insert("t".to_string(), Value::from(ts.time));
            inner.insert("i".to_string(), Value::from(ts.increment));
            tagged("$timestamp", Value::Object(inner))
        }
        Bson::Binary(bin) => {
            let mut inner = Map::new();
            inner.insert("base64".to_string(), Value::String(BASE64.encode(&bin.bytes)));
            inner.insert(
                "subType".to_string(),
                Value::String(format!("{:02x}", u8::from(bin.subtype))),
            );
            tagged("$binary", Value::Object(inner))
        }
        Bson::RegularExpression(re) => {
            let mut inner = Map::new();
            inner.insert("pattern".to_string(), Value::String(re.pattern.clone()));
            inner.insert("options".to_string(), Value::String(sorted_options(&re.options)));
            tagged("$regularExpression", Value::Object(inner))
        }
        Bson::JavaScriptCode(code) => tagged("$code", Value::String(code.clone())),
        Bson::JavaScriptCodeWithScope(cws) => {
            let mut map = Map::new();
            map.insert("$code".to_string(), Value::String(cws.code.clone()));
            map.insert("$scope".to_string(), encode_document(&cws.scope, mode));
            Value::Object(map)
        }
        Bson::Symbol(s) => tagged("$symbol", Value::String(s.clone())),
        Bson::Undefined => tagged("$undefined", Value::Bool(true)),
        Bson::MinKey => tagged("$minKey", Value::from(1)),
        Bson::MaxKey => tagged("$maxKey", Value::from(1)),
        // DBPointer is deprecated and opaque in the bson crate
        other => other.clone().into_canonical_extjson(),
    }
}

fn tagged(tag: &str, payload: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(tag.to_string(), payload);
    Value::Object(map)
}

fn encode_double(f: f64, mode: ExtJsonMode) -> Value {
    if f.is_nan() {
        return tagged("$numberDouble", Value::String("NaN".to_string()));
    }
    if f.is_infinite() {
        let repr = if f > 0.0 { "Infinity" } else { "-Infinity" };
        return tagged("$numberDouble", Value::String(repr.to_string()));
    }
    match mode {
        ExtJsonMode::Relaxed => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        // Debug keeps a fractional part ("1.0") and uses exponents for large values
        ExtJsonMode::Canonical => tagged("$numberDouble", Value::String(format!("{:?}", f))),
    }
}

fn encode_date(dt: DateTime, mode: ExtJsonMode) -> Value {
    let millis = dt.timestamp_millis();
    if mode == ExtJsonMode::Relaxed
        && let Some(utc) = chrono::DateTime::<Utc>::from_timestamp_millis(millis)
        && (1970..=9999).contains(&utc.year())
    {
        return tagged(
            "$date",
            Value::String(utc.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    tagged("$date", tagged("$numberLong", Value::String(millis.to_string())))
}

fn sorted_options(options: &str) -> String {
    let mut chars: Vec<char> = options.chars().collect();
    chars.sort_unstable();
    chars.into_iter().collect()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a JSON object into a BSON document
pub fn decode_document(value: Value) -> Result<Document, ExtJsonError> {
    match decode(value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(ExtJsonError::NotADocument {
            found: bson_type_name(&other),
        }),
    }
}

/// Decode any Extended JSON value
pub fn decode(value: Value) -> Result<Bson, ExtJsonError> {
    match value {
        Value::Null => Ok(Bson::Null),
        Value::Bool(b) => Ok(Bson::Boolean(b)),
        Value::String(s) => Ok(Bson::String(s)),
        Value::Number(n) => Ok(decode_number(&n)),
        Value::Array(items) => items
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()
            .map(Bson::Array),
        Value::Object(map) => decode_object(map),
    }
}

fn decode_number(n: &Number) -> Bson {
    if let Some(i) = n.as_i64() {
        match i32::try_from(i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(i),
        }
    } else {
        Bson::Double(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn decode_object(map: Map<String, Value>) -> Result<Bson, ExtJsonError> {
    if let Some(bson) = decode_tagged(&map)? {
        return Ok(bson);
    }

    let mut doc = Document::new();
    for (key, value) in map {
        doc.insert(key, decode(value)?);
    }
    Ok(Bson::Document(doc))
}

/// Recognize a tagged scalar. `Ok(None)` means "ordinary document".
fn decode_tagged(map: &Map<String, Value>) -> Result<Option<Bson>, ExtJsonError> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();

    let bson = match keys.as_slice() {
        ["$oid"] => {
            let hex = expect_str(&map["$oid"], "$oid")?;
            Bson::ObjectId(ObjectId::parse_str(hex).map_err(|e| ExtJsonError::tag("$oid", e))?)
        }
        ["$date"] => Bson::DateTime(decode_date(&map["$date"])?),
        ["$numberInt"] => {
            let s = expect_str(&map["$numberInt"], "$numberInt")?;
            Bson::Int32(s.parse().map_err(|e| ExtJsonError::tag("$numberInt", e))?)
        }
        ["$numberLong"] => {
            let s = expect_str(&map["$numberLong"], "$numberLong")?;
            Bson::Int64(s.parse().map_err(|e| ExtJsonError::tag("$numberLong", e))?)
        }
        ["$numberDouble"] => {
            let s = expect_str(&map["$numberDouble"], "$numberDouble")?;
            Bson::Double(parse_double(s)?)
        }
        ["$numberDecimal"] => {
            let s = expect_str(&map["$numberDecimal"], "$numberDecimal")?;
            Bson::Decimal128(
                s.parse::<Decimal128>()
                    .map_err(|e| ExtJsonError::tag("$numberDecimal", e))?,
            )
        }
        ["$binary"] => Bson::Binary(decode_binary(&map["$binary"])?),
        ["$binary", "$type"] => {
            // legacy form: {"$binary": "<base64>", "$type": "<hex>"}
            let b64 = expect_str(&map["$binary"], "$binary")?;
            let subtype = expect_str(&map["$type"], "$binary")?;
            Bson::Binary(build_binary(b64, subtype)?)
        }
        ["$uuid"] => {
            let s = expect_str(&map["$uuid"], "$uuid")?;
            let uuid = uuid::Uuid::parse_str(s).map_err(|e| ExtJsonError::tag("$uuid", e))?;
            Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes: uuid.as_bytes().to_vec(),
            })
        }
        ["$timestamp"] => {
            let inner = expect_object(&map["$timestamp"], "$timestamp")?;
            Bson::Timestamp(Timestamp {
                time: expect_u32(inner.get("t"), "$timestamp")?,
                increment: expect_u32(inner.get("i"), "$timestamp")?,
            })
        }
        ["$regularExpression"] => {
            let inner = expect_object(&map["$regularExpression"], "$regularExpression")?;
            let pattern = expect_str(
                inner.get("pattern").unwrap_or(&Value::Null),
                "$regularExpression",
            )?;
            let options = expect_str(
                inner.get("options").unwrap_or(&Value::Null),
                "$regularExpression",
            )?;
            Bson::RegularExpression(Regex {
                pattern: pattern.to_string(),
                options: sorted_options(options),
            })
        }
        ["$code"] => Bson::JavaScriptCode(expect_str(&map["$code"], "$code")?.to_string()),
        ["$code", "$scope"] => {
            let code = expect_str(&map["$code"], "$code")?.to_string();
            let scope = decode_document(map["$scope"].clone())
                .map_err(|e| ExtJsonError::tag("$scope", e))?;
            Bson::JavaScriptCodeWithScope(JavaScriptCodeWithScope { code, scope })
        }
        ["$symbol"] => Bson::Symbol(expect_str(&map["$symbol"], "$symbol")?.to_string()),
        ["$undefined"] => Bson::Undefined,
        ["$minKey"] => Bson::MinKey,
        ["$maxKey"] => Bson::MaxKey,
        ["$dbPointer"] => Bson::try_from(Value::Object(map.clone()))
            .map_err(|e| ExtJsonError::tag("$dbPointer", e))?,
        _ => return Ok(None),
    };
    Ok(Some(bson))
}

fn decode_date(payload: &Value) -> Result<DateTime, ExtJsonError> {
    match payload {
        Value::String(iso) => chrono::DateTime::parse_from_rfc3339(iso)
            .map(|dt| DateTime::from_millis(dt.timestamp_millis()))
            .map_err(|e| ExtJsonError::tag("$date", e)),
        Value::Object(inner) => match inner.get("$numberLong") {
            Some(Value::String(ms)) if inner.len() == 1 => ms
                .parse::<i64>()
                .map(DateTime::from_millis)
                .map_err(|e| ExtJsonError::tag("$date", e)),
            _ => Err(ExtJsonError::tag("$date", "expected {\"$numberLong\": \"<millis>\"}")),
        },
        Value::Number(n) => n
            .as_i64()
            .map(DateTime::from_millis)
            .ok_or_else(|| ExtJsonError::tag("$date", "milliseconds must be an integer")),
        _ => Err(ExtJsonError::tag("$date", "unsupported payload")),
    }
}

fn decode_binary(payload: &Value) -> Result<Binary, ExtJsonError> {
    let inner = expect_object(payload, "$binary")?;
    let b64 = expect_str(inner.get("base64").unwrap_or(&Value::Null), "$binary")?;
    let subtype = expect_str(inner.get("subType").unwrap_or(&Value::Null), "$binary")?;
    build_binary(b64, subtype)
}

fn build_binary(b64: &str, subtype: &str) -> Result<Binary, ExtJsonError> {
    let bytes = BASE64
        .decode(b64)
        .map_err(|e| ExtJsonError::tag("$binary", e))?;
    let subtype = u8::from_str_radix(subtype, 16).map_err(|e| ExtJsonError::tag("$binary", e))?;
    Ok(Binary {
        subtype: BinarySubtype::from(subtype),
        bytes,
    })
}

fn parse_double(s: &str) -> Result<f64, ExtJsonError> {
    match s {
        "NaN" => Ok(f64::NAN),
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        _ => s.parse().map_err(|e| ExtJsonError::tag("$numberDouble", e)),
    }
}

fn expect_str<'a>(value: &'a Value, tag: &'static str) -> Result<&'a str, ExtJsonError> {
    value
        .as_str()
        .ok_or_else(|| ExtJsonError::tag(tag, "expected a string"))
}

fn expect_object<'a>(
    value: &'a Value,
    tag: &'static str,
) -> Result<&'a Map<String, Value>, ExtJsonError> {
    value
        .as_object()
        .ok_or_else(|| ExtJsonError::tag(tag, "expected an object"))
}

fn expect_u32(value: Option<&Value>, tag: &'static str) -> Result<u32, ExtJsonError> {
    value
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ExtJsonError::tag(tag, "expected an unsigned 32-bit integer"))
}

/// Human-readable BSON type name, used in error messages
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "document",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::JavaScriptCodeWithScope(_) => "javascriptWithScope",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal",
        Bson::Undefined => "undefined",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        _ => "dbPointer",
    }
}
