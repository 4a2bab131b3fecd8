//! Extended JSON output of result envelopes
//!
//! A canonical envelope must parse back into exactly the documents it was
//! built from; a relaxed envelope trades numeric type fidelity for plain JSON.

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, DateTime, Decimal128, Regex, Timestamp};
use mongodb_query::prelude::*;
use serde_json::{Value, json};
use std::str::FromStr;

fn rich_document() -> Document {
    doc! {
        "_id": ObjectId::parse_str("5f1d7f1b9d1e8a3b2c4d5e6f").unwrap(),
        "hostname": "db01",
        "startTime": DateTime::from_millis(1_600_000_000_000),
        "pid": 4242_i64,
        "cpus": 8,
        "load": 0.75,
        "payload": Binary { subtype: BinarySubtype::Generic, bytes: vec![1, 2, 3, 4] },
        "oplog": Timestamp { time: 1_600_000_000, increment: 7 },
        "price": Decimal128::from_str("12.50").unwrap(),
        "pattern": Regex { pattern: "^db".to_string(), options: "i".to_string() },
        "tags": ["primary", "east"],
        "nested": { "ok": true, "missing": null },
    }
}

// =============================================================================
// Canonical mode
// =============================================================================

mod canonical_tests {
    use super::*;

    #[test]
    fn test_envelope_round_trip() {
        let result = QueryResult::new(vec![rich_document(), doc! { "_id": 2 }]);

        let json = result.to_extjson(ExtJsonMode::Canonical);
        let parsed = QueryResult::from_extjson(json).unwrap();

        assert_eq!(parsed, result);
    }

    #[test]
    fn test_round_trip_through_text() {
        let result = QueryResult::new(vec![rich_document()]);

        let line = result.to_extjson_string(ExtJsonMode::Canonical);
        assert!(!line.contains('\n'));

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(QueryResult::from_extjson(value).unwrap(), result);
    }

    #[test]
    fn test_tagged_shapes() {
        let json = encode_document(&rich_document(), ExtJsonMode::Canonical);

        assert_eq!(json["_id"], json!({ "$oid": "5f1d7f1b9d1e8a3b2c4d5e6f" }));
        assert_eq!(
            json["startTime"],
            json!({ "$date": { "$numberLong": "1600000000000" } })
        );
        assert_eq!(json["pid"], json!({ "$numberLong": "4242" }));
        assert_eq!(json["cpus"], json!({ "$numberInt": "8" }));
        assert_eq!(json["load"], json!({ "$numberDouble": "0.75" }));
        assert_eq!(
            json["payload"],
            json!({ "$binary": { "base64": "AQIDBA==", "subType": "00" } })
        );
        assert_eq!(
            json["oplog"],
            json!({ "$timestamp": { "t": 1600000000u32, "i": 7 } })
        );
        assert_eq!(json["price"], json!({ "$numberDecimal": "12.50" }));
        assert_eq!(
            json["pattern"],
            json!({ "$regularExpression": { "pattern": "^db", "options": "i" } })
        );
    }

    #[test]
    fn test_field_order_is_preserved() {
        let json = encode_document(&rich_document(), ExtJsonMode::Canonical);
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();

        assert_eq!(keys.first(), Some(&"_id"));
        assert_eq!(keys.last(), Some(&"nested"));
        assert_eq!(keys.len(), rich_document().len());
    }
}

// =============================================================================
// Relaxed mode
// =============================================================================

mod relaxed_tests {
    use super::*;

    #[test]
    fn test_numbers_are_plain_and_dates_are_iso() {
        let json = encode_document(&rich_document(), ExtJsonMode::Relaxed);

        assert_eq!(json["pid"], json!(4242));
        assert_eq!(json["cpus"], json!(8));
        assert_eq!(json["load"], json!(0.75));
        assert_eq!(json["startTime"], json!({ "$date": "2020-09-13T12:26:40.000Z" }));
        // types without a JSON equivalent stay tagged
        assert_eq!(json["_id"], json!({ "$oid": "5f1d7f1b9d1e8a3b2c4d5e6f" }));
        assert_eq!(json["price"], json!({ "$numberDecimal": "12.50" }));
    }

    #[test]
    fn test_relaxed_keeps_object_ids_and_dates() {
        let result = QueryResult::new(vec![rich_document()]);
        let parsed = QueryResult::from_extjson(result.to_extjson(ExtJsonMode::Relaxed)).unwrap();
        let doc = &parsed.result[0];

        assert_eq!(
            doc.get_object_id("_id").unwrap().to_hex(),
            "5f1d7f1b9d1e8a3b2c4d5e6f"
        );
        assert_eq!(
            doc.get_datetime("startTime").unwrap().timestamp_millis(),
            1_600_000_000_000
        );
        assert_eq!(doc.get_str("hostname").unwrap(), "db01");
    }

    #[test]
    fn test_non_finite_doubles_stay_tagged() {
        let json = encode(&Bson::Double(f64::NAN), ExtJsonMode::Relaxed);
        assert_eq!(json, json!({ "$numberDouble": "NaN" }));

        let json = encode(&Bson::Double(f64::NEG_INFINITY), ExtJsonMode::Relaxed);
        assert_eq!(json, json!({ "$numberDouble": "-Infinity" }));
    }
}

// =============================================================================
// Decoding host input
// =============================================================================

mod decode_tests {
    use super::*;

    #[test]
    fn test_query_operators_pass_through() {
        let filter = decode_document(json!({
            "age": { "$gt": 30, "$lte": { "$numberLong": "65" } },
            "$or": [ { "name": "a" }, { "name": "b" } ]
        }))
        .unwrap();

        let age = filter.get_document("age").unwrap();
        assert_eq!(age.get_i32("$gt").unwrap(), 30);
        assert_eq!(age.get_i64("$lte").unwrap(), 65);
        assert_eq!(filter.get_array("$or").unwrap().len(), 2);
    }

    #[test]
    fn test_uuid_shorthand() {
        let value = decode(json!({ "$uuid": "00112233-4455-6677-8899-aabbccddeeff" })).unwrap();

        match value {
            Bson::Binary(binary) => {
                assert_eq!(binary.subtype, BinarySubtype::Uuid);
                assert_eq!(binary.bytes.len(), 16);
            }
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_object_id_is_rejected() {
        assert!(decode(json!({ "$oid": "not-hex" })).is_err());
    }

    #[test]
    fn test_top_level_must_be_a_document() {
        assert!(decode_document(json!([1, 2, 3])).is_err());
    }
}
