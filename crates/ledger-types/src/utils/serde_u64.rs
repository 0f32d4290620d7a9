//! Serde helpers that encode `u64` values as decimal strings.
//!
//! Persisted state may be read by consumers whose number type cannot hold a
//! full 64-bit integer, so amounts, memos, block indices and timestamps are
//! written as strings. Plain JSON numbers are still accepted on read.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.collect_str(value)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
	D: Deserializer<'de>,
{
	deserializer.deserialize_any(U64Visitor)
}

struct U64Visitor;

impl Visitor<'_> for U64Visitor {
	type Value = u64;

	fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
		formatter.write_str("an unsigned 64-bit integer or its decimal string")
	}

	fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
		Ok(value)
	}

	fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
		u64::try_from(value).map_err(|_| E::custom(format!("negative value: {}", value)))
	}

	fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
		value
			.parse::<u64>()
			.map_err(|e| E::custom(format!("invalid u64 string '{}': {}", value, e)))
	}
}

/// Same encoding for `Option<u64>`; `None` is written as `null`.
pub mod option {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match value {
			Some(v) => serializer.collect_str(v),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
	where
		D: Deserializer<'de>,
	{
		#[derive(Deserialize)]
		struct Wrapper(#[serde(with = "super")] u64);

		Option::<Wrapper>::deserialize(deserializer).map(|w| w.map(|Wrapper(v)| v))
	}
}

#[cfg(test)]
mod tests {
	use serde::{Deserialize, Serialize};

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Sample {
		#[serde(with = "super")]
		value: u64,
		#[serde(with = "super::option")]
		maybe: Option<u64>,
	}

	#[test]
	fn test_max_value_written_as_string() {
		let sample = Sample {
			value: u64::MAX,
			maybe: Some(u64::MAX - 1),
		};
		let json = serde_json::to_string(&sample).unwrap();
		assert_eq!(
			json,
			r#"{"value":"18446744073709551615","maybe":"18446744073709551614"}"#
		);
		let parsed: Sample = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed, sample);
	}

	#[test]
	fn test_accepts_plain_numbers_and_null() {
		let parsed: Sample = serde_json::from_str(r#"{"value":42,"maybe":null}"#).unwrap();
		assert_eq!(parsed.value, 42);
		assert_eq!(parsed.maybe, None);
	}

	#[test]
	fn test_rejects_garbage() {
		assert!(serde_json::from_str::<Sample>(r#"{"value":"12x","maybe":null}"#).is_err());
		assert!(serde_json::from_str::<Sample>(r#"{"value":-1,"maybe":null}"#).is_err());
	}
}
