use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Jupiter 协议中 Pubkey 与 u64 数量均以字符串传输。
pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: ToString,
    S: Serializer,
{
    value.to_string().serialize(serializer)
}

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: FromStr,
    T::Err: std::fmt::Debug,
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse()
        .map_err(|err| de::Error::custom(format!("parse error for {raw:?}: {err:?}")))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Amount {
        #[serde(with = "super")]
        value: u64,
    }

    #[test]
    fn amounts_round_trip_as_strings() {
        let encoded = serde_json::to_string(&Amount { value: 42 }).expect("encode");
        assert_eq!(encoded, r#"{"value":"42"}"#);
        let err = serde_json::from_str::<Amount>(r#"{"value":"x"}"#).expect_err("reject");
        assert!(err.to_string().contains("parse error"));
    }
}
