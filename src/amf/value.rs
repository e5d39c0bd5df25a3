//! AMF value types
//!
//! RTMP commands and data messages exchange dynamically typed AMF0 values.
//! This enum is the unified in-memory representation; dispatch happens on
//! the variant tag, never on reflective type queries.

use std::collections::HashMap;

/// Unified AMF value representation
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// Null value (0x05)
    Null,

    /// Undefined value (0x06)
    Undefined,

    /// Boolean value (0x01)
    Boolean(bool),

    /// IEEE 754 double-precision floating point (0x00)
    Number(f64),

    /// UTF-8 string (0x02, long form 0x0C)
    String(String),

    /// Key-value object (0x03); keys are always strings in AMF
    Object(HashMap<String, AmfValue>),

    /// ECMA Array (0x08) - associative array with a length hint
    EcmaArray(HashMap<String, AmfValue>),

    /// Strict array (0x0A) - dense ordered array
    Array(Vec<AmfValue>),

    /// Date value as milliseconds since Unix epoch (0x0B)
    Date(f64),
}

impl AmfValue {
    /// The string payload, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        if let AmfValue::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// The numeric payload, if this is a number
    pub fn as_number(&self) -> Option<f64> {
        if let AmfValue::Number(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    /// The boolean payload, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        if let AmfValue::Boolean(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// The property map of an object-like value. ECMA arrays behave as
    /// objects here; command senders use the two interchangeably.
    pub fn as_object(&self) -> Option<&HashMap<String, AmfValue>> {
        match self {
            AmfValue::Object(props) | AmfValue::EcmaArray(props) => Some(props),
            _ => None,
        }
    }

    /// Look up a property on an object-like value
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object().and_then(|props| props.get(key))
    }

    /// String-typed property lookup
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AmfValue::as_str)
    }

    /// Number-typed property lookup
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(AmfValue::as_number)
    }
}

macro_rules! value_from {
    ($ty:ty, $into:expr) => {
        impl From<$ty> for AmfValue {
            fn from(v: $ty) -> AmfValue {
                $into(v)
            }
        }
    };
}

value_from!(bool, AmfValue::Boolean);
value_from!(f64, AmfValue::Number);
value_from!(u32, |v| AmfValue::Number(v as f64));
value_from!(String, AmfValue::String);
value_from!(&str, |v: &str| AmfValue::String(v.to_string()));

/// Build an `AmfValue::Object` from `("key", value)` pairs
#[macro_export]
macro_rules! amf_object {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = ::std::collections::HashMap::new();
        $(map.insert($key.to_string(), $crate::amf::AmfValue::from($value));)*
        $crate::amf::AmfValue::Object(map)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let s = AmfValue::String("test".into());
        assert_eq!(s.as_str(), Some("test"));
        assert_eq!(s.as_number(), None);

        let n = AmfValue::Number(42.0);
        assert_eq!(n.as_number(), Some(42.0));
        assert_eq!(n.as_str(), None);

        let o = amf_object! { "key" => "value", "num" => 7.0 };
        assert_eq!(o.get_string("key"), Some("value"));
        assert_eq!(o.get_number("num"), Some(7.0));
        assert_eq!(o.get("missing"), None);
        assert_eq!(n.get("anything"), None);
    }

    #[test]
    fn test_from_conversions() {
        let v: AmfValue = "test".into();
        assert!(matches!(v, AmfValue::String(_)));

        let v: AmfValue = 42.0.into();
        assert!(matches!(v, AmfValue::Number(_)));

        let v: AmfValue = 7u32.into();
        assert_eq!(v.as_number(), Some(7.0));

        let v: AmfValue = true.into();
        assert!(matches!(v, AmfValue::Boolean(true)));
    }

    #[test]
    fn test_ecma_array_acts_as_object() {
        let mut m = HashMap::new();
        m.insert("width".to_string(), AmfValue::Number(320.0));
        let v = AmfValue::EcmaArray(m);
        assert_eq!(v.get_number("width"), Some(320.0));
    }
}
