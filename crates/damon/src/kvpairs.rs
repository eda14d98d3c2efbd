#![forbid(unsafe_code)]

//! Ordered key-value trees.
//!
//! Every entity serializes into a [`KvMap`] whose keys follow the declaration
//! order of the entity's fields. Kernel interfaces key on that block
//! structure, so insertion order is preserved and output is deterministic.

use crate::error::{DecodeError, ParseError};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvValue {
    Str(String),
    Map(KvMap),
    List(Vec<KvValue>),
}

impl KvValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&KvMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[KvValue]> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// Treat a list element as a nested map.
    pub fn expect_map(
        &self,
        entity: &'static str,
        field: &'static str,
    ) -> Result<&KvMap, DecodeError> {
        self.as_map().ok_or(DecodeError::UnexpectedShape {
            entity,
            field,
            expected: "map",
        })
    }
}

impl From<String> for KvValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for KvValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<KvMap> for KvValue {
    fn from(value: KvMap) -> Self {
        Self::Map(value)
    }
}

impl From<Vec<KvValue>> for KvValue {
    fn from(value: Vec<KvValue>) -> Self {
        Self::List(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvMap {
    entries: Vec<(String, KvValue)>,
}

impl KvMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<KvValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder form of [`KvMap::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<KvValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&KvValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KvValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn opt_str(
        &self,
        entity: &'static str,
        field: &'static str,
    ) -> Result<Option<&str>, DecodeError> {
        match self.get(field) {
            None => Ok(None),
            Some(value) => value.as_str().map(Some).ok_or(DecodeError::UnexpectedShape {
                entity,
                field,
                expected: "string",
            }),
        }
    }

    pub fn str(&self, entity: &'static str, field: &'static str) -> Result<&str, DecodeError> {
        self.opt_str(entity, field)?
            .ok_or(DecodeError::MissingField { entity, field })
    }

    pub fn opt_map(
        &self,
        entity: &'static str,
        field: &'static str,
    ) -> Result<Option<&KvMap>, DecodeError> {
        match self.get(field) {
            None => Ok(None),
            Some(value) => value.expect_map(entity, field).map(Some),
        }
    }

    pub fn map(&self, entity: &'static str, field: &'static str) -> Result<&KvMap, DecodeError> {
        self.opt_map(entity, field)?
            .ok_or(DecodeError::MissingField { entity, field })
    }

    pub fn opt_list(
        &self,
        entity: &'static str,
        field: &'static str,
    ) -> Result<Option<&[KvValue]>, DecodeError> {
        match self.get(field) {
            None => Ok(None),
            Some(value) => value.as_list().map(Some).ok_or(DecodeError::UnexpectedShape {
                entity,
                field,
                expected: "list",
            }),
        }
    }

    pub fn list(
        &self,
        entity: &'static str,
        field: &'static str,
    ) -> Result<&[KvValue], DecodeError> {
        self.opt_list(entity, field)?
            .ok_or(DecodeError::MissingField { entity, field })
    }

    /// Parse a required string field with one of the `fmt` parsers.
    pub fn parse<T>(
        &self,
        entity: &'static str,
        field: &'static str,
        parser: impl FnOnce(&str) -> Result<T, ParseError>,
    ) -> Result<T, DecodeError> {
        let text = self.str(entity, field)?;
        parser(text).map_err(|source| DecodeError::Invalid {
            entity,
            field,
            source,
        })
    }

    /// Parse an optional string field, substituting `default` when absent.
    pub fn parse_or<T>(
        &self,
        entity: &'static str,
        field: &'static str,
        default: T,
        parser: impl FnOnce(&str) -> Result<T, ParseError>,
    ) -> Result<T, DecodeError> {
        match self.opt_str(entity, field)? {
            None => Ok(default),
            Some(text) => parser(text).map_err(|source| DecodeError::Invalid {
                entity,
                field,
                source,
            }),
        }
    }
}

impl<'a> IntoIterator for &'a KvMap {
    type Item = &'a (String, KvValue);
    type IntoIter = std::slice::Iter<'a, (String, KvValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Serialize for KvValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Str(s) => serializer.serialize_str(s),
            Self::Map(map) => map.serialize(serializer),
            Self::List(list) => serializer.collect_seq(list),
        }
    }
}

impl Serialize for KvMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct KvValueVisitor;

impl<'de> Visitor<'de> for KvValueVisitor {
    type Value = KvValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string, number, boolean, table or array")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<KvValue, E> {
        Ok(KvValue::Str(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<KvValue, E> {
        Ok(KvValue::Str(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<KvValue, E> {
        Ok(KvValue::Str(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<KvValue, E> {
        Ok(KvValue::Str(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<KvValue, E> {
        Ok(KvValue::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<KvValue, E> {
        Ok(KvValue::Str(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<KvValue, A::Error> {
        let mut list = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(value) = seq.next_element()? {
            list.push(value);
        }
        Ok(KvValue::List(list))
    }

    fn visit_map<A: MapAccess<'de>>(self, access: A) -> Result<KvValue, A::Error> {
        KvMapVisitor.visit_map(access).map(KvValue::Map)
    }
}

struct KvMapVisitor;

impl<'de> Visitor<'de> for KvMapVisitor {
    type Value = KvMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a table")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<KvMap, A::Error> {
        let mut map = KvMap::new();
        while let Some((key, value)) = access.next_entry::<String, KvValue>()? {
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for KvValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(KvValueVisitor)
    }
}

impl<'de> Deserialize<'de> for KvMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(KvMapVisitor)
    }
}
