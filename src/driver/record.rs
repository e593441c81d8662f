//! Record - 쿼리 결과 레코드
//!
//! 커서가 전달하는 불변 레코드. 필드 이름 목록은 같은 커서의 레코드끼리 공유합니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::error::{DriverError, DriverResult};
use super::types::{Node, Path, Relationship, Value};

// ============================================================================
// Record - 단일 레코드
// ============================================================================

/// 쿼리 결과 레코드
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 컬럼 키 (커서와 공유)
    keys: Arc<[String]>,
    /// 값들
    values: Vec<Value>,
}

impl Record {
    /// 새 레코드 생성
    pub fn new(keys: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { keys, values }
    }

    /// 키 목록
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// 값 목록
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// 레코드 길이
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 빈 레코드 여부
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 키의 위치
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// 키로 값 가져오기
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index_of(key).and_then(|i| self.values.get(i))
    }

    /// 인덱스로 값 가져오기
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// 키로 타입 변환된 값 가져오기
    pub fn get_as<T>(&self, key: &str) -> DriverResult<T>
    where
        T: TryFrom<Value, Error = DriverError>,
    {
        self.get(key)
            .cloned()
            .ok_or_else(|| DriverError::type_conversion(format!("Key '{}' not found", key)))
            .and_then(T::try_from)
    }

    /// 인덱스로 타입 변환된 값 가져오기
    pub fn get_as_by_index<T>(&self, index: usize) -> DriverResult<T>
    where
        T: TryFrom<Value, Error = DriverError>,
    {
        self.get_by_index(index)
            .cloned()
            .ok_or_else(|| {
                DriverError::type_conversion(format!(
                    "Index {} out of range for record of {} fields",
                    index,
                    self.len()
                ))
            })
            .and_then(T::try_from)
    }

    /// Integer 값 가져오기
    pub fn get_int(&self, key: &str) -> DriverResult<i64> {
        self.get_as::<i64>(key)
    }

    /// String 값 가져오기
    pub fn get_string(&self, key: &str) -> DriverResult<String> {
        self.get_as::<String>(key)
    }

    /// Node 값 가져오기
    pub fn get_node(&self, key: &str) -> DriverResult<Node> {
        self.get_as::<Node>(key)
    }

    /// Relationship 값 가져오기
    pub fn get_relationship(&self, key: &str) -> DriverResult<Relationship> {
        self.get_as::<Relationship>(key)
    }

    /// Path 값 가져오기
    pub fn get_path(&self, key: &str) -> DriverResult<Path> {
        self.get_as::<Path>(key)
    }

    /// Map으로 변환
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.keys
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    /// 키 존재 여부
    pub fn contains_key(&self, key: &str) -> bool {
        self.index_of(key).is_some()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .keys
            .iter()
            .zip(self.values.iter())
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        write!(f, "{{{}}}", pairs.join(", "))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::iter::Zip<std::slice::Iter<'a, String>, std::slice::Iter<'a, Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter().zip(self.values.iter())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_record() -> Record {
        let keys: Arc<[String]> = vec!["name".into(), "age".into(), "active".into()].into();
        let values = vec![
            Value::String("Alice".into()),
            Value::Integer(30),
            Value::Boolean(true),
        ];
        Record::new(keys, values)
    }

    #[test]
    fn test_record_creation() {
        let record = create_test_record();
        assert_eq!(record.len(), 3);
        assert!(!record.is_empty());
        assert_eq!(record.keys(), &["name", "age", "active"]);
    }

    #[test]
    fn test_name_and_position_agree() {
        let record = create_test_record();
        for (i, key) in record.keys().iter().enumerate() {
            assert_eq!(record.get(key), record.get_by_index(i));
        }
        assert_eq!(record.get("unknown"), None);
        assert_eq!(record.get_by_index(3), None);
    }

    #[test]
    fn test_record_get_typed() {
        let record = create_test_record();

        assert_eq!(record.get_string("name").unwrap(), "Alice");
        assert_eq!(record.get_int("age").unwrap(), 30);
        assert!(record.get_as::<bool>("active").unwrap());
        assert_eq!(record.get_as_by_index::<i64>(1).unwrap(), 30);
    }

    #[test]
    fn test_record_get_typed_error() {
        let record = create_test_record();

        assert!(record.get_int("name").is_err());
        assert!(record.get_string("unknown").is_err());
        assert!(matches!(
            record.get_as_by_index::<i64>(9),
            Err(DriverError::TypeConversion(_))
        ));
    }

    #[test]
    fn test_optional_values() {
        let keys: Arc<[String]> = vec!["value".into(), "missing".into()].into();
        let record = Record::new(keys, vec![Value::Integer(42), Value::Null]);

        assert_eq!(record.get_as::<Option<i64>>("value").unwrap(), Some(42));
        assert_eq!(record.get_as::<Option<i64>>("missing").unwrap(), None);
    }

    #[test]
    fn test_keys_are_shared() {
        let keys: Arc<[String]> = vec!["n".into()].into();
        let a = Record::new(keys.clone(), vec![Value::Integer(1)]);
        let b = Record::new(keys.clone(), vec![Value::Integer(2)]);
        assert_eq!(Arc::strong_count(&keys), 3);
        assert_eq!(a.keys(), b.keys());
    }

    #[test]
    fn test_record_to_map_and_display() {
        let record = create_test_record();
        let map = record.to_map();
        assert_eq!(map.get("age"), Some(&Value::Integer(30)));
        assert_eq!(record.to_string(), "{name: \"Alice\", age: 30, active: true}");
    }

    #[test]
    fn test_record_serializes_as_map() {
        let record = create_test_record();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Alice", "age": 30, "active": true}));
    }
}
