//! Driver Types
//!
//! 드라이버 값 모델과 PackStream 구조체의 수화(hydration)/탈수(dehydration)

use std::collections::HashMap;
use std::fmt;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};

use super::error::{DriverError, DriverResult};
use crate::bolt::packstream::{
    marker::*, Fields, PackStreamError, PackStreamNode, PackStreamPath, PackStreamRelationship,
    PackStreamStructure, PackStreamValue,
};

/// 0001-01-01 부터 1970-01-01 까지의 일 수
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SECOND;

// ============================================================================
// Value - 그래프 값
// ============================================================================

/// 그래프 값 타입
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Boolean(bool),
    /// Integer (i64)
    Integer(i64),
    /// Float (f64)
    Float(f64),
    /// String
    String(String),
    /// Bytes
    Bytes(Vec<u8>),
    /// List
    List(Vec<Value>),
    /// Map
    Map(HashMap<String, Value>),
    /// Node
    Node(Node),
    /// Relationship
    Relationship(Relationship),
    /// Path
    Path(Path),
    /// Point (2D/3D)
    Point(Point),
    /// Date
    Date(NaiveDate),
    /// Time (오프셋 포함)
    Time(OffsetTime),
    /// LocalTime
    LocalTime(NaiveTime),
    /// DateTime (고정 오프셋)
    DateTime(DateTime<FixedOffset>),
    /// DateTime (타임존 ID)
    #[serde(serialize_with = "serialize_zoned")]
    DateTimeZoneId(DateTime<Tz>),
    /// LocalDateTime
    LocalDateTime(NaiveDateTime),
    /// Duration
    Duration(Duration),
}

fn serialize_zoned<S: Serializer>(dt: &DateTime<Tz>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!(
        "{}[{}]",
        dt.fixed_offset().to_rfc3339(),
        dt.timezone().name()
    ))
}

impl Value {
    /// Null 여부
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean으로 변환
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer로 변환
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Float로 변환 (정수는 넓혀서)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// String으로 변환
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// List로 변환
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Map으로 변환
    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Node로 변환
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Relationship으로 변환
    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Value::Relationship(r) => Some(r),
            _ => None,
        }
    }

    /// Path로 변환
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    /// 타입 이름
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Node(_) => "Node",
            Value::Relationship(_) => "Relationship",
            Value::Path(_) => "Path",
            Value::Point(_) => "Point",
            Value::Date(_) => "Date",
            Value::Time(_) => "Time",
            Value::LocalTime(_) => "LocalTime",
            Value::DateTime(_) => "DateTime",
            Value::DateTimeZoneId(_) => "DateTime",
            Value::LocalDateTime(_) => "LocalDateTime",
            Value::Duration(_) => "Duration",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(l) => write!(f, "[{} items]", l.len()),
            Value::Map(m) => write!(f, "{{{} entries}}", m.len()),
            Value::Node(n) => write!(f, "{}", n),
            Value::Relationship(r) => write!(f, "{}", r),
            Value::Path(p) => write!(f, "{}", p),
            Value::Point(p) => write!(f, "{}", p),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::LocalTime(t) => write!(f, "{}", t),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::DateTimeZoneId(dt) => {
                write!(f, "{}[{}]", dt.fixed_offset().to_rfc3339(), dt.timezone().name())
            }
            Value::LocalDateTime(dt) => write!(f, "{}", dt),
            Value::Duration(d) => write!(f, "{}", d),
        }
    }
}

// From implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl TryFrom<u64> for Value {
    type Error = DriverError;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        i64::try_from(v).map(Value::Integer).map_err(|_| {
            DriverError::type_conversion(format!("{} is out of range for a 64-bit integer", v))
        })
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(v: HashMap<String, T>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::LocalTime(v)
    }
}

impl From<OffsetTime> for Value {
    fn from(v: OffsetTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::LocalDateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTime(v)
    }
}

impl From<DateTime<Tz>> for Value {
    fn from(v: DateTime<Tz>) -> Self {
        Value::DateTimeZoneId(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}

impl From<Point> for Value {
    fn from(v: Point) -> Self {
        Value::Point(v)
    }
}

// ============================================================================
// Node - 그래프 노드
// ============================================================================

/// 그래프 노드
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// 노드 ID
    pub id: i64,
    /// 레이블
    pub labels: Vec<String>,
    /// 속성
    pub properties: HashMap<String, Value>,
    /// 엘리먼트 ID (프로토콜 5.0+)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
}

impl Node {
    /// 새 노드 생성
    pub fn new(id: i64, labels: Vec<String>, properties: HashMap<String, Value>) -> Self {
        Self {
            id,
            labels,
            properties,
            element_id: None,
        }
    }

    /// 레이블 포함 여부
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// 속성 가져오기
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// 속성 가져오기 (타입 변환)
    pub fn get_as<T: TryFrom<Value, Error = DriverError>>(&self, key: &str) -> DriverResult<T> {
        self.properties
            .get(key)
            .cloned()
            .ok_or_else(|| DriverError::type_conversion(format!("Property '{}' not found", key)))
            .and_then(T::try_from)
    }

    fn hydrate(raw: PackStreamNode) -> Result<Self, PackStreamError> {
        Ok(Self {
            id: raw.id,
            labels: raw.labels,
            properties: hydrate_map(raw.properties)?,
            element_id: raw.element_id,
        })
    }

    /// 엘리먼트 ID, 없으면 정수 ID 문자열
    fn element_id_or_id(&self) -> String {
        self.element_id.clone().unwrap_or_else(|| self.id.to_string())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = if self.labels.is_empty() {
            String::new()
        } else {
            format!(":{}", self.labels.join(":"))
        };
        write!(f, "({}{})", self.id, labels)
    }
}

// ============================================================================
// Relationship - 그래프 관계
// ============================================================================

/// 그래프 관계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    /// 관계 ID
    pub id: i64,
    /// 시작 노드 ID
    pub start_node_id: i64,
    /// 끝 노드 ID
    pub end_node_id: i64,
    /// 타입
    #[serde(rename = "type")]
    pub rel_type: String,
    /// 속성
    pub properties: HashMap<String, Value>,
    /// 엘리먼트 ID (프로토콜 5.0+)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    /// 시작 노드 엘리먼트 ID (프로토콜 5.0+)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_node_element_id: Option<String>,
    /// 끝 노드 엘리먼트 ID (프로토콜 5.0+)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_node_element_id: Option<String>,
}

impl Relationship {
    /// 새 관계 생성
    pub fn new(
        id: i64,
        start_node_id: i64,
        end_node_id: i64,
        rel_type: String,
        properties: HashMap<String, Value>,
    ) -> Self {
        Self {
            id,
            start_node_id,
            end_node_id,
            rel_type,
            properties,
            element_id: None,
            start_node_element_id: None,
            end_node_element_id: None,
        }
    }

    /// 속성 가져오기
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    fn hydrate(raw: PackStreamRelationship) -> Result<Self, PackStreamError> {
        Ok(Self {
            id: raw.id,
            start_node_id: raw.start_node_id,
            end_node_id: raw.end_node_id,
            rel_type: raw.rel_type,
            properties: hydrate_map(raw.properties)?,
            element_id: raw.element_id,
            start_node_element_id: raw.start_node_element_id,
            end_node_element_id: raw.end_node_element_id,
        })
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({})-[:{}]->({})  [id: {}]",
            self.start_node_id, self.rel_type, self.end_node_id, self.id
        )
    }
}

// ============================================================================
// Path - 그래프 경로
// ============================================================================

/// 그래프 경로
///
/// `nodes`는 순회 순서대로 나열되며 (반복 가능), `relationships[i]`는
/// `nodes[i]`와 `nodes[i + 1]`을 잇습니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    /// 노드들
    pub nodes: Vec<Node>,
    /// 관계들
    pub relationships: Vec<Relationship>,
}

impl Path {
    /// 새 경로 생성
    pub fn new(nodes: Vec<Node>, relationships: Vec<Relationship>) -> Self {
        Self { nodes, relationships }
    }

    /// 경로 길이 (관계 수)
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    /// 빈 경로 여부
    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    /// 시작 노드
    pub fn start(&self) -> Option<&Node> {
        self.nodes.first()
    }

    /// 끝 노드
    pub fn end(&self) -> Option<&Node> {
        self.nodes.last()
    }

    /// 압축된 전송 형식(고유 노드, 경계 없는 관계, 인덱스)에서 경로 재구성
    fn hydrate(raw: PackStreamPath) -> Result<Self, PackStreamError> {
        let invalid = |msg: String| PackStreamError::InvalidStructure(msg);

        let unique_nodes = raw
            .nodes
            .into_iter()
            .map(Node::hydrate)
            .collect::<Result<Vec<_>, _>>()?;
        let first = unique_nodes
            .first()
            .cloned()
            .ok_or_else(|| invalid("Path must contain at least one node".into()))?;

        let mut nodes = vec![first];
        let mut relationships = Vec::with_capacity(raw.indices.len() / 2);

        for pair in raw.indices.chunks_exact(2) {
            let (rel_index, node_index) = (pair[0], pair[1]);
            let next = usize::try_from(node_index)
                .ok()
                .and_then(|i| unique_nodes.get(i))
                .cloned()
                .ok_or_else(|| invalid(format!("Path node index {} out of range", node_index)))?;

            let forward = rel_index > 0;
            let slot = usize::try_from(rel_index.unsigned_abs())
                .ok()
                .and_then(|i| i.checked_sub(1));
            let unbound = slot
                .and_then(|i| raw.relationships.get(i))
                .cloned()
                .ok_or_else(|| {
                    invalid(format!("Path relationship index {} out of range", rel_index))
                })?;

            let current = nodes.last().cloned().unwrap_or_else(|| next.clone());
            let (start, end) = if forward { (&current, &next) } else { (&next, &current) };
            relationships.push(Relationship {
                id: unbound.id,
                start_node_id: start.id,
                end_node_id: end.id,
                rel_type: unbound.rel_type,
                properties: hydrate_map(unbound.properties)?,
                start_node_element_id: unbound.element_id.as_ref().map(|_| start.element_id_or_id()),
                end_node_element_id: unbound.element_id.as_ref().map(|_| end.element_id_or_id()),
                element_id: unbound.element_id,
            });
            nodes.push(next);
        }

        Ok(Self { nodes, relationships })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Path: {} nodes, {} rels>", self.nodes.len(), self.relationships.len())
    }
}

// ============================================================================
// Point - 공간 좌표
// ============================================================================

/// 공간 좌표
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    /// SRID (Spatial Reference ID)
    pub srid: i32,
    /// X 좌표 (경도)
    pub x: f64,
    /// Y 좌표 (위도)
    pub y: f64,
    /// Z 좌표 (고도, 선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Point {
    /// 2D 포인트 생성
    pub fn new_2d(srid: i32, x: f64, y: f64) -> Self {
        Self { srid, x, y, z: None }
    }

    /// 3D 포인트 생성
    pub fn new_3d(srid: i32, x: f64, y: f64, z: f64) -> Self {
        Self { srid, x, y, z: Some(z) }
    }

    /// WGS84 2D 포인트 (경도, 위도)
    pub fn wgs84_2d(longitude: f64, latitude: f64) -> Self {
        Self::new_2d(4326, longitude, latitude)
    }

    /// Cartesian 2D 포인트
    pub fn cartesian_2d(x: f64, y: f64) -> Self {
        Self::new_2d(7203, x, y)
    }

    /// 3D 여부
    pub fn is_3d(&self) -> bool {
        self.z.is_some()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.z {
            Some(z) => write!(f, "Point(srid={}, x={}, y={}, z={})", self.srid, self.x, self.y, z),
            None => write!(f, "Point(srid={}, x={}, y={})", self.srid, self.x, self.y),
        }
    }
}

// ============================================================================
// OffsetTime - 오프셋 포함 시각
// ============================================================================

/// UTC 오프셋이 붙은 하루 중 시각
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OffsetTime {
    /// 현지 시각
    pub time: NaiveTime,
    /// UTC 기준 오프셋 (초)
    pub offset_seconds: i32,
}

impl OffsetTime {
    /// 새 OffsetTime 생성
    pub fn new(time: NaiveTime, offset: FixedOffset) -> Self {
        Self {
            time,
            offset_seconds: offset.local_minus_utc(),
        }
    }

    /// 오프셋
    pub fn offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.offset_seconds)
    }
}

impl fmt::Display for OffsetTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset() {
            Some(offset) => write!(f, "{}{}", self.time, offset),
            None => write!(f, "{}+{}s", self.time, self.offset_seconds),
        }
    }
}

// ============================================================================
// Duration - 시간 간격
// ============================================================================

/// 시간 간격
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Duration {
    /// 개월
    pub months: i64,
    /// 일
    pub days: i64,
    /// 초
    pub seconds: i64,
    /// 나노초
    pub nanoseconds: i32,
}

impl Duration {
    /// 새 Duration 생성
    pub fn new(months: i64, days: i64, seconds: i64, nanoseconds: i32) -> Self {
        Self {
            months,
            days,
            seconds,
            nanoseconds,
        }
    }

    /// 초에서 생성
    pub fn from_seconds(seconds: i64) -> Self {
        Self::new(0, 0, seconds, 0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P{}M{}DT{}S",
            self.months,
            self.days,
            self.seconds as f64 + self.nanoseconds as f64 / 1_000_000_000.0
        )
    }
}

// ============================================================================
// Hydration - PackStream → Value
// ============================================================================

fn hydrate_map(
    map: HashMap<String, PackStreamValue>,
) -> Result<HashMap<String, Value>, PackStreamError> {
    map.into_iter()
        .map(|(k, v)| Ok((k, Value::hydrate(v)?)))
        .collect()
}

fn out_of_range(what: &str) -> PackStreamError {
    PackStreamError::InvalidStructure(format!("{} out of range", what))
}

fn naive_time_from_nanos(nanos_of_day: i64) -> Result<NaiveTime, PackStreamError> {
    if !(0..NANOS_PER_DAY).contains(&nanos_of_day) {
        return Err(out_of_range("time of day"));
    }
    NaiveTime::from_num_seconds_from_midnight_opt(
        (nanos_of_day / NANOS_PER_SECOND) as u32,
        (nanos_of_day % NANOS_PER_SECOND) as u32,
    )
    .ok_or_else(|| out_of_range("time of day"))
}

fn naive_date_time(seconds: i64, nanos: i64) -> Result<NaiveDateTime, PackStreamError> {
    let nanos = u32::try_from(nanos).map_err(|_| out_of_range("nanoseconds"))?;
    DateTime::from_timestamp(seconds, nanos)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| out_of_range("date-time"))
}

fn fixed_offset(seconds: i64) -> Result<FixedOffset, PackStreamError> {
    i32::try_from(seconds)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| out_of_range("UTC offset"))
}

fn time_zone(name: &str) -> Result<Tz, PackStreamError> {
    name.parse::<Tz>()
        .map_err(|_| PackStreamError::InvalidStructure(format!("Unknown time zone '{}'", name)))
}

impl Value {
    /// PackStream 값을 드라이버 값으로 변환 (구조체는 태그로 분기)
    pub fn hydrate(value: PackStreamValue) -> Result<Value, PackStreamError> {
        Ok(match value {
            PackStreamValue::Null => Value::Null,
            PackStreamValue::Boolean(b) => Value::Boolean(b),
            PackStreamValue::Integer(i) => Value::Integer(i),
            PackStreamValue::Float(f) => Value::Float(f),
            PackStreamValue::String(s) => Value::String(s),
            PackStreamValue::Bytes(b) => Value::Bytes(b),
            PackStreamValue::List(l) => {
                Value::List(l.into_iter().map(Value::hydrate).collect::<Result<_, _>>()?)
            }
            PackStreamValue::Map(m) => Value::Map(hydrate_map(m)?),
            PackStreamValue::Structure(s) => Self::hydrate_structure(&s)?,
        })
    }

    fn hydrate_structure(s: &PackStreamStructure) -> Result<Value, PackStreamError> {
        let value = match s.tag {
            NODE_TAG => Value::Node(Node::hydrate(PackStreamNode::from_structure(s)?)?),
            RELATIONSHIP_TAG => Value::Relationship(Relationship::hydrate(
                PackStreamRelationship::from_structure(s)?,
            )?),
            PATH_TAG => Value::Path(Path::hydrate(PackStreamPath::from_structure(s)?)?),
            UNBOUND_RELATIONSHIP_TAG => {
                return Err(PackStreamError::InvalidStructure(
                    "UnboundRelationship is only valid inside a Path".into(),
                ))
            }
            DATE_TAG => {
                let f = Fields::new(s, DATE_TAG, "Date", 1..=1)?;
                let days = f
                    .int(0)?
                    .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                    .and_then(|d| i32::try_from(d).ok())
                    .ok_or_else(|| out_of_range("date"))?;
                Value::Date(NaiveDate::from_num_days_from_ce_opt(days).ok_or_else(|| out_of_range("date"))?)
            }
            TIME_TAG => {
                let f = Fields::new(s, TIME_TAG, "Time", 2..=2)?;
                Value::Time(OffsetTime::new(naive_time_from_nanos(f.int(0)?)?, fixed_offset(f.int(1)?)?))
            }
            LOCAL_TIME_TAG => {
                let f = Fields::new(s, LOCAL_TIME_TAG, "LocalTime", 1..=1)?;
                Value::LocalTime(naive_time_from_nanos(f.int(0)?)?)
            }
            DATE_TIME_TAG | DATE_TIME_UTC_TAG => {
                let f = Fields::new(s, s.tag, "DateTime", 3..=3)?;
                let naive = naive_date_time(f.int(0)?, f.int(1)?)?;
                let offset = fixed_offset(f.int(2)?)?;
                let dt = if s.tag == DATE_TIME_UTC_TAG {
                    offset.from_utc_datetime(&naive)
                } else {
                    offset
                        .from_local_datetime(&naive)
                        .single()
                        .ok_or_else(|| out_of_range("date-time"))?
                };
                Value::DateTime(dt)
            }
            DATE_TIME_ZONE_ID_TAG | DATE_TIME_ZONE_ID_UTC_TAG => {
                let f = Fields::new(s, s.tag, "DateTimeZoneId", 3..=3)?;
                let naive = naive_date_time(f.int(0)?, f.int(1)?)?;
                let tz = time_zone(f.string(2)?)?;
                let dt = if s.tag == DATE_TIME_ZONE_ID_UTC_TAG {
                    tz.from_utc_datetime(&naive)
                } else {
                    tz.from_local_datetime(&naive)
                        .earliest()
                        .ok_or_else(|| out_of_range("local date-time in zone"))?
                };
                Value::DateTimeZoneId(dt)
            }
            LOCAL_DATE_TIME_TAG => {
                let f = Fields::new(s, LOCAL_DATE_TIME_TAG, "LocalDateTime", 2..=2)?;
                Value::LocalDateTime(naive_date_time(f.int(0)?, f.int(1)?)?)
            }
            DURATION_TAG => {
                let f = Fields::new(s, DURATION_TAG, "Duration", 4..=4)?;
                Value::Duration(Duration::new(
                    f.int(0)?,
                    f.int(1)?,
                    f.int(2)?,
                    i32::try_from(f.int(3)?).map_err(|_| out_of_range("nanoseconds"))?,
                ))
            }
            POINT_2D_TAG | POINT_3D_TAG => {
                let arity = if s.tag == POINT_2D_TAG { 3 } else { 4 };
                let f = Fields::new(s, s.tag, "Point", arity..=arity)?;
                let srid = i32::try_from(f.int(0)?).map_err(|_| out_of_range("SRID"))?;
                Value::Point(Point {
                    srid,
                    x: f.float(1)?,
                    y: f.float(2)?,
                    z: if arity == 4 { Some(f.float(3)?) } else { None },
                })
            }
            other => return Err(PackStreamError::UnknownTag(other)),
        };
        Ok(value)
    }
}

// ============================================================================
// Dehydration - Value → PackStream
// ============================================================================

fn structure(tag: u8, fields: Vec<PackStreamValue>) -> PackStreamValue {
    PackStreamValue::Structure(PackStreamStructure::new(tag, fields))
}

fn nanos_of_day(time: &NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * NANOS_PER_SECOND + time.nanosecond() as i64
}

impl Value {
    /// 쿼리 파라미터로 전송할 PackStream 값으로 변환
    ///
    /// `utc_date_times`가 참이면 날짜-시간을 UTC 초 형식으로, 아니면
    /// 현지 벽시계 초 형식으로 씁니다. 그래프 엔티티는 파라미터가 될 수 없습니다.
    pub fn dehydrate(&self, utc_date_times: bool) -> DriverResult<PackStreamValue> {
        Ok(match self {
            Value::Null => PackStreamValue::Null,
            Value::Boolean(b) => PackStreamValue::Boolean(*b),
            Value::Integer(i) => PackStreamValue::Integer(*i),
            Value::Float(f) => PackStreamValue::Float(*f),
            Value::String(s) => PackStreamValue::String(s.clone()),
            Value::Bytes(b) => PackStreamValue::Bytes(b.clone()),
            Value::List(l) => PackStreamValue::List(
                l.iter()
                    .map(|v| v.dehydrate(utc_date_times))
                    .collect::<DriverResult<_>>()?,
            ),
            Value::Map(m) => PackStreamValue::Map(dehydrate_map(m, utc_date_times)?),
            Value::Node(_) | Value::Relationship(_) | Value::Path(_) => {
                return Err(DriverError::type_conversion(format!(
                    "{} cannot be used as a query parameter",
                    self.type_name()
                )))
            }
            Value::Point(p) => match p.z {
                None => structure(POINT_2D_TAG, vec![(p.srid as i64).into(), p.x.into(), p.y.into()]),
                Some(z) => structure(
                    POINT_3D_TAG,
                    vec![(p.srid as i64).into(), p.x.into(), p.y.into(), z.into()],
                ),
            },
            Value::Date(d) => structure(
                DATE_TAG,
                vec![(d.num_days_from_ce() as i64 - UNIX_EPOCH_DAYS_FROM_CE).into()],
            ),
            Value::Time(t) => structure(
                TIME_TAG,
                vec![nanos_of_day(&t.time).into(), (t.offset_seconds as i64).into()],
            ),
            Value::LocalTime(t) => structure(LOCAL_TIME_TAG, vec![nanos_of_day(t).into()]),
            Value::DateTime(dt) => {
                let offset = dt.offset().local_minus_utc() as i64;
                let (tag, seconds) = if utc_date_times {
                    (DATE_TIME_UTC_TAG, dt.timestamp())
                } else {
                    (DATE_TIME_TAG, dt.naive_local().and_utc().timestamp())
                };
                structure(
                    tag,
                    vec![seconds.into(), (dt.timestamp_subsec_nanos() as i64).into(), offset.into()],
                )
            }
            Value::DateTimeZoneId(dt) => {
                let (tag, seconds) = if utc_date_times {
                    (DATE_TIME_ZONE_ID_UTC_TAG, dt.timestamp())
                } else {
                    (DATE_TIME_ZONE_ID_TAG, dt.naive_local().and_utc().timestamp())
                };
                structure(
                    tag,
                    vec![
                        seconds.into(),
                        (dt.timestamp_subsec_nanos() as i64).into(),
                        dt.timezone().name().into(),
                    ],
                )
            }
            Value::LocalDateTime(dt) => {
                let utc = dt.and_utc();
                structure(
                    LOCAL_DATE_TIME_TAG,
                    vec![utc.timestamp().into(), (utc.timestamp_subsec_nanos() as i64).into()],
                )
            }
            Value::Duration(d) => structure(
                DURATION_TAG,
                vec![
                    d.months.into(),
                    d.days.into(),
                    d.seconds.into(),
                    (d.nanoseconds as i64).into(),
                ],
            ),
        })
    }
}

/// 파라미터 맵 전체 변환
pub fn dehydrate_map(
    map: &HashMap<String, Value>,
    utc_date_times: bool,
) -> DriverResult<HashMap<String, PackStreamValue>> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), v.dehydrate(utc_date_times)?)))
        .collect()
}

// ============================================================================
// TryFrom implementations
// ============================================================================

macro_rules! impl_try_from_value {
    ($target:ty, $name:literal, $($pattern:pat => $out:expr),+ $(,)?) => {
        impl TryFrom<Value> for $target {
            type Error = DriverError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    $($pattern => Ok($out),)+
                    other => Err(DriverError::type_conversion(format!(
                        "Cannot convert {} to {}",
                        other.type_name(),
                        $name
                    ))),
                }
            }
        }
    };
}

impl_try_from_value!(bool, "bool", Value::Boolean(b) => b);
impl_try_from_value!(i64, "i64", Value::Integer(i) => i);
impl_try_from_value!(f64, "f64", Value::Float(f) => f, Value::Integer(i) => i as f64);
impl_try_from_value!(String, "String", Value::String(s) => s);
impl_try_from_value!(Vec<u8>, "bytes", Value::Bytes(b) => b);
impl_try_from_value!(Vec<Value>, "List", Value::List(l) => l);
impl_try_from_value!(HashMap<String, Value>, "Map", Value::Map(m) => m);
impl_try_from_value!(Node, "Node", Value::Node(n) => n);
impl_try_from_value!(Relationship, "Relationship", Value::Relationship(r) => r);
impl_try_from_value!(Path, "Path", Value::Path(p) => p);
impl_try_from_value!(Point, "Point", Value::Point(p) => p);
impl_try_from_value!(Duration, "Duration", Value::Duration(d) => d);
impl_try_from_value!(NaiveDate, "Date", Value::Date(d) => d);
impl_try_from_value!(NaiveTime, "LocalTime", Value::LocalTime(t) => t);
impl_try_from_value!(OffsetTime, "Time", Value::Time(t) => t);
impl_try_from_value!(NaiveDateTime, "LocalDateTime", Value::LocalDateTime(dt) => dt);
impl_try_from_value!(DateTime<FixedOffset>, "DateTime", Value::DateTime(dt) => dt);
impl_try_from_value!(DateTime<Tz>, "DateTime with zone id", Value::DateTimeZoneId(dt) => dt);

impl<T: TryFrom<Value, Error = DriverError>> TryFrom<Value> for Option<T> {
    type Error = DriverError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(None),
            other => T::try_from(other).map(Some),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
