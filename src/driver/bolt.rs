//! Bolt adapter over `neo4rs`
//!
//! One `neo4rs::Graph` (itself a connection pool) is opened lazily per
//! database name. A [`BoltSession`] is a handle on that graph; closing it
//! returns nothing to the server.
//!
//! `neo4rs` rows are read by column name, so the column list is taken from
//! the statement's final `RETURN` clause: the `AS` alias when present,
//! otherwise the expression text, which is how the server names columns.
//! Store types without a wire counterpart come back as [`OpaqueValue`]s
//! holding the original `BoltType`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use neo4rs::{
    query, BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder, Graph,
};
use tokio::sync::Mutex;

use super::{Driver, OpaqueValue, Row, Session, WireDateTime, WireEdge, WireMap, WireNode, WireValue};
use crate::error::{MapperError, Result};

pub struct BoltDriver {
    uri: String,
    user: String,
    password: String,
    graphs: Mutex<HashMap<String, Graph>>,
}

impl BoltDriver {
    pub fn new(uri: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            user: user.into(),
            password: password.into(),
            graphs: Mutex::new(HashMap::new()),
        }
    }

    async fn graph(&self, database: &str) -> Result<Graph> {
        let mut graphs = self.graphs.lock().await;
        if let Some(graph) = graphs.get(database) {
            return Ok(graph.clone());
        }

        let config = ConfigBuilder::default()
            .uri(self.uri.as_str())
            .user(self.user.as_str())
            .password(self.password.as_str())
            .db(database)
            .build()
            .map_err(MapperError::driver)?;
        let graph = Graph::connect(config).await.map_err(MapperError::driver)?;
        tracing::info!("Connected to {} (database {})", self.uri, database);

        graphs.insert(database.to_string(), graph.clone());
        Ok(graph)
    }
}

#[async_trait]
impl Driver for BoltDriver {
    async fn open_session(&self, database: &str) -> Result<Box<dyn Session>> {
        Ok(Box::new(BoltSession {
            graph: self.graph(database).await?,
        }))
    }
}

pub struct BoltSession {
    graph: Graph,
}

#[async_trait]
impl Session for BoltSession {
    async fn run(&mut self, statement: &str, params: WireMap) -> Result<Vec<Row>> {
        let columns = return_columns(statement)?;
        let mut q = query(statement);
        for (name, value) in params {
            q = q.param(&name, to_bolt(value)?);
        }

        let mut stream = self.graph.execute(q).await.map_err(MapperError::driver)?;
        let mut rows = Vec::new();
        while let Some(record) = stream.next().await.map_err(MapperError::driver)? {
            let mut row = Row::new();
            for column in &columns {
                let cell: BoltType = record.get(column).map_err(MapperError::driver)?;
                row.push(column.clone(), from_bolt(cell)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Result Columns
// ============================================================================

/// Column names of the statement's final `RETURN` clause, in order
fn return_columns(statement: &str) -> Result<Vec<String>> {
    let masked = mask_nested(statement);
    let Some(start) = keyword_positions(&masked, "RETURN").last() else {
        return Ok(Vec::new());
    };
    let body_start = start + "RETURN".len();
    let body_end = ["ORDER", "SKIP", "LIMIT"]
        .iter()
        .filter_map(|kw| keyword_positions(&masked[body_start..], kw).next())
        .min()
        .map_or(statement.len(), |at| body_start + at);

    let mut item_start = body_start;
    if let Some(at) = keyword_positions(&masked[body_start..body_end], "DISTINCT").next() {
        if statement[body_start..body_start + at].trim().is_empty() {
            item_start = body_start + at + "DISTINCT".len();
        }
    }

    let mut columns = Vec::new();
    for at in item_start..=body_end {
        if at == body_end || masked[at] == b',' {
            columns.push(column_name(&statement[item_start..at], &masked[item_start..at])?);
            item_start = at + 1;
        }
    }
    Ok(columns)
}

fn column_name(item: &str, masked: &[u8]) -> Result<String> {
    let name = match keyword_positions(masked, "AS").last() {
        Some(at) => item[at + "AS".len()..].trim(),
        None => item.trim(),
    };
    if name == "*" {
        return Err(MapperError::Conversion(
            "RETURN * does not name its columns; list them explicitly".into(),
        ));
    }
    match name.strip_prefix('`').and_then(|n| n.strip_suffix('`')) {
        Some(quoted) => Ok(quoted.replace("``", "`")),
        None => Ok(name.to_string()),
    }
}

/// Statement bytes with quoted text and bracketed sub-expressions blanked
///
/// Keywords and commas found in the result are top-level. Offsets match
/// the original text.
fn mask_nested(text: &str) -> Vec<u8> {
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    text.bytes()
        .map(|b| {
            let blank = match quote {
                Some(q) => {
                    if b == q {
                        quote = None;
                    }
                    true
                }
                None => match b {
                    b'\'' | b'"' | b'`' => {
                        quote = Some(b);
                        true
                    }
                    b'(' | b'[' | b'{' => {
                        depth += 1;
                        true
                    }
                    b')' | b']' | b'}' => {
                        depth = depth.saturating_sub(1);
                        true
                    }
                    _ => depth > 0,
                },
            };
            if blank {
                b' '
            } else {
                b
            }
        })
        .collect()
}

fn keyword_positions<'a>(masked: &'a [u8], keyword: &'a str) -> impl Iterator<Item = usize> + 'a {
    let kw = keyword.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b'.';
    (0..(masked.len() + 1).saturating_sub(kw.len())).filter(move |&at| {
        masked[at..at + kw.len()].eq_ignore_ascii_case(kw)
            && (at == 0 || !is_word(masked[at - 1]))
            && masked.get(at + kw.len()).map_or(true, |&b| !is_word(b))
    })
}

// ============================================================================
// Value Conversion
// ============================================================================

fn to_bolt_map(map: WireMap) -> Result<BoltMap> {
    let mut out = BoltMap::default();
    for (key, value) in map {
        out.value.insert(BoltString::from(key), to_bolt(value)?);
    }
    Ok(out)
}

fn to_bolt(value: WireValue) -> Result<BoltType> {
    Ok(match value {
        WireValue::Null => BoltType::Null(BoltNull),
        WireValue::Bool(b) => BoltType::from(b),
        WireValue::Integer(i) => BoltType::from(i),
        WireValue::Float(f) => BoltType::from(f),
        WireValue::String(s) => BoltType::from(s),
        WireValue::DateTime(dt) => {
            let offset = FixedOffset::east_opt(dt.offset_seconds)
                .ok_or_else(|| MapperError::Conversion(format!("invalid zone offset {}", dt.offset_seconds)))?;
            let at = offset
                .timestamp_opt(dt.seconds, dt.nanoseconds)
                .single()
                .ok_or_else(|| MapperError::Conversion(format!("invalid timestamp {}s", dt.seconds)))?;
            BoltType::from(at)
        }
        WireValue::List(items) => BoltType::List(BoltList::from(
            items.into_iter().map(to_bolt).collect::<Result<Vec<_>>>()?,
        )),
        WireValue::Map(map) => BoltType::Map(to_bolt_map(map)?),
        WireValue::Opaque(opaque) => opaque.downcast_ref::<BoltType>().cloned().ok_or_else(|| {
            MapperError::Conversion(format!("{} value was not read from a Bolt store", opaque.type_name()))
        })?,
        WireValue::Node(_) | WireValue::Relationship(_) => {
            return Err(MapperError::Conversion(
                "node and relationship values cannot be sent as parameters".into(),
            ))
        }
    })
}

fn from_bolt_map(map: BoltMap) -> Result<WireMap> {
    map.value
        .into_iter()
        .map(|(key, value)| Ok((key.value, from_bolt(value)?)))
        .collect()
}

fn from_bolt(value: BoltType) -> Result<WireValue> {
    Ok(match value {
        BoltType::Null(_) => WireValue::Null,
        BoltType::Boolean(b) => WireValue::Bool(b.value),
        BoltType::Integer(i) => WireValue::Integer(i.value),
        BoltType::Float(f) => WireValue::Float(f.value),
        BoltType::String(s) => WireValue::String(s.value),
        BoltType::List(list) => WireValue::List(
            list.value.into_iter().map(from_bolt).collect::<Result<Vec<_>>>()?,
        ),
        BoltType::Map(map) => WireValue::Map(from_bolt_map(map)?),
        BoltType::Node(node) => WireValue::Node(WireNode {
            labels: node
                .labels
                .value
                .into_iter()
                .filter_map(|l| match l {
                    BoltType::String(s) => Some(s.value),
                    _ => None,
                })
                .collect(),
            properties: from_bolt_map(node.properties)?,
        }),
        BoltType::Relation(rel) => WireValue::Relationship(WireEdge {
            rel_type: rel.typ.value,
            properties: from_bolt_map(rel.properties)?,
        }),
        BoltType::DateTime(dt) => {
            let at = DateTime::<FixedOffset>::try_from(&dt).map_err(MapperError::driver)?;
            WireValue::DateTime(WireDateTime {
                seconds: at.timestamp(),
                nanoseconds: at.timestamp_subsec_nanos(),
                offset_seconds: at.offset().local_minus_utc(),
            })
        }
        other => WireValue::Opaque(OpaqueValue::new(bolt_type_name(&other), other)),
    })
}

/// Variant name of a `BoltType`, e.g. `Date` or `Point2D`
fn bolt_type_name(value: &BoltType) -> String {
    let repr = format!("{:?}", value);
    repr.split(|c: char| !c.is_ascii_alphanumeric())
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::cypher;
    use crate::value::PropertyMap;
    use chrono::NaiveDate;

    #[test]
    fn test_columns_of_generated_statements() {
        assert_eq!(return_columns(&cypher::fetch_node("a").text).unwrap(), vec!["n"]);
        assert_eq!(
            return_columns(&cypher::outgoing("FOLLOWS", "a").unwrap().text).unwrap(),
            vec!["r", "from", "to"]
        );
        assert_eq!(
            return_columns(&cypher::link("FOLLOWS", "a", "b", PropertyMap::new()).unwrap().text).unwrap(),
            vec!["r", "from", "to"]
        );
        let find = cypher::find(
            "User",
            &cypher::FindQuery::new()
                .filter("name", "x")
                .order_by("name", cypher::Direction::Desc)
                .limit(3),
        )
        .unwrap();
        assert_eq!(return_columns(&find.text).unwrap(), vec!["n"]);
        assert!(return_columns(&cypher::delete_node("a").text).unwrap().is_empty());
        assert!(return_columns(&cypher::reset().text).unwrap().is_empty());
    }

    #[test]
    fn test_columns_of_raw_statements() {
        assert_eq!(
            return_columns("MATCH (n) RETURN n.name, count(n) AS total ORDER BY total").unwrap(),
            vec!["n.name", "total"]
        );
        assert_eq!(
            return_columns("MATCH (n) return distinct n.`$id` as `my id`").unwrap(),
            vec!["my id"]
        );
        assert_eq!(
            return_columns("MATCH (n) WHERE n.note = 'RETURN x, y' RETURN n").unwrap(),
            vec!["n"]
        );
        assert_eq!(
            return_columns("MATCH (n) RETURN coalesce(n.a, n.b) AS v, [x IN n.l | x] AS l").unwrap(),
            vec!["v", "l"]
        );
        assert!(matches!(return_columns("MATCH (n) RETURN *"), Err(MapperError::Conversion(_))));
    }

    #[test]
    fn test_wire_values_survive_bolt() {
        let samples = vec![
            WireValue::Null,
            WireValue::Bool(true),
            WireValue::Integer(-42),
            WireValue::Float(2.5),
            WireValue::from("text"),
            WireValue::DateTime(WireDateTime {
                seconds: 1_684_312_215,
                nanoseconds: 123_456_789,
                offset_seconds: 3600,
            }),
            WireValue::List(vec![WireValue::Integer(1), WireValue::from("two")]),
            WireValue::Map(
                [("a".to_string(), WireValue::Integer(1)), ("b".to_string(), WireValue::Null)]
                    .into_iter()
                    .collect(),
            ),
        ];
        for value in samples {
            let back = from_bolt(to_bolt(value.clone()).unwrap()).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn test_unmodelled_bolt_values_pass_through() {
        let date = BoltType::from(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let wire = from_bolt(date.clone()).unwrap();
        let WireValue::Opaque(opaque) = &wire else { panic!("expected opaque value") };
        assert_eq!(opaque.type_name(), "Date");

        assert_eq!(to_bolt(wire).unwrap(), date);
    }

    #[test]
    fn test_foreign_opaque_and_graph_values_are_refused() {
        let foreign = WireValue::Opaque(OpaqueValue::new("Duration", std::time::Duration::from_secs(1)));
        assert!(matches!(to_bolt(foreign), Err(MapperError::Conversion(_))));
        assert!(matches!(
            to_bolt(WireValue::Node(WireNode::default())),
            Err(MapperError::Conversion(_))
        ));
    }
}
