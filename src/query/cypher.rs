//! Statement builders for the primitive query shapes
//!
//! Labels, relationship types, and property names are only ever spliced in
//! as backtick-quoted identifiers; every value, `LIMIT` included, travels
//! as a parameter.

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, Result};
use crate::value::{PropertyMap, Value};

/// Reserved property holding the synthetic identifier
pub const ID_PROPERTY: &str = "$id";

/// Result column of node-returning statements
pub const NODE_COLUMN: &str = "n";
/// Result column of relation-returning statements
pub const REL_COLUMN: &str = "r";
pub const FROM_COLUMN: &str = "from";
pub const TO_COLUMN: &str = "to";

/// Confirmation literal required by [`reset`]
pub const RESET_CONFIRMATION: &str = "DELETE ALL DATA";

/// Statement text plus its native parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: PropertyMap,
}

impl Statement {
    fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: PropertyMap::new(),
        }
    }

    fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }
}

/// Sort direction of one `ORDER BY` key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Filter, ordering, and limit for `find`
///
/// Filters are equality tests joined with AND. Order keys apply left to
/// right. A limit of zero means no limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Vec<(String, Value)>,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<usize>,
}

impl FindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `property = value`
    pub fn filter(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.push((property.into(), value.into()));
        self
    }

    /// Require every entry of `props` to match
    pub fn filter_all(mut self, props: PropertyMap) -> Self {
        self.filter.extend(props);
        self
    }

    /// Append a sort key
    pub fn order_by(mut self, property: impl Into<String>, direction: Direction) -> Self {
        self.order.push((property.into(), direction));
        self
    }

    /// Append several sort keys, in priority order
    pub fn order<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = (S, Direction)>,
        S: Into<String>,
    {
        self.order.extend(keys.into_iter().map(|(p, d)| (p.into(), d)));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Quote an identifier with backticks, doubling embedded backticks
pub fn quote_identifier(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(MapperError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("`{}`", name.replace('`', "``")))
}

fn label_list<S: AsRef<str>>(labels: &[S]) -> Result<String> {
    if labels.is_empty() {
        return Err(MapperError::InvalidIdentifier(String::new()));
    }
    labels
        .iter()
        .map(|l| quote_identifier(l.as_ref()).map(|q| format!(":{}", q)))
        .collect()
}

fn by_id(var: &str) -> String {
    format!("{}.`{}` = $id", var, ID_PROPERTY)
}

// ============================================================================
// Node Statements
// ============================================================================

/// Wipe the entire graph
pub fn reset() -> Statement {
    Statement::new("MATCH (n) DETACH DELETE n")
}

pub fn fetch_node(id: &str) -> Statement {
    Statement::new(format!("MATCH (n) WHERE {} RETURN n", by_id("n"))).param("id", id)
}

/// Bulk-create nodes; each bag must already carry its `$id`
pub fn create_nodes<S: AsRef<str>>(labels: &[S], bags: Vec<PropertyMap>) -> Result<Statement> {
    let text = format!(
        "UNWIND $props AS props CREATE (n{}) SET n = props RETURN n",
        label_list(labels)?
    );
    let rows = bags.into_iter().map(Value::Map).collect::<Vec<_>>();
    Ok(Statement::new(text).param("props", Value::List(rows)))
}

/// Replace a node's properties with `old` overlaid by `data`, keeping `$id`
pub fn update_node(id: &str, data: PropertyMap, old: Option<PropertyMap>) -> Statement {
    Statement::new(format!("MATCH (n) WHERE {} SET n = $data RETURN n", by_id("n")))
        .param("id", id)
        .param("data", merge_props(id, data, old))
}

/// Remove a node and all incident edges
pub fn delete_node(id: &str) -> Statement {
    Statement::new(format!("MATCH (n) WHERE {} DETACH DELETE n", by_id("n"))).param("id", id)
}

/// Match by label with an optional equality filter, ordering, and limit
pub fn find(label: &str, query: &FindQuery) -> Result<Statement> {
    let mut text = format!("MATCH (n:{})", quote_identifier(label)?);
    let mut params = PropertyMap::new();

    if !query.filter.is_empty() {
        let mut conditions = Vec::with_capacity(query.filter.len());
        for (i, (property, value)) in query.filter.iter().enumerate() {
            let param = format!("where_{}", i);
            conditions.push(format!("n.{} = ${}", quote_identifier(property)?, param));
            params.insert(param, value.clone());
        }
        text.push_str(" WHERE ");
        text.push_str(&conditions.join(" AND "));
    }

    text.push_str(" RETURN n");

    if !query.order.is_empty() {
        let keys = query
            .order
            .iter()
            .map(|(property, dir)| Ok(format!("n.{} {}", quote_identifier(property)?, dir.as_str())))
            .collect::<Result<Vec<_>>>()?;
        text.push_str(" ORDER BY ");
        text.push_str(&keys.join(", "));
    }

    if let Some(limit) = query.limit.filter(|l| *l > 0) {
        text.push_str(" LIMIT $limit");
        params.insert("limit".into(), Value::from(limit as u64));
    }

    Ok(Statement { text, params })
}

// ============================================================================
// Relation Statements
// ============================================================================

const REL_RETURN: &str = "RETURN r, n.`$id` AS from, m.`$id` AS to";

/// Create a directed edge between two nodes addressed by `$id`
pub fn link(rel_type: &str, from: &str, to: &str, data: PropertyMap) -> Result<Statement> {
    let text = format!(
        "MATCH (n), (m) WHERE n.`{id}` = $from AND m.`{id}` = $to CREATE (n)-[r:{ty} $data]->(m) RETURN r, $from AS from, $to AS to",
        id = ID_PROPERTY,
        ty = quote_identifier(rel_type)?,
    );
    Ok(Statement::new(text)
        .param("from", from)
        .param("to", to)
        .param("data", data))
}

/// All outgoing edges of one type from a node
pub fn outgoing(rel_type: &str, from: &str) -> Result<Statement> {
    let text = format!(
        "MATCH (n)-[r:{}]->(m) WHERE n.`{}` = $from {}",
        quote_identifier(rel_type)?,
        ID_PROPERTY,
        REL_RETURN
    );
    Ok(Statement::new(text).param("from", from))
}

pub fn fetch_relation(id: &str) -> Statement {
    Statement::new(format!("MATCH (n)-[r]->(m) WHERE {} {}", by_id("r"), REL_RETURN)).param("id", id)
}

/// Replace an edge's properties with `old` overlaid by `data`, keeping `$id`
pub fn update_relation(id: &str, data: PropertyMap, old: Option<PropertyMap>) -> Statement {
    Statement::new(format!(
        "MATCH (n)-[r]->(m) WHERE {} SET r = $data {}",
        by_id("r"),
        REL_RETURN
    ))
    .param("id", id)
    .param("data", merge_props(id, data, old))
}

pub fn delete_relation(id: &str) -> Statement {
    Statement::new(format!("MATCH ()-[r]->() WHERE {} DELETE r", by_id("r"))).param("id", id)
}

fn merge_props(id: &str, data: PropertyMap, old: Option<PropertyMap>) -> PropertyMap {
    let mut merged = old.unwrap_or_default();
    merged.extend(data);
    merged.insert(ID_PROPERTY.to_string(), Value::from(id));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("User").unwrap(), "`User`");
        assert_eq!(quote_identifier("$id").unwrap(), "`$id`");
        assert_eq!(quote_identifier("a`b").unwrap(), "`a``b`");
        assert!(quote_identifier("").is_err());
        assert!(quote_identifier("bad\0name").is_err());
    }

    #[test]
    fn test_fetch_node() {
        let stmt = fetch_node("c123");
        assert_eq!(stmt.text, "MATCH (n) WHERE n.`$id` = $id RETURN n");
        assert_eq!(stmt.params["id"], Value::from("c123"));
    }

    #[test]
    fn test_create_nodes() {
        let stmt = create_nodes(&["User", "Person"], vec![crate::props! { "$id" => "a" }]).unwrap();
        assert_eq!(
            stmt.text,
            "UNWIND $props AS props CREATE (n:`User`:`Person`) SET n = props RETURN n"
        );
        assert_eq!(stmt.params["props"].as_list().map(|l| l.len()), Some(1));
    }

    #[test]
    fn test_create_requires_label() {
        let labels: [&str; 0] = [];
        assert!(create_nodes(&labels, vec![]).is_err());
    }

    #[test]
    fn test_update_merges_and_keeps_id() {
        let old = crate::props! { "name" => "Jacob", "email" => "a@b", "$id" => "stale" };
        let stmt = update_node("c1", crate::props! { "name" => "Jake" }, Some(old));
        assert_eq!(stmt.text, "MATCH (n) WHERE n.`$id` = $id SET n = $data RETURN n");

        let data = stmt.params["data"].as_map().unwrap();
        assert_eq!(data["name"], Value::from("Jake"));
        assert_eq!(data["email"], Value::from("a@b"));
        assert_eq!(data["$id"], Value::from("c1"));
    }

    #[test]
    fn test_delete_node() {
        assert_eq!(
            delete_node("c1").text,
            "MATCH (n) WHERE n.`$id` = $id DETACH DELETE n"
        );
    }

    #[test]
    fn test_find_all() {
        let stmt = find("User", &FindQuery::new()).unwrap();
        assert_eq!(stmt.text, "MATCH (n:`User`) RETURN n");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_find_full() {
        let query = FindQuery::new()
            .filter("name", "Jacob")
            .filter("email", "hi@example.com")
            .order([("name", Direction::Desc), ("email", Direction::Asc)])
            .limit(10);
        let stmt = find("User", &query).unwrap();
        assert_eq!(
            stmt.text,
            "MATCH (n:`User`) WHERE n.`name` = $where_0 AND n.`email` = $where_1 RETURN n ORDER BY n.`name` DESC, n.`email` ASC LIMIT $limit"
        );
        assert_eq!(stmt.params["where_0"], Value::from("Jacob"));
        assert_eq!(stmt.params["limit"], Value::BigInt(10));
    }

    #[test]
    fn test_find_zero_limit_is_unbounded() {
        let stmt = find("User", &FindQuery::new().limit(0)).unwrap();
        assert!(!stmt.text.contains("LIMIT"));
    }

    #[test]
    fn test_find_quotes_hostile_property() {
        let query = FindQuery::new().filter("x` = 1 OR true //", 1);
        let stmt = find("User", &query).unwrap();
        assert_eq!(
            stmt.text,
            "MATCH (n:`User`) WHERE n.`x`` = 1 OR true //` = $where_0 RETURN n"
        );
    }

    #[test]
    fn test_link() {
        let stmt = link("FOLLOWS", "a", "b", crate::props! { "$id" => "r1" }).unwrap();
        assert_eq!(
            stmt.text,
            "MATCH (n), (m) WHERE n.`$id` = $from AND m.`$id` = $to CREATE (n)-[r:`FOLLOWS` $data]->(m) RETURN r, $from AS from, $to AS to"
        );
        assert_eq!(stmt.params["from"], Value::from("a"));
        assert_eq!(stmt.params["to"], Value::from("b"));
    }

    #[test]
    fn test_relation_statements() {
        assert_eq!(
            outgoing("OWN", "a").unwrap().text,
            "MATCH (n)-[r:`OWN`]->(m) WHERE n.`$id` = $from RETURN r, n.`$id` AS from, m.`$id` AS to"
        );
        assert_eq!(
            fetch_relation("r1").text,
            "MATCH (n)-[r]->(m) WHERE r.`$id` = $id RETURN r, n.`$id` AS from, m.`$id` AS to"
        );
        assert_eq!(
            update_relation("r1", PropertyMap::new(), None).text,
            "MATCH (n)-[r]->(m) WHERE r.`$id` = $id SET r = $data RETURN r, n.`$id` AS from, m.`$id` AS to"
        );
        assert_eq!(
            delete_relation("r1").text,
            "MATCH ()-[r]->() WHERE r.`$id` = $id DELETE r"
        );
    }
}
