//! Recognizer for the statement shapes the mapper emits
//!
//! The in-memory store does not implement a general query language. It
//! accepts the fixed family of statements produced by
//! [`crate::query::cypher`] (whitespace-insensitive, any variable names)
//! and turns each into a [`Command`].
//!
//! Supported shapes:
//! - `MATCH (n) DETACH DELETE n`
//! - `UNWIND $rows AS x CREATE (n:L1:L2) SET n = x RETURN n`
//! - `MATCH (n) WHERE n.p = $v RETURN n | SET n = $d RETURN n | DETACH DELETE n`
//! - `MATCH (n:L) [WHERE n.p = $v AND ...] RETURN n [ORDER BY n.p ASC, ...] [LIMIT $l]`
//! - `MATCH (n), (m) WHERE n.p = $a AND m.q = $b CREATE (n)-[r:T $d]->(m) RETURN r, ...`
//! - `MATCH (n)-[r:T]->(m) WHERE n.p = $v RETURN r, ...`
//! - `MATCH (n)-[r]->(m) WHERE r.p = $v [SET r = $d] RETURN r, ...`
//! - `MATCH ()-[r]->() WHERE r.p = $v DELETE r`

use std::sync::OnceLock;

use regex_lite::{Captures, Regex};

/// Parse error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    fn new(message: &str) -> Self {
        ParseError {
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unsupported statement: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// `var.property = $param`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub property: String,
    pub param: String,
}

/// Source of an extra result column next to a relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `x.prop AS alias` where `from_start` tells which endpoint `x` is
    Property { from_start: bool, property: String, alias: String },
    /// `$param AS alias`
    Param { param: String, alias: String },
}

/// Output columns of relation statements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelReturn {
    pub rel: String,
    pub extra: Vec<Projection>,
}

/// A recognized statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    DeleteAll,
    CreateNodes { labels: Vec<String>, rows: String, ret: String },
    MatchNodes { key: Lookup, ret: String },
    UpdateNodes { key: Lookup, data: String, ret: String },
    DeleteNodes { key: Lookup },
    FindNodes {
        label: String,
        filters: Vec<Lookup>,
        order: Vec<(String, bool)>,
        limit: Option<String>,
        ret: String,
    },
    CreateEdge {
        rel_type: String,
        from: Lookup,
        to: Lookup,
        data: String,
        ret: RelReturn,
    },
    Outgoing { rel_type: String, from: Lookup, ret: RelReturn },
    MatchEdges { key: Lookup, ret: RelReturn },
    UpdateEdges { key: Lookup, data: String, ret: RelReturn },
    DeleteEdges { key: Lookup },
}

const IDENT: &str = r"(?:`(?:[^`]|``)+`|[A-Za-z_][A-Za-z0-9_$]*)";
const VAR: &str = r"[A-Za-z_][A-Za-z0-9_]*";

fn compile(cell: &'static OnceLock<Regex>, pattern: impl FnOnce() -> String) -> &'static Regex {
    cell.get_or_init(|| {
        let pattern = pattern()
            .replace("{IDENT}", IDENT)
            .replace("{VAR}", VAR);
        // Patterns are fixed at build time; a bad one is a programming error.
        Regex::new(&pattern).unwrap_or_else(|e| panic!("invalid statement pattern: {e}"))
    })
}

macro_rules! pattern {
    ($name:ident, $text:expr) => {
        fn $name() -> &'static Regex {
            static CELL: OnceLock<Regex> = OnceLock::new();
            compile(&CELL, || $text.to_string())
        }
    };
}

pattern!(re_delete_all, r"^MATCH \((?P<v>{VAR})\) DETACH DELETE (?P<d>{VAR})$");
pattern!(
    re_create,
    r"^UNWIND \$(?P<rows>{VAR}) AS (?P<row>{VAR}) CREATE \((?P<v>{VAR})(?P<labels>(?::{IDENT})+)\) SET (?P<s>{VAR}) = (?P<src>{VAR}) RETURN (?P<ret>{VAR})$"
);
pattern!(
    re_node_by_key,
    r"^MATCH \((?P<v>{VAR})\) WHERE (?P<w>{VAR})\.(?P<prop>{IDENT}) = \$(?P<param>{VAR}) (?P<tail>.+)$"
);
pattern!(re_return, r"^RETURN (?P<ret>{VAR})$");
pattern!(re_set_return, r"^SET (?P<s>{VAR}) = \$(?P<data>{VAR}) RETURN (?P<ret>{VAR})$");
pattern!(re_detach_delete, r"^DETACH DELETE (?P<d>{VAR})$");
pattern!(
    re_find,
    r"^MATCH \((?P<v>{VAR}):(?P<label>{IDENT})\)(?: WHERE (?P<where>.+?))? RETURN (?P<ret>{VAR})(?: ORDER BY (?P<order>.+?))?(?: LIMIT \$(?P<limit>{VAR}))?$"
);
pattern!(re_condition, r"^(?P<v>{VAR})\.(?P<prop>{IDENT}) = \$(?P<param>{VAR})$");
pattern!(re_sort_key, r"^(?P<v>{VAR})\.(?P<prop>{IDENT})(?: (?P<dir>ASC|DESC|ASCENDING|DESCENDING))?$");
pattern!(
    re_link,
    r"^MATCH \((?P<a>{VAR})\), \((?P<b>{VAR})\) WHERE (?P<a2>{VAR})\.(?P<pa>{IDENT}) = \$(?P<qa>{VAR}) AND (?P<b2>{VAR})\.(?P<pb>{IDENT}) = \$(?P<qb>{VAR}) CREATE \((?P<a3>{VAR})\)-\[(?P<r>{VAR}):(?P<ty>{IDENT}) \$(?P<data>{VAR})\]->\((?P<b3>{VAR})\) RETURN (?P<ret>.+)$"
);
pattern!(
    re_outgoing,
    r"^MATCH \((?P<a>{VAR})\)-\[(?P<r>{VAR}):(?P<ty>{IDENT})\]->\((?P<b>{VAR})\) WHERE (?P<w>{VAR})\.(?P<prop>{IDENT}) = \$(?P<param>{VAR}) RETURN (?P<ret>.+)$"
);
pattern!(
    re_edge_by_key,
    r"^MATCH \((?P<a>{VAR})\)-\[(?P<r>{VAR})\]->\((?P<b>{VAR})\) WHERE (?P<w>{VAR})\.(?P<prop>{IDENT}) = \$(?P<param>{VAR})(?: SET (?P<s>{VAR}) = \$(?P<data>{VAR}))? RETURN (?P<ret>.+)$"
);
pattern!(
    re_delete_edge,
    r"^MATCH \(\)-\[(?P<r>{VAR})\]->\(\) WHERE (?P<w>{VAR})\.(?P<prop>{IDENT}) = \$(?P<param>{VAR}) DELETE (?P<d>{VAR})$"
);
pattern!(re_projection_prop, r"^(?P<v>{VAR})\.(?P<prop>{IDENT}) AS (?P<alias>{VAR})$");
pattern!(re_projection_param, r"^\$(?P<param>{VAR}) AS (?P<alias>{VAR})$");
pattern!(re_label, r":(?P<label>{IDENT})");

/// Collapse whitespace runs so patterns can use single spaces
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unquote(ident: &str) -> String {
    if ident.len() >= 2 && ident.starts_with('`') && ident.ends_with('`') {
        ident[1..ident.len() - 1].replace("``", "`")
    } else {
        ident.to_string()
    }
}

fn group<'t>(caps: &Captures<'t>, name: &str) -> &'t str {
    caps.name(name).map_or("", |m| m.as_str())
}

fn same_var(expected: &str, actual: &str, context: &str) -> Result<(), ParseError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ParseError::new(&format!(
            "{} refers to '{}' but '{}' is bound",
            context, actual, expected
        )))
    }
}

/// Split on a separator that is outside backtick-quoted identifiers
fn split_outside_quotes<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if !in_quotes && text[i..].starts_with(separator) {
            parts.push(&text[start..i]);
            i += separator.len();
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

fn lookup(caps: &Captures<'_>) -> Lookup {
    Lookup {
        property: unquote(group(caps, "prop")),
        param: group(caps, "param").to_string(),
    }
}

/// Parse `r, a.p AS x, $q AS y` given the bound variable names
fn parse_rel_return(text: &str, rel: &str, start: &str, end: &str) -> Result<RelReturn, ParseError> {
    let mut items = split_outside_quotes(text, ", ").into_iter();
    let first = items.next().unwrap_or_default();
    same_var(rel, first, "RETURN")?;

    let mut extra = Vec::new();
    for item in items {
        if let Some(caps) = re_projection_prop().captures(item) {
            let var = group(&caps, "v");
            let from_start = if var == start {
                true
            } else if var == end {
                false
            } else {
                return Err(ParseError::new(&format!("unknown variable '{}' in RETURN", var)));
            };
            extra.push(Projection::Property {
                from_start,
                property: unquote(group(&caps, "prop")),
                alias: group(&caps, "alias").to_string(),
            });
        } else if let Some(caps) = re_projection_param().captures(item) {
            extra.push(Projection::Param {
                param: group(&caps, "param").to_string(),
                alias: group(&caps, "alias").to_string(),
            });
        } else {
            return Err(ParseError::new(&format!("unsupported projection '{}'", item)));
        }
    }

    Ok(RelReturn { rel: rel.to_string(), extra })
}

fn parse_node_by_key(caps: &Captures<'_>) -> Result<Command, ParseError> {
    let var = group(caps, "v");
    same_var(var, group(caps, "w"), "WHERE")?;
    let key = lookup(caps);
    let tail = group(caps, "tail");

    if let Some(t) = re_return().captures(tail) {
        same_var(var, group(&t, "ret"), "RETURN")?;
        return Ok(Command::MatchNodes { key, ret: var.to_string() });
    }
    if let Some(t) = re_set_return().captures(tail) {
        same_var(var, group(&t, "s"), "SET")?;
        same_var(var, group(&t, "ret"), "RETURN")?;
        return Ok(Command::UpdateNodes {
            key,
            data: group(&t, "data").to_string(),
            ret: var.to_string(),
        });
    }
    if let Some(t) = re_detach_delete().captures(tail) {
        same_var(var, group(&t, "d"), "DELETE")?;
        return Ok(Command::DeleteNodes { key });
    }
    Err(ParseError::new(&format!("unsupported clause '{}'", tail)))
}

fn parse_find(caps: &Captures<'_>) -> Result<Command, ParseError> {
    let var = group(caps, "v");
    same_var(var, group(caps, "ret"), "RETURN")?;

    let mut filters = Vec::new();
    if let Some(conditions) = caps.name("where") {
        for condition in split_outside_quotes(conditions.as_str(), " AND ") {
            let c = re_condition()
                .captures(condition)
                .ok_or_else(|| ParseError::new(&format!("unsupported condition '{}'", condition)))?;
            same_var(var, group(&c, "v"), "WHERE")?;
            filters.push(lookup(&c));
        }
    }

    let mut order = Vec::new();
    if let Some(keys) = caps.name("order") {
        for key in split_outside_quotes(keys.as_str(), ", ") {
            let k = re_sort_key()
                .captures(key)
                .ok_or_else(|| ParseError::new(&format!("unsupported sort key '{}'", key)))?;
            same_var(var, group(&k, "v"), "ORDER BY")?;
            let descending = group(&k, "dir").starts_with("DESC");
            order.push((unquote(group(&k, "prop")), descending));
        }
    }

    Ok(Command::FindNodes {
        label: unquote(group(caps, "label")),
        filters,
        order,
        limit: caps.name("limit").map(|m| m.as_str().to_string()),
        ret: var.to_string(),
    })
}

fn parse_link(caps: &Captures<'_>) -> Result<Command, ParseError> {
    let (a, b) = (group(caps, "a"), group(caps, "b"));
    same_var(a, group(caps, "a2"), "WHERE")?;
    same_var(b, group(caps, "b2"), "WHERE")?;
    same_var(a, group(caps, "a3"), "CREATE")?;
    same_var(b, group(caps, "b3"), "CREATE")?;

    Ok(Command::CreateEdge {
        rel_type: unquote(group(caps, "ty")),
        from: Lookup {
            property: unquote(group(caps, "pa")),
            param: group(caps, "qa").to_string(),
        },
        to: Lookup {
            property: unquote(group(caps, "pb")),
            param: group(caps, "qb").to_string(),
        },
        data: group(caps, "data").to_string(),
        ret: parse_rel_return(group(caps, "ret"), group(caps, "r"), a, b)?,
    })
}

/// Recognize a statement
pub fn parse_statement(text: &str) -> Result<Command, ParseError> {
    let text = normalize(text);

    if let Some(caps) = re_delete_all().captures(&text) {
        same_var(group(&caps, "v"), group(&caps, "d"), "DELETE")?;
        return Ok(Command::DeleteAll);
    }

    if let Some(caps) = re_create().captures(&text) {
        let var = group(&caps, "v");
        same_var(var, group(&caps, "s"), "SET")?;
        same_var(var, group(&caps, "ret"), "RETURN")?;
        same_var(group(&caps, "row"), group(&caps, "src"), "SET")?;
        let labels = re_label()
            .captures_iter(group(&caps, "labels"))
            .map(|l| unquote(group(&l, "label")))
            .collect();
        return Ok(Command::CreateNodes {
            labels,
            rows: group(&caps, "rows").to_string(),
            ret: var.to_string(),
        });
    }

    if let Some(caps) = re_link().captures(&text) {
        return parse_link(&caps);
    }

    if let Some(caps) = re_outgoing().captures(&text) {
        let (a, r, b) = (group(&caps, "a"), group(&caps, "r"), group(&caps, "b"));
        same_var(a, group(&caps, "w"), "WHERE")?;
        return Ok(Command::Outgoing {
            rel_type: unquote(group(&caps, "ty")),
            from: lookup(&caps),
            ret: parse_rel_return(group(&caps, "ret"), r, a, b)?,
        });
    }

    if let Some(caps) = re_edge_by_key().captures(&text) {
        let (a, r, b) = (group(&caps, "a"), group(&caps, "r"), group(&caps, "b"));
        same_var(r, group(&caps, "w"), "WHERE")?;
        let key = lookup(&caps);
        let ret = parse_rel_return(group(&caps, "ret"), r, a, b)?;
        return match caps.name("data") {
            Some(data) => {
                same_var(r, group(&caps, "s"), "SET")?;
                Ok(Command::UpdateEdges { key, data: data.as_str().to_string(), ret })
            }
            None => Ok(Command::MatchEdges { key, ret }),
        };
    }

    if let Some(caps) = re_delete_edge().captures(&text) {
        let r = group(&caps, "r");
        same_var(r, group(&caps, "w"), "WHERE")?;
        same_var(r, group(&caps, "d"), "DELETE")?;
        return Ok(Command::DeleteEdges { key: lookup(&caps) });
    }

    if let Some(caps) = re_find().captures(&text) {
        return parse_find(&caps);
    }

    if let Some(caps) = re_node_by_key().captures(&text) {
        return parse_node_by_key(&caps);
    }

    Err(ParseError::new(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::cypher::{self, Direction, FindQuery};
    use crate::value::PropertyMap;

    fn id_lookup(param: &str) -> Lookup {
        Lookup { property: "$id".into(), param: param.into() }
    }

    fn endpoint_columns() -> Vec<Projection> {
        vec![
            Projection::Property { from_start: true, property: "$id".into(), alias: "from".into() },
            Projection::Property { from_start: false, property: "$id".into(), alias: "to".into() },
        ]
    }

    #[test]
    fn test_delete_all() {
        assert_eq!(parse_statement(&cypher::reset().text), Ok(Command::DeleteAll));
        assert_eq!(parse_statement("MATCH (x)\n  DETACH DELETE x"), Ok(Command::DeleteAll));
        assert!(parse_statement("MATCH (x) DETACH DELETE y").is_err());
    }

    #[test]
    fn test_node_statements() {
        assert_eq!(
            parse_statement(&cypher::fetch_node("a").text),
            Ok(Command::MatchNodes { key: id_lookup("id"), ret: "n".into() })
        );
        assert_eq!(
            parse_statement(&cypher::update_node("a", PropertyMap::new(), None).text),
            Ok(Command::UpdateNodes { key: id_lookup("id"), data: "data".into(), ret: "n".into() })
        );
        assert_eq!(
            parse_statement(&cypher::delete_node("a").text),
            Ok(Command::DeleteNodes { key: id_lookup("id") })
        );
    }

    #[test]
    fn test_create() {
        let stmt = cypher::create_nodes(&["User", "We`ird"], vec![]).unwrap();
        assert_eq!(
            parse_statement(&stmt.text),
            Ok(Command::CreateNodes {
                labels: vec!["User".into(), "We`ird".into()],
                rows: "props".into(),
                ret: "n".into(),
            })
        );
    }

    #[test]
    fn test_find() {
        let query = FindQuery::new()
            .filter("name", "x")
            .filter("a AND b", 1)
            .order([("name", Direction::Desc), ("email", Direction::Asc)])
            .limit(3);
        let stmt = cypher::find("User", &query).unwrap();
        assert_eq!(
            parse_statement(&stmt.text),
            Ok(Command::FindNodes {
                label: "User".into(),
                filters: vec![
                    Lookup { property: "name".into(), param: "where_0".into() },
                    Lookup { property: "a AND b".into(), param: "where_1".into() },
                ],
                order: vec![("name".into(), true), ("email".into(), false)],
                limit: Some("limit".into()),
                ret: "n".into(),
            })
        );

        let plain = cypher::find("User", &FindQuery::new()).unwrap();
        assert!(matches!(
            parse_statement(&plain.text),
            Ok(Command::FindNodes { ref filters, ref order, limit: None, .. }) if filters.is_empty() && order.is_empty()
        ));
    }

    #[test]
    fn test_link() {
        let stmt = cypher::link("FOLLOWS", "a", "b", PropertyMap::new()).unwrap();
        assert_eq!(
            parse_statement(&stmt.text),
            Ok(Command::CreateEdge {
                rel_type: "FOLLOWS".into(),
                from: id_lookup("from"),
                to: id_lookup("to"),
                data: "data".into(),
                ret: RelReturn {
                    rel: "r".into(),
                    extra: vec![
                        Projection::Param { param: "from".into(), alias: "from".into() },
                        Projection::Param { param: "to".into(), alias: "to".into() },
                    ],
                },
            })
        );
    }

    #[test]
    fn test_relation_statements() {
        let ret = RelReturn { rel: "r".into(), extra: endpoint_columns() };
        assert_eq!(
            parse_statement(&cypher::outgoing("OWN", "a").unwrap().text),
            Ok(Command::Outgoing { rel_type: "OWN".into(), from: id_lookup("from"), ret: ret.clone() })
        );
        assert_eq!(
            parse_statement(&cypher::fetch_relation("r1").text),
            Ok(Command::MatchEdges { key: id_lookup("id"), ret: ret.clone() })
        );
        assert_eq!(
            parse_statement(&cypher::update_relation("r1", PropertyMap::new(), None).text),
            Ok(Command::UpdateEdges { key: id_lookup("id"), data: "data".into(), ret })
        );
        assert_eq!(
            parse_statement(&cypher::delete_relation("r1").text),
            Ok(Command::DeleteEdges { key: id_lookup("id") })
        );
    }

    #[test]
    fn test_unsupported() {
        assert!(parse_statement("MATCH (n) RETURN count(n)").is_err());
        assert!(parse_statement("CALL db.labels()").is_err());
        assert!(parse_statement("").is_err());
    }

    #[test]
    fn test_split_outside_quotes() {
        assert_eq!(split_outside_quotes("a, `b, c`, d", ", "), vec!["a", "`b, c`", "d"]);
    }
}
