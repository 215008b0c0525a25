//! In-process property graph implementing the driver boundary
//!
//! Architecture:
//! ```text
//! MemorySession::run(text, params)
//!     │
//!     ├─ parse_statement(text) ──► Command
//!     │
//!     └─ MemoryGraph (Arc<RwLock>) ──► Vec<Row>
//!            nodes / edges keyed by internal u64
//!            adjacency / reverse_adjacency for detach and traversal
//! ```
//!
//! Only the statement shapes listed in [`super::statement`] are accepted.
//! Within those shapes it follows Cypher semantics: `SET x = map` replaces
//! all properties and drops nulls, `DETACH DELETE` removes incident edges,
//! equality compares integers and floats numerically, null never equals
//! anything, and ascending sorts put nulls last.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use super::statement::{parse_statement, Command, Lookup, Projection, RelReturn};
use super::{Driver, Row, Session, WireEdge, WireMap, WireNode, WireValue};
use crate::error::{MapperError, Result};

#[derive(Debug, Clone)]
struct StoredNode {
    labels: Vec<String>,
    props: WireMap,
}

#[derive(Debug, Clone)]
struct StoredEdge {
    src: u64,
    dst: u64,
    rel_type: String,
    props: WireMap,
}

/// Graph contents shared by every session of one driver
#[derive(Debug, Default)]
struct MemoryGraph {
    next_id: u64,
    nodes: BTreeMap<u64, StoredNode>,
    edges: BTreeMap<u64, StoredEdge>,
    // src -> edge ids
    adjacency: HashMap<u64, Vec<u64>>,
    // dst -> edge ids
    reverse_adjacency: HashMap<u64, Vec<u64>>,
}

/// Drop null entries; a stored property is never null
fn stored_props(map: WireMap) -> WireMap {
    map.into_iter().filter(|(_, v)| !v.is_null()).collect()
}

impl MemoryGraph {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.adjacency.clear();
        self.reverse_adjacency.clear();
    }

    fn add_node(&mut self, labels: Vec<String>, props: WireMap) -> u64 {
        let id = self.allocate();
        self.nodes.insert(id, StoredNode { labels, props: stored_props(props) });
        id
    }

    /// Remove a node and every incident edge
    fn detach_delete_node(&mut self, id: u64) {
        let mut incident: Vec<u64> = Vec::new();
        if let Some(out) = self.adjacency.get(&id) {
            incident.extend(out);
        }
        if let Some(inc) = self.reverse_adjacency.get(&id) {
            incident.extend(inc);
        }
        for edge in incident {
            self.delete_edge(edge);
        }
        self.adjacency.remove(&id);
        self.reverse_adjacency.remove(&id);
        self.nodes.remove(&id);
    }

    fn add_edge(&mut self, src: u64, dst: u64, rel_type: String, props: WireMap) -> u64 {
        let id = self.allocate();
        self.edges.insert(id, StoredEdge { src, dst, rel_type, props: stored_props(props) });
        self.adjacency.entry(src).or_default().push(id);
        self.reverse_adjacency.entry(dst).or_default().push(id);
        id
    }

    fn delete_edge(&mut self, id: u64) {
        if let Some(edge) = self.edges.remove(&id) {
            if let Some(out) = self.adjacency.get_mut(&edge.src) {
                out.retain(|e| *e != id);
            }
            if let Some(inc) = self.reverse_adjacency.get_mut(&edge.dst) {
                inc.retain(|e| *e != id);
            }
        }
    }

    fn nodes_where(&self, key: &Lookup, params: &WireMap) -> Result<Vec<u64>> {
        let expected = param(params, &key.param)?;
        Ok(self
            .nodes
            .iter()
            .filter(|(_, node)| matches_value(node.props.get(&key.property), expected))
            .map(|(id, _)| *id)
            .collect())
    }

    fn edges_where(&self, key: &Lookup, params: &WireMap) -> Result<Vec<u64>> {
        let expected = param(params, &key.param)?;
        Ok(self
            .edges
            .iter()
            .filter(|(_, edge)| matches_value(edge.props.get(&key.property), expected))
            .map(|(id, _)| *id)
            .collect())
    }

    fn node_cell(&self, id: u64) -> WireValue {
        match self.nodes.get(&id) {
            Some(node) => WireValue::Node(WireNode {
                labels: node.labels.clone(),
                properties: node.props.clone(),
            }),
            None => WireValue::Null,
        }
    }

    fn node_row(&self, column: &str, id: u64) -> Row {
        Row::new().with(column, self.node_cell(id))
    }

    fn edge_row(&self, ret: &RelReturn, id: u64, params: &WireMap) -> Row {
        let Some(edge) = self.edges.get(&id) else {
            return Row::new();
        };
        let mut row = Row::new().with(
            ret.rel.as_str(),
            WireValue::Relationship(WireEdge {
                rel_type: edge.rel_type.clone(),
                properties: edge.props.clone(),
            }),
        );
        for projection in &ret.extra {
            match projection {
                Projection::Property { from_start, property, alias } => {
                    let endpoint = if *from_start { edge.src } else { edge.dst };
                    let value = self
                        .nodes
                        .get(&endpoint)
                        .and_then(|n| n.props.get(property))
                        .cloned()
                        .unwrap_or(WireValue::Null);
                    row.push(alias.as_str(), value);
                }
                Projection::Param { param, alias } => {
                    let value = params.get(param).cloned().unwrap_or(WireValue::Null);
                    row.push(alias.as_str(), value);
                }
            }
        }
        row
    }

    fn execute(&mut self, command: Command, params: &WireMap) -> Result<Vec<Row>> {
        match command {
            Command::DeleteAll => {
                self.clear();
                Ok(Vec::new())
            }
            Command::CreateNodes { labels, rows, ret } => {
                let items = match param(params, &rows)? {
                    WireValue::List(items) => items.clone(),
                    _ => return Err(type_error(&rows, "list")),
                };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let WireValue::Map(props) = item else {
                        return Err(type_error(&rows, "list of maps"));
                    };
                    let id = self.add_node(labels.clone(), props);
                    out.push(self.node_row(&ret, id));
                }
                Ok(out)
            }
            Command::MatchNodes { key, ret } => Ok(self
                .nodes_where(&key, params)?
                .into_iter()
                .map(|id| self.node_row(&ret, id))
                .collect()),
            Command::UpdateNodes { key, data, ret } => {
                let props = map_param(params, &data)?;
                let ids = self.nodes_where(&key, params)?;
                for id in &ids {
                    if let Some(node) = self.nodes.get_mut(id) {
                        node.props = stored_props(props.clone());
                    }
                }
                Ok(ids.into_iter().map(|id| self.node_row(&ret, id)).collect())
            }
            Command::DeleteNodes { key } => {
                for id in self.nodes_where(&key, params)? {
                    self.detach_delete_node(id);
                }
                Ok(Vec::new())
            }
            Command::FindNodes { label, filters, order, limit, ret } => {
                self.find(&label, &filters, &order, limit.as_deref(), &ret, params)
            }
            Command::CreateEdge { rel_type, from, to, data, ret } => {
                let props = map_param(params, &data)?;
                let sources = self.nodes_where(&from, params)?;
                let targets = self.nodes_where(&to, params)?;
                let mut out = Vec::new();
                for src in &sources {
                    for dst in &targets {
                        let id = self.add_edge(*src, *dst, rel_type.clone(), props.clone());
                        out.push(self.edge_row(&ret, id, params));
                    }
                }
                Ok(out)
            }
            Command::Outgoing { rel_type, from, ret } => {
                let mut out = Vec::new();
                for src in self.nodes_where(&from, params)? {
                    let Some(edge_ids) = self.adjacency.get(&src) else {
                        continue;
                    };
                    for id in edge_ids {
                        if self.edges.get(id).is_some_and(|e| e.rel_type == rel_type) {
                            out.push(self.edge_row(&ret, *id, params));
                        }
                    }
                }
                Ok(out)
            }
            Command::MatchEdges { key, ret } => Ok(self
                .edges_where(&key, params)?
                .into_iter()
                .map(|id| self.edge_row(&ret, id, params))
                .collect()),
            Command::UpdateEdges { key, data, ret } => {
                let props = map_param(params, &data)?;
                let ids = self.edges_where(&key, params)?;
                for id in &ids {
                    if let Some(edge) = self.edges.get_mut(id) {
                        edge.props = stored_props(props.clone());
                    }
                }
                Ok(ids.into_iter().map(|id| self.edge_row(&ret, id, params)).collect())
            }
            Command::DeleteEdges { key } => {
                for id in self.edges_where(&key, params)? {
                    self.delete_edge(id);
                }
                Ok(Vec::new())
            }
        }
    }

    fn find(
        &self,
        label: &str,
        filters: &[Lookup],
        order: &[(String, bool)],
        limit: Option<&str>,
        ret: &str,
        params: &WireMap,
    ) -> Result<Vec<Row>> {
        let mut expected = Vec::with_capacity(filters.len());
        for filter in filters {
            expected.push((filter.property.as_str(), param(params, &filter.param)?));
        }

        let mut matched: Vec<(&u64, &StoredNode)> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.labels.iter().any(|l| l == label))
            .filter(|(_, node)| {
                expected
                    .iter()
                    .all(|(property, value)| matches_value(node.props.get(*property), value))
            })
            .collect();

        if !order.is_empty() {
            matched.sort_by(|(_, a), (_, b)| {
                for (property, descending) in order {
                    let ord = compare_sort_keys(a.props.get(property), b.props.get(property));
                    let ord = if *descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let limit = match limit {
            Some(name) => match param(params, name)? {
                WireValue::Integer(n) if *n >= 0 => *n as usize,
                _ => return Err(type_error(name, "non-negative integer")),
            },
            None => usize::MAX,
        };

        Ok(matched
            .into_iter()
            .take(limit)
            .map(|(id, _)| self.node_row(ret, *id))
            .collect())
    }
}

fn param<'a>(params: &'a WireMap, name: &str) -> Result<&'a WireValue> {
    params
        .get(name)
        .ok_or_else(|| MapperError::Driver(format!("Expected parameter: ${}", name)))
}

fn map_param(params: &WireMap, name: &str) -> Result<WireMap> {
    match param(params, name)? {
        WireValue::Map(map) => Ok(map.clone()),
        _ => Err(type_error(name, "map")),
    }
}

fn type_error(name: &str, expected: &str) -> MapperError {
    MapperError::Driver(format!("Parameter ${} must be a {}", name, expected))
}

/// Cypher equality for `WHERE x.p = $v`
fn matches_value(actual: Option<&WireValue>, expected: &WireValue) -> bool {
    match actual {
        Some(actual) => values_equal(actual, expected),
        None => false,
    }
}

fn values_equal(a: &WireValue, b: &WireValue) -> bool {
    match (a, b) {
        (WireValue::Null, _) | (_, WireValue::Null) => false,
        (WireValue::Integer(x), WireValue::Float(y)) | (WireValue::Float(y), WireValue::Integer(x)) => {
            (*x as f64) == *y
        }
        (WireValue::List(xs), WireValue::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (WireValue::DateTime(x), WireValue::DateTime(y)) => {
            (x.seconds, x.nanoseconds) == (y.seconds, y.nanoseconds)
        }
        _ => a == b,
    }
}

/// Rank used to order values of different types
fn type_rank(value: &WireValue) -> u8 {
    match value {
        WireValue::Map(_) => 0,
        WireValue::Node(_) => 1,
        WireValue::Relationship(_) => 2,
        WireValue::List(_) => 3,
        WireValue::String(_) => 4,
        WireValue::Bool(_) => 5,
        WireValue::Integer(_) | WireValue::Float(_) => 6,
        WireValue::DateTime(_) => 7,
        WireValue::Opaque(_) => 8,
        WireValue::Null => 9,
    }
}

/// Ascending sort order; absent and null sort after everything else
fn compare_sort_keys(a: Option<&WireValue>, b: Option<&WireValue>) -> Ordering {
    let a = a.unwrap_or(&WireValue::Null);
    let b = b.unwrap_or(&WireValue::Null);
    match (a, b) {
        (WireValue::String(x), WireValue::String(y)) => x.cmp(y),
        (WireValue::Bool(x), WireValue::Bool(y)) => x.cmp(y),
        (WireValue::Integer(x), WireValue::Integer(y)) => x.cmp(y),
        (WireValue::Integer(_) | WireValue::Float(_), WireValue::Integer(_) | WireValue::Float(_)) => {
            as_f64(a).total_cmp(&as_f64(b))
        }
        (WireValue::DateTime(x), WireValue::DateTime(y)) => {
            (x.seconds, x.nanoseconds).cmp(&(y.seconds, y.nanoseconds))
        }
        (WireValue::List(xs), WireValue::List(ys)) => xs
            .iter()
            .zip(ys)
            .map(|(x, y)| compare_sort_keys(Some(x), Some(y)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| xs.len().cmp(&ys.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn as_f64(value: &WireValue) -> f64 {
    match value {
        WireValue::Integer(i) => *i as f64,
        WireValue::Float(f) => *f,
        _ => f64::NAN,
    }
}

// ============================================================================
// Driver
// ============================================================================

/// In-process store; clones share the same graph
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    graph: Arc<RwLock<MemoryGraph>>,
    fault: Arc<Mutex<Option<String>>>,
    stall: Arc<AtomicBool>,
    statements: Arc<AtomicUsize>,
    sessions: Arc<AtomicUsize>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.read().unwrap_or_else(PoisonError::into_inner).nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.read().unwrap_or_else(PoisonError::into_inner).edges.len()
    }

    /// Statements received so far, failed ones included
    pub fn statement_count(&self) -> usize {
        self.statements.load(AtomicOrdering::SeqCst)
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.sessions.load(AtomicOrdering::SeqCst)
    }

    /// Make the next statement fail with a driver error carrying `message`
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    /// Make the next statement wait forever instead of answering
    pub fn stall_next(&self) {
        self.stall.store(true, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn open_session(&self, database: &str) -> Result<Box<dyn Session>> {
        self.sessions.fetch_add(1, AtomicOrdering::SeqCst);
        tracing::trace!("Opened memory session on {}", database);
        Ok(Box::new(MemorySession { driver: self.clone() }))
    }
}

struct MemorySession {
    driver: MemoryDriver,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.driver.sessions.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn run(&mut self, statement: &str, params: WireMap) -> Result<Vec<Row>> {
        self.driver.statements.fetch_add(1, AtomicOrdering::SeqCst);

        let fault = self
            .driver
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(message) = fault {
            return Err(MapperError::Driver(message));
        }
        if self.driver.stall.swap(false, AtomicOrdering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let command = parse_statement(statement).map_err(MapperError::driver)?;
        let mut graph = self.driver.graph.write().unwrap_or_else(PoisonError::into_inner);
        graph.execute(command, &params)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
