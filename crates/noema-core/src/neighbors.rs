//! Neighbor expansion and shortest-path search (§4.10).
//!
//! The graph is a relational adjacency set, never in-memory pointer
//! structures (spec.md §9); every traversal issues parameterized queries
//! against `relations` and carries an explicit `visited` set.

use std::collections::{HashSet, VecDeque};

use rusqlite::{params, Connection};

use crate::error::{CoreError, CoreResult};
use crate::mutation::get_relations_for;
use crate::storage::row_to_entity;
use crate::types::{Direction, Entity, GraphResult, PathResult, Relation};

/// Breadth-first expansion from `name` for up to `depth` hops (`1..=5`).
pub fn get_neighbors(
    conn: &Connection,
    name: &str,
    direction: Direction,
    relation_type: Option<&str>,
    depth: usize,
    include_relations: bool,
) -> CoreResult<GraphResult> {
    if !(1..=5).contains(&depth) {
        return Err(CoreError::InvalidInput(format!("depth must be in [1, 5], got {depth}")));
    }

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(name.to_lowercase());
    let mut frontier = vec![name.to_lowercase()];
    let mut collected_relations: Vec<Relation> = Vec::new();
    let mut collected_names: Vec<String> = Vec::new();

    for _ in 0..depth {
        let mut next_frontier = Vec::new();
        for current in &frontier {
            let edges = edges_for(conn, current, direction, relation_type)?;
            for (edge, other) in edges {
                if visited.insert(other.clone()) {
                    next_frontier.push(other.clone());
                    collected_names.push(other);
                }
                collected_relations.push(edge);
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }

    let mut entities = Vec::new();
    for n in &collected_names {
        if let Some(e) = fetch_entity(conn, n)? {
            entities.push(e);
        }
    }

    collected_relations.sort_by(|a, b| (a.from.clone(), a.to.clone(), a.relation_type.clone()).cmp(&(b.from.clone(), b.to.clone(), b.relation_type.clone())));
    collected_relations.dedup_by(|a, b| a.from == b.from && a.to == b.to && a.relation_type == b.relation_type);

    Ok(GraphResult {
        entities,
        relations: if include_relations { collected_relations } else { Vec::new() },
        total_count: None,
        next_offset: None,
    })
}

fn edges_for(conn: &Connection, name: &str, direction: Direction, relation_type: Option<&str>) -> CoreResult<Vec<(Relation, String)>> {
    let all = get_relations_for(conn, name)?;
    let mut out = Vec::new();
    for rel in all {
        if let Some(rt) = relation_type {
            if rel.relation_type != rt {
                continue;
            }
        }
        let is_outgoing = rel.from.eq_ignore_ascii_case(name);
        let is_incoming = rel.to.eq_ignore_ascii_case(name);
        let matches_direction = match direction {
            Direction::Outgoing => is_outgoing,
            Direction::Incoming => is_incoming,
            Direction::Both => is_outgoing || is_incoming,
        };
        if !matches_direction {
            continue;
        }
        let other = if is_outgoing { rel.to.clone() } else { rel.from.clone() };
        out.push((rel, other));
    }
    Ok(out)
}

fn fetch_entity(conn: &Connection, name: &str) -> CoreResult<Option<Entity>> {
    use rusqlite::OptionalExtension;
    conn.query_row("SELECT * FROM entities WHERE name = ?1 COLLATE NOCASE", params![name], row_to_entity)
        .optional()
        .map_err(CoreError::from)
}

/// Breadth-first single-source shortest path. Edges are undirected for
/// path-finding (spec.md §4.10). Tie-break: among equal-length paths, the
/// one discovered first by BFS wins — stable because `relations` rows are
/// visited in a fixed (from, to) order per entity.
pub fn find_shortest_path(conn: &Connection, from: &str, to: &str, max_depth: usize, relation_type: Option<&str>) -> CoreResult<PathResult> {
    if !(1..=10).contains(&max_depth) {
        return Err(CoreError::InvalidInput(format!("max_depth must be in [1, 10], got {max_depth}")));
    }

    let from = from.to_lowercase();
    let to = to.to_lowercase();
    let mut nodes_explored = 0usize;

    if from == to {
        return Ok(PathResult { found: true, path: vec![from], distance: 0, nodes_explored: 1 });
    }

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(from.clone());
    let mut queue: VecDeque<Vec<String>> = VecDeque::new();
    queue.push_back(vec![from]);

    while let Some(path) = queue.pop_front() {
        if path.len() as isize - 1 >= max_depth as isize {
            continue;
        }
        let current = path.last().unwrap().clone();
        nodes_explored += 1;

        let edges = edges_for(conn, &current, Direction::Both, relation_type)?;
        for (_, other) in edges {
            if other == to {
                let mut found_path = path.clone();
                found_path.push(other);
                return Ok(PathResult { found: true, distance: found_path.len() - 1, path: found_path, nodes_explored });
            }
            if visited.insert(other.clone()) {
                let mut next = path.clone();
                next.push(other);
                queue.push_back(next);
            }
        }
    }

    Ok(PathResult { found: false, path: Vec::new(), distance: 0, nodes_explored })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        for name in ["a", "b", "c", "d"] {
            conn.execute(
                "INSERT INTO entities (name, entity_type, observations_blob, observations_text, created_at, updated_at)
                 VALUES (?1, 'thing', X'00', '', '2024-01-01', '2024-01-01')",
                params![name],
            ).unwrap();
        }
        for (from, to) in [("a", "b"), ("b", "c"), ("a", "d"), ("d", "c")] {
            conn.execute(
                "INSERT INTO relations (\"from\", \"to\", relation_type, created_at) VALUES (?1, ?2, 'rel', '2024-01-01')",
                params![from, to],
            ).unwrap();
        }
        conn
    }

    #[test]
    fn shortest_path_finds_two_hop_route() {
        let conn = setup();
        let result = find_shortest_path(&conn, "a", "c", 4, None).unwrap();
        assert!(result.found);
        assert_eq!(result.distance, 2);
        assert!(result.path == vec!["a", "b", "c"] || result.path == vec!["a", "d", "c"]);
    }

    #[test]
    fn shortest_path_rejects_out_of_range_depth() {
        let conn = setup();
        assert!(find_shortest_path(&conn, "a", "c", 0, None).is_err());
        assert!(find_shortest_path(&conn, "a", "c", 11, None).is_err());
    }

    #[test]
    fn neighbors_respects_depth_and_direction() {
        let conn = setup();
        let result = get_neighbors(&conn, "a", Direction::Outgoing, None, 1, true).unwrap();
        let names: HashSet<_> = result.entities.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, HashSet::from(["b".to_string(), "d".to_string()]));
    }

    #[test]
    fn neighbors_rejects_out_of_range_depth() {
        let conn = setup();
        assert!(get_neighbors(&conn, "a", Direction::Both, None, 0, true).is_err());
        assert!(get_neighbors(&conn, "a", Direction::Both, None, 6, true).is_err());
    }
}
