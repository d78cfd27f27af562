use std::collections::{BTreeMap, BTreeSet};

use crate::clique;
use crate::models::Match;

/// Per-student scholarship scores: student id -> (scholarship id -> score).
pub type ScoreTable = BTreeMap<i32, BTreeMap<i32, f64>>;

pub fn score_table(matches: &[Match]) -> ScoreTable {
    let mut table = ScoreTable::new();
    for record in matches {
        table
            .entry(record.student_id)
            .or_default()
            .insert(record.scholarship_id, record.score);
    }
    table
}

/// Undirected simple graph over students. Vertices are dense indices whose
/// labels are student ids; adjacency is kept as neighbour sets.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityGraph {
    labels: Vec<i32>,
    adjacency: Vec<BTreeSet<usize>>,
    index: BTreeMap<i32, usize>,
}

impl CompatibilityGraph {
    pub fn add_vertex(&mut self, student_id: i32) -> usize {
        if let Some(&vertex) = self.index.get(&student_id) {
            return vertex;
        }
        let vertex = self.labels.len();
        self.labels.push(student_id);
        self.adjacency.push(BTreeSet::new());
        self.index.insert(student_id, vertex);
        vertex
    }

    pub fn add_edge(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.adjacency[a].insert(b);
        self.adjacency[b].insert(a);
    }

    pub fn vertex_count(&self) -> usize {
        self.labels.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn label(&self, vertex: usize) -> Option<i32> {
        self.labels.get(vertex).copied()
    }

    pub fn vertex_of(&self, student_id: i32) -> Option<usize> {
        self.index.get(&student_id).copied()
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.adjacency.get(a).is_some_and(|n| n.contains(&b))
    }

    pub fn adjacency(&self) -> &[BTreeSet<usize>] {
        &self.adjacency
    }

    pub fn maximal_cliques(&self) -> Vec<Vec<usize>> {
        clique::maximal_cliques(&self.adjacency)
    }
}

/// Scholarships on which both students score at least `min_score`.
pub fn common_scholarships(
    first: &BTreeMap<i32, f64>,
    second: &BTreeMap<i32, f64>,
    min_score: f64,
) -> BTreeSet<i32> {
    first
        .iter()
        .filter(|(_, &score)| score >= min_score)
        .filter(|(id, _)| second.get(*id).is_some_and(|&other| other >= min_score))
        .map(|(&id, _)| id)
        .collect()
}

/// Connects every pair of students sharing at least `min_common` scholarships
/// scored at or above `min_score`. `min_common` of zero connects every pair.
pub fn build_graph(table: &ScoreTable, min_score: f64, min_common: usize) -> CompatibilityGraph {
    let filtered: BTreeMap<i32, BTreeMap<i32, f64>> = table
        .iter()
        .map(|(&student_id, scores)| {
            let kept: BTreeMap<i32, f64> = scores
                .iter()
                .filter(|(_, &score)| score >= min_score)
                .map(|(&id, &score)| (id, score))
                .collect();
            (student_id, kept)
        })
        .filter(|(_, kept)| !kept.is_empty())
        .collect();

    let mut graph = CompatibilityGraph::default();
    let students: Vec<(usize, &BTreeMap<i32, f64>)> = filtered
        .iter()
        .map(|(&student_id, scores)| (graph.add_vertex(student_id), scores))
        .collect();

    for i in 0..students.len() {
        for j in (i + 1)..students.len() {
            let (a, first) = students[i];
            let (b, second) = students[j];
            if common_scholarships(first, second, min_score).len() >= min_common {
                graph.add_edge(a, b);
            }
        }
    }

    graph
}

pub fn build_graph_from_matches(
    matches: &[Match],
    min_score: f64,
    min_common: usize,
) -> CompatibilityGraph {
    build_graph(&score_table(matches), min_score, min_common)
}
