use std::collections::BTreeSet;

// Bron–Kerbosch with Tomita pivoting over neighbour sets. Vertices are the
// indices of `adjacency`; the graph is expected to be undirected without
// self-loops. Every maximal clique is reported exactly once, including
// isolated vertices as singletons.

/// Enumerates all maximal cliques. Each clique is returned sorted ascending.
pub fn maximal_cliques(adjacency: &[BTreeSet<usize>]) -> Vec<Vec<usize>> {
    let mut cliques = Vec::new();
    if adjacency.is_empty() {
        return cliques;
    }
    let mut r: Vec<usize> = Vec::new();
    let p: BTreeSet<usize> = (0..adjacency.len()).collect();
    let x: BTreeSet<usize> = BTreeSet::new();

    bron_kerbosch(adjacency, &mut r, p, x, &mut cliques);
    cliques
}

fn bron_kerbosch(
    adjacency: &[BTreeSet<usize>],
    r: &mut Vec<usize>,
    mut p: BTreeSet<usize>,
    mut x: BTreeSet<usize>,
    cliques: &mut Vec<Vec<usize>>,
) {
    if p.is_empty() {
        if x.is_empty() {
            let mut clique = r.clone();
            clique.sort_unstable();
            cliques.push(clique);
        }
        return;
    }

    let pivot = choose_pivot(adjacency, &p, &x);
    let candidates: Vec<usize> = match pivot {
        Some(u) => p.difference(&adjacency[u]).copied().collect(),
        None => p.iter().copied().collect(),
    };

    for v in candidates {
        let neighbours = &adjacency[v];
        let p_next: BTreeSet<usize> = p.intersection(neighbours).copied().collect();
        let x_next: BTreeSet<usize> = x.intersection(neighbours).copied().collect();

        r.push(v);
        bron_kerbosch(adjacency, r, p_next, x_next, cliques);
        r.pop();

        p.remove(&v);
        x.insert(v);
    }
}

// Vertex of P ∪ X with the most neighbours in P.
fn choose_pivot(
    adjacency: &[BTreeSet<usize>],
    p: &BTreeSet<usize>,
    x: &BTreeSet<usize>,
) -> Option<usize> {
    p.union(x)
        .copied()
        .max_by_key(|&u| adjacency[u].intersection(p).count())
}

/// Returns true when every pair of `vertices` is adjacent.
pub fn is_clique(adjacency: &[BTreeSet<usize>], vertices: &[usize]) -> bool {
    vertices.iter().enumerate().all(|(i, &a)| {
        vertices[i + 1..]
            .iter()
            .all(|&b| a != b && adjacency[a].contains(&b))
    })
}

/// Returns true when `vertices` is a clique no outside vertex can extend.
pub fn is_maximal_clique(adjacency: &[BTreeSet<usize>], vertices: &[usize]) -> bool {
    if !is_clique(adjacency, vertices) {
        return false;
    }
    let members: BTreeSet<usize> = vertices.iter().copied().collect();
    (0..adjacency.len())
        .filter(|v| !members.contains(v))
        .all(|v| !vertices.iter().all(|&m| adjacency[v].contains(&m)))
}
