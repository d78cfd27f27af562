use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::graph::{build_graph, score_table, CompatibilityGraph, ScoreTable};
use crate::models::{GroupMember, ScholarshipCriteria, SharedScholarship, StudentGroup, StudentProfile};
use crate::store::{MatchStore, ScholarshipDirectory, StudentDirectory};

/// Scholarships matched by every listed student, with the group's mean score
/// on each, highest mean first. Students without any scores are skipped.
pub fn common_scholarships_for_group(
    student_ids: &[i32],
    table: &ScoreTable,
    scholarships: &BTreeMap<i32, ScholarshipCriteria>,
) -> Vec<SharedScholarship> {
    let member_scores: Vec<&BTreeMap<i32, f64>> =
        student_ids.iter().filter_map(|id| table.get(id)).collect();

    let mut common: Option<BTreeSet<i32>> = None;
    for scores in &member_scores {
        let ids: BTreeSet<i32> = scores.keys().copied().collect();
        common = Some(match common {
            None => ids,
            Some(acc) => acc.intersection(&ids).copied().collect(),
        });
    }

    let Some(common) = common else {
        return Vec::new();
    };

    let mut shared: Vec<SharedScholarship> = common
        .into_iter()
        .filter_map(|scholarship_id| {
            let scholarship = scholarships.get(&scholarship_id)?;
            let total: f64 = member_scores
                .iter()
                .map(|scores| scores.get(&scholarship_id).copied().unwrap_or(0.0))
                .sum();
            Some(SharedScholarship {
                scholarship_id,
                name: scholarship.name.clone(),
                amount: scholarship.amount,
                min_gpa: scholarship.min_gpa,
                average_score: total / member_scores.len() as f64,
            })
        })
        .collect();

    shared.sort_by(|a, b| {
        b.average_score
            .partial_cmp(&a.average_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    shared
}

/// Turns cliques of two or more students into group reports, largest first.
/// Group ids follow enumeration order and are not stable across runs.
pub fn assemble_groups(
    cliques: &[Vec<usize>],
    graph: &CompatibilityGraph,
    table: &ScoreTable,
    students: &BTreeMap<i32, StudentProfile>,
    scholarships: &BTreeMap<i32, ScholarshipCriteria>,
) -> Vec<StudentGroup> {
    let mut groups = Vec::new();

    for clique in cliques.iter().filter(|c| c.len() >= 2) {
        let student_ids: Vec<i32> = clique.iter().filter_map(|&v| graph.label(v)).collect();
        let members: Vec<GroupMember> = student_ids
            .iter()
            .filter_map(|id| students.get(id))
            .map(GroupMember::from)
            .collect();

        groups.push(StudentGroup {
            group_id: groups.len() + 1,
            member_count: clique.len(),
            members,
            common_scholarships: common_scholarships_for_group(&student_ids, table, scholarships),
        });
    }

    groups.sort_by(|a, b| b.member_count.cmp(&a.member_count));
    groups
}

/// Finds groups of students who are pairwise compatible: each pair shares at
/// least `min_common_scholarships` matches scored at or above `min_match_score`.
/// Callers should pass `min_common_scholarships >= 1`.
pub async fn find_compatible_student_groups<B>(
    backend: &B,
    min_match_score: f64,
    min_common_scholarships: usize,
) -> anyhow::Result<Vec<StudentGroup>>
where
    B: StudentDirectory + ScholarshipDirectory + MatchStore,
{
    let matches = backend.find_matches_above_score(min_match_score).await?;
    let mut table = score_table(&matches);

    let student_ids: Vec<i32> = table.keys().copied().collect();
    let students: BTreeMap<i32, StudentProfile> = backend
        .get_students(&student_ids)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    table.retain(|id, _| students.contains_key(id));

    let scholarships: BTreeMap<i32, ScholarshipCriteria> = backend
        .list_all_scholarships()
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let graph = build_graph(&table, min_match_score, min_common_scholarships);
    debug!(
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        "built compatibility graph"
    );

    let cliques = graph.maximal_cliques();
    let groups = assemble_groups(&cliques, &graph, &table, &students, &scholarships);
    info!(
        min_match_score,
        min_common_scholarships,
        cliques = cliques.len(),
        groups = groups.len(),
        "found compatible student groups"
    );
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::fixtures::{scholarship, student};
    use crate::models::Match;
    use crate::store::InMemoryStore;
    use chrono::Utc;

    async fn store_with_matches(
        students: Vec<StudentProfile>,
        scholarships: Vec<ScholarshipCriteria>,
        matches: &[(i32, i32, f64)],
    ) -> InMemoryStore {
        let store = InMemoryStore::new(students, scholarships);
        let now = Utc::now();
        let records: Vec<Match> = matches
            .iter()
            .map(|&(s, sch, score)| Match::new(s, sch, score, now))
            .collect();
        let mut by_student: BTreeMap<i32, Vec<Match>> = BTreeMap::new();
        for record in records {
            by_student.entry(record.student_id).or_default().push(record);
        }
        let batches: Vec<(i32, Vec<Match>)> = by_student.into_iter().collect();
        store.replace_all_matches(&batches).await.unwrap();
        store
    }

    #[tokio::test]
    async fn three_students_sharing_three_scholarships_form_one_group() {
        let students = (1..=3).map(|id| student(id, 9.0, 2)).collect();
        let scholarships = (10..=12).map(|id| scholarship(id, 7.0, 1)).collect();
        let mut matches = Vec::new();
        for s in 1..=3 {
            for sch in 10..=12 {
                matches.push((s, sch, 70.0 + f64::from(s)));
            }
        }
        let store = store_with_matches(students, scholarships, &matches).await;

        let groups = find_compatible_student_groups(&store, 7.0, 2).await.unwrap();
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.group_id, 1);
        assert_eq!(group.member_count, 3);
        assert_eq!(group.members.len(), 3);
        assert_eq!(group.common_scholarships.len(), 3);
        for shared in &group.common_scholarships {
            assert!((shared.average_score - 72.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn groups_are_ordered_by_size() {
        let students = (1..=5).map(|id| student(id, 9.0, 2)).collect();
        let scholarships = (10..=13).map(|id| scholarship(id, 7.0, 1)).collect();
        // {1,2,3} share 10 and 11; {4,5} share 12 and 13.
        let store = store_with_matches(
            students,
            scholarships,
            &[
                (1, 10, 80.0),
                (1, 11, 80.0),
                (2, 10, 70.0),
                (2, 11, 90.0),
                (3, 10, 75.0),
                (3, 11, 65.0),
                (4, 12, 88.0),
                (4, 13, 61.0),
                (5, 12, 66.0),
                (5, 13, 99.0),
            ],
        )
        .await;

        let groups = find_compatible_student_groups(&store, 60.0, 2).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].member_count, 3);
        assert_eq!(groups[1].member_count, 2);

        let mut ids: Vec<usize> = groups.iter().map(|g| g.group_id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);

        let names: Vec<&str> = groups[0]
            .common_scholarships
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        // 11 averages 78.33, 10 averages 75.
        assert_eq!(names, vec!["Scholarship 11", "Scholarship 10"]);
    }

    #[tokio::test]
    async fn singletons_and_unknown_students_are_not_reported() {
        let students = vec![student(1, 9.0, 2), student(2, 9.0, 2)];
        let scholarships = (10..=11).map(|id| scholarship(id, 7.0, 1)).collect();
        let store = store_with_matches(
            students,
            scholarships,
            &[(1, 10, 80.0), (1, 11, 80.0), (99, 10, 80.0), (99, 11, 80.0), (2, 10, 80.0)],
        )
        .await;

        let groups = find_compatible_student_groups(&store, 60.0, 2).await.unwrap();
        assert!(groups.is_empty());
    }

    #[tokio::test]
    async fn members_are_loaded_in_one_directory_call() {
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingDirectory {
            inner: InMemoryStore,
            student_calls: AtomicUsize,
        }

        #[async_trait]
        impl StudentDirectory for CountingDirectory {
            async fn get_student(&self, id: i32) -> anyhow::Result<Option<StudentProfile>> {
                self.student_calls.fetch_add(1, Ordering::SeqCst);
                self.inner.get_student(id).await
            }
            async fn list_all_students(&self) -> anyhow::Result<Vec<StudentProfile>> {
                self.student_calls.fetch_add(1, Ordering::SeqCst);
                self.inner.list_all_students().await
            }
        }

        #[async_trait]
        impl ScholarshipDirectory for CountingDirectory {
            async fn get_scholarship(&self, id: i32) -> anyhow::Result<Option<ScholarshipCriteria>> {
                self.inner.get_scholarship(id).await
            }
            async fn list_all_scholarships(&self) -> anyhow::Result<Vec<ScholarshipCriteria>> {
                self.inner.list_all_scholarships().await
            }
        }

        #[async_trait]
        impl MatchStore for CountingDirectory {
            async fn delete_matches_for_student(&self, student_id: i32) -> anyhow::Result<()> {
                self.inner.delete_matches_for_student(student_id).await
            }
            async fn save_match(&self, record: &Match) -> anyhow::Result<()> {
                self.inner.save_match(record).await
            }
            async fn find_matches_for_student(&self, student_id: i32) -> anyhow::Result<Vec<Match>> {
                self.inner.find_matches_for_student(student_id).await
            }
            async fn find_matches_above_score(&self, min_score: f64) -> anyhow::Result<Vec<Match>> {
                self.inner.find_matches_above_score(min_score).await
            }
            async fn find_match(&self, s: i32, sch: i32) -> anyhow::Result<Option<Match>> {
                self.inner.find_match(s, sch).await
            }
        }

        let students = (1..=4).map(|id| student(id, 9.0, 2)).collect();
        let scholarships = (10..=11).map(|id| scholarship(id, 7.0, 1)).collect();
        let mut matches = Vec::new();
        for s in 1..=4 {
            matches.push((s, 10, 75.0));
            matches.push((s, 11, 85.0));
        }
        let directory = CountingDirectory {
            inner: store_with_matches(students, scholarships, &matches).await,
            student_calls: AtomicUsize::new(0),
        };

        let groups = find_compatible_student_groups(&directory, 60.0, 2).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 4);
        assert_eq!(directory.student_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn common_set_spans_all_members_and_ignores_threshold() {
        let mut table = ScoreTable::new();
        table.insert(1, BTreeMap::from([(10, 90.0), (11, 50.0), (12, 70.0)]));
        table.insert(2, BTreeMap::from([(10, 70.0), (11, 40.0)]));
        table.insert(3, BTreeMap::from([(10, 80.0), (11, 60.0), (12, 99.0)]));
        let scholarships: BTreeMap<i32, ScholarshipCriteria> =
            (10..=12).map(|id| (id, scholarship(id, 7.0, 1))).collect();

        let shared = common_scholarships_for_group(&[1, 2, 3], &table, &scholarships);
        let ids: Vec<i32> = shared.iter().map(|s| s.scholarship_id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert!((shared[0].average_score - 80.0).abs() < 1e-9);
        assert!((shared[1].average_score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn assembler_skips_small_cliques_and_numbers_sequentially() {
        let mut graph = CompatibilityGraph::default();
        let a = graph.add_vertex(1);
        let b = graph.add_vertex(2);
        let c = graph.add_vertex(3);
        graph.add_edge(a, b);

        let mut table = ScoreTable::new();
        for id in 1..=3 {
            table.insert(id, BTreeMap::from([(10, 80.0)]));
        }
        let students: BTreeMap<i32, StudentProfile> =
            (1..=3).map(|id| (id, student(id, 9.0, 2))).collect();
        let scholarships = BTreeMap::from([(10, scholarship(10, 7.0, 1))]);

        let cliques = vec![vec![c], vec![a, b]];
        let groups = assemble_groups(&cliques, &graph, &table, &students, &scholarships);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_id, 1);
        let member_ids: Vec<i32> = groups[0].members.iter().map(|m| m.id).collect();
        assert_eq!(member_ids, vec![1, 2]);
    }
}
