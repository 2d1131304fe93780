//! Pure helpers over a tenant's flat department list.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::models::department::DepartmentRow;

pub const PATH_SEPARATOR: &str = " / ";

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentNode {
    #[serde(flatten)]
    pub department: DepartmentRow,
    pub children_count: usize,
    pub jobs_count: i64,
    pub children: Vec<DepartmentNode>,
}

/// Nests `rows` under their parents. Rows whose parent is missing from the
/// list become roots. Siblings are ordered by name.
pub fn build_tree(rows: Vec<DepartmentRow>, job_counts: &HashMap<Uuid, i64>) -> Vec<DepartmentNode> {
    let ids: HashSet<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut by_parent: HashMap<Option<Uuid>, Vec<DepartmentRow>> = HashMap::new();
    for row in rows {
        let parent = row.parent_id.filter(|p| ids.contains(p));
        by_parent.entry(parent).or_default().push(row);
    }
    attach(None, &mut by_parent, job_counts)
}

fn attach(
    parent: Option<Uuid>,
    by_parent: &mut HashMap<Option<Uuid>, Vec<DepartmentRow>>,
    job_counts: &HashMap<Uuid, i64>,
) -> Vec<DepartmentNode> {
    let mut rows = by_parent.remove(&parent).unwrap_or_default();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    rows.into_iter()
        .map(|department| {
            let children = attach(Some(department.id), by_parent, job_counts);
            DepartmentNode {
                children_count: children.len(),
                jobs_count: job_counts.get(&department.id).copied().unwrap_or(0),
                department,
                children,
            }
        })
        .collect()
}

/// True if making `new_parent` the parent of `id` would close a loop.
pub fn would_create_cycle(rows: &[DepartmentRow], id: Uuid, new_parent: Option<Uuid>) -> bool {
    let parents: HashMap<Uuid, Option<Uuid>> = rows.iter().map(|r| (r.id, r.parent_id)).collect();
    let mut seen = HashSet::new();
    let mut cursor = new_parent;
    while let Some(current) = cursor {
        if current == id {
            return true;
        }
        if !seen.insert(current) {
            // Existing data already loops; refuse to make it worse.
            return true;
        }
        cursor = parents.get(&current).copied().flatten();
    }
    false
}

/// Recomputes `(id, level, path)` for `root_id` and every descendant.
///
/// `rows` must already reflect the pending change to the root (its new name
/// or parent).
pub fn recompute_paths(rows: &[DepartmentRow], root_id: Uuid) -> Vec<(Uuid, i32, String)> {
    let by_id: HashMap<Uuid, &DepartmentRow> = rows.iter().map(|r| (r.id, r)).collect();
    let Some(root) = by_id.get(&root_id) else {
        return Vec::new();
    };

    let (level, path) = match root.parent_id.and_then(|p| by_id.get(&p)) {
        Some(parent) => {
            let (parent_level, parent_path) = ancestry(&by_id, parent);
            (parent_level + 1, format!("{parent_path}{PATH_SEPARATOR}{}", root.name))
        }
        None => (1, root.name.clone()),
    };

    let mut children: HashMap<Uuid, Vec<&DepartmentRow>> = HashMap::new();
    for row in rows {
        if let Some(parent) = row.parent_id {
            children.entry(parent).or_default().push(row);
        }
    }

    let mut updates = Vec::new();
    let mut stack = vec![(root_id, level, path)];
    let mut seen = HashSet::new();
    while let Some((id, level, path)) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        for child in children.get(&id).map(Vec::as_slice).unwrap_or_default() {
            stack.push((
                child.id,
                level + 1,
                format!("{path}{PATH_SEPARATOR}{}", child.name),
            ));
        }
        updates.push((id, level, path));
    }
    updates
}

/// Level and path of `row` derived from its ancestors' names.
fn ancestry(by_id: &HashMap<Uuid, &DepartmentRow>, row: &DepartmentRow) -> (i32, String) {
    let mut names = vec![row.name.as_str()];
    let mut seen = HashSet::from([row.id]);
    let mut cursor = row.parent_id;
    while let Some(parent) = cursor.and_then(|id| by_id.get(&id)) {
        if !seen.insert(parent.id) {
            break;
        }
        names.push(parent.name.as_str());
        cursor = parent.parent_id;
    }
    names.reverse();
    (names.len() as i32, names.join(PATH_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dept(name: &str, parent: Option<Uuid>) -> DepartmentRow {
        DepartmentRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            name: name.to_string(),
            description: None,
            parent_id: parent,
            manager_id: None,
            level: 0,
            path: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn tree_nests_children_and_counts_jobs() {
        let eng = dept("Engineering", None);
        let backend = dept("Backend", Some(eng.id));
        let frontend = dept("Frontend", Some(eng.id));
        let sales = dept("Sales", None);
        let counts = HashMap::from([(backend.id, 3)]);

        let tree = build_tree(
            vec![sales.clone(), frontend.clone(), eng.clone(), backend.clone()],
            &counts,
        );

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].department.name, "Engineering");
        assert_eq!(tree[0].children_count, 2);
        assert_eq!(tree[0].children[0].department.name, "Backend");
        assert_eq!(tree[0].children[0].jobs_count, 3);
        assert_eq!(tree[0].children[1].jobs_count, 0);
        assert_eq!(tree[1].department.name, "Sales");
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn orphaned_rows_become_roots() {
        let orphan = dept("Orphan", Some(Uuid::new_v4()));
        let tree = build_tree(vec![orphan], &HashMap::new());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn self_parent_and_descendant_parent_are_cycles() {
        let a = dept("A", None);
        let b = dept("B", Some(a.id));
        let c = dept("C", Some(b.id));
        let rows = vec![a.clone(), b.clone(), c.clone()];

        assert!(would_create_cycle(&rows, a.id, Some(a.id)));
        assert!(would_create_cycle(&rows, a.id, Some(c.id)));
        assert!(!would_create_cycle(&rows, c.id, Some(a.id)));
        assert!(!would_create_cycle(&rows, b.id, None));
    }

    #[test]
    fn moving_a_department_rewrites_its_subtree() {
        let a = dept("A", None);
        let x = dept("X", None);
        let mut b = dept("B", Some(a.id));
        let c = dept("C", Some(b.id));

        // Move B under X.
        b.parent_id = Some(x.id);
        let rows = vec![a, x, b.clone(), c.clone()];
        let mut updates = recompute_paths(&rows, b.id);
        updates.sort_by_key(|(_, level, _)| *level);

        assert_eq!(
            updates,
            vec![
                (b.id, 2, "X / B".to_string()),
                (c.id, 3, "X / B / C".to_string()),
            ]
        );
    }

    #[test]
    fn root_rename_updates_paths() {
        let mut a = dept("A", None);
        let b = dept("B", Some(a.id));
        a.name = "Alpha".into();
        let rows = vec![a.clone(), b.clone()];

        let updates: HashMap<Uuid, (i32, String)> = recompute_paths(&rows, a.id)
            .into_iter()
            .map(|(id, level, path)| (id, (level, path)))
            .collect();
        assert_eq!(updates[&a.id], (1, "Alpha".to_string()));
        assert_eq!(updates[&b.id], (2, "Alpha / B".to_string()));
    }
}
