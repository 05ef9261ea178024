use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::EngineError;
use crate::model::{Environment, Folder, FolderKind};

/// One node of the classified folder forest.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub id: i64,
    pub name: String,
    pub kind: FolderKind,
    pub environment: Option<Environment>,
    pub children: Vec<TreeNode>,
}

/// Build the Environment → DeploymentDate → Feature forest from the flat
/// parent-pointer table.
///
/// Classification: a stored `kind` always wins; legacy rows without one
/// are inferred from depth (root = Environment, child of Environment =
/// DeploymentDate, deeper = Feature). Folders pointing at a nonexistent
/// parent are treated as roots, a known legacy data condition. True
/// cycles are rejected.
pub fn build_tree(folders: &[Folder]) -> Result<Vec<TreeNode>, EngineError> {
    let children_of = index_children(folders);

    // Explicit stack: folder depth is data-controlled and must not be able
    // to exhaust the call stack. Nodes land in `arena` in preorder.
    let mut stack: Vec<(&Folder, usize, Option<Environment>, Option<usize>)> = children_of
        .get(&None)
        .map(|roots| roots.iter().rev().map(|f| (*f, 0, None, None)).collect())
        .unwrap_or_default();

    let mut arena: Vec<TreeNode> = Vec::with_capacity(folders.len());
    let mut parent_of: Vec<Option<usize>> = Vec::with_capacity(folders.len());
    let mut visited = HashSet::new();

    while let Some((folder, depth, inherited, parent)) = stack.pop() {
        visited.insert(folder.id);
        let environment = folder.environment.or(inherited);
        let index = arena.len();
        arena.push(TreeNode {
            id: folder.id,
            name: folder.name.clone(),
            kind: classify(folder, depth),
            environment,
            children: Vec::new(),
        });
        parent_of.push(parent);
        if let Some(kids) = children_of.get(&Some(folder.id)) {
            for kid in kids.iter().rev() {
                stack.push((*kid, depth + 1, environment, Some(index)));
            }
        }
    }

    // Anything unreachable from a root sits on a cycle.
    if visited.len() != folders.len() {
        return Err(cycle_error(folders, &visited));
    }

    // Preorder means every child has a higher index than its parent, so a
    // reverse sweep attaches children bottom-up with sibling order intact.
    let mut child_indices: Vec<Vec<usize>> = vec![Vec::new(); arena.len()];
    for (index, parent) in parent_of.iter().enumerate() {
        if let Some(p) = parent {
            child_indices[*p].push(index);
        }
    }
    let mut slots: Vec<Option<TreeNode>> = arena.into_iter().map(Some).collect();
    for index in (0..slots.len()).rev() {
        let kids: Vec<TreeNode> = child_indices[index]
            .iter()
            .filter_map(|k| slots[*k].take())
            .collect();
        if let Some(node) = slots[index].as_mut() {
            node.children = kids;
        }
    }

    Ok(slots
        .into_iter()
        .zip(parent_of)
        .filter(|(_, parent)| parent.is_none())
        .filter_map(|(slot, _)| slot)
        .collect())
}

/// Ids of every folder belonging to an environment: folders carrying or
/// inheriting it, plus all their descendants. Walks the flat table
/// directly; no tree is materialized.
pub fn environment_folder_ids(
    folders: &[Folder],
    environment: Environment,
) -> Result<Vec<i64>, EngineError> {
    let children_of = index_children(folders);

    let mut stack: Vec<(&Folder, Option<Environment>, bool)> = children_of
        .get(&None)
        .map(|roots| roots.iter().rev().map(|f| (*f, None, false)).collect())
        .unwrap_or_default();

    let mut visited = HashSet::new();
    let mut ids = Vec::new();
    while let Some((folder, inherited, in_subtree)) = stack.pop() {
        visited.insert(folder.id);
        let env = folder.environment.or(inherited);
        let matched = in_subtree || env == Some(environment);
        if matched {
            ids.push(folder.id);
        }
        if let Some(kids) = children_of.get(&Some(folder.id)) {
            for kid in kids.iter().rev() {
                stack.push((*kid, env, matched));
            }
        }
    }

    if visited.len() != folders.len() {
        return Err(cycle_error(folders, &visited));
    }
    Ok(ids)
}

/// Single pass: parent id -> children. Orphans count as roots.
fn index_children(folders: &[Folder]) -> HashMap<Option<i64>, Vec<&Folder>> {
    let known_ids: HashSet<i64> = folders.iter().map(|f| f.id).collect();
    let mut children_of: HashMap<Option<i64>, Vec<&Folder>> = HashMap::new();
    for folder in folders {
        let parent = match folder.parent_id {
            Some(pid) if known_ids.contains(&pid) => Some(pid),
            _ => None,
        };
        children_of.entry(parent).or_default().push(folder);
    }
    children_of
}

fn classify(folder: &Folder, depth: usize) -> FolderKind {
    folder.kind.unwrap_or(match depth {
        0 => FolderKind::Environment,
        1 => FolderKind::DeploymentDate,
        _ => FolderKind::Feature,
    })
}

fn cycle_error(folders: &[Folder], visited: &HashSet<i64>) -> EngineError {
    let stranded = folders
        .iter()
        .map(|f| f.id)
        .find(|id| !visited.contains(id))
        .unwrap_or(0);
    EngineError::CyclicFolderGraph(stranded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: i64, parent_id: Option<i64>) -> Folder {
        Folder {
            id,
            name: format!("folder-{}", id),
            kind: None,
            environment: None,
            parent_id,
        }
    }

    fn env_folder(id: i64, environment: Environment) -> Folder {
        Folder {
            id,
            name: environment.to_string(),
            kind: Some(FolderKind::Environment),
            environment: Some(environment),
            parent_id: None,
        }
    }

    #[test]
    fn depth_classifies_legacy_rows() {
        // id 1 root, 2 under 1, 3 under 2.
        let folders = vec![folder(1, None), folder(2, Some(1)), folder(3, Some(2))];
        let forest = build_tree(&folders).unwrap();
        assert_eq!(forest.len(), 1);
        let root = &forest[0];
        assert_eq!(root.kind, FolderKind::Environment);
        assert_eq!(root.children[0].kind, FolderKind::DeploymentDate);
        assert_eq!(root.children[0].children[0].kind, FolderKind::Feature);
    }

    #[test]
    fn stored_kind_wins_over_inference() {
        let folders = vec![Folder {
            id: 1,
            name: "hotfix".to_string(),
            kind: Some(FolderKind::Feature),
            environment: None,
            parent_id: None,
        }];
        let forest = build_tree(&folders).unwrap();
        assert_eq!(forest[0].kind, FolderKind::Feature);
    }

    #[test]
    fn node_count_matches_input_and_edges_mirror_parents() {
        let folders = vec![
            folder(1, None),
            folder(2, Some(1)),
            folder(3, Some(1)),
            folder(4, Some(3)),
            folder(5, None),
        ];
        let forest = build_tree(&folders).unwrap();

        fn count(nodes: &[TreeNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        assert_eq!(count(&forest), folders.len());

        let root1 = forest.iter().find(|n| n.id == 1).unwrap();
        let child_ids: Vec<i64> = root1.children.iter().map(|c| c.id).collect();
        assert_eq!(child_ids, vec![2, 3]);
        assert_eq!(root1.children[1].children[0].id, 4);
    }

    #[test]
    fn cycle_is_rejected() {
        let folders = vec![folder(1, Some(2)), folder(2, Some(1))];
        let err = build_tree(&folders).unwrap_err();
        assert!(matches!(err, EngineError::CyclicFolderGraph(_)));
    }

    #[test]
    fn self_parent_is_a_cycle() {
        let folders = vec![folder(1, Some(1))];
        let err = build_tree(&folders).unwrap_err();
        assert!(matches!(err, EngineError::CyclicFolderGraph(1)));
    }

    #[test]
    fn orphan_parent_pointer_becomes_root() {
        // Parent 99 does not exist; legacy data after a bad migration.
        let folders = vec![folder(1, Some(99))];
        let forest = build_tree(&folders).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].kind, FolderKind::Environment);
    }

    #[test]
    fn environment_is_inherited_by_descendants() {
        let folders = vec![
            env_folder(1, Environment::Staging),
            folder(2, Some(1)),
            folder(3, Some(2)),
        ];
        let forest = build_tree(&folders).unwrap();
        let root = &forest[0];
        assert_eq!(root.children[0].environment, Some(Environment::Staging));
        assert_eq!(
            root.children[0].children[0].environment,
            Some(Environment::Staging)
        );
    }

    #[test]
    fn environment_folder_ids_scopes_by_root() {
        let folders = vec![
            env_folder(1, Environment::Dev),
            folder(2, Some(1)),
            env_folder(3, Environment::Production),
            folder(4, Some(3)),
        ];
        let mut dev_ids = environment_folder_ids(&folders, Environment::Dev).unwrap();
        dev_ids.sort();
        assert_eq!(dev_ids, vec![1, 2]);

        let staging_ids = environment_folder_ids(&folders, Environment::Staging).unwrap();
        assert!(staging_ids.is_empty());
    }

    #[test]
    fn empty_input_builds_empty_forest() {
        let forest = build_tree(&[]).unwrap();
        assert!(forest.is_empty());
    }

    #[test]
    fn deep_chain_resolves_without_blowing_the_stack() {
        let depth: i64 = 10_000;
        let mut folders = vec![env_folder(1, Environment::Dev)];
        for id in 2..=depth {
            folders.push(folder(id, Some(id - 1)));
        }

        let forest = build_tree(&folders).unwrap();
        assert_eq!(forest.len(), 1);

        let mut levels = 0i64;
        let mut node = &forest[0];
        loop {
            assert_eq!(node.environment, Some(Environment::Dev));
            match node.children.first() {
                Some(child) => {
                    levels += 1;
                    node = child;
                }
                None => break,
            }
        }
        assert_eq!(levels, depth - 1);

        let ids = environment_folder_ids(&folders, Environment::Dev).unwrap();
        assert_eq!(ids.len() as i64, depth);

        // Unnest before dropping; Drop glue recurses per level otherwise.
        let mut stack = forest;
        while let Some(mut n) = stack.pop() {
            stack.append(&mut n.children);
        }
    }
}
