use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use crate::models::{Comment, ThreadReply, ThreadRoot};

/// Shapes a flat comment list into the two-level thread the frontend renders.
///
/// Inactive rows and repeated ids are dropped. A comment whose parent is not
/// in the active set is a root; every other comment lands in the reply list of
/// the root at the top of its ancestor chain. Replies keep their own
/// `parent_id` so the renderer can show which comment a reply answers.
/// Roots are newest first, replies oldest first, ties broken by id.
pub fn build_thread(comments: Vec<Comment>, liked: &HashSet<String>) -> Vec<ThreadRoot> {
    let mut seen = HashSet::new();
    let active: Vec<Comment> = comments
        .into_iter()
        .filter(|c| c.is_active() && seen.insert(c.id.clone()))
        .collect();

    let root_ids: Vec<String> = {
        let parents: HashMap<&str, Option<&str>> = active
            .iter()
            .map(|c| (c.id.as_str(), c.parent_id.as_deref()))
            .collect();
        active
            .iter()
            .map(|c| resolve_root(&c.id, &parents).to_string())
            .collect()
    };

    let mut roots = Vec::new();
    let mut replies: HashMap<String, Vec<ThreadReply>> = HashMap::new();
    for (comment, root_id) in active.into_iter().zip(root_ids) {
        let liked = liked.contains(&comment.id);
        if comment.id == root_id {
            roots.push(ThreadRoot {
                comment,
                liked,
                replies: Vec::new(),
            });
        } else {
            replies
                .entry(root_id)
                .or_default()
                .push(ThreadReply { comment, liked });
        }
    }

    for root in &mut roots {
        if let Some(mut list) = replies.remove(&root.comment.id) {
            list.sort_by(|a, b| oldest_first(&a.comment, &b.comment));
            root.replies = list;
        }
    }
    roots.sort_by(|a, b| oldest_first(&b.comment, &a.comment));
    roots
}

fn oldest_first(a: &Comment, b: &Comment) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Follows parent links while they resolve. A comment caught in a parent cycle
/// is its own root; a comment leading into a cycle hangs off the first cycle
/// member it reaches.
fn resolve_root<'a>(id: &'a str, parents: &HashMap<&'a str, Option<&'a str>>) -> &'a str {
    let mut path = vec![id];
    let mut current = id;

    while let Some(parent) = parents
        .get(current)
        .copied()
        .flatten()
        .filter(|p| parents.contains_key(p))
    {
        if let Some(pos) = path.iter().position(|seen| *seen == parent) {
            return path[pos];
        }
        path.push(parent);
        current = parent;
    }

    current
}
