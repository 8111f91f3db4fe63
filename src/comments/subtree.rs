use std::collections::HashSet;

/// Breadth-first walk over a reply subtree, one level per store round trip.
///
/// The caller feeds the children of [`SubtreeWalk::frontier`] back through
/// [`SubtreeWalk::push_level`] until it returns `false`. Ids already seen are
/// ignored, so corrupt parent cycles terminate.
#[derive(Debug)]
pub struct SubtreeWalk {
    visited: HashSet<String>,
    levels: Vec<Vec<String>>,
}

impl SubtreeWalk {
    pub fn new(root_id: &str) -> Self {
        Self {
            visited: HashSet::from([root_id.to_string()]),
            levels: vec![vec![root_id.to_string()]],
        }
    }

    pub fn frontier(&self) -> &[String] {
        self.levels.last().map(Vec::as_slice).unwrap_or_default()
    }

    /// Records the next level; returns whether anything new was found.
    pub fn push_level<I>(&mut self, children: I) -> bool
    where
        I: IntoIterator<Item = String>,
    {
        let level: Vec<String> = children
            .into_iter()
            .filter(|id| self.visited.insert(id.clone()))
            .collect();

        if level.is_empty() {
            return false;
        }
        self.levels.push(level);
        true
    }

    /// Levels from the leaves up to the root, the order rows must be removed in.
    pub fn into_levels_deepest_first(self) -> Vec<Vec<String>> {
        let mut levels = self.levels;
        levels.reverse();
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn walk_collects_levels_and_reverses_them() {
        let mut walk = SubtreeWalk::new("a");
        assert_eq!(walk.frontier(), ids(&["a"]).as_slice());

        assert!(walk.push_level(ids(&["b", "c"])));
        assert_eq!(walk.frontier(), ids(&["b", "c"]).as_slice());
        assert!(walk.push_level(ids(&["d"])));
        assert!(!walk.push_level(Vec::new()));

        assert_eq!(
            walk.into_levels_deepest_first(),
            vec![ids(&["d"]), ids(&["b", "c"]), ids(&["a"])]
        );
    }

    #[test]
    fn cycles_and_duplicates_do_not_loop() {
        let mut walk = SubtreeWalk::new("a");
        assert!(walk.push_level(ids(&["b", "b"])));
        // corrupt data: b's child points back at a
        assert!(!walk.push_level(ids(&["a"])));

        assert_eq!(
            walk.into_levels_deepest_first(),
            vec![ids(&["b"]), ids(&["a"])]
        );
    }
}
