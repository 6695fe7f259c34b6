//! Ordered exclusion rules for one upload
//!
//! Built once from the root pattern file and read-only afterwards. The last rule
//! that applies to a path decides it, and a path below an excluded directory is
//! excluded no matter what later rules say about the path itself.

use crate::artifacts::ignore::pattern::Pattern;
use anyhow::Context;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct IgnoreSpec {
    patterns: Vec<Pattern>,
}

impl IgnoreSpec {
    /// A spec that excludes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile pattern file text, one rule per line
    pub fn compile(pattern_text: &str) -> anyhow::Result<Self> {
        let patterns = pattern_text
            .lines()
            .map(Pattern::parse)
            .filter_map(Result::transpose)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Compile the pattern file at `path`; a missing file yields [`IgnoreSpec::empty`]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::empty());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ignore file at {:?}", path))?;
        Self::compile(&text)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether a slash-separated relative path is excluded
    ///
    /// A trailing `/` marks the path as a directory.
    pub fn matches(&self, relative_path: &str) -> bool {
        match relative_path.strip_suffix('/') {
            Some(dir) => self.is_ignored(dir, true),
            None => self.is_ignored(relative_path, false),
        }
    }

    /// Whether `relative_path` is excluded, itself or through one of its parent directories
    pub fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        let relative_path = relative_path.trim_matches('/');
        let parent_excluded = relative_path
            .match_indices('/')
            .any(|(idx, _)| self.decide(&relative_path[..idx], true));

        parent_excluded || self.decide(relative_path, is_dir)
    }

    fn decide(&self, path: &str, is_dir: bool) -> bool {
        self.patterns
            .iter()
            .rev()
            .find(|pattern| pattern.applies_to(path, is_dir))
            .is_some_and(|pattern| !pattern.is_negated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::proptest;
    use rstest::rstest;

    proptest! {
        #[test]
        fn empty_spec_excludes_nothing(path in "[a-z]{1,8}(/[a-z.]{1,8}){0,4}") {
            assert!(!IgnoreSpec::empty().matches(&path));
            assert!(!IgnoreSpec::compile("").unwrap().matches(&path));
        }

        #[test]
        fn excluded_directory_hides_every_descendant(
            dir in "[a-z]{1,8}",
            rest in "[a-z]{1,8}(/[a-z]{1,8}){0,3}"
        ) {
            let spec = IgnoreSpec::compile(&format!("{dir}/\n!*.txt")).unwrap();
            assert!(spec.is_ignored(&format!("{dir}/{rest}.txt"), false));
        }
    }

    #[rstest]
    #[case("debug.log", true)]
    #[case("important.log", false)]
    #[case("logs/debug.log", true)]
    #[case("logs/important.log", false)]
    #[case("notes.txt", false)]
    fn later_negation_wins(#[case] path: &str, #[case] expected: bool) {
        let spec = IgnoreSpec::compile("*.log\n!important.log\n").unwrap();
        assert_eq!(spec.matches(path), expected);
    }

    #[test]
    fn order_decides_precedence() {
        let spec = IgnoreSpec::compile("!important.log\n*.log\n").unwrap();
        assert!(spec.matches("important.log"));
    }

    #[test]
    fn file_under_excluded_directory_cannot_be_reincluded() {
        let spec = IgnoreSpec::compile("build/\n!build/keep.txt\n").unwrap();
        assert!(spec.matches("build/"));
        assert!(spec.matches("build/keep.txt"));
        assert!(!spec.matches("src/build.rs"));
    }

    #[test]
    fn directory_rule_does_not_touch_same_named_file() {
        let spec = IgnoreSpec::compile("out/\n").unwrap();
        assert!(!spec.matches("out"));
        assert!(spec.matches("out/"));
    }

    #[test]
    fn reversed_range_does_not_break_the_other_rules() {
        let spec = IgnoreSpec::compile("*.log\n[z-a].txt\n[[:digit:]]*.csv\n").unwrap();
        assert_eq!(spec.len(), 3);
        assert!(spec.matches("debug.log"));
        assert!(!spec.matches("z.txt"));
        assert!(spec.matches("data/2024.csv"));
        assert!(!spec.matches("data/report.csv"));
    }

    #[test]
    fn comments_and_blanks_are_not_rules() {
        let spec = IgnoreSpec::compile("# generated\n\n*.o\n").unwrap();
        assert_eq!(spec.len(), 1);
    }

    #[test]
    fn missing_pattern_file_yields_empty_spec() {
        let dir = assert_fs::TempDir::new().unwrap();
        let spec = IgnoreSpec::load(&dir.path().join(".gitignore")).unwrap();
        assert!(spec.is_empty());
        assert!(!spec.matches("anything.log"));
    }
}
