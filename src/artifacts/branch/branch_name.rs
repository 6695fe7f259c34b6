use crate::artifacts::branch::{INVALID_BRANCH_NAME_REGEX, TIMESTAMPED_BRANCH_FORMAT};
use anyhow::Context;
use chrono::{DateTime, TimeZone};

const REF_PREFIX: &str = "refs/heads/";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BranchName(String);

impl BranchName {
    pub fn try_parse(name: String) -> anyhow::Result<Self> {
        if name.is_empty() {
            anyhow::bail!("branch name cannot be empty");
        }

        let re = regex::Regex::new(INVALID_BRANCH_NAME_REGEX)
            .with_context(|| format!("invalid branch name regex: {INVALID_BRANCH_NAME_REGEX}"))?;

        if re.is_match(&name) {
            anyhow::bail!("invalid branch name: {}", name);
        } else {
            Ok(Self(name))
        }
    }

    /// Accepts either `name` or `refs/heads/name`
    pub fn try_parse_ref(full_ref: &str) -> anyhow::Result<Self> {
        Self::try_parse(full_ref.strip_prefix(REF_PREFIX).unwrap_or(full_ref).to_string())
    }

    /// Branch named after the given wall-clock minute, e.g. `build-2024-11-15-06-37`
    pub fn timestamped<Tz>(at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self(at.format(TIMESTAMPED_BRANCH_FORMAT).to_string())
    }

    /// Timestamped branch name for the current local time
    pub fn timestamped_now() -> Self {
        Self::timestamped(&chrono::Local::now())
    }

    /// Fully-qualified ref, e.g. `refs/heads/main`
    pub fn as_full_ref(&self) -> String {
        format!("{REF_PREFIX}{}", self.0)
    }

    /// Slash-separated components, e.g. `["feature", "x"]`
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for BranchName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Self::try_parse(s.to_string())
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use pretty_assertions::assert_eq;
    use proptest::proptest;

    proptest! {
        #[test]
        fn test_is_valid_branch_name_with_valid_branch_name(
            branch_name in "[a-zA-Z0-9_-]+"
        ) {
            assert!(BranchName::try_parse(branch_name).is_ok());
        }

        #[test]
        fn test_is_valid_branch_name_with_slashes(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+"
        ) {
            let branch_name = format!("{}/{}", prefix, suffix);
            assert!(BranchName::try_parse(branch_name).is_ok());
        }

        #[test]
        fn test_is_invalid_branch_name_ending_with_lock(
            prefix in "[a-zA-Z0-9_-]+"
        ) {
            let branch_name = format!("{}.lock", prefix);
            assert!(BranchName::try_parse(branch_name).is_err());
        }

        #[test]
        fn test_is_invalid_branch_name_with_consecutive_dots(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+"
        ) {
            let branch_name = format!("{}..{}", prefix, suffix);
            assert!(BranchName::try_parse(branch_name).is_err());
        }

        #[test]
        fn test_is_invalid_branch_name_with_special_chars(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+",
            special_char in r"[\*:\?\[\\^~ ]"
        ) {
            let branch_name = format!("{}{}{}", prefix, special_char, suffix);
            assert!(BranchName::try_parse(branch_name).is_err());
        }

        #[test]
        fn test_timestamped_names_are_always_valid(
            secs in 0i64..4_102_444_800i64
        ) {
            let at = DateTime::from_timestamp(secs, 0).unwrap();
            let name = BranchName::timestamped(&at);
            assert!(BranchName::try_parse(name.to_string()).is_ok());
        }
    }

    #[test]
    fn test_is_invalid_branch_name_empty() {
        assert!(BranchName::try_parse("".to_string()).is_err());
    }

    #[test]
    fn test_timestamped_name_is_zero_padded() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 9, 59).unwrap();
        assert_eq!(BranchName::timestamped(&at).as_ref(), "build-2024-03-05-07-09");
    }

    #[test]
    fn test_timestamped_name_uses_the_clock_of_the_given_zone() {
        let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        let at = offset.with_ymd_and_hms(2024, 11, 15, 6, 37, 56).unwrap();
        assert_eq!(BranchName::timestamped(&at).as_ref(), "build-2024-11-15-06-37");
    }

    #[test]
    fn test_ref_forms() {
        let name = BranchName::try_parse_ref("refs/heads/feature/x").unwrap();
        assert_eq!(name.as_ref(), "feature/x");
        assert_eq!(name.as_full_ref(), "refs/heads/feature/x");
        assert_eq!(name.segments().collect::<Vec<_>>(), vec!["feature", "x"]);
    }

    #[test]
    fn test_ref_prefix_is_stripped_once() {
        let name = BranchName::try_parse_ref("refs/heads/refs/heads/x").unwrap();
        assert_eq!(name.as_ref(), "refs/heads/x");
    }
}
