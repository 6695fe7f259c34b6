pub mod branch_name;
pub mod branch_state;

pub const INVALID_BRANCH_NAME_REGEX: &str =
    r"^\.|\/\.|\.\.|^\/|\/$|\.lock$|@\{|[\x00-\x20\*:\?\[\\~\^\x7f]";

/// strftime layout of upload branches: `build-YYYY-MM-DD-HH-mm`
pub const TIMESTAMPED_BRANCH_FORMAT: &str = "build-%Y-%m-%d-%H-%M";
