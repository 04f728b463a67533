/// Prefix of in-flight download files inside the destination directory.
pub const PART_FILE_PREFIX: &str = ".docfetch-";

/// Suffix of in-flight download files inside the destination directory.
pub const PART_FILE_SUFFIX: &str = ".part";
