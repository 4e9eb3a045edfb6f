/// Configuration errors. Parsing content never fails; only building a registry (or asking it
/// for a tag it doesn't have) does.
#[derive(Debug, thiserror::Error)]
pub enum ShortcodeError {
    /// The tag name was already registered. The first registration is kept.
    #[error("shortcode '{0}' is already registered")]
    DuplicateTag(String),

    /// The tag name isn't in the registry.
    #[error("shortcode '{0}' is not registered")]
    UnknownTag(String),

    /// The tag name could never be matched by the scanner (empty, or contains whitespace,
    /// brackets or a slash).
    #[error("'{0}' is not a usable shortcode name")]
    InvalidTagName(String),

    /// A built-in handler's pattern failed to compile.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}
