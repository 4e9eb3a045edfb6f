use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::ShortcodeError;

/// The attributes of one shortcode, in the order they were written. Names are case sensitive
/// and the first occurrence of a name wins: `[tag a=1 a=2]` has `a` = `1`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attributes<'a> {
    entries: Vec<(&'a str, &'a str)>,
}

impl<'a> Attributes<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute unless one with the same name is already present. Returns whether it
    /// was added.
    pub fn insert(&mut self, name: &'a str, value: &'a str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.push(name, value);
        true
    }

    /// Append without the duplicate check. The caller already knows `name` is new
    pub(crate) fn push(&mut self, name: &'a str, value: &'a str) {
        self.entries.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    /// The first of `names` that is present with a non-blank value. Handlers use this for
    /// aliases like `lang`/`language`
    pub fn first_nonblank(&self, names: &[&str]) -> Option<&'a str> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .find(|value| !value.trim().is_empty())
    }

    /// Parse an attribute value. Missing and unparsable are both `None`, so handlers can fall
    /// back to a default instead of failing.
    pub fn parsed<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| *n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Attributes<'a> {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut result = Self::new();
        for (name, value) in iter {
            result.insert(name, value);
        }
        result
    }
}

/// Something that turns a shortcode's attributes and inner content into output text. Handlers
/// should be pure: same input, same output, no I/O. If they can't make sense of an attribute they
/// fall back to a default rendering instead of panicking.
pub trait Handler {
    fn process(&self, attributes: &Attributes<'_>, content: &str) -> String;
}

/// Builds a fresh handler for each shortcode occurrence. Shared read-only between parses, so it
/// has to be thread safe.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

/// Adapter so plain closures can be registered with [`Registry::register_fn`]
struct FnHandler<F>(Arc<F>);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Attributes<'_>, &str) -> String,
{
    fn process(&self, attributes: &Attributes<'_>, content: &str) -> String {
        (self.0)(attributes, content)
    }
}

/// A handler bound to the attributes and content of one particular shortcode, ready to render
pub struct Invocation<'a> {
    handler: Box<dyn Handler>,
    pub attributes: Attributes<'a>,
    pub content: &'a str,
}

impl Invocation<'_> {
    pub fn process(&self) -> String {
        self.handler.process(&self.attributes, self.content)
    }
}

/// Tag name to handler mapping. Fill it once at startup, then share it (it's `Send + Sync`) with
/// as many parses as you like. Nothing mutates it after registration, so no locking is needed.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, HandlerFactory>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("tags", &self.names()).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `name` with a handler factory. Names are case sensitive. Registering a name
    /// twice is an error (the first registration stays), since an ambiguous tag set is a
    /// configuration bug.
    pub fn register(&mut self, name: &str, factory: HandlerFactory) -> Result<(), ShortcodeError> {
        if !Self::valid_name(name) {
            return Err(ShortcodeError::InvalidTagName(name.to_string()));
        }
        if self.handlers.contains_key(name) {
            return Err(ShortcodeError::DuplicateTag(name.to_string()));
        }
        log::debug!("Registering shortcode '{}'", name);
        self.handlers.insert(name.to_string(), factory);
        Ok(())
    }

    /// Register a plain closure as the handler for `name`
    pub fn register_fn<F>(&mut self, name: &str, handler: F) -> Result<(), ShortcodeError>
    where
        F: Fn(&Attributes<'_>, &str) -> String + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            name,
            Arc::new(move || Box::new(FnHandler(Arc::clone(&handler))) as Box<dyn Handler>),
        )
    }

    /// Move every registration from `other` into this registry. Stops at the first name that
    /// already exists here.
    pub fn extend_from(&mut self, other: Registry) -> Result<(), ShortcodeError> {
        let mut incoming: Vec<(String, HandlerFactory)> = other.handlers.into_iter().collect();
        //Sorted so the error (if any) is deterministic
        incoming.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, factory) in incoming {
            self.register(&name, factory)?;
        }
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Construct the handler for `name` and bind it to the given attributes and content
    pub fn create<'a>(
        &self,
        name: &str,
        attributes: Attributes<'a>,
        content: &'a str,
    ) -> Result<Invocation<'a>, ShortcodeError> {
        let factory = self
            .handlers
            .get(name)
            .ok_or_else(|| ShortcodeError::UnknownTag(name.to_string()))?;
        Ok(Invocation {
            handler: factory(),
            attributes,
            content,
        })
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|n| n.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The scanner ends a tag name at whitespace, `/` or `]`, and a name containing `[` could
    /// never be reached either
    fn valid_name(name: &str) -> bool {
        !name.is_empty()
            && !name
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '[' | ']' | '/'))
    }
}
