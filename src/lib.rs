//! Shortcode expansion for authored content. Finds `[tag]`, `[tag attr=value/]` and
//! `[tag attr="value"]content[/tag]` in arbitrary text and replaces each one with whatever the
//! registered handler for `tag` renders. Everything else (unknown tags, broken syntax, stray
//! brackets) passes through byte for byte.
//!
//! ```
//! use shortscope::{Registry, Shortcodes};
//!
//! let mut registry = Registry::new();
//! registry.register_fn("shout", |_attrs, content| content.to_uppercase()).unwrap();
//! let shortcodes = Shortcodes::from_registry(registry);
//! assert_eq!(shortcodes.parse("say [shout]hi[/shout] [whisper]"), "say HI [whisper]");
//! ```

use std::sync::Arc;

pub mod cursor;
mod error;
pub mod handlers;
pub mod parser;
pub mod registry;

pub use error::ShortcodeError;
pub use handlers::{CodeConfig, VideoConfig};
pub use parser::{Match, Matches};
pub use registry::{Attributes, Handler, HandlerFactory, Invocation, Registry};

use handlers::{CodeBlock, YouTube, YouTubePatterns};

// Scanning rules, in short:
//- unknown or malformed tags are left exactly as written
//- [tag] needs a [/tag], [tag attr=x] doesn't (it's self closing without one), [tag/] never does
//- the first [/tag] closes, nested tags of the same name aren't balanced
//- handler output is never scanned again

const CODETAG: &str = "code";
const YOUTUBETAG: &str = "youtube";

const BUILTINTAGS: &[&str] = &[CODETAG, YOUTUBETAG];

/// Configuration for the built-in tags. Generally you only touch this to change a default or
/// to leave one of the built-ins out; anything fancier is easier as your own [`Handler`].
#[derive(Clone, Debug)]
pub struct ShortcodeConfig {
    /// Which built-in tags to register. Defaults to all of them
    pub accepted_tags: Vec<String>,
    pub code: CodeConfig,
    pub video: VideoConfig,
}

impl Default for ShortcodeConfig {
    fn default() -> Self {
        Self {
            accepted_tags: BUILTINTAGS.iter().map(|t| t.to_string()).collect(),
            code: CodeConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

/// The main shortcode system. Build one at startup and share it: clones are cheap (the
/// registry is reference counted) and parsing never mutates anything.
#[derive(Clone)]
pub struct Shortcodes {
    pub registry: Arc<Registry>,

    #[cfg(feature = "profiling")]
    pub profiler: onestop::OneList<onestop::OneDuration>,
}

impl Shortcodes {
    /// The built-in tags with the default configuration
    pub fn builtin() -> Result<Self, ShortcodeError> {
        Self::from_config(ShortcodeConfig::default(), None)
    }

    /// Use exactly the tags in `registry`, no built-ins. If you're building a fully custom tag set,
    /// use this
    pub fn from_registry(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            #[cfg(feature = "profiling")]
            profiler: onestop::OneList::<onestop::OneDuration>::new(),
        }
    }

    /// Register the built-ins named in `config.accepted_tags`, then everything in `additional`
    /// (plugin tags, say). A tag name that shows up twice is an error: better to refuse to start
    /// than to guess which handler was meant.
    pub fn from_config(config: ShortcodeConfig, additional: Option<Registry>) -> Result<Self, ShortcodeError> {
        let mut registry = Registry::new();
        let accepted = |tag: &str| config.accepted_tags.iter().any(|t| t == tag);

        if accepted(CODETAG) {
            let code_config = config.code.clone();
            registry.register(
                CODETAG,
                Arc::new(move || Box::new(CodeBlock::new(code_config.clone())) as Box<dyn Handler>),
            )?;
        }

        if accepted(YOUTUBETAG) {
            let patterns = Arc::new(YouTubePatterns::new()?);
            let video_config = config.video.clone();
            registry.register(
                YOUTUBETAG,
                Arc::new(move || {
                    Box::new(YouTube::new(Arc::clone(&patterns), video_config.clone())) as Box<dyn Handler>
                }),
            )?;
        }

        if let Some(additional) = additional {
            registry.extend_from(additional)?;
        }

        Ok(Self::from_registry(registry))
    }

    /// Main function! Replace every well formed, registered shortcode in `input` with its handler's
    /// output. Never fails: anything that doesn't parse stays as the author typed it.
    pub fn parse(&self, input: &str) -> String {
        self.splice(input, |found| {
            match self.registry.create(found.name, found.attributes, found.content) {
                Ok(invocation) => {
                    log::debug!("Rendering shortcode '{}' at {}", found.name, found.begin);
                    Some(invocation.process())
                }
                //The scanner only matches registered names, so this shouldn't happen
                Err(error) => {
                    log::warn!("{} - leaving shortcode unaltered", error);
                    None
                }
            }
        })
    }

    /// Every shortcode in `input` in source order, without rendering anything
    pub fn find_matches<'a>(&self, input: &'a str) -> Vec<Match<'a>> {
        self.matches(input).collect()
    }

    /// Lazy version of [`Shortcodes::find_matches`]
    pub fn matches<'a>(&self, input: &'a str) -> Matches<'_, 'a> {
        parser::matches(&self.registry, input)
    }

    /// Remove the shortcodes but keep what they wrapped: `[tag a=1/]` disappears and
    /// `[tag]text[/tag]` becomes `text`. Handy for excerpts and plain text summaries. Handlers
    /// are not invoked.
    pub fn strip(&self, input: &str) -> String {
        self.splice(input, |found| Some(found.content.to_string()))
    }

    /// Copy `input`, replacing each match with what `render` returns for it. `None` leaves the
    /// original text of that match in place.
    fn splice<'a, F>(&self, input: &'a str, mut render: F) -> String
    where
        F: FnMut(Match<'a>) -> Option<String>,
    {
        //Nothing can possibly match, skip the scanner
        if !input.contains('[') {
            return input.to_string();
        }

        let mut result = String::with_capacity(input.len());
        let mut last_end = 0;

        for found in self.matches(input) {
            let span = found.span();
            if let Some(rendered) = render(found) {
                result.push_str(&input[last_end..span.start]);
                result.push_str(&rendered);
                last_end = span.end;
            }
        }

        result.push_str(&input[last_end..]);
        result
    }

    /// This MAY OR MAY NOT profile, depending on your featureset!
    pub fn parse_profiled_opt(&mut self, input: &str, _name: String) -> String {
        #[cfg(feature = "profiling")]
        {
            let mut profile = onestop::OneDuration::new(_name);
            let result = self.parse(input);
            profile.finish();
            self.profiler.add(profile);
            result
        }

        #[cfg(not(feature = "profiling"))]
        return self.parse(input);
    }
}

// ----------------------------
// *         TESTS
// ----------------------------
