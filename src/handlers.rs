//! Built-in handlers for `[code]` and `[youtube]`. Both are pure: no I/O, and bad attribute
//! values fall back to configured defaults instead of failing.

use std::sync::Arc;

use regex::Regex;

use crate::registry::{Attributes, Handler};

/// Settings for the `code` tag
#[derive(Clone, Debug)]
pub struct CodeConfig {
    /// Language label used when the tag has no `lang`/`language` attribute
    pub default_language: String,
    /// Drop one line break right after the opening tag and one right before the closing tag,
    /// so `[code]\n...\n[/code]` doesn't render blank lines
    pub trim_newlines: bool,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            default_language: String::from("text"),
            trim_newlines: true,
        }
    }
}

/// Settings for embedded videos
#[derive(Clone, Debug)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub allow_fullscreen: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 560,
            height: 315,
            allow_fullscreen: true,
        }
    }
}

/// `[code lang=cs]...[/code]`: escaped, preformatted code with a language label.
///
/// ```text
/// [code lang=rust]let x = 1 < 2;[/code]
/// ```
/// becomes
/// ```html
/// <pre class="code" data-lang="rust"><code class="language-rust">let x = 1 &lt; 2;</code></pre>
/// ```
pub struct CodeBlock {
    config: CodeConfig,
}

impl CodeBlock {
    pub fn new(config: CodeConfig) -> Self {
        Self { config }
    }
}

impl Handler for CodeBlock {
    fn process(&self, attributes: &Attributes<'_>, content: &str) -> String {
        let language = attributes
            .first_nonblank(&["lang", "language"])
            .map(str::trim)
            .unwrap_or(self.config.default_language.as_str());
        let language = html_escape::encode_double_quoted_attribute(language);
        let body = if self.config.trim_newlines {
            trim_one_newline(content)
        } else {
            content
        };
        format!(
            r#"<pre class="code" data-lang="{0}"><code class="language-{0}">{1}</code></pre>"#,
            language,
            html_escape::encode_text(body)
        )
    }
}

fn trim_one_newline(text: &str) -> &str {
    let text = text
        .strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text);
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// The patterns for pulling a video id out of a youtube url. Compiled once and shared by every
/// [`YouTube`] handler the registry builds.
pub struct YouTubePatterns {
    url: Regex,
    id: Regex,
}

impl YouTubePatterns {
    pub fn new() -> Result<Self, regex::Error> {
        //No unicode classes: the regex crate is built without them
        Ok(Self {
            url: Regex::new(
                r"^(?:https?://)?(?:(?:www\.|m\.)?youtube\.com/watch\?(?:[^#]*&)?v=|youtu\.be/)([A-Za-z0-9_-]+)",
            )?,
            id: Regex::new(r"^[A-Za-z0-9_-]+$")?,
        })
    }

    /// The video id in a `youtube.com/watch?v=ID` or `youtu.be/ID` url, if it's one of those
    pub fn video_id<'t>(&self, url: &'t str) -> Option<&'t str> {
        self.url
            .captures(url.trim())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    fn bare_id<'t>(&self, id: &'t str) -> Option<&'t str> {
        let id = id.trim();
        self.id.is_match(id).then_some(id)
    }
}

/// `[youtube url=...]`, `[youtube id=...]` or `[youtube]url[/youtube]`: an embedded player.
/// Urls we don't understand render as nothing.
///
/// Attributes:
/// - url / src: the video url (`watch?v=ID` or `youtu.be/ID` form)
/// - id: a bare video id, used when there's no url
/// - width / height: pixel size, falls back to [`VideoConfig`] if missing or not a number
/// - start: start time in seconds, ignored if not a number
pub struct YouTube {
    patterns: Arc<YouTubePatterns>,
    config: VideoConfig,
}

impl YouTube {
    pub fn new(patterns: Arc<YouTubePatterns>, config: VideoConfig) -> Self {
        Self { patterns, config }
    }

    /// The canonical embed url for a shortcode, if it has a usable video
    pub fn embed_url(&self, attributes: &Attributes<'_>, content: &str) -> Option<String> {
        let id = match attributes.first_nonblank(&["url", "src"]) {
            Some(url) => self.patterns.video_id(url),
            None => match attributes.first_nonblank(&["id"]) {
                Some(id) => self.patterns.bare_id(id),
                None => self.patterns.video_id(content),
            },
        }?;
        let mut url = format!("https://www.youtube.com/embed/{}", id);
        if let Some(start) = attributes.parsed::<u32>("start") {
            url.push_str(&format!("?start={}", start));
        }
        Some(url)
    }
}

impl Handler for YouTube {
    fn process(&self, attributes: &Attributes<'_>, content: &str) -> String {
        let Some(src) = self.embed_url(attributes, content) else {
            log::debug!("Unsupported youtube url in shortcode - rendering nothing");
            return String::new();
        };
        let width = attributes
            .parsed::<u32>("width")
            .filter(|w| *w > 0)
            .unwrap_or(self.config.width);
        let height = attributes
            .parsed::<u32>("height")
            .filter(|h| *h > 0)
            .unwrap_or(self.config.height);
        let fullscreen = if self.config.allow_fullscreen {
            " allowfullscreen"
        } else {
            ""
        };
        format!(
            r#"<iframe class="youtube" width="{}" height="{}" src="{}" frameborder="0"{}></iframe>"#,
            width, height, src, fullscreen
        )
    }
}
