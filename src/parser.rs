//! The scanner. One forward pass over the text, driven by a small state machine:
//!
//! - Scanning: skip ordinary text up to the next `[`
//! - OpenTag: read the tag name, bail out if it isn't registered
//! - ParsingAttributes: `name`, `name=value`, `name='quoted value'`, repeated
//! - LookingForClosingTag: find the first literal `[/name]` (no nesting!)
//!
//! A candidate that doesn't work out is abandoned and the `[` becomes plain text. Candidates are
//! scanned with a cloned lookahead cursor, so the main cursor only ever moves forward: either past
//! a finished match or one character past an abandoned `[`.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use crate::cursor::Cursor;
use crate::registry::{Attributes, Registry};

/// A complete shortcode found in the source. Everything borrows from the source text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match<'a> {
    /// Tag name, exactly as registered
    pub name: &'a str,
    /// Offset of the opening `[`
    pub begin: usize,
    /// Offset just past the final `]` (of the closing tag, if there is one)
    pub end: usize,
    pub attributes: Attributes<'a>,
    /// True for `[tag/]`, `[tag a=1/]` and attribute tags with no closing tag
    pub self_closing: bool,
    /// Text between the opening and closing tag, verbatim. Empty when self closing
    pub content: &'a str,
}

impl Match<'_> {
    pub fn span(&self) -> Range<usize> {
        self.begin..self.end
    }
}

/// A shortcode whose name has been recognized but which hasn't closed yet
#[derive(Debug)]
struct PendingTag<'a> {
    name: &'a str,
    begin: usize,
    attributes: Attributes<'a>,
    seen: HashSet<&'a str>,
}

impl<'a> PendingTag<'a> {
    fn new(name: &'a str, begin: usize) -> Self {
        Self {
            name,
            begin,
            attributes: Attributes::new(),
            seen: HashSet::new(),
        }
    }

    /// First occurrence of a name wins
    fn add_attribute(&mut self, name: &'a str, value: &'a str) {
        if self.seen.insert(name) {
            self.attributes.push(name, value);
        }
    }

    fn self_closed(self, end: usize) -> Match<'a> {
        Match {
            name: self.name,
            begin: self.begin,
            end,
            attributes: self.attributes,
            self_closing: true,
            content: "",
        }
    }

    fn closed(self, content: &'a str, end: usize) -> Match<'a> {
        Match {
            name: self.name,
            begin: self.begin,
            end,
            attributes: self.attributes,
            self_closing: false,
            content,
        }
    }
}

enum State<'a> {
    Scanning,
    OpenTag { begin: usize },
    ParsingAttributes(PendingTag<'a>),
    /// `required` is false for tags that already have attributes: those fall back to self
    /// closing when no closing tag exists
    LookingForClosingTag { pending: PendingTag<'a>, required: bool },
    /// Transition: hand out a match and resume scanning after it
    Matched(Match<'a>),
    /// Transition: the `[` at the main cursor is plain text after all
    Rejected,
}

/// The two quote families. Opening and closing smart quotes differ, but any member of the
/// family that opened a value closes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum QuoteFamily {
    Single,
    Double,
}

impl QuoteFamily {
    fn of(ch: char) -> Option<Self> {
        match ch {
            '\'' | '‘' | '’' => Some(Self::Single),
            '"' | '“' | '”' => Some(Self::Double),
            _ => None,
        }
    }
}

/// The different kinds of character runs the scanner reads, identified by what ends them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Run {
    TagName,
    AttributeName,
    UnquotedValue,
    QuotedValue(QuoteFamily),
}

impl Run {
    fn stops_at(self, ch: char) -> bool {
        match self {
            //A registered name can't contain '[', so stopping there changes nothing except
            //keeping `[code[code[code...` from reading (and hashing) giant names
            Run::TagName => ch.is_whitespace() || matches!(ch, '/' | ']' | '['),
            //'[' can only appear inside quotes, anywhere else it ends the candidate
            Run::AttributeName => ch.is_whitespace() || matches!(ch, '=' | ']' | '/' | '['),
            Run::UnquotedValue => ch.is_whitespace() || matches!(ch, ']' | '['),
            Run::QuotedValue(family) => QuoteFamily::of(ch) == Some(family),
        }
    }
}

fn is_attribute_start(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Remembers lookahead results for the current parse. Abandoned candidates can overlap (think
/// `[code[code[code...` or a thousand `[code]` with no `[/code]`), and without this every one of
/// them would rescan to the end of the text.
#[derive(Default)]
struct Lookahead<'a> {
    /// Per run kind: scanning from `.0` first hits a stop character at `.1` (or the end)
    runs: HashMap<Run, (usize, usize)>,
    /// Per tag name: searching from `.0`, the first `[/name]` starts at `.1`
    closing: HashMap<&'a str, (usize, Option<usize>)>,
    /// Offsets of attributes whose attribute list ended in a rejection. Parsing the rest of a
    /// tag only depends on where it starts, so any candidate that gets here fails the same way.
    rejected_attributes: HashSet<usize>,
}

impl<'a> Lookahead<'a> {
    /// Offset where `run` ends when started at the cursor
    fn run_end(&mut self, cursor: &Cursor<'a>, run: Run) -> usize {
        let from = cursor.pos();
        let stop = |c: char| run.stops_at(c);
        let end = match self.runs.get(&run) {
            Some(&(start, end)) if start <= from && from <= end => end,
            //Only the stretch before the known scan is new
            Some(&(start, end)) if from < start => cursor.find_char_before(start, stop).unwrap_or(end),
            _ => cursor.find_char(stop).unwrap_or(cursor.len()),
        };
        self.runs.insert(run, (from, end));
        end
    }

    /// Consume a run, returning its text
    fn take_run(&mut self, cursor: &mut Cursor<'a>, run: Run) -> &'a str {
        let end = self.run_end(cursor, run);
        cursor.take_to(end)
    }

    /// Read a quoted or unquoted value. None means a quote was opened and never closed.
    fn attribute_value(&mut self, look: &mut Cursor<'a>) -> Option<&'a str> {
        if let Some(family) = look.peek().and_then(QuoteFamily::of) {
            look.bump();
            let end = self.run_end(look, Run::QuotedValue(family));
            if end >= look.len() {
                return None;
            }
            let value = look.take_to(end);
            look.bump();
            return Some(value);
        }

        let end = self.run_end(look, Run::UnquotedValue);
        let mut value = look.slice(look.pos(), end);
        //In `a=b/]` the slash closes the tag, it isn't part of the value
        if value.ends_with('/') && look.slice(end, end + 1) == "]" {
            value = &value[..value.len() - 1];
        }
        look.seek(look.pos() + value.len());
        Some(value)
    }

    /// Offset of the first `[/name]` at or after the cursor
    fn closing_tag(&mut self, cursor: &Cursor<'a>, name: &'a str) -> Option<usize> {
        let from = cursor.pos();
        if let Some(&(start, found)) = self.closing.get(name) {
            let covered = match found {
                Some(at) => start <= from && from <= at,
                None => start <= from,
            };
            if covered {
                return found;
            }
        }
        let found = cursor.find(&format!("[/{}]", name));
        self.closing.insert(name, (from, found));
        found
    }
}

/// Lazily finds every shortcode in a text. Created by [`matches`] (or
/// [`Shortcodes::matches`](crate::Shortcodes::matches)).
pub struct Matches<'r, 'a> {
    registry: &'r Registry,
    cursor: Cursor<'a>,
    /// The current candidate is always scanned with this, never with the main cursor
    look: Cursor<'a>,
    lookahead: Lookahead<'a>,
}

/// Iterate over the shortcodes in `input` that `registry` knows about, in source order
pub fn matches<'r, 'a>(registry: &'r Registry, input: &'a str) -> Matches<'r, 'a> {
    Matches {
        registry,
        cursor: Cursor::new(input),
        look: Cursor::new(input),
        lookahead: Lookahead::default(),
    }
}

impl<'a> Iterator for Matches<'_, 'a> {
    type Item = Match<'a>;

    fn next(&mut self) -> Option<Match<'a>> {
        let mut state = State::Scanning;

        loop {
            state = match state {
                State::Scanning => {
                    self.cursor.advance_until(|c| c == '[');
                    if self.cursor.at_end() {
                        return None;
                    }
                    self.look = self.cursor.clone();
                    self.look.expect('[');
                    State::OpenTag {
                        begin: self.cursor.pos(),
                    }
                }
                State::OpenTag { begin } => self.open_tag(begin),
                State::ParsingAttributes(pending) => self.parse_attributes(pending),
                State::LookingForClosingTag { pending, required } => self.closing_tag(pending, required),
                State::Matched(found) => {
                    self.cursor.seek(found.end);
                    return Some(found);
                }
                State::Rejected => {
                    self.cursor.expect('[');
                    State::Scanning
                }
            };
        }
    }
}

impl<'a> Matches<'_, 'a> {
    fn open_tag(&mut self, begin: usize) -> State<'a> {
        let look = &mut self.look;
        let name = self.lookahead.take_run(look, Run::TagName);
        if !self.registry.exists(name) {
            log::trace!("Unknown shortcode '{}' at {} - leaving unaltered", name, begin);
            return State::Rejected;
        }

        let pending = PendingTag::new(name, begin);
        look.skip_whitespace();
        match look.peek() {
            Some(']') => {
                look.expect(']');
                State::LookingForClosingTag {
                    pending,
                    required: true,
                }
            }
            Some('/') => Self::self_close(look, pending),
            Some(c) if is_attribute_start(c) => State::ParsingAttributes(pending),
            _ => {
                log::trace!("Malformed shortcode '{}' at {} - leaving unaltered", name, begin);
                State::Rejected
            }
        }
    }

    fn parse_attributes(&mut self, pending: PendingTag<'a>) -> State<'a> {
        let mut visited = Vec::new();
        let state = self.read_attributes(pending, &mut visited);
        if let State::Rejected = state {
            self.lookahead.rejected_attributes.extend(visited);
        }
        state
    }

    /// Pushes the offset of every attribute it starts reading onto `visited`
    fn read_attributes(&mut self, mut pending: PendingTag<'a>, visited: &mut Vec<usize>) -> State<'a> {
        let look = &mut self.look;
        let lookahead = &mut self.lookahead;
        loop {
            if lookahead.rejected_attributes.contains(&look.pos()) {
                log::trace!(
                    "Attributes of shortcode '{}' at {} already failed once - leaving unaltered",
                    pending.name,
                    pending.begin
                );
                return State::Rejected;
            }
            visited.push(look.pos());

            let name = lookahead.take_run(look, Run::AttributeName);
            look.skip_whitespace();
            let value = if look.expect('=') {
                look.skip_whitespace();
                match lookahead.attribute_value(look) {
                    Some(value) => value,
                    None => {
                        log::trace!(
                            "Unterminated value for '{}' in shortcode '{}' at {} - leaving unaltered",
                            name,
                            pending.name,
                            pending.begin
                        );
                        return State::Rejected;
                    }
                }
            } else {
                ""
            };
            pending.add_attribute(name, value);

            look.skip_whitespace();
            match look.peek() {
                Some(c) if is_attribute_start(c) => continue,
                Some('/') => return Self::self_close(look, pending),
                Some(']') => {
                    look.expect(']');
                    return State::LookingForClosingTag {
                        pending,
                        required: false,
                    };
                }
                _ => {
                    log::trace!(
                        "Malformed attributes in shortcode '{}' at {} - leaving unaltered",
                        pending.name,
                        pending.begin
                    );
                    return State::Rejected;
                }
            }
        }
    }

    /// Expects `/]` at the cursor
    fn self_close(look: &mut Cursor<'a>, pending: PendingTag<'a>) -> State<'a> {
        if look.expect('/') && look.expect(']') {
            State::Matched(pending.self_closed(look.pos()))
        } else {
            log::trace!(
                "Stray '/' in shortcode '{}' at {} - leaving unaltered",
                pending.name,
                pending.begin
            );
            State::Rejected
        }
    }

    /// The first `[/name]` wins, even if another `[name]` opened in between
    fn closing_tag(&mut self, pending: PendingTag<'a>, required: bool) -> State<'a> {
        let look = &self.look;
        let open_end = look.pos();
        match self.lookahead.closing_tag(look, pending.name) {
            Some(at) => {
                let content = look.slice(open_end, at);
                let end = at + pending.name.len() + 3;
                State::Matched(pending.closed(content, end))
            }
            None if required => {
                log::trace!(
                    "No closing tag for shortcode '{}' at {} - leaving unaltered",
                    pending.name,
                    pending.begin
                );
                State::Rejected
            }
            None => State::Matched(pending.self_closed(open_end)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_fn("tag", |_a, c| c.to_string()).unwrap();
        registry.register_fn("code", |_a, c| c.to_string()).unwrap();
        registry
    }

    fn find<'a>(registry: &Registry, input: &'a str) -> Vec<Match<'a>> {
        matches(registry, input).collect()
    }

    fn attrs<'a>(m: &Match<'a>) -> Vec<(&'a str, &'a str)> {
        m.attributes.iter().collect()
    }

    #[test]
    fn offsets_and_kinds() {
        let registry = registry();
        let found = find(&registry, "ab [tag x=1/] [tag]y[/tag]");
        assert_eq!(found.len(), 2);

        assert_eq!(found[0].name, "tag");
        assert_eq!(found[0].span(), 3..13);
        assert!(found[0].self_closing);
        assert_eq!(found[0].content, "");
        assert_eq!(attrs(&found[0]), vec![("x", "1")]);

        assert_eq!(found[1].span(), 14..26);
        assert!(!found[1].self_closing);
        assert_eq!(found[1].content, "y");
        assert!(found[1].attributes.is_empty());
    }

    #[test]
    fn attribute_order_kept() {
        let registry = registry();
        let found = find(&registry, "[tag z=26 a=1 m=13/]");
        assert_eq!(attrs(&found[0]), vec![("z", "26"), ("a", "1"), ("m", "13")]);
    }

    #[test]
    fn quote_families() {
        let registry = registry();
        for input in [
            "[tag v='x']",
            "[tag v=\"x\"]",
            "[tag v=‘x’]",
            "[tag v=“x”]",
            "[tag v=“x\"]",
            "[tag v='x’]",
        ] {
            let found = find(&registry, input);
            assert_eq!(found.len(), 1, "{input}");
            assert_eq!(found[0].attributes.get("v"), Some("x"), "{input}");
            assert_eq!(found[0].end, input.len(), "{input}");
        }
    }

    #[test]
    fn other_family_does_not_close() {
        let registry = registry();
        let found = find(&registry, "[tag v=\"it's\" w='say “hi”'/]");
        assert_eq!(attrs(&found[0]), vec![("v", "it's"), ("w", "say “hi”")]);
    }

    #[test]
    fn quoted_value_keeps_brackets_and_spaces() {
        let registry = registry();
        let found = find(&registry, "[tag title=\"a [b] /] c\"/]");
        assert_eq!(found[0].attributes.get("title"), Some("a [b] /] c"));
    }

    #[test]
    fn unquoted_stops_at_space() {
        let registry = registry();
        let found = find(&registry, "[tag v=foo bar=baz]");
        assert_eq!(attrs(&found[0]), vec![("v", "foo"), ("bar", "baz")]);
    }

    #[test]
    fn unquoted_slash_values() {
        let registry = registry();
        let found = find(&registry, "[tag url=https://youtu.be/abc/]");
        assert_eq!(found[0].attributes.get("url"), Some("https://youtu.be/abc"));
        assert!(found[0].self_closing);

        let found = find(&registry, "[tag url=https://youtu.be/abc]");
        assert_eq!(found[0].attributes.get("url"), Some("https://youtu.be/abc"));
    }

    #[test]
    fn flags_and_spacing() {
        let registry = registry();
        let found = find(&registry, "[tag  flag   a = 1  b=   2 /]");
        assert_eq!(attrs(&found[0]), vec![("flag", ""), ("a", "1"), ("b", "2")]);
    }

    #[test]
    fn empty_values() {
        let registry = registry();
        let found = find(&registry, "[tag a= b=''/]");
        //`a= b=''` reads as a = "b=''" since whitespace after '=' is skipped
        assert_eq!(attrs(&found[0]), vec![("a", "b=''")]);

        let found = find(&registry, "[tag a=]");
        assert_eq!(attrs(&found[0]), vec![("a", "")]);

        let found = find(&registry, "[tag a=\"\"/]");
        assert_eq!(attrs(&found[0]), vec![("a", "")]);
    }

    #[test]
    fn attribute_tag_with_content() {
        let registry = registry();
        let found = find(&registry, "[code lang=cs]var x = 1;[/code]");
        assert_eq!(found[0].attributes.get("lang"), Some("cs"));
        assert_eq!(found[0].content, "var x = 1;");
        assert!(!found[0].self_closing);
    }

    #[test]
    fn attribute_tag_without_closing_is_self_closed() {
        let registry = registry();
        let input = "[tag a=1] and more";
        let found = find(&registry, input);
        assert_eq!(found[0].span(), 0..9);
        assert!(found[0].self_closing);
    }

    #[test]
    fn closing_is_greedy() {
        let registry = registry();
        let found = find(&registry, "[tag]a[tag]b[/tag]c[/tag]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "a[tag]b");
        assert_eq!(found[0].end, 18);
    }

    #[test]
    fn nested_brackets_in_content_are_verbatim() {
        let registry = registry();
        let found = find(&registry, "[code]if (a[0]) { b[1] = [/x]; }[/code]");
        assert_eq!(found[0].content, "if (a[0]) { b[1] = [/x]; }");
    }

    #[test]
    fn rejected_candidates() {
        let registry = registry();
        for input in [
            "",
            "[",
            "[]",
            "[/]",
            "[tag",
            "[tag]",
            "[tag]unterminated",
            "[tag/",
            "[tag/x]",
            "[tag !]x[/tag]",
            "[tag a=1",
            "[tag a='1]",
            "[tag a=1 \"b\"]",
            "[TAG]x[/TAG]",
            "[tagx]x[/tagx]",
            "[ tag/]",
            "[/tag]",
        ] {
            assert!(find(&registry, input).is_empty(), "{input:?}");
        }
    }

    #[test]
    fn restart_after_rejection() {
        let registry = registry();
        let found = find(&registry, "[[tag/]]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].span(), 1..7);

        //The broken first tag doesn't eat the good one
        let found = find(&registry, "[tag a='oops] [tag b=2/]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].begin, 14);

        let found = find(&registry, "[tag]x [tag a=1/]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].begin, 7);
    }

    #[test]
    fn tag_name_touching_bracket() {
        let registry = registry();
        //A name followed straight by '[' is malformed, so restart at the inner bracket
        let found = find(&registry, "[tag[tag/]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].begin, 4);
    }

    #[test]
    fn multibyte_offsets() {
        let registry = registry();
        let input = "💙 [tag v=“ünï”/] ok";
        let found = find(&registry, input);
        assert_eq!(found[0].attributes.get("v"), Some("ünï"));
        assert_eq!(&input[found[0].span()], "[tag v=“ünï”/]");
    }

    #[test]
    fn brackets_outside_quotes_end_the_candidate() {
        let registry = registry();
        assert!(find(&registry, "[tag a=x[y]").is_empty());
        assert!(find(&registry, "[tag a=x[y]z[/tag]").is_empty());

        let found = find(&registry, "[tag a=x[tag b=1/]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].begin, 8);
        assert_eq!(attrs(&found[0]), vec![("b", "1")]);

        let found = find(&registry, "[tag a[tag/]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].begin, 6);
    }

    #[test]
    fn duplicate_attributes_first_wins() {
        let registry = registry();
        let found = find(&registry, "[tag a=1 b=2 a=3 a/]");
        assert_eq!(attrs(&found[0]), vec![("a", "1"), ("b", "2")]);
    }

    #[test]
    fn many_attributes() {
        let registry = registry();
        let list: Vec<String> = (0..20_000).map(|i| format!("a{i}={i}")).collect();
        let input = format!("[tag {}/]", list.join(" "));
        let found = find(&registry, &input);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attributes.len(), 20_000);
        assert_eq!(found[0].attributes.get("a19999"), Some("19999"));
    }

    #[test]
    fn rejected_attribute_lists_are_remembered() {
        let registry = registry();
        //The inner candidate lines up with the outer one at `c=1`, both fail at the `!`
        let input = format!("[tag a='[tag b=x' {}!]", "c=1 ".repeat(1_000));
        assert!(find(&registry, &input).is_empty());

        //Same text at a different offset is parsed on its own
        let found = find(&registry, "[tag a='[tag b=x' c=1 !] [tag b=x c=1/]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].begin, 25);
        assert_eq!(attrs(&found[0]), vec![("b", "x"), ("c", "1")]);
    }

    /// Time to scan `unit` repeated `count` times. None of these inputs contain a shortcode
    fn scan_time(registry: &Registry, unit: &str, count: usize) -> Duration {
        let input = unit.repeat(count);
        let start = Instant::now();
        let found = find(registry, &input);
        let elapsed = start.elapsed();
        assert!(found.is_empty(), "{unit:?}");
        elapsed
    }

    fn assert_linear(registry: &Registry, unit: &str) {
        let small = scan_time(registry, unit, 5_000);
        let large = scan_time(registry, unit, 20_000);
        //4x the input: linear is about 4x the time, quadratic about 16x
        assert!(
            large <= small * 10 + Duration::from_millis(50),
            "{unit:?}: {small:?} for 5000, {large:?} for 20000"
        );
    }

    #[test]
    fn many_unclosed_tags_stay_linear() {
        let registry = registry();
        for unit in [
            "[tag]",
            "[tag v='x ",
            "[tag v=x",
            "[tag a",
            "[tag a='b' ",
            "[tag a=\"[tag b=\" c ",
            "[code",
            "[",
        ] {
            assert_linear(&registry, unit);
        }

        let input = "[tag v=x".repeat(50_000);
        assert!(find(&registry, &input).is_empty());
    }

    #[test]
    fn many_matches() {
        let registry = registry();
        let input = "x [tag a=1/] y [tag]z[/tag] ".repeat(1_000);
        let found = find(&registry, &input);
        assert_eq!(found.len(), 2_000);
        assert!(found.windows(2).all(|w| w[0].end <= w[1].begin));
    }
}
