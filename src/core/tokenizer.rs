// EN: src/core/tokenizer.rs

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::ArgumentSpec;

lazy_static! {
    /// Triple-backtick, backtick, double and single quoted tokens, then bare words.
    static ref TOKEN_RE: Regex =
        Regex::new(r#"```([\s\S]*?)```|`([^`]*)`|"([^"]*)"|'([^']*)'|(\S+)"#).unwrap();
}

lazy_static! {
    static ref FLAG_RE: Regex = Regex::new(r"^(--?)([A-Za-z][\w-]*)(?:=(.*))?$").unwrap();
}

/// A `--key[=value]` or `-k[=value]` switch found in a command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub key: String,
    /// `None` when the flag was given without `=value`.
    pub value: Option<String>,
    pub is_short: bool,
    /// Number of positional tokens that preceded the flag.
    pub position: usize,
    /// Positional tokens, starting at `position`, that were split off this flag's quoted
    /// value.
    pub spilled: usize,
}

impl Flag {
    /// The flag's value, where a bare flag means `true`.
    pub fn value_or_true(&self) -> &str {
        self.value.as_deref().unwrap_or("true")
    }
}

/// The positional tokens and flags of one command string. Built fresh per message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawInvocation {
    pub tokens: Vec<String>,
    pub flags: Vec<Flag>,
}

/// Splits a raw command string into positional tokens and flags.
///
/// # Logic:
/// - Tokens are whitespace-delimited.
/// - A token wrapped in matching ```` ``` ````, `` ` ``, `"` or `'` is a single token with the
///   quotes stripped, and may contain whitespace.
/// - A bare token shaped like `--name`, `-n`, `--name=value` or `--name="quoted value"`
///   is a flag. Numbers such as `-13` stay positional.
pub fn tokenize(raw: &str) -> RawInvocation {
    let mut tokens = Vec::new();
    let mut flags: Vec<Flag> = Vec::new();
    // Byte offset where the last quoted flag value ends. Anything starting before it is a
    // word of that value and stays positional.
    let mut spill_end = 0;

    for caps in TOKEN_RE.captures_iter(raw) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() < spill_end {
            let word = (1..=5).find_map(|group| caps.get(group)).map_or("", |m| m.as_str());
            tokens.push(word.to_string());
            if let Some(owner) = flags.last_mut() {
                owner.spilled += 1;
            }
            continue;
        }

        if let Some(quoted) = (1..=4).find_map(|group| caps.get(group)) {
            tokens.push(quoted.as_str().to_string());
            continue;
        }
        let Some(bare) = caps.get(5) else {
            continue;
        };
        match parse_flag(raw, bare.start(), bare.as_str(), tokens.len()) {
            Some((flag, value_end)) => {
                if let Some(end) = value_end {
                    spill_end = end;
                }
                flags.push(flag);
            }
            None => tokens.push(bare.as_str().to_string()),
        }
    }

    log::trace!("Tokenized {:?} into {:?} / {:?}", raw, tokens, flags);
    RawInvocation { tokens, flags }
}

/// Parses a bare token as a flag. `token_start` is the token's byte offset in `raw`, used
/// to read quoted values that span whitespace.
///
/// Also returns the byte offset just past the closing quote when the value continued
/// beyond the token itself.
fn parse_flag(
    raw: &str,
    token_start: usize,
    token: &str,
    position: usize,
) -> Option<(Flag, Option<usize>)> {
    let caps = FLAG_RE.captures(token)?;
    let is_short = caps.get(1).map_or(0, |m| m.len()) == 1;
    let key = caps.get(2)?.as_str().to_string();

    let mut value_end = None;
    let value = caps.get(3).map(|m| {
        let value = m.as_str();
        match value.strip_prefix('"') {
            Some(rest) if !rest.is_empty() && rest.ends_with('"') => {
                rest[..rest.len() - 1].to_string()
            }
            Some(rest) => {
                let open = token_start + m.start() + 1;
                match raw[open..].find('"') {
                    Some(close) => {
                        value_end = Some(open + close + 1);
                        raw[open..open + close].to_string()
                    }
                    None => rest.to_string(),
                }
            }
            None => value.to_string(),
        }
    });

    let flag = Flag {
        key,
        value,
        is_short,
        position,
        spilled: 0,
    };
    Some((flag, value_end))
}

impl RawInvocation {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.flags.is_empty()
    }

    /// Finds a flag by key (long or short form).
    pub fn flag(&self, key: &str) -> Option<&Flag> {
        self.flags.iter().find(|flag| flag.key == key)
    }

    /// Collapses all positional tokens into one, for commands in single-argument mode.
    pub fn collapse(mut self) -> Self {
        if self.tokens.len() > 1 {
            self.tokens = vec![self.tokens.join(" ")];
            for flag in &mut self.flags {
                flag.position = flag.position.min(1);
                flag.spilled = 0;
            }
        }
        self
    }

    /// Maps the invocation onto a command's argument schema.
    ///
    /// Positional tokens fill slots in order. A flag whose key matches a schema entry's name
    /// (long form) or `flag_short` (short form) then overwrites the slot at that entry's
    /// *schema index*, clobbering whatever positional token was there.
    ///
    /// Known defect, kept for compatibility: a quoted flag value containing spaces also
    /// leaves its trailing words behind as positional tokens. To compensate, one token per
    /// extra word is popped off the *tail* of the slot list, which removes the wrong tokens
    /// whenever the flag was not the last thing on the line.
    pub fn slots(&self, schema: &[ArgumentSpec]) -> Vec<Option<String>> {
        let mut slots: Vec<Option<String>> = self.tokens.iter().cloned().map(Some).collect();

        for flag in &self.flags {
            let Some(index) = schema.iter().position(|spec| {
                if flag.is_short {
                    spec.flag_short.as_deref() == Some(flag.key.as_str())
                } else {
                    spec.name == flag.key
                }
            }) else {
                continue;
            };

            let value = flag.value_or_true().to_string();
            let extra_words = value.split_whitespace().count().saturating_sub(1);

            if slots.len() <= index {
                slots.resize(index + 1, None);
            }
            slots[index] = Some(value);

            for _ in 0..extra_words {
                if slots.len() > index + 1 {
                    slots.pop();
                }
            }
        }

        slots
    }

    /// Rebuilds a command string that tokenizes back to an equivalent invocation.
    ///
    /// Flags are written back where they appeared. Tokens spilled from a quoted flag value
    /// are not written; they reappear when the flag value is tokenized again.
    pub fn to_command_string(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.tokens.len() + self.flags.len());
        let mut skip_until = 0;

        for index in 0..=self.tokens.len() {
            for flag in self.flags.iter().filter(|flag| flag.position == index) {
                parts.push(render_flag(flag));
                skip_until = skip_until.max(index + flag.spilled);
            }
            match self.tokens.get(index) {
                Some(token) if index >= skip_until => parts.push(quote_token(token)),
                _ => {}
            }
        }

        parts.join(" ")
    }
}

fn render_flag(flag: &Flag) -> String {
    let dashes = if flag.is_short { "-" } else { "--" };
    match &flag.value {
        None => format!("{}{}", dashes, flag.key),
        Some(value) if value.is_empty() || value.contains(char::is_whitespace) => {
            format!("{}{}=\"{}\"", dashes, flag.key, value)
        }
        Some(value) => format!("{}{}={}", dashes, flag.key, value),
    }
}

/// Wraps a positional token in the first quote style it does not contain, when needed.
fn quote_token(token: &str) -> String {
    let needs_quotes = token.is_empty()
        || token.contains(char::is_whitespace)
        || token.starts_with(['"', '\'', '`'])
        || FLAG_RE.is_match(token);
    if !needs_quotes {
        return token.to_string();
    }

    if !token.contains('"') {
        format!("\"{}\"", token)
    } else if !token.contains('`') {
        format!("`{}`", token)
    } else {
        format!("```{}```", token)
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(key: &str, value: Option<&str>, is_short: bool, position: usize, spilled: usize) -> Flag {
        Flag {
            key: key.to_string(),
            value: value.map(str::to_string),
            is_short,
            position,
            spilled,
        }
    }

    #[test]
    fn test_tokenize_plain_words() {
        let invocation = tokenize("  kick   someone  now ");
        assert_eq!(invocation.tokens, vec!["kick", "someone", "now"]);
        assert!(invocation.flags.is_empty());
    }

    #[test]
    fn test_tokenize_quoted_tokens() {
        let invocation = tokenize(r#"say "hello world" 'single quoted' `tick tock`"#);
        assert_eq!(
            invocation.tokens,
            vec!["say", "hello world", "single quoted", "tick tock"]
        );
    }

    #[test]
    fn test_tokenize_code_block() {
        let invocation = tokenize("eval ```let x = 1;\nx + 1```");
        assert_eq!(invocation.tokens, vec!["eval", "let x = 1;\nx + 1"]);
    }

    #[test]
    fn test_tokenize_flags() {
        let invocation = tokenize(r#"ban 1234 --days=7 -s --reason="being rude" --dry-run"#);
        assert_eq!(invocation.tokens, vec!["ban", "1234", "rude\""]);
        assert_eq!(
            invocation.flags,
            vec![
                flag("days", Some("7"), false, 2, 0),
                flag("s", None, true, 2, 0),
                flag("reason", Some("being rude"), false, 2, 1),
                flag("dry-run", None, false, 3, 0),
            ]
        );
        assert_eq!(invocation.flag("s").unwrap().value_or_true(), "true");
    }

    #[test]
    fn test_negative_numbers_are_positional() {
        let invocation = tokenize("add 100 -13");
        assert_eq!(invocation.tokens, vec!["add", "100", "-13"]);
        assert!(invocation.flags.is_empty());
    }

    #[test]
    fn test_quoted_flag_value_without_spaces() {
        let invocation = tokenize(r#"--name="bob""#);
        assert!(invocation.tokens.is_empty());
        assert_eq!(invocation.flags, vec![flag("name", Some("bob"), false, 0, 0)]);
    }

    #[test]
    fn test_slots_flag_overwrites_by_schema_index() {
        // --- Setup ---
        let schema = vec![
            ArgumentSpec::required("target", "string"),
            ArgumentSpec::optional("count", "integer").with_flag("n"),
        ];

        // --- Execute ---
        let long = tokenize("alice --count=3").slots(&schema);
        let short = tokenize("alice -n=4").slots(&schema);
        let bare = tokenize("alice -n").slots(&schema);
        let clobbered = tokenize("alice bob --target=carol").slots(&schema);

        // --- Assert ---
        assert_eq!(long, vec![Some("alice".into()), Some("3".into())]);
        assert_eq!(short, vec![Some("alice".into()), Some("4".into())]);
        assert_eq!(bare, vec![Some("alice".into()), Some("true".into())]);
        assert_eq!(clobbered, vec![Some("carol".into()), Some("bob".into())]);
    }

    #[test]
    fn test_slots_flag_beyond_tokens_leaves_gap() {
        let schema = vec![
            ArgumentSpec::optional("first", "string"),
            ArgumentSpec::optional("second", "string"),
        ];
        let slots = tokenize("--second=x").slots(&schema);
        assert_eq!(slots, vec![None, Some("x".into())]);
    }

    #[test]
    fn test_slots_spaced_flag_value_pops_tail() {
        // The stray `bad"` lands in slot 1 and happens to be clobbered by the flag; the
        // tail pop then drops `tail`, a legitimate token.
        let schema = vec![
            ArgumentSpec::required("target", "string"),
            ArgumentSpec::optional("reason", "string"),
        ];
        let invocation = tokenize(r#"hello --reason="very bad" world tail"#);
        assert_eq!(invocation.tokens, vec!["hello", "bad\"", "world", "tail"]);

        let slots = invocation.slots(&schema);
        assert_eq!(
            slots,
            vec![
                Some("hello".into()),
                Some("very bad".into()),
                Some("world".into())
            ]
        );
    }

    #[test]
    fn test_spilled_words_stay_positional_and_are_not_rebuilt() {
        // --- Setup ---
        let first = tokenize(r#"ban bob --reason="very bad" now"#);

        // --- Execute ---
        let rebuilt = first.to_command_string();
        let second = tokenize(&rebuilt);

        // --- Assert ---
        assert_eq!(first.tokens, vec!["ban", "bob", "bad\"", "now"]);
        assert_eq!(first.flags, vec![flag("reason", Some("very bad"), false, 2, 1)]);
        assert_eq!(rebuilt, r#"ban bob --reason="very bad" now"#);
        assert_eq!(second, first);

        let schema = vec![
            ArgumentSpec::required("user", "string"),
            ArgumentSpec::optional("reason", "string"),
        ];
        assert_eq!(second.slots(&schema), first.slots(&schema));
    }

    #[test]
    fn test_flag_like_word_inside_quoted_value_is_positional() {
        let invocation = tokenize(r#"echo --msg="keep --this=flat" done"#);
        assert_eq!(invocation.tokens, vec!["echo", "--this=flat\"", "done"]);
        assert_eq!(
            invocation.flags,
            vec![flag("msg", Some("keep --this=flat"), false, 1, 1)]
        );
    }

    #[test]
    fn test_collapse_joins_tokens() {
        let invocation = tokenize("hello  there \"big world\" --loud").collapse();
        assert_eq!(invocation.tokens, vec!["hello there big world"]);
        assert_eq!(invocation.flags.len(), 1);
    }

    #[test]
    fn test_round_trip_reconstructs_equivalent_invocation() {
        let samples = [
            "plain words only",
            r#"say "hello world" --loud"#,
            r#"quote 'it has "double" quotes' -v=2"#,
            "code ```fn main() {}``` --lang=rust",
            r#"empty "" --name="""#,
            r#"literal "--not-a-flag" next"#,
            "mixed `back tick` -x --y=z 42 -13",
            r#"ban bob --reason="very bad" now"#,
            r#"note --title="a long title" --tag="x y" tail"#,
            r#"echo --msg="keep --this=flat" done"#,
        ];

        for sample in samples {
            let first = tokenize(sample);
            let rebuilt = first.to_command_string();
            let second = tokenize(&rebuilt);
            assert_eq!(first, second, "round trip failed for {:?} -> {:?}", sample, rebuilt);
        }
    }
}
