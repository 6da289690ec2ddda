// build.rs

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::Path;

const LOCALES_DIR: &str = "locales";
const FALLBACK_LANG: &str = "en";

type Table = BTreeMap<String, String>;

fn main() {
    println!("cargo:rerun-if-env-changed=HERALD_LANG");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={}/", LOCALES_DIR);

    let lang = effective_language();
    println!("cargo:rustc-env=HERALD_LANG_EFFECTIVE={}", lang);

    let mut strings = read_table(FALLBACK_LANG)
        .unwrap_or_else(|e| panic!("The fallback locale must load: {}", e));

    if lang != FALLBACK_LANG {
        match read_table(&lang) {
            Ok(overrides) => merge(&mut strings, overrides, &lang),
            Err(e) => println!("cargo:warning={} Falling back to '{}'.", e, FALLBACK_LANG),
        }
    }

    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| panic!("Cargo did not set OUT_DIR"));
    fs::write(Path::new(&out_dir).join("translations.rs"), render_macro(&strings))
        .unwrap_or_else(|e| panic!("Could not write translations.rs: {}", e));
}

/// A `lang_*` feature wins over `HERALD_LANG`, which wins over English.
fn effective_language() -> String {
    let mut featured: Vec<String> = env::vars()
        .filter_map(|(key, _)| key.strip_prefix("CARGO_FEATURE_LANG_").map(str::to_lowercase))
        .collect();
    featured.sort();

    if let Some(first) = featured.first() {
        if featured.len() > 1 {
            println!(
                "cargo:warning=Several language features are enabled ({:?}); using '{}'.",
                featured, first
            );
        }
        return first.clone();
    }
    env::var("HERALD_LANG").unwrap_or_else(|_| FALLBACK_LANG.to_string())
}

fn read_table(lang: &str) -> Result<Table, String> {
    let path = format!("{}/{}.toml", LOCALES_DIR, lang);
    let content =
        fs::read_to_string(&path).map_err(|e| format!("Locale '{}' is unreadable: {}.", path, e))?;
    toml::from_str(&content).map_err(|e| format!("Locale '{}' is invalid: {}.", path, e))
}

/// Overlays `overrides` onto the fallback strings. A translation whose placeholders differ
/// from the fallback would break the `format!` call sites, so it is skipped.
fn merge(strings: &mut Table, overrides: Table, lang: &str) {
    for (key, text) in overrides {
        let Some(fallback) = strings.get(&key) else {
            println!("cargo:warning=[{}] Unknown key '{}' ignored.", lang, key);
            continue;
        };
        if placeholders(fallback) != placeholders(&text) {
            println!(
                "cargo:warning=[{}] '{}' does not use the placeholders {:?}; keeping English.",
                lang,
                key,
                placeholders(fallback)
            );
            continue;
        }
        strings.insert(key, text);
    }
}

/// Named `{placeholder}`s in `text`, ignoring `{{` escapes.
fn placeholders(text: &str) -> BTreeSet<&str> {
    let mut found = BTreeSet::new();
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        if let Some(escaped) = after.strip_prefix('{') {
            rest = escaped;
            continue;
        }
        let Some(close) = after.find('}') else {
            break;
        };
        found.insert(&after[..close]);
        rest = &after[close + 1..];
    }
    found
}

fn render_macro(strings: &Table) -> String {
    let mut code = String::from("#[macro_export]\nmacro_rules! t {\n");
    for (key, text) in strings {
        code.push_str(&format!("    ({:?}) => {{ {:?} }};\n", key, text));
    }
    // An unknown key fails the build instead of rendering an empty message.
    code.push_str(
        "    ($key:expr) => {{ compile_error!(concat!(\"Missing translation key: \", $key)) }};\n",
    );
    code.push_str("}\n");
    code
}
