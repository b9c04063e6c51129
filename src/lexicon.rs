use crate::error::{Error, Result};
use fst::Automaton;
use fst::automaton::Str;
use fst::{IntoStreamer, Map, Streamer};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

static BUILTIN_TSV: &str = include_str!("../data/lexicon.tsv");

static BUILTIN_LEXICON: Lazy<Lexicon> = Lazy::new(Lexicon::default);

/// Term to polite-replacement table, keyed by lowercase whole words.
///
/// Keys live in an in-memory fst map whose values index into `replacements`.
pub struct Lexicon {
    map: Map<Vec<u8>>,
    replacements: Vec<String>,
}

impl Lexicon {
    /// The table shipped with the crate.
    pub fn builtin() -> &'static Lexicon {
        &BUILTIN_LEXICON
    }

    /// Builds a lexicon from `(term, replacement)` pairs.
    ///
    /// Terms are lowercased; two terms equal after lowercasing are rejected.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut rows: BTreeMap<String, String> = BTreeMap::new();
        for (term, replacement) in pairs {
            let term = normalize_term(term.as_ref())?;
            let replacement = replacement.into().trim().to_string();
            if replacement.is_empty() {
                return Err(Error::lexicon(format!(
                    "term {term:?} has an empty replacement"
                )));
            }
            if rows.contains_key(&term) {
                return Err(Error::lexicon(format!("duplicate term {term:?}")));
            }
            rows.insert(term, replacement);
        }

        let mut replacements = Vec::with_capacity(rows.len());
        let mut keys = Vec::with_capacity(rows.len());
        for (idx, (term, replacement)) in rows.into_iter().enumerate() {
            keys.push((term, idx as u64));
            replacements.push(replacement);
        }
        let map = Map::from_iter(keys)
            .map_err(|err| Error::lexicon(format!("failed to index terms: {err}")))?;
        Ok(Self { map, replacements })
    }

    /// Parses `term<TAB>replacement` rows. Blank lines, `#` comments and a
    /// leading `term` header are skipped.
    pub fn from_tsv_str(text: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if idx == 0 && line.starts_with("term\t") {
                continue;
            }
            let (term, replacement) = line
                .split_once('\t')
                .ok_or_else(|| Error::lexicon(format!("missing tab on line {}", idx + 1)))?;
            pairs.push((term.to_string(), replacement.to_string()));
        }
        Self::from_pairs(pairs)
    }

    /// Parses a flat JSON object of `"term": "replacement"`.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let rows: BTreeMap<String, String> = serde_json::from_str(text)
            .map_err(|err| Error::lexicon(format!("malformed JSON lexicon: {err}")))?;
        Self::from_pairs(rows)
    }

    /// Loads a lexicon file; `.json` files are read as JSON, anything else as TSV.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_tsv_str(&text)
        }
    }

    /// Returns the replacement for a whole token, ignoring case.
    pub fn lookup(&self, token: &str) -> Option<&str> {
        let key = token.to_lowercase();
        self.map
            .get(key.as_bytes())
            .map(|idx| self.replacements[idx as usize].as_str())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.map.contains_key(token.to_lowercase().as_bytes())
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// All entries in lexicographic term order.
    pub fn entries(&self) -> Vec<(String, &str)> {
        self.prefix("", usize::MAX)
    }

    /// Returns up to `limit` entries whose term starts with `prefix`.
    pub fn prefix(&self, prefix: &str, limit: usize) -> Vec<(String, &str)> {
        let prefix = prefix.to_lowercase();
        let automaton = Str::new(&prefix).starts_with();
        let mut stream = self.map.search(automaton).into_stream();
        let mut results = Vec::new();
        while results.len() < limit {
            let Some((key, value)) = stream.next() else {
                break;
            };
            let term = String::from_utf8_lossy(key).into_owned();
            results.push((term, self.replacements[value as usize].as_str()));
        }
        results
    }
}

impl Default for Lexicon {
    /// An owned copy of the built-in table.
    fn default() -> Self {
        Self::from_tsv_str(BUILTIN_TSV).expect("valid built-in lexicon")
    }
}

impl std::fmt::Debug for Lexicon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lexicon")
            .field("terms", &self.len())
            .finish()
    }
}

fn normalize_term(term: &str) -> Result<String> {
    let term = term.trim();
    if term.is_empty() {
        return Err(Error::lexicon("empty term"));
    }
    if term.chars().any(char::is_whitespace) {
        return Err(Error::lexicon(format!(
            "term {term:?} contains whitespace and can never match a single word"
        )));
    }
    Ok(term.to_lowercase())
}
