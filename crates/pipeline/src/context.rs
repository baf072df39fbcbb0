//! Per-(call, target_lang) translation context (spec §4.3, glossary
//! "Context snippet").
//!
//! The External-Speech-API Client passes the tail of the previous
//! translation into the same target language as disambiguating context
//! for pronoun resolution. One `ContextStore` is shared across all
//! speakers and utterances of a call; keys are `(call_id, target_lang)`
//! because context doesn't cross languages.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::Language;

#[derive(Default)]
pub struct ContextStore {
    max_chars: usize,
    snippets: Arc<Mutex<HashMap<(String, String), String>>>,
}

impl ContextStore {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            snippets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The trailing snippet recorded for this call/target_lang pair, if any.
    pub fn get(&self, call_id: &str, target_lang: &Language) -> Option<String> {
        let key = (call_id.to_string(), target_lang.code().to_string());
        self.snippets.lock().get(&key).cloned()
    }

    /// Record `translated_text` as the new context, truncated to the
    /// configured tail length so it never grows unbounded across a long
    /// call.
    pub fn record(&self, call_id: &str, target_lang: &Language, translated_text: &str) {
        let key = (call_id.to_string(), target_lang.code().to_string());
        let snippet = tail_chars(translated_text, self.max_chars);
        self.snippets.lock().insert(key, snippet);
    }

    /// Drop all context for a call, on call end.
    pub fn clear_call(&self, call_id: &str) {
        self.snippets.lock().retain(|(cid, _), _| cid != call_id);
    }
}

fn tail_chars(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(char_count - max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_retrieves_per_language() {
        let store = ContextStore::new(150);
        let en = Language::from("en");
        let he = Language::from("he");

        assert!(store.get("call-1", &en).is_none());

        store.record("call-1", &en, "hello there");
        store.record("call-1", &he, "shalom");

        assert_eq!(store.get("call-1", &en).unwrap(), "hello there");
        assert_eq!(store.get("call-1", &he).unwrap(), "shalom");
    }

    #[test]
    fn truncates_to_max_chars() {
        let store = ContextStore::new(5);
        let en = Language::from("en");
        store.record("call-1", &en, "abcdefghij");
        assert_eq!(store.get("call-1", &en).unwrap(), "fghij");
    }

    #[test]
    fn clear_call_drops_all_languages_for_that_call() {
        let store = ContextStore::new(150);
        let en = Language::from("en");
        store.record("call-1", &en, "hi");
        store.record("call-2", &en, "bye");
        store.clear_call("call-1");
        assert!(store.get("call-1", &en).is_none());
        assert!(store.get("call-2", &en).is_some());
    }
}
