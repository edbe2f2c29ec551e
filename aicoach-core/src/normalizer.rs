use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

use crate::config::NarrationCfg;

/// Canonical speakable field.
pub const NARRATION_FIELD: &str = "fullText";
/// Marked-up (SSML) variant of the narration.
pub const MARKUP_FIELD: &str = "fullTextSsml";

/// Known narration containers, checked in order. When none is present the
/// root object is treated as the container.
pub const CONTAINER_FIELDS: [&str; 5] = [
    "realtimeAdvice",
    "preGameAnalysis",
    "liveAdvice",
    "postGameAnalysis",
    "analysis",
];

/// Component fields used to synthesize a missing narration. Each entry lists
/// candidate dotted paths, first non-empty wins.
const COMPONENTS: [&[&str]; 3] = [
    &["title"],
    &["mantra", "advice.mind"],
    &["focus", "technicalFocus", "advice.rift"],
];

/// Breaks at or above this pause become a full stop.
const LONG_PAUSE_MS: u64 = 500;

static BREAK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<break\b([^>]*)>"#).expect("valid regex")
});
static BREAK_STRENGTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)strength\s*=\s*["']?(x-strong|strong)"#).expect("valid regex")
});
static BREAK_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)time\s*=\s*["']?(\d+(?:\.\d+)?)\s*(ms|s)"#).expect("valid regex")
});
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</\s*(?:p|s)\s*>").expect("valid regex"));
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<>]+>").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([,;.!?])").expect("valid regex"));
static COMMA_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r",(?:\s*,)+").expect("valid regex"));
static COMMA_BEFORE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[,;]\s*)+([.!?])").expect("valid regex"));
static AFTER_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.!?])(?:\s*[.,;])+").expect("valid regex"));

/// Post-processes provider payloads so every narration container carries a
/// plain `fullText` a speech consumer can read as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    markup_supported: bool,
}

impl Normalizer {
    pub fn new(markup_supported: bool) -> Self {
        Self { markup_supported }
    }

    pub fn from_cfg(cfg: &NarrationCfg) -> Self {
        Self::new(cfg.markup_supported)
    }

    /// Normalize a structured result. Idempotent.
    pub fn normalize(&self, mut value: Value) -> Value {
        self.normalize_in_place(&mut value);
        value
    }

    fn normalize_in_place(&self, value: &mut Value) {
        match value {
            Value::Array(items) => items.iter_mut().for_each(|v| self.normalize_in_place(v)),
            Value::Object(root) => {
                let mut found = false;
                for name in CONTAINER_FIELDS {
                    match root.get_mut(name) {
                        Some(Value::Object(obj)) => {
                            found = true;
                            self.normalize_container(obj);
                        }
                        Some(Value::Array(items)) => {
                            found = true;
                            for item in items.iter_mut() {
                                if let Value::Object(obj) = item {
                                    self.normalize_container(obj);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                if !found {
                    self.normalize_container(root);
                }
            }
            _ => {}
        }
    }

    fn normalize_container(&self, obj: &mut Map<String, Value>) {
        let markup = non_empty_str(obj, MARKUP_FIELD).map(str::to_owned);
        let narration = non_empty_str(obj, NARRATION_FIELD).map(str::to_owned);

        if let Some(markup) = markup {
            if !self.markup_supported {
                obj.insert(NARRATION_FIELD.into(), Value::String(markup_to_plain(&markup)));
                return;
            }
            match &narration {
                None => {
                    obj.insert(NARRATION_FIELD.into(), Value::String(markup));
                    return;
                }
                // verbatim copy from an earlier pass
                Some(n) if *n == markup => return,
                Some(_) => {}
            }
        }

        if let Some(text) = narration {
            if ANY_TAG.is_match(&text) {
                obj.insert(NARRATION_FIELD.into(), Value::String(markup_to_plain(&text)));
            }
            return;
        }

        if let Some(text) = synthesize(obj) {
            obj.insert(NARRATION_FIELD.into(), Value::String(text));
        }
    }
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn lookup_path<'a>(obj: &'a Map<String, Value>, path: &str) -> Option<&'a str> {
    let mut parts = path.split('.');
    let mut cur = obj.get(parts.next()?)?;
    for p in parts {
        cur = cur.get(p)?;
    }
    cur.as_str()
}

/// Join the non-empty components as sentences: "A. B. C."
fn synthesize(obj: &Map<String, Value>) -> Option<String> {
    let parts: Vec<String> = COMPONENTS
        .iter()
        .filter_map(|paths| {
            paths
                .iter()
                .filter_map(|p| lookup_path(obj, p))
                .map(plain_component)
                .find(|s| !s.is_empty())
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("{}.", parts.join(". ")).nfc().collect())
}

fn plain_component(raw: &str) -> String {
    let text = if ANY_TAG.is_match(raw) {
        markup_to_plain(raw)
    } else {
        raw.to_string()
    };
    text.trim().trim_end_matches(['.', '!', '?']).trim().to_string()
}

/// Convert SSML-ish markup to speakable plain text: pauses become
/// punctuation, remaining tags are dropped, whitespace collapses and the
/// result ends in terminal punctuation.
pub fn markup_to_plain(markup: &str) -> String {
    let text = decode_entities(markup);
    let text = BREAK_TAG.replace_all(&text, |caps: &Captures<'_>| {
        if is_long_pause(&caps[1]) { ". " } else { ", " }
    });
    let text = SENTENCE_END.replace_all(&text, ". ");
    let mut text = ANY_TAG.replace_all(&text, " ").into_owned();
    // stripping "<a<b>>" leaves "<a >"
    while ANY_TAG.is_match(&text) {
        text = ANY_TAG.replace_all(&text, " ").into_owned();
    }
    let text = WHITESPACE.replace_all(&text, " ");
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");
    let text = COMMA_RUN.replace_all(&text, ",");
    let text = COMMA_BEFORE_END.replace_all(&text, "$1");
    let text = AFTER_END.replace_all(&text, "$1");

    let mut out: String = text
        .trim_start_matches([' ', ',', ';', '.'])
        .trim_end_matches([' ', ',', ';'])
        .nfc()
        .collect();
    if !out.is_empty() && !out.ends_with(['.', '!', '?', '…']) {
        out.push('.');
    }
    out
}

fn is_long_pause(attrs: &str) -> bool {
    if BREAK_STRENGTH.is_match(attrs) {
        return true;
    }
    BREAK_TIME.captures(attrs).is_some_and(|c| {
        let n: f64 = c[1].parse().unwrap_or(0.0);
        let ms = if c[2].eq_ignore_ascii_case("s") { n * 1000.0 } else { n };
        ms >= LONG_PAUSE_MS as f64
    })
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain() -> Normalizer {
        Normalizer::new(false)
    }

    #[test]
    fn synthesizes_from_components() {
        let out = plain().normalize(json!({
            "title": "Ventana de dragón",
            "mantra": "Paciencia.",
            "focus": "Controla el río!"
        }));
        assert_eq!(out["fullText"], "Ventana de dragón. Paciencia. Controla el río.");
    }

    #[test]
    fn synthesis_skips_empty_and_reads_nested_advice() {
        let out = plain().normalize(json!({
            "preGameAnalysis": {
                "title": "  ",
                "advice": {"mind": "Golpea primero", "rift": "Visión en el río"}
            }
        }));
        assert_eq!(
            out["preGameAnalysis"]["fullText"],
            "Golpea primero. Visión en el río."
        );
    }

    #[test]
    fn synthesized_components_are_tag_free() {
        let out = plain().normalize(json!({
            "title": "<b>Dragón</b>",
            "mantra": "Calma<break time=\"1s\"/>",
            "focus": "<speak></speak>",
            "technicalFocus": "Visión"
        }));
        assert_eq!(out["fullText"], "Dragón. Calma. Visión.");
    }

    #[test]
    fn nested_tag_fragments_are_fully_stripped() {
        assert_eq!(markup_to_plain("<a<b>>ya"), "ya.");
    }

    #[test]
    fn nothing_to_synthesize_leaves_object_alone() {
        let input = json!({"priorityAction": "WAIT"});
        assert_eq!(plain().normalize(input.clone()), input);
    }

    #[test]
    fn markup_is_flattened_when_unsupported() {
        let out = plain().normalize(json!({
            "realtimeAdvice": {
                "fullText": "old",
                "fullTextSsml": "<speak>Retrocede <break time=\"300ms\"/> <emphasis>ahora</emphasis></speak>"
            }
        }));
        assert_eq!(out["realtimeAdvice"]["fullText"], "Retrocede, ahora.");
        // markup variant is kept for consumers that want it
        assert!(out["realtimeAdvice"]["fullTextSsml"].as_str().unwrap().contains("<break"));
    }

    #[test]
    fn long_and_strong_breaks_become_full_stops() {
        assert_eq!(
            markup_to_plain("Uno<break time=\"1s\"/>dos<break strength=\"strong\"/>tres"),
            "Uno. dos. tres."
        );
        assert_eq!(markup_to_plain("<p>Farmea</p><p>Luego empuja</p>"), "Farmea. Luego empuja.");
    }

    #[test]
    fn tags_in_plain_field_are_stripped() {
        let out = plain().normalize(json!({
            "fullText": "Agrupa en mid <break/> <prosody rate=\"fast\">ya</prosody>"
        }));
        let text = out["fullText"].as_str().unwrap();
        assert_eq!(text, "Agrupa en mid, ya.");
        assert!(!text.contains('<'));
    }

    #[test]
    fn supported_markup_is_copied_verbatim() {
        let ssml = "<speak>Retrocede<break time=\"200ms\"/>ya</speak>";
        let n = Normalizer::new(true);
        let once = n.normalize(json!({"liveAdvice": {"fullTextSsml": ssml}}));
        assert_eq!(once["liveAdvice"]["fullText"], ssml);
        assert_eq!(n.normalize(once.clone()), once);
    }

    #[test]
    fn every_present_container_is_normalized() {
        let out = plain().normalize(json!({
            "realtimeAdvice": {"title": "A"},
            "analysis": [{"mantra": "B"}, {"fullText": "<b>C</b>"}]
        }));
        assert_eq!(out["realtimeAdvice"]["fullText"], "A.");
        assert_eq!(out["analysis"][0]["fullText"], "B.");
        assert_eq!(out["analysis"][1]["fullText"], "C.");
        assert!(out.get("fullText").is_none());
    }

    #[test]
    fn arrays_are_normalized_per_element() {
        let out = plain().normalize(json!([{"title": "Uno"}, 3, {"fullText": "Dos"}]));
        assert_eq!(out, json!([{"title": "Uno", "fullText": "Uno."}, 3, {"fullText": "Dos"}]));
    }

    #[test]
    fn entities_are_decoded_once() {
        assert_eq!(markup_to_plain("Tom &amp; Jerry"), "Tom & Jerry.");
        assert_eq!(markup_to_plain("a &amp;lt;b&amp;gt; c"), "a &lt;b&gt; c.");
    }

    #[test]
    fn punctuation_runs_are_cleaned() {
        assert_eq!(markup_to_plain("Hola , , <break/> . mundo"), "Hola. mundo.");
        assert_eq!(markup_to_plain("<break/>Inicio"), "Inicio.");
        assert_eq!(markup_to_plain("<speak></speak>"), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            json!({"fullTextSsml": "<speak>Hola<break time=\"600ms\"/>mundo &amp; más</speak>"}),
            json!({"realtimeAdvice": {"fullText": "Ve <s>ya</s> , , ."}}),
            json!({"title": "T!", "technicalFocus": "F"}),
            json!([{"postGameAnalysis": {"mantra": "M", "fullText": ""}}]),
            json!({"fullText": "a &amp;lt;b&amp;gt; <i>c</i>"}),
            json!({"title": "<b>Dragón</b>", "mantra": "Calma"}),
            json!({"liveAdvice": {"focus": "<a<b>>x</b>"}}),
        ];
        for markup_supported in [false, true] {
            let n = Normalizer::new(markup_supported);
            for input in &inputs {
                let once = n.normalize(input.clone());
                let twice = n.normalize(once.clone());
                assert_eq!(once, twice, "not idempotent for {input}");
            }
        }
    }
}
