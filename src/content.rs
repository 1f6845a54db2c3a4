use pulldown_cmark::{Event, Parser};
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;
use whatlang::Lang;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("language detection failed: text too short or ambiguous")]
    LanguageDetection,
}

/// Resolve a configured language code to a whatlang language. Accepts the
/// detector's own ISO 639-3 codes plus the common two-letter forms.
pub fn parse_language(code: &str) -> Option<Lang> {
    let code = code.trim().to_ascii_lowercase();
    Lang::from_code(code.as_str()).or_else(|| match code.as_str() {
        "it" => Some(Lang::Ita),
        "en" => Some(Lang::Eng),
        "es" => Some(Lang::Spa),
        "fr" => Some(Lang::Fra),
        "de" => Some(Lang::Deu),
        "pt" => Some(Lang::Por),
        "nl" => Some(Lang::Nld),
        _ => None,
    })
}

/// Markdown-aware word counting and bilingual detection for post bodies.
pub struct ContentAnalyzer {
    target: Lang,
    image_re: Regex,
    link_re: Regex,
    word_re: Regex,
    tag_re: Regex,
}

impl ContentAnalyzer {
    pub fn new(target: Lang) -> Self {
        Self {
            target,
            image_re: Regex::new(r"!\[.*?\]\(.*?\)").expect("static pattern"),
            link_re: Regex::new(r"\[(.*?)\]\(.*?\)").expect("static pattern"),
            word_re: Regex::new(r"\b\w+\b").expect("static pattern"),
            tag_re: Regex::new(r"<[^>]+>").expect("static pattern"),
        }
    }

    /// Remove image embeds and collapse hyperlinks to their visible label.
    /// Everything else passes through unmodified.
    pub fn strip_markup(&self, text: &str) -> String {
        let without_images = self.image_re.replace_all(text, "");
        self.link_re.replace_all(&without_images, "$1").into_owned()
    }

    /// Render markdown to its plain-text content: headings, emphasis and
    /// lists resolve to their text, HTML tags are discarded but the text
    /// they wrap survives.
    fn to_plain_text(&self, markdown: &str) -> String {
        let mut plain = String::with_capacity(markdown.len());
        for event in Parser::new(markdown) {
            match event {
                Event::Text(text) | Event::Code(text) => {
                    plain.push_str(&text);
                    plain.push(' ');
                }
                Event::Html(html) => {
                    plain.push_str(&self.tag_re.replace_all(&html, " "));
                    plain.push(' ');
                }
                Event::SoftBreak | Event::HardBreak => plain.push(' '),
                _ => {}
            }
        }
        plain
    }

    /// Count word tokens (alphanumeric runs, Unicode-aware) in the rendered
    /// plain text of `text`.
    pub fn word_count(&self, text: &str) -> usize {
        let plain = self.to_plain_text(&self.strip_markup(text));
        self.word_re.find_iter(&plain).count()
    }

    /// Classify how many languages a text carries.
    ///
    /// Statistical detection reports only the dominant language per pass, so
    /// a bilingual body can pass a single full-text check. The full text and
    /// both halves (character-offset split) are probed; when the resulting
    /// language set contains the target language next to at least one other,
    /// the text is bilingual (multiplicity 2). Otherwise the multiplicity is
    /// the number of distinct languages seen.
    ///
    /// Fails when detection on the full text cannot produce an answer at
    /// all; failures on the half probes are ignored.
    pub fn language_multiplicity(&self, text: &str) -> Result<u32, ContentError> {
        let full = whatlang::detect(text).ok_or(ContentError::LanguageDetection)?;
        let mut languages: HashSet<Lang> = HashSet::new();
        languages.insert(full.lang());

        let mut mid = text.len() / 2;
        while !text.is_char_boundary(mid) {
            mid += 1;
        }
        for half in [&text[..mid], &text[mid..]] {
            if let Some(info) = whatlang::detect(half) {
                languages.insert(info.lang());
            }
        }

        if languages.len() > 1 && languages.contains(&self.target) {
            return Ok(2);
        }
        Ok(languages.len() as u32)
    }

    /// Analyzed word count for a post body: bilingual posts duplicate their
    /// content in two languages, so only half of the words count. When the
    /// language cannot be determined the raw count stands, the body is just
    /// ineligible for halving.
    pub fn counted_words(&self, text: &str) -> usize {
        let words = self.word_count(text);
        match self.language_multiplicity(text) {
            Ok(2) => words / 2,
            Ok(_) => words,
            Err(e) => {
                log::warn!("{e}; keeping full word count");
                words
            }
        }
    }
}
