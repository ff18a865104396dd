//! Ordered rule tables for each listing field.
//!
//! Every field kind gets two ordered lists: structural probes (CSS selectors
//! scoped to a markup unit) and text patterns (regexes run over the unit's
//! flattened text). Order is the contract. The extractor stops at the first
//! rule that yields an accepted value, so specific rules come before general
//! ones, e.g. `City, ST ZIP` before a bare ZIP code.
//!
//! The default tables are compiled once per process and shared through
//! [`PatternLibrary::shared`].

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;

/// Amount syntax shared by the price rules: `1,234.56`, `40`, `5.00`.
const AMOUNT: &str = r"\d+(?:,\d{3})*(?:\.\d{2})?";

const MONTH: &str = r"(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?";

/// A CSS selector probed inside a markup unit.
#[derive(Debug)]
pub struct Probe {
    pub selector: Selector,
    pub css: &'static str,
    /// Separator placed between the matched element's text fragments.
    pub joiner: &'static str,
    /// Values of this many characters or fewer are rejected.
    pub min_chars: usize,
    /// Attribute consulted before the element text, e.g. `datetime` on `<time>`.
    pub attr: Option<&'static str>,
}

impl Probe {
    fn new(css: &'static str) -> Self {
        Self {
            selector: Selector::parse(css).expect("valid selector"),
            css,
            joiner: " ",
            min_chars: 0,
            attr: None,
        }
    }

    fn joined(mut self, joiner: &'static str) -> Self {
        self.joiner = joiner;
        self
    }

    fn min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    fn attr(mut self, attr: &'static str) -> Self {
        self.attr = Some(attr);
        self
    }
}

/// A regex whose capture group 1 is the field value.
#[derive(Debug)]
pub struct Rule {
    pub name: &'static str,
    pub regex: Regex,
    /// Captures of this many characters or fewer are rejected.
    pub min_chars: usize,
}

impl Rule {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("valid regex"),
            min_chars: 0,
        }
    }

    fn min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    /// The trimmed capture of this rule in `text`, if it matches and is long
    /// enough.
    pub fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        let caps = self.regex.captures(text)?;
        let value = caps.get(1)?.as_str().trim();
        if value.is_empty() || value.chars().count() <= self.min_chars {
            return None;
        }
        Some(value)
    }
}

/// Probes and patterns for one field kind.
#[derive(Debug, Default)]
pub struct FieldRules {
    pub probes: Vec<Probe>,
    pub patterns: Vec<Rule>,
}

impl FieldRules {
    /// First pattern in list order that yields a capture, with its name.
    pub fn first_capture<'t>(&self, text: &'t str) -> Option<(&'static str, &'t str)> {
        self.patterns
            .iter()
            .find_map(|rule| rule.capture(text).map(|value| (rule.name, value)))
    }
}

/// Regexes applied to a title before it becomes a record title.
#[derive(Debug)]
pub struct TitleCleanup {
    pub price_tokens: Vec<Regex>,
    pub trailing_suffix: Regex,
}

impl TitleCleanup {
    /// Remove price tokens and a trailing parenthesized location, then
    /// collapse whitespace.
    pub fn apply(&self, title: &str) -> String {
        let mut cleaned = title.to_string();
        for re in &self.price_tokens {
            cleaned = re.replace_all(&cleaned, "").into_owned();
        }
        cleaned = self.trailing_suffix.replace(&cleaned, "").into_owned();
        crate::utils::collapse_whitespace(&cleaned)
    }
}

/// The complete rule set used by the extractor.
#[derive(Debug)]
pub struct PatternLibrary {
    pub title: FieldRules,
    pub location: FieldRules,
    pub date: FieldRules,
    pub price: FieldRules,
    pub title_cleanup: TitleCleanup,
    /// A bare amount, used to read a price out of a probed price element.
    pub amount: Regex,
}

static SHARED: Lazy<PatternLibrary> = Lazy::new(PatternLibrary::default);

impl PatternLibrary {
    /// The process-wide default library, compiled on first use.
    pub fn shared() -> &'static PatternLibrary {
        &SHARED
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        let title = FieldRules {
            probes: vec![
                Probe::new("h3"),
                Probe::new("h2"),
                Probe::new("h4"),
                Probe::new(".title"),
                Probe::new(r#"[class*="title"]"#),
                Probe::new("a"),
            ],
            patterns: Vec::new(),
        };

        let location = FieldRules {
            probes: vec![
                Probe::new("address").joined(", ").min_chars(2),
                Probe::new("app-sale-address").joined(", ").min_chars(2),
                Probe::new(".address").joined(", ").min_chars(2),
                Probe::new(".location").min_chars(2),
                Probe::new(".city").min_chars(2),
                Probe::new(r#"[class*="location"]"#).min_chars(2),
                Probe::new(r#"[class*="city"]"#).min_chars(2),
                Probe::new(r#"[class*="address"]"#).joined(", ").min_chars(2),
            ],
            patterns: vec![
                Rule::new(
                    "labelled",
                    r"(?im)\b(?:address|location|where)[ \t]*:[ \t]*([^\n|;]+?)[ \t]*(?:$|[|;]|\s(?:date|when|time|price|cost)[ \t]*:)",
                )
                .min_chars(2),
                Rule::new(
                    "parenthesized_city_state",
                    r"\([ \t]*([A-Za-z][A-Za-z .'-]*,[ \t]*[A-Z]{2}(?:[ \t]+\d{5})?)[ \t]*\)",
                )
                .min_chars(2),
                Rule::new(
                    "street_address",
                    r"(?i)\b(\d+[ \t]+[A-Za-z0-9 .]+?[ \t](?:st|street|ave|avenue|rd|road|blvd|boulevard|dr|drive|ln|lane|way|ct|court)\b\.?)",
                )
                .min_chars(2),
                Rule::new(
                    "city_state_zip",
                    r"\b([A-Z][A-Za-z.'-]*(?:[ \t]+[A-Z][A-Za-z.'-]*)*,[ \t]*[A-Z]{2}[ \t]+\d{5}(?:-\d{4})?)\b",
                )
                .min_chars(2),
                Rule::new(
                    "city_state",
                    r"\b([A-Z][A-Za-z.'-]*(?:[ \t]+[A-Z][A-Za-z.'-]*)*,[ \t]*[A-Z]{2})\b",
                )
                .min_chars(2),
                Rule::new("trailing_parenthesized", r"\(([^)]+)\)\s*$").min_chars(2),
                Rule::new("zip", r"\b(\d{5})\b"),
            ],
        };

        let date = FieldRules {
            probes: vec![
                Probe::new("time").attr("datetime"),
                Probe::new("app-sale-date"),
                Probe::new(".date"),
                Probe::new(".when"),
                Probe::new(r#"[class*="date"]"#),
                Probe::new(r#"[class*="time"]"#),
            ],
            patterns: vec![
                Rule::new("year_first", r"\b(\d{4}[/-]\d{1,2}[/-]\d{1,2})\b"),
                Rule::new("month_first", r"\b(\d{1,2}[/-]\d{1,2}[/-](?:\d{4}|\d{2}))\b"),
                Rule::new(
                    "month_name_first",
                    &format!(r"(?i)\b({MONTH}\s+\d{{1,2}}(?:,\s*\d{{4}})?)\b"),
                ),
                Rule::new(
                    "day_first",
                    &format!(r"(?i)\b(\d{{1,2}}\s+{MONTH}(?:,?\s*\d{{4}})?)\b"),
                ),
            ],
        };

        let price = FieldRules {
            probes: vec![
                Probe::new(".price"),
                Probe::new(".cost"),
                Probe::new(r#"[class*="price"]"#),
                Probe::new(r#"[class*="cost"]"#),
            ],
            patterns: vec![
                Rule::new("price_label", &format!(r"(?i)\bprice[:\s]*\$?({AMOUNT})")),
                Rule::new("cost_label", &format!(r"(?i)\bcost[:\s]*\$?({AMOUNT})")),
                Rule::new("dollar_sign", &format!(r"\$({AMOUNT})")),
                Rule::new("dollars_word", &format!(r"(?i)\b({AMOUNT})\s*dollars?\b")),
                Rule::new("trailing_dollar", &format!(r"\b({AMOUNT})\s*\$")),
            ],
        };

        let title_cleanup = TitleCleanup {
            price_tokens: vec![
                Regex::new(&format!(r"\${AMOUNT}")).expect("valid regex"),
                Regex::new(&format!(r"(?i)\b{AMOUNT}\s*dollars?\b")).expect("valid regex"),
            ],
            trailing_suffix: Regex::new(r"\s*\([^)]+\)\s*$").expect("valid regex"),
        };

        Self {
            title,
            location,
            date,
            price,
            title_cleanup,
            amount: Regex::new(&format!(r"({AMOUNT})")).expect("valid regex"),
        }
    }
}
