use log::debug;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::error::ExtractionError;
use crate::property::split_address;

/// Fields pulled from a parcel detail page. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedProperty {
    pub parcel: Option<String>,
    pub owner1: Option<String>,
    pub owner2: Option<String>,
    pub mailing_lines: Vec<String>,
    pub location: Option<String>,
    pub town: Option<String>,
}

impl ExtractedProperty {
    pub fn is_empty(&self) -> bool {
        self.owner1.is_none()
            && self.owner2.is_none()
            && self.mailing_lines.is_empty()
            && self.location.is_none()
            && self.town.is_none()
    }

    /// Fills fields that are still missing from `other`. Existing values win.
    pub fn merge_missing(&mut self, other: ExtractedProperty) {
        if self.parcel.is_none() {
            self.parcel = other.parcel;
        }
        if self.owner1.is_none() {
            self.owner1 = other.owner1;
        }
        if self.owner2.is_none() {
            self.owner2 = other.owner2;
        }
        if self.mailing_lines.is_empty() {
            self.mailing_lines = other.mailing_lines;
        }
        if self.location.is_none() {
            self.location = other.location;
        }
        if self.town.is_none() {
            self.town = other.town;
        }
    }
}

/// One way of reading a detail page. Returns `None` when nothing it knows is present.
pub trait ExtractionStrategy {
    fn name(&self) -> &'static str;
    fn extract(&self, document: &Html) -> Option<ExtractedProperty>;
}

pub struct Extractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    /// Structural ids first, labelled text as the fallback.
    pub fn new() -> Self {
        Extractor {
            strategies: vec![Box::new(LabelIdStrategy::new()), Box::new(LabeledTextStrategy::new())],
        }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Extractor { strategies }
    }

    pub fn parse(&self, html: &str) -> Result<ExtractedProperty, ExtractionError> {
        let document = Html::parse_document(html);
        let mut merged: Option<ExtractedProperty> = None;

        for strategy in &self.strategies {
            match strategy.extract(&document) {
                Some(found) => {
                    debug!("Strategy '{}' matched", strategy.name());
                    match merged.as_mut() {
                        Some(current) => current.merge_missing(found),
                        None => merged = Some(found),
                    }
                }
                None => debug!("Strategy '{}' found nothing", strategy.name()),
            }
        }

        merged.filter(|p| !p.is_empty()).ok_or(ExtractionError::NoDataFound)
    }
}

fn clean(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Reads the assessor's `lbl*` span ids.
pub struct LabelIdStrategy {
    parcel: Selector,
    owner1: Selector,
    owner2: Selector,
    mailing: Vec<Selector>,
    location: Selector,
    town: Selector,
}

impl Default for LabelIdStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelIdStrategy {
    pub fn new() -> Self {
        let sel = |css: &str| Selector::parse(css).expect("static selector is valid");
        LabelIdStrategy {
            parcel: sel("#lblParcel"),
            owner1: sel("#lblOwner1"),
            owner2: sel("#lblOwner2"),
            mailing: (1..=5).map(|i| sel(&format!("#lblAddr{}", i))).collect(),
            location: sel("#lblLocation"),
            town: sel("#lblTown"),
        }
    }

    fn text_of(document: &Html, selector: &Selector) -> Option<String> {
        document
            .select(selector)
            .next()
            .and_then(|el| clean(&el.text().collect::<String>()))
    }
}

/// Text segments of an element, split at `<br>` tags.
fn br_segments(element: ElementRef) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for child in element.children() {
        match child.value() {
            Node::Text(text) => current.push_str(text),
            Node::Element(el) if el.name().eq_ignore_ascii_case("br") => {
                segments.extend(clean(&current));
                current.clear();
            }
            Node::Element(_) => {
                if let Some(inner) = ElementRef::wrap(child) {
                    current.push(' ');
                    current.push_str(&inner.text().collect::<String>());
                }
            }
            _ => {}
        }
    }
    segments.extend(clean(&current));
    segments
}

impl ExtractionStrategy for LabelIdStrategy {
    fn name(&self) -> &'static str {
        "label-ids"
    }

    fn extract(&self, document: &Html) -> Option<ExtractedProperty> {
        let mut found = ExtractedProperty {
            parcel: Self::text_of(document, &self.parcel),
            ..Default::default()
        };

        if let Some(owner_el) = document.select(&self.owner1).next() {
            let mut owners = br_segments(owner_el).into_iter();
            found.owner1 = owners.next();
            found.owner2 = owners.next();
        }
        if found.owner2.is_none() {
            found.owner2 = Self::text_of(document, &self.owner2);
        }

        found.mailing_lines = self
            .mailing
            .iter()
            .filter_map(|s| Self::text_of(document, s))
            .collect();
        found.location = Self::text_of(document, &self.location);
        found.town = Self::text_of(document, &self.town);

        if found.is_empty() {
            None
        } else {
            Some(found)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Parcel,
    Owner1,
    Owner2,
    Mailing,
    Location,
    Town,
}

const MAX_MAILING_LINES: usize = 5;

/// Elements whose text never renders on the page.
const HIDDEN_TEXT: [&str; 4] = ["script", "style", "noscript", "template"];

/// Rendered text nodes under `element`, in document order.
fn visible_text(element: ElementRef<'_>) -> Vec<&str> {
    element
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node.ancestors().any(|a| {
                    matches!(a.value(), Node::Element(el) if HIDDEN_TEXT.contains(&el.name()))
                });
                if hidden {
                    None
                } else {
                    Some(&**text)
                }
            }
            _ => None,
        })
        .collect()
}

/// Scans the page text for `Label: value` lines.
pub struct LabeledTextStrategy {
    labels: Vec<(Label, Regex)>,
    any_label: Regex,
    body: Selector,
}

impl Default for LabeledTextStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl LabeledTextStrategy {
    pub fn new() -> Self {
        let re = |pattern: &str| Regex::new(pattern).expect("static label pattern is valid");
        LabeledTextStrategy {
            labels: vec![
                (Label::Owner2, re(r"(?i)^owner\s*(?:#\s*)?2\s*:\s*(.*)$")),
                (Label::Owner1, re(r"(?i)^owner(?:\s*(?:#\s*)?1|\s+name)?\s*:\s*(.*)$")),
                (Label::Mailing, re(r"(?i)^mailing\s+address\s*:\s*(.*)$")),
                (Label::Location, re(r"(?i)^(?:location|situs|property)(?:\s+address)?\s*:\s*(.*)$")),
                (Label::Town, re(r"(?i)^(?:city\s*/\s*unincorporated\s+town|city|town)\s*:\s*(.*)$")),
                (Label::Parcel, re(r"(?i)^parcel(?:\s*(?:#|no\.?|number))?\s*:\s*(.*)$")),
            ],
            any_label: re(r"^[A-Za-z][A-Za-z0-9 /#.]{0,40}:"),
            body: Selector::parse("body").expect("static selector is valid"),
        }
    }

    fn lines(&self, document: &Html) -> Vec<String> {
        let text = match document.select(&self.body).next() {
            Some(body) => visible_text(body),
            None => visible_text(document.root_element()),
        };
        text.iter()
            .flat_map(|chunk| chunk.lines())
            .filter_map(clean)
            .collect()
    }

    /// Mailing lines following a bare label. The block ends at the next label,
    /// after the city/state/zip line, or at `MAX_MAILING_LINES`.
    fn mailing_block(&self, following: &[String]) -> Vec<String> {
        let mut block = Vec::new();
        for line in following.iter().take(MAX_MAILING_LINES) {
            if self.any_label.is_match(line) {
                break;
            }
            block.push(line.clone());
            if split_address(line).is_some() {
                break;
            }
        }
        block
    }

    fn classify(&self, line: &str) -> Option<(Label, String)> {
        self.labels.iter().find_map(|(label, re)| {
            re.captures(line)
                .map(|caps| (*label, caps.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default()))
        })
    }
}

impl ExtractionStrategy for LabeledTextStrategy {
    fn name(&self) -> &'static str {
        "labeled-text"
    }

    fn extract(&self, document: &Html) -> Option<ExtractedProperty> {
        let lines = self.lines(document);
        let mut found = ExtractedProperty::default();

        for (idx, line) in lines.iter().enumerate() {
            let Some((label, inline)) = self.classify(line) else {
                continue;
            };

            // Value on the label line, otherwise on the lines that follow (table layouts).
            let values: Vec<String> = if !inline.is_empty() {
                vec![inline]
            } else if label == Label::Mailing {
                self.mailing_block(&lines[idx + 1..])
            } else {
                lines[idx + 1..]
                    .iter()
                    .take_while(|l| !self.any_label.is_match(l))
                    .take(1)
                    .cloned()
                    .collect()
            };
            let Some(first) = values.first().cloned() else {
                continue;
            };

            match label {
                Label::Owner1 if found.owner1.is_none() => found.owner1 = Some(first),
                Label::Owner2 if found.owner2.is_none() => found.owner2 = Some(first),
                Label::Mailing if found.mailing_lines.is_empty() => found.mailing_lines = values,
                Label::Location if found.location.is_none() => found.location = Some(first),
                Label::Town if found.town.is_none() => found.town = Some(first),
                Label::Parcel if found.parcel.is_none() => found.parcel = Some(first),
                _ => {}
            }
        }

        if found.is_empty() {
            None
        } else {
            Some(found)
        }
    }
}
