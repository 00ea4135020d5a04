use std::collections::BTreeMap;

use scraper::Html;

use crate::error::ScrapeError;
use crate::parse::create_selector;
use crate::{EVENT_ARGUMENT_FIELD, EVENT_TARGET_FIELD, GRID_EVENT_TARGET};

/// Snapshot of every named input of the page's form.
///
/// A state is captured from one response and consumed by exactly one postback.
/// Mutation never happens in place: [`FormState::for_page`] hands back a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    fields: BTreeMap<String, String>,
}

impl FormState {
    /// Collects `name`/`value` of all inputs inside the first `<form>`.
    /// Inputs without a `value` attribute are sent as empty strings.
    pub fn capture(doc: &Html) -> Result<Self, ScrapeError> {
        let form_selector = create_selector("form")?;
        let input_selector = create_selector("input[name]")?;

        let form = doc
            .select(&form_selector)
            .next()
            .ok_or_else(|| ScrapeError::Parse("response contains no <form>".into()))?;

        let fields = form
            .select(&input_selector)
            .filter_map(|input| {
                let name = input.value().attr("name")?;
                let value = input.value().attr("value").unwrap_or_default();
                Some((name.to_string(), value.to_string()))
            })
            .collect();

        Ok(Self { fields })
    }

    pub fn from_html(html: &str) -> Result<Self, ScrapeError> {
        Self::capture(&Html::parse_document(html))
    }

    /// Copy of this state with the two postback fields set so the grid serves `target_page`.
    pub fn for_page(&self, target_page: usize) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(EVENT_TARGET_FIELD.into(), GRID_EVENT_TARGET.into());
        fields.insert(EVENT_ARGUMENT_FIELD.into(), format!("Page${target_page}"));
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field pairs in the shape `reqwest` urlencodes as a form body.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
