use chrono::NaiveDate;
use pubdate_common::ArticleMetadata;
use serde::{Serialize, Serializer};
use std::fmt;

/// Where on the page a date was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateLocation {
    Element,
    Attribute,
    HtmlString,
    JsonString,
    Url,
    StructuredData,
    Meta,
}

impl DateLocation {
    pub fn label(self) -> &'static str {
        match self {
            DateLocation::Element => "HTML Element",
            DateLocation::Attribute => "HTML Attribute",
            DateLocation::HtmlString => "HTML String",
            DateLocation::JsonString => "JSON String",
            DateLocation::Url => "Article URL",
            DateLocation::StructuredData => "Structured Data",
            DateLocation::Meta => "Meta Tag",
        }
    }
}

impl fmt::Display for DateLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for DateLocation {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.label())
    }
}

/// A date that has passed the plausibility filter.
///
/// Only [`crate::normalize::Normalizer`] can mint one, so holding a
/// `ValidDate` is proof the checks ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ValidDate(NaiveDate);

impl ValidDate {
    pub(crate) fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }
}

/// A normalised date plus where and how it was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDate {
    #[serde(serialize_with = "serialize_day")]
    value: NaiveDate,
    #[serde(rename = "location")]
    source_location: DateLocation,
    #[serde(rename = "html")]
    raw_fragment: String,
    #[serde(skip)]
    has_structured_origin: bool,
}

impl CandidateDate {
    pub(crate) fn new(date: ValidDate, location: DateLocation, fragment: impl Into<String>) -> Self {
        Self {
            value: date.date(),
            source_location: location,
            raw_fragment: fragment.into(),
            has_structured_origin: false,
        }
    }

    pub(crate) fn structured(
        date: ValidDate,
        location: DateLocation,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            has_structured_origin: true,
            ..Self::new(date, location, fragment)
        }
    }

    pub fn value(&self) -> NaiveDate {
        self.value
    }

    pub fn source_location(&self) -> DateLocation {
        self.source_location
    }

    pub fn raw_fragment(&self) -> &str {
        &self.raw_fragment
    }

    pub fn has_structured_origin(&self) -> bool {
        self.has_structured_origin
    }
}

fn serialize_day<S: Serializer>(d: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&d.format("%Y-%m-%d"))
}

fn serialize_candidate_day<S: Serializer>(
    d: &Option<CandidateDate>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match d {
        Some(c) => serialize_day(&c.value, s),
        None => s.serialize_none(),
    }
}

/// Outcome of one extraction: dates, the fragment behind the publish date
/// and best-effort article metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    #[serde(serialize_with = "serialize_candidate_day")]
    pub publish_date: Option<CandidateDate>,
    #[serde(serialize_with = "serialize_candidate_day")]
    pub modify_date: Option<CandidateDate>,
    pub organization: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<DateLocation>,
    #[serde(rename = "html")]
    pub debug_html: Option<String>,
    /// Name of the strategy that produced the publish date.
    pub strategy: Option<&'static str>,
}

impl ExtractionResult {
    pub fn metadata(&self) -> ArticleMetadata {
        ArticleMetadata {
            organization: self.organization.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }
}
