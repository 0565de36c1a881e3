//! OAI-PMH verbs and request parameters.

use std::fmt;

use chrono::NaiveDate;

/// The OAI-PMH verbs this client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Repository description.
    Identify,
    /// Set hierarchy.
    ListSets,
    /// Supported metadata formats.
    ListMetadataFormats,
    /// Headers and metadata.
    ListRecords,
    /// Headers only.
    ListIdentifiers,
    /// A single record.
    GetRecord,
}

impl Verb {
    /// Name of the verb as sent in the `verb` parameter.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identify => "Identify",
            Self::ListSets => "ListSets",
            Self::ListMetadataFormats => "ListMetadataFormats",
            Self::ListRecords => "ListRecords",
            Self::ListIdentifiers => "ListIdentifiers",
            Self::GetRecord => "GetRecord",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query parameters of one request, in the order they are sent.
pub type QueryParams = Vec<(&'static str, String)>;

/// Parameters of a `ListRecords` / `ListIdentifiers` listing.
///
/// # Examples
///
/// ```ignore
/// use chrono::NaiveDate;
/// use cerif_harvest::oai::ListRecordsRequest;
///
/// let request = ListRecordsRequest::new("repoX")
///     .with_metadata_prefix("oai_cerif_openaire")
///     .with_from(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
///     .with_set("openaire_cris_publications");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRecordsRequest {
    /// Handler to query.
    pub handler: String,
    /// Metadata prefix; the handler or client default applies when `None`.
    pub metadata_prefix: Option<String>,
    /// Lower datestamp bound (inclusive).
    pub from: Option<NaiveDate>,
    /// Upper datestamp bound (inclusive).
    pub until: Option<NaiveDate>,
    /// Set spec.
    pub set: Option<String>,
    /// Resumption token of the page to fetch; `None` for the first page.
    pub resumption_token: Option<String>,
    /// Use `ListIdentifiers` instead of `ListRecords`.
    pub identifiers_only: bool,
}

impl ListRecordsRequest {
    /// A first-page request against `handler` with no filters.
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            metadata_prefix: None,
            from: None,
            until: None,
            set: None,
            resumption_token: None,
            identifiers_only: false,
        }
    }

    /// Sets the metadata prefix.
    #[must_use]
    pub fn with_metadata_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_prefix = Some(prefix.into());
        self
    }

    /// Sets the lower datestamp bound.
    #[must_use]
    pub fn with_from(mut self, from: NaiveDate) -> Self {
        self.from = Some(from);
        self
    }

    /// Sets the upper datestamp bound.
    #[must_use]
    pub fn with_until(mut self, until: NaiveDate) -> Self {
        self.until = Some(until);
        self
    }

    /// Restricts the listing to a set.
    #[must_use]
    pub fn with_set(mut self, set: impl Into<String>) -> Self {
        self.set = Some(set.into());
        self
    }

    /// Requests headers only.
    #[must_use]
    pub fn identifiers_only(mut self, identifiers_only: bool) -> Self {
        self.identifiers_only = identifiers_only;
        self
    }

    /// Sets the resumption token of the page to fetch.
    #[must_use]
    pub fn with_resumption_token(mut self, token: impl Into<String>) -> Self {
        self.resumption_token = Some(token.into());
        self
    }

    /// Verb this request issues.
    #[must_use]
    pub fn verb(&self) -> Verb {
        if self.identifiers_only {
            Verb::ListIdentifiers
        } else {
            Verb::ListRecords
        }
    }

    /// Query parameters, with `default_prefix` used when none is set.
    ///
    /// A resumption token is an exclusive argument: when present, only the
    /// verb and the token are sent.
    #[must_use]
    pub fn query(&self, default_prefix: &str) -> QueryParams {
        let mut params = vec![("verb", self.verb().as_str().to_string())];
        if let Some(token) = &self.resumption_token {
            params.push(("resumptionToken", token.clone()));
            return params;
        }
        params.push((
            "metadataPrefix",
            self.metadata_prefix
                .clone()
                .unwrap_or_else(|| default_prefix.to_string()),
        ));
        if let Some(from) = self.from {
            params.push(("from", format_date(from)));
        }
        if let Some(until) = self.until {
            params.push(("until", format_date(until)));
        }
        if let Some(set) = &self.set {
            params.push(("set", set.clone()));
        }
        params
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
