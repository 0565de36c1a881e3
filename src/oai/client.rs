//! Verb-level client and the resumption-token pager.

use indexmap::IndexMap;
use tracing::debug;

use crate::config::{HandlerConfig, HarvestConfig};
use crate::error::{HarvestError, Result};
use crate::oai::request::{ListRecordsRequest, QueryParams, Verb};
use crate::oai::response::{
    parse_envelope, parse_identity, parse_metadata_formats, parse_record, parse_record_page,
    parse_sets, Envelope, MetadataFormat, RepositoryIdentity, SetInfo,
};
use crate::oai::transport::Transport;
use crate::oai::{RawRecord, RecordPage};

/// OAI-PMH client over a set of named handlers.
///
/// The client is stateless between calls and can be shared across threads
/// when its transport can.
#[derive(Debug)]
pub struct OaiClient<T> {
    handlers: IndexMap<String, HandlerConfig>,
    default_prefix: String,
    transport: T,
}

impl<T: Transport> OaiClient<T> {
    /// Creates a client for the handlers named in `config`.
    pub fn new(config: &HarvestConfig, transport: T) -> Self {
        Self {
            handlers: config
                .handlers
                .iter()
                .map(|h| (h.name.clone(), h.clone()))
                .collect(),
            default_prefix: config.default_metadata_prefix.clone(),
            transport,
        }
    }

    /// Names of the configured handlers, in configuration order.
    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Looks up a handler.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::UnknownHandler`] for an unconfigured name.
    pub fn handler(&self, name: &str) -> Result<&HandlerConfig> {
        self.handlers
            .get(name)
            .ok_or_else(|| HarvestError::UnknownHandler(name.to_string()))
    }

    /// Metadata prefix a request against `handler` uses when it names none.
    fn prefix_for<'a>(&'a self, handler: &'a HandlerConfig) -> &'a str {
        handler
            .metadata_prefix
            .as_deref()
            .unwrap_or(&self.default_prefix)
    }

    fn request(&self, handler: &HandlerConfig, verb: Verb, params: &QueryParams) -> Result<Envelope> {
        let body = self
            .transport
            .fetch(&handler.base_url, params)
            .map_err(|e| HarvestError::protocol(&handler.name, e.to_string()))?;
        parse_envelope(&handler.name, verb, &body)
    }

    fn single_shot(&self, name: &str, verb: Verb, params: QueryParams) -> Result<Option<crate::xml::XmlElement>> {
        let handler = self.handler(name)?;
        match self.request(handler, verb, &params)? {
            Envelope::Payload(element) => Ok(Some(element)),
            Envelope::NoRecords => Ok(None),
        }
    }

    /// Issues `Identify`.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::UnknownHandler`] or [`HarvestError::Protocol`].
    pub fn identify(&self, handler: &str) -> Result<RepositoryIdentity> {
        let element = self
            .single_shot(handler, Verb::Identify, vec![("verb", Verb::Identify.as_str().to_string())])?
            .ok_or_else(|| HarvestError::protocol(handler, "empty Identify response"))?;
        Ok(parse_identity(&element))
    }

    /// Issues `ListSets`. Only the first page of sets is read.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::UnknownHandler`] or [`HarvestError::Protocol`].
    pub fn list_sets(&self, handler: &str) -> Result<Vec<SetInfo>> {
        let element =
            self.single_shot(handler, Verb::ListSets, vec![("verb", Verb::ListSets.as_str().to_string())])?;
        Ok(element.as_ref().map(parse_sets).unwrap_or_default())
    }

    /// Issues `ListMetadataFormats`.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::UnknownHandler`] or [`HarvestError::Protocol`].
    pub fn list_metadata_formats(&self, handler: &str) -> Result<Vec<MetadataFormat>> {
        let element = self.single_shot(
            handler,
            Verb::ListMetadataFormats,
            vec![("verb", Verb::ListMetadataFormats.as_str().to_string())],
        )?;
        Ok(element.as_ref().map(parse_metadata_formats).unwrap_or_default())
    }

    /// Fetches one page of `ListRecords` (or `ListIdentifiers`).
    ///
    /// A `noRecordsMatch` answer is an empty page without a resumption token.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::UnknownHandler`] before any request is made for
    /// an unconfigured handler, and [`HarvestError::Protocol`] for transport
    /// failures, OAI error codes and unreadable responses.
    pub fn list_records(&self, request: &ListRecordsRequest) -> Result<RecordPage> {
        let handler = self.handler(&request.handler)?;
        let verb = request.verb();
        let params = request.query(self.prefix_for(handler));
        debug!(
            handler = %handler.name,
            %verb,
            resumption_token = request.resumption_token.as_deref().unwrap_or(""),
            "requesting page"
        );
        let page = match self.request(handler, verb, &params)? {
            Envelope::Payload(element) => parse_record_page(&handler.name, element)?,
            Envelope::NoRecords => RecordPage::default(),
        };
        debug!(
            handler = %handler.name,
            records = page.records.len(),
            more = page.has_more(),
            "page received"
        );
        Ok(page)
    }

    /// Issues `GetRecord` for one OAI identifier.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Protocol`] when the repository does not know
    /// the identifier (`idDoesNotExist`) or cannot disseminate the format.
    pub fn get_record(
        &self,
        handler: &str,
        identifier: &str,
        metadata_prefix: Option<&str>,
    ) -> Result<RawRecord> {
        let config = self.handler(handler)?;
        let prefix = metadata_prefix.unwrap_or_else(|| self.prefix_for(config));
        let params = vec![
            ("verb", Verb::GetRecord.as_str().to_string()),
            ("identifier", identifier.to_string()),
            ("metadataPrefix", prefix.to_string()),
        ];
        let mut element = match self.request(config, Verb::GetRecord, &params)? {
            Envelope::Payload(element) => element,
            Envelope::NoRecords => {
                return Err(HarvestError::protocol(handler, format!("no record '{identifier}'")))
            },
        };
        let index = element
            .children
            .iter()
            .position(|c| c.local_name == "record")
            .ok_or_else(|| HarvestError::protocol(handler, "GetRecord without record"))?;
        parse_record(handler, element.children.swap_remove(index))
    }

    /// Starts a lazy walk over every page of a listing.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::UnknownHandler`] immediately, before any
    /// request, when the handler is not configured.
    pub fn pages(&self, request: ListRecordsRequest) -> Result<RecordPager<'_, T>> {
        self.handler(&request.handler)?;
        Ok(RecordPager {
            client: self,
            request,
            state: PagerState::Idle,
            pages_fetched: 0,
        })
    }
}

/// Lifecycle of a [`RecordPager`].
///
/// `Idle → Requesting → PageReceived → (MoreAvailable → Requesting) | Done`;
/// a failed request moves to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PagerState {
    /// No page requested yet.
    Idle,
    /// A request is in flight.
    Requesting,
    /// A page arrived and is being inspected.
    PageReceived,
    /// Another page can be requested.
    MoreAvailable,
    /// The listing is exhausted.
    Done,
    /// The last request failed; [`RecordPager::retry`] re-arms it.
    Failed,
}

/// Lazy sequence of pages for one listing.
///
/// Pages are fetched strictly one after another. Iteration stops after the
/// first page without records or without a resumption token, and after a
/// failure until [`retry`](Self::retry) is called.
#[derive(Debug)]
pub struct RecordPager<'a, T> {
    client: &'a OaiClient<T>,
    request: ListRecordsRequest,
    state: PagerState,
    pages_fetched: usize,
}

impl<T: Transport> RecordPager<'_, T> {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> PagerState {
        self.state
    }

    /// Handler this pager walks.
    #[must_use]
    pub fn handler(&self) -> &str {
        &self.request.handler
    }

    /// Resumption token the next request will send.
    #[must_use]
    pub fn next_token(&self) -> Option<&str> {
        self.request.resumption_token.as_deref()
    }

    /// Number of pages received so far.
    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Requests the next page, or returns `None` when done or failed.
    pub fn next_page(&mut self) -> Option<Result<RecordPage>> {
        if matches!(self.state, PagerState::Done | PagerState::Failed) {
            return None;
        }
        self.state = PagerState::Requesting;
        match self.client.list_records(&self.request) {
            Ok(page) => {
                self.state = PagerState::PageReceived;
                self.pages_fetched += 1;
                if page.has_more() {
                    self.request.resumption_token.clone_from(&page.resumption_token);
                    self.state = PagerState::MoreAvailable;
                } else {
                    self.state = PagerState::Done;
                }
                Some(Ok(page))
            },
            Err(err) => {
                self.state = PagerState::Failed;
                Some(Err(err))
            },
        }
    }

    /// Re-arms a failed pager so the same page is requested again.
    ///
    /// Returns false when the pager was not in [`PagerState::Failed`].
    pub fn retry(&mut self) -> bool {
        if self.state != PagerState::Failed {
            return false;
        }
        self.state = if self.request.resumption_token.is_some() {
            PagerState::MoreAvailable
        } else {
            PagerState::Idle
        };
        true
    }
}

impl<T: Transport> Iterator for RecordPager<'_, T> {
    type Item = Result<RecordPage>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_page()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oai::transport::{FetchResult, TransportError};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers with queued bodies and records every request.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<FetchResult>>,
        requests: Mutex<Vec<Vec<(&'static str, String)>>>,
    }

    impl Scripted {
        fn new(responses: Vec<FetchResult>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Transport for Scripted {
        fn fetch(&self, _base_url: &str, params: &[(&'static str, String)]) -> FetchResult {
            self.requests.lock().unwrap().push(params.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::new("no scripted response")))
        }
    }

    fn config() -> HarvestConfig {
        HarvestConfig::new().with_handler(HandlerConfig::new("repoX", "https://repo.example.org/oai"))
    }

    fn listing(ids: &[&str], token: Option<&str>) -> FetchResult {
        let records: String = ids
            .iter()
            .map(|id| format!(r#"<record><header><identifier>{id}</identifier></header><metadata><OrgUnit id="{id}"/></metadata></record>"#))
            .collect();
        let token = token.map_or_else(String::new, |t| format!("<resumptionToken>{t}</resumptionToken>"));
        Ok(format!(
            r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/"><ListRecords>{records}{token}</ListRecords></OAI-PMH>"#
        ))
    }

    #[test]
    fn test_unknown_handler_fails_before_request() {
        let transport = Scripted::new(vec![]);
        let client = OaiClient::new(&config(), &transport);
        assert!(matches!(
            client.pages(ListRecordsRequest::new("repoY")),
            Err(HarvestError::UnknownHandler(ref name)) if name == "repoY"
        ));
        assert!(matches!(client.identify("repoY"), Err(HarvestError::UnknownHandler(_))));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn test_pager_follows_tokens_until_done() {
        let transport = Scripted::new(vec![listing(&["a", "b"], Some("t1")), listing(&["c"], None)]);
        let client = OaiClient::new(&config(), &transport);
        let mut pager = client.pages(ListRecordsRequest::new("repoX")).unwrap();
        assert_eq!(pager.state(), PagerState::Idle);

        let first = pager.next_page().unwrap().unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(pager.state(), PagerState::MoreAvailable);
        assert_eq!(pager.next_token(), Some("t1"));

        let second = pager.next_page().unwrap().unwrap();
        assert_eq!(second.records.len(), 1);
        assert_eq!(pager.state(), PagerState::Done);
        assert!(pager.next_page().is_none());
        assert_eq!(pager.pages_fetched(), 2);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[1], vec![("verb", "ListRecords".to_string()), ("resumptionToken", "t1".to_string())]);
    }

    #[test]
    fn test_empty_page_is_terminal_even_with_token() {
        let transport = Scripted::new(vec![listing(&[], Some("t1"))]);
        let client = OaiClient::new(&config(), &transport);
        let pages: Vec<_> = client.pages(ListRecordsRequest::new("repoX")).unwrap().collect();
        assert_eq!(pages.len(), 1);
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_failed_page_is_not_retried_automatically() {
        let transport = Scripted::new(vec![
            listing(&["a"], Some("t1")),
            Err(TransportError::new("connection reset")),
            listing(&["b"], None),
        ]);
        let client = OaiClient::new(&config(), &transport);
        let mut pager = client.pages(ListRecordsRequest::new("repoX")).unwrap();

        pager.next_page().unwrap().unwrap();
        let err = pager.next_page().unwrap().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(pager.state(), PagerState::Failed);
        assert!(pager.next_page().is_none());
        assert_eq!(transport.request_count(), 2);

        assert!(pager.retry());
        assert_eq!(pager.next_token(), Some("t1"));
        let page = pager.next_page().unwrap().unwrap();
        assert_eq!(page.records[0].header.identifier, "b");
        assert_eq!(pager.state(), PagerState::Done);
        assert!(!pager.retry());
    }

    #[test]
    fn test_no_records_match_is_empty_page() {
        let transport = Scripted::new(vec![Ok(
            r#"<OAI-PMH><error code="noRecordsMatch"/></OAI-PMH>"#.to_string(),
        )]);
        let client = OaiClient::new(&config(), &transport);
        let page = client.list_records(&ListRecordsRequest::new("repoX")).unwrap();
        assert!(page.records.is_empty());
        assert!(!page.has_more());
    }

    #[test]
    fn test_identifiers_only_uses_list_identifiers() {
        let transport = Scripted::new(vec![Ok(
            r"<OAI-PMH><ListIdentifiers><header><identifier>x</identifier></header></ListIdentifiers></OAI-PMH>"
                .to_string(),
        )]);
        let client = OaiClient::new(&config(), &transport);
        let page = client
            .list_records(&ListRecordsRequest::new("repoX").identifiers_only(true))
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(transport.requests.lock().unwrap()[0][0].1, "ListIdentifiers");
    }

    #[test]
    fn test_get_record() {
        let transport = Scripted::new(vec![Ok(r#"<OAI-PMH><GetRecord><record>
                <header><identifier>oai:repoX:OrgUnits/o1</identifier></header>
                <metadata><OrgUnit id="o1"><Name lang="en">Faculty</Name></OrgUnit></metadata>
            </record></GetRecord></OAI-PMH>"#
            .to_string())]);
        let client = OaiClient::new(&config(), &transport);
        let record = client.get_record("repoX", "oai:repoX:OrgUnits/o1", None).unwrap();
        assert_eq!(record.metadata.unwrap().attr("id"), Some("o1"));
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0][2], ("metadataPrefix", "oai_cerif_openaire".to_string()));
    }
}
