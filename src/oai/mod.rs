//! OAI-PMH protocol client.
//!
//! The [`OaiClient`] issues the six OAI-PMH verbs against named handlers and
//! returns typed results. Listings are paged through resumption tokens; the
//! [`RecordPager`] walks them lazily, one request per page, and never retries
//! on its own. A failed page leaves the pager in [`PagerState::Failed`] and the
//! caller decides whether to [`retry`](RecordPager::retry) it.
//!
//! # Examples
//!
//! ```ignore
//! use cerif_harvest::config::{HandlerConfig, HarvestConfig};
//! use cerif_harvest::oai::{HttpTransport, ListRecordsRequest, OaiClient};
//!
//! let config = HarvestConfig::new()
//!     .with_handler(HandlerConfig::new("repoX", "https://repo.example.org/oai"));
//! let client = OaiClient::new(&config, HttpTransport::from_config(&config)?);
//!
//! for page in client.pages(ListRecordsRequest::new("repoX"))? {
//!     for record in page?.records {
//!         println!("{}", record.header.identifier);
//!     }
//! }
//! # Ok::<(), cerif_harvest::HarvestError>(())
//! ```

mod client;
mod request;
mod response;
mod transport;

pub use client::{OaiClient, PagerState, RecordPager};
pub use request::{ListRecordsRequest, QueryParams, Verb};
pub use response::{MetadataFormat, RepositoryIdentity, SetInfo, NO_RECORDS_MATCH};
pub use transport::{FetchResult, HttpTransport, Transport, TransportError};

use crate::model::RecordHeader;
use crate::xml::XmlElement;

/// A record as received: header plus the unparsed metadata root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// OAI header.
    pub header: RecordHeader,
    /// First child of `<metadata>`; absent for deleted records and identifier listings.
    pub metadata: Option<XmlElement>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPage {
    /// Records in repository order.
    pub records: Vec<RawRecord>,
    /// Token for the next page; `None` when the listing is complete.
    pub resumption_token: Option<String>,
    /// Total listing size, when the repository reports it.
    pub complete_list_size: Option<u64>,
}

impl RecordPage {
    /// Whether another page follows.
    #[must_use]
    pub fn has_more(&self) -> bool {
        !self.records.is_empty() && self.resumption_token.is_some()
    }
}
