// Client library for the travel search API

// Core: documents, the HTTP client behind them and the search session
pub mod client;
pub mod config;
pub mod document;
pub mod errors;
pub mod session;
pub mod transport;
pub mod utils;
pub mod validations;

// Searches the API offers
pub mod flights;
pub mod hotels;

// Re-export key types for convenience
pub use client::{Client, FetchOutcome};
pub use config::{ClassMapping, DocumentKind, TapiConfig};
pub use document::{cache_fingerprint, Document, FetchOptions, Resolved, Value};
pub use errors::{HttpFailure, Result, TapiError};
pub use flights::FlightSearch;
pub use hotels::{parse_room_configuration, HotelSearch, LocationType, Room};
pub use session::{SearchQuery, SearchSession, SessionState};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
pub use utils::{append_query, params, parse_date, Param, Params};
pub use validations::{RuleSet, Validate, ValidationErrors};
