#![forbid(unsafe_code)]

pub mod config;
pub mod loader;
pub mod stats;
pub mod timeline;
pub mod transport;

pub use config::{LoadConfig, TransportSetup};
pub use loader::{
    LoadContext, LoadFailure, LoadResponse, LoaderCallbacks, LoaderState, SegmentLoader,
};
pub use stats::{LoadReport, LoadStats};
pub use timeline::{reconcile_fragment_times, Fragment, LevelDetails, ProposedTimes};
pub use transport::{
    DefaultTransportProvider, DirectTransport, EventSender, HttpTransport, ReadyState,
    ReadyStateCell, ResponseBody, ResponseKind, Transport, TransportAdapter, TransportError,
    TransportEvent, TransportProvider, TransportRequest, TransportResult,
};
